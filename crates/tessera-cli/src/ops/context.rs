//! Shared command context.
//!
//! Groups the loaded manifest, its lockfile and the release sources built
//! from it, so commands do not each repeat the loading.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context as _, Result};
use tessera_core::Reporter;
use tessera_core::director::{Director, DirectorConfig, HttpDirector};
use tessera_core::source::SourceRegistry;
use tessera_schema::{Kilnfile, KilnfileLock};
use tracing::debug;

use crate::DirectorArgs;
use crate::ui::ConsoleReporter;

pub struct Context {
    pub kilnfile: Kilnfile,
    pub lockfile: KilnfileLock,
    pub lockfile_path: PathBuf,
    pub registry: SourceRegistry,
    pub reporter: Arc<dyn Reporter>,
}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Context")
            .field("lockfile_path", &self.lockfile_path)
            .field("sources", &self.registry.sources().ids())
            .finish_non_exhaustive()
    }
}

impl Context {
    pub fn load(kilnfile_path: &Path, lockfile_path: &Path) -> Result<Self> {
        let kilnfile = Kilnfile::load(kilnfile_path)
            .with_context(|| format!("loading {}", kilnfile_path.display()))?;
        let lockfile = KilnfileLock::load(lockfile_path)
            .with_context(|| format!("loading {}", lockfile_path.display()))?;
        let client = reqwest::Client::builder()
            .user_agent(crate::USER_AGENT)
            .build()
            .context("building HTTP client")?;
        let registry = SourceRegistry::from_kilnfile(&kilnfile, &client)
            .context("configuring release sources")?;
        debug!(
            kilnfile = %kilnfile_path.display(),
            releases = lockfile.releases.len(),
            sources = ?registry.sources().ids(),
            "loaded manifest"
        );
        Ok(Self {
            kilnfile,
            lockfile,
            lockfile_path: lockfile_path.to_path_buf(),
            registry,
            reporter: Arc::new(ConsoleReporter::spawn()),
        })
    }

    pub fn save_lockfile(&self) -> Result<()> {
        self.lockfile
            .save(&self.lockfile_path)
            .with_context(|| format!("writing {}", self.lockfile_path.display()))
    }

    pub fn director(args: &DirectorArgs) -> Result<Arc<dyn Director>> {
        let mut config = DirectorConfig::new(&args.environment);
        config.client.clone_from(&args.client);
        config.client_secret.clone_from(&args.client_secret);
        config.ca_cert = args.ca_cert.as_deref().map(read_ca_cert).transpose()?;
        let director = HttpDirector::new(config).context("connecting to the BOSH director")?;
        Ok(Arc::new(director))
    }
}

/// `BOSH_CA_CERT` holds either the PEM itself or a path to it.
fn read_ca_cert(value: &str) -> Result<String> {
    if value.trim_start().starts_with("-----BEGIN") {
        return Ok(value.to_string());
    }
    std::fs::read_to_string(value).with_context(|| format!("reading CA certificate {value}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_ca_cert_inline_or_path() {
        let pem = "-----BEGIN CERTIFICATE-----\nMIIB\n-----END CERTIFICATE-----\n";
        assert_eq!(read_ca_cert(pem).unwrap(), pem);

        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(pem.as_bytes()).unwrap();
        let path = file.path().to_str().unwrap();
        assert_eq!(read_ca_cert(path).unwrap(), pem);

        assert!(read_ca_cert("/does/not/exist.pem").is_err());
    }
}
