//! Reading manifests out of gzipped BOSH tarballs.

use std::fs::File;
use std::io::Read;
use std::path::{Component, Path};

use flate2::read::GzDecoder;
use serde::de::DeserializeOwned;
use tessera_schema::{ReleaseManifest, StemcellManifest};

use crate::error::{ReleaseError, Result};

pub const RELEASE_MANIFEST: &str = "release.MF";
pub const STEMCELL_MANIFEST: &str = "stemcell.MF";

/// Parse `release.MF` from a release tarball.
pub fn read_release_manifest(path: &Path) -> Result<ReleaseManifest> {
    read_manifest(path, RELEASE_MANIFEST)
}

/// Parse `stemcell.MF` from a stemcell tarball.
pub fn read_stemcell_manifest(path: &Path) -> Result<StemcellManifest> {
    read_manifest(path, STEMCELL_MANIFEST)
}

fn read_manifest<T: DeserializeOwned>(path: &Path, member: &str) -> Result<T> {
    let bytes = read_member(path, member)?;
    serde_yaml::from_slice(&bytes).map_err(|e| ReleaseError::Tarball {
        path: path.to_path_buf(),
        message: format!("{member} is not valid: {e}"),
    })
}

/// Read a top-level member of a `.tgz`, accepting both `name` and `./name`.
fn read_member(path: &Path, member: &str) -> Result<Vec<u8>> {
    let invalid = |message: String| ReleaseError::Tarball {
        path: path.to_path_buf(),
        message,
    };

    let file = File::open(path).map_err(|e| ReleaseError::io(path, e))?;
    let mut archive = tar::Archive::new(GzDecoder::new(file));
    let entries = archive.entries().map_err(|e| invalid(e.to_string()))?;

    for entry in entries {
        let mut entry = entry.map_err(|e| invalid(e.to_string()))?;
        let entry_path = entry.path().map_err(|e| invalid(e.to_string()))?;
        let mut components = entry_path
            .components()
            .filter(|c| !matches!(c, Component::CurDir));
        let is_member = matches!(
            (components.next(), components.next()),
            (Some(Component::Normal(name)), None) if name == member
        );
        if is_member {
            let mut buf = Vec::new();
            entry
                .read_to_end(&mut buf)
                .map_err(|e| invalid(e.to_string()))?;
            return Ok(buf);
        }
    }

    Err(invalid(format!("{member} not found")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{write_release_tarball, write_tarball};
    use tempfile::tempdir;

    #[test]
    fn test_reads_release_manifest() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("bpm.tgz");
        write_release_tarball(&path, "bpm", "1.1.21", Some("alpine/9.0.0"));

        let manifest = read_release_manifest(&path).unwrap();
        assert_eq!(manifest.name, "bpm");
        assert_eq!(manifest.version, "1.1.21");
        assert_eq!(manifest.compiled_packages[0].stemcell, "alpine/9.0.0");
    }

    #[test]
    fn test_reads_dot_slash_stemcell_manifest() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("stemcell.tgz");
        write_tarball(
            &path,
            &[(
                "./stemcell.MF",
                b"name: bosh-alpine\noperating_system: alpine\nversion: 9.0.0\n".as_slice(),
            )],
        );

        let manifest = read_stemcell_manifest(&path).unwrap();
        assert_eq!(manifest.operating_system, "alpine");
        assert_eq!(manifest.version, "9.0.0");
    }

    #[test]
    fn test_missing_manifest_is_tarball_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("empty.tgz");
        write_tarball(&path, &[("README", b"hi".as_slice())]);

        let err = read_release_manifest(&path).unwrap_err();
        assert!(matches!(err, ReleaseError::Tarball { .. }));
    }
}
