//! The `Kilnfile` manifest and its `Kilnfile.lock`.
//!
//! Key names match the files existing products already carry, so a lockfile
//! written here can be read by older tooling and vice versa.

use std::fs;
use std::io::Write;
use std::path::Path;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::SchemaError;
use crate::release::{Lock, Spec, Stemcell};
use crate::version::VersionConstraint;

/// Backend kinds a release source may be configured as.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SourceKind {
    /// An S3 (or S3-compatible) bucket.
    #[default]
    #[serde(rename = "s3")]
    S3,
    /// The public bosh.io release index.
    #[serde(rename = "bosh.io")]
    BoshIo,
    /// Release assets attached to GitHub releases of one organisation.
    #[serde(rename = "github")]
    Github,
    /// A JFrog Artifactory repository.
    #[serde(rename = "artifactory")]
    Artifactory,
    /// Any other type string. Kept so unknown sources fail at construction
    /// with a useful message instead of at parse time.
    #[serde(other)]
    Unsupported,
}

impl SourceKind {
    /// The type string as written in a Kilnfile.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::S3 => "s3",
            Self::BoshIo => "bosh.io",
            Self::Github => "github",
            Self::Artifactory => "artifactory",
            Self::Unsupported => "unsupported",
        }
    }
}

/// One entry of `release_sources`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReleaseSourceConfig {
    /// Backend kind.
    #[serde(rename = "type")]
    pub kind: SourceKind,
    /// Explicit id. See [`ReleaseSourceConfig::source_id`] for the default.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub id: String,
    /// Whether releases from this source may ship in a product.
    #[serde(default)]
    pub publishable: bool,
    /// S3 bucket name.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub bucket: String,
    /// S3 region.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub region: String,
    /// S3 access key id.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub access_key_id: String,
    /// S3 secret access key.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub secret_access_key: String,
    /// Object key template, e.g. `{{.Name}}/{{.Name}}-{{.Version}}.tgz`.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub path_template: String,
    /// Endpoint override for S3-compatible stores and bosh.io mirrors.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub endpoint: String,
    /// GitHub organisation whose repositories are searched.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub org: String,
    /// GitHub API token.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub github_token: String,
    /// Artifactory base URL, e.g. `https://artifactory.example.com`.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub artifactory_host: String,
    /// Artifactory repository key.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub repo: String,
    /// Artifactory user.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub username: String,
    /// Artifactory password or API key.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub password: String,
}

impl ReleaseSourceConfig {
    /// The id this source is referred to by.
    ///
    /// Falls back to the bucket for S3, the organisation for GitHub, and
    /// the type string for bosh.io and Artifactory.
    pub fn source_id(&self) -> String {
        if !self.id.is_empty() {
            return self.id.clone();
        }
        match self.kind {
            SourceKind::BoshIo | SourceKind::Artifactory => self.kind.as_str().to_string(),
            SourceKind::S3 => self.bucket.clone(),
            SourceKind::Github => self.org.clone(),
            SourceKind::Unsupported => String::new(),
        }
    }
}

/// One entry of `releases` in the manifest.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComponentRequirement {
    /// Release name.
    pub name: String,
    /// Version constraint; empty means any version.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub version: String,
    /// Pin to a specific release source id.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub release_source: String,
    /// Source repository URL; GitHub sources only look here.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub github_repository: String,
}

impl ComponentRequirement {
    /// Parse the version constraint.
    ///
    /// # Errors
    ///
    /// Returns [`SchemaError::Constraint`] for malformed constraints.
    pub fn constraint(&self) -> Result<VersionConstraint, SchemaError> {
        self.version.parse()
    }

    /// Lookup spec for this requirement, without a stemcell.
    pub fn spec(&self) -> Spec {
        Spec::new(&self.name, &self.version).with_github_repository(&self.github_repository)
    }
}

/// The manifest of desired releases.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Kilnfile {
    /// Configured release sources, in lookup order.
    #[serde(default)]
    pub release_sources: Vec<ReleaseSourceConfig>,
    /// Desired releases.
    #[serde(default)]
    pub releases: Vec<ComponentRequirement>,
    /// Stemcell operating system and version constraint.
    #[serde(default)]
    pub stemcell_criteria: Stemcell,
}

impl Kilnfile {
    /// Load a manifest from disk.
    ///
    /// # Errors
    ///
    /// Returns [`SchemaError::Io`] if the file cannot be read and
    /// [`SchemaError::Parse`] if it is not a valid manifest.
    pub fn load(path: &Path) -> Result<Self, SchemaError> {
        read_yaml(path)
    }

    /// Find the requirement for a release by name.
    pub fn component(&self, name: &str) -> Option<&ComponentRequirement> {
        self.releases.iter().find(|r| r.name == name)
    }
}

/// The persisted resolution of a [`Kilnfile`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct KilnfileLock {
    /// One lock per manifest release.
    #[serde(default)]
    pub releases: Vec<Lock>,
    /// The exact stemcell every compiled release targets.
    #[serde(default, alias = "stemcell")]
    pub stemcell_criteria: Stemcell,
}

impl KilnfileLock {
    /// Load a lockfile from disk.
    ///
    /// # Errors
    ///
    /// Returns [`SchemaError::Io`] if the file cannot be read and
    /// [`SchemaError::Parse`] if it is not a valid lockfile.
    pub fn load(path: &Path) -> Result<Self, SchemaError> {
        read_yaml(path)
    }

    /// Write the lockfile atomically: a sibling temp file is written and then
    /// renamed over `path`, so readers never see a half-written lockfile.
    ///
    /// # Errors
    ///
    /// Returns [`SchemaError::Serialize`] if encoding fails and
    /// [`SchemaError::Io`] if the temp file cannot be written or renamed.
    pub fn save(&self, path: &Path) -> Result<(), SchemaError> {
        let content = serde_yaml::to_string(self)?;
        let io_err = |source| SchemaError::Io {
            path: path.to_path_buf(),
            source,
        };

        let dir = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        let mut tmp = tempfile::NamedTempFile::new_in(dir).map_err(io_err)?;
        tmp.write_all(content.as_bytes()).map_err(io_err)?;
        tmp.persist(path).map_err(|e| io_err(e.error))?;
        Ok(())
    }

    /// Find a lock by release name.
    pub fn find(&self, name: &str) -> Option<&Lock> {
        self.releases.iter().find(|l| l.name == name)
    }

    /// Find a lock by release name for in-place mutation.
    pub fn find_mut(&mut self, name: &str) -> Option<&mut Lock> {
        self.releases.iter_mut().find(|l| l.name == name)
    }

    /// Every lock, tagged with the lockfile's stemcell.
    pub fn stamped_locks(&self) -> Vec<Lock> {
        self.releases
            .iter()
            .map(|lock| Lock {
                stemcell: Some(self.stemcell_criteria.clone()),
                ..lock.clone()
            })
            .collect()
    }
}

fn read_yaml<T: DeserializeOwned>(path: &Path) -> Result<T, SchemaError> {
    let content = fs::read_to_string(path).map_err(|source| SchemaError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    serde_yaml::from_str(&content).map_err(|source| SchemaError::Parse {
        path: path.to_path_buf(),
        source,
    })
}
