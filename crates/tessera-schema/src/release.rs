//! Release identities.
//!
//! A [`Spec`] says what is wanted, a [`Lock`] says where exactly it was
//! found, and a [`Local`] says where its bytes live on disk.

use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// A platform image (stemcell), identified by operating system and version.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Stemcell {
    /// Operating system, e.g. `ubuntu-jammy`.
    pub os: String,
    /// Version, e.g. `1.423`.
    pub version: String,
}

impl Stemcell {
    /// Create a stemcell identity.
    pub fn new(os: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            os: os.into(),
            version: version.into(),
        }
    }

    /// Director slug form, `os/version`.
    pub fn slug(&self) -> String {
        format!("{}/{}", self.os, self.version)
    }

    /// True when neither field is set.
    pub fn is_empty(&self) -> bool {
        self.os.is_empty() && self.version.is_empty()
    }
}

impl fmt::Display for Stemcell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.os, self.version)
    }
}

/// A requirement: the release wanted and the stemcell it must target.
///
/// `version` is a constraint (see [`crate::VersionConstraint`]); for exact
/// lookups it is simply the version itself.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct Spec {
    /// Release name.
    pub name: String,
    /// Version or version constraint. Empty means any version.
    pub version: String,
    /// Target stemcell operating system. Empty for stemcell-agnostic lookups.
    pub stemcell_os: String,
    /// Target stemcell version.
    pub stemcell_version: String,
    /// Source repository URL, used by GitHub release sources.
    pub github_repository: String,
}

impl Spec {
    /// Create a spec for `name` at `version` without a stemcell.
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
            ..Self::default()
        }
    }

    /// Set the target stemcell.
    pub fn with_stemcell(mut self, stemcell: &Stemcell) -> Self {
        self.stemcell_os.clone_from(&stemcell.os);
        self.stemcell_version.clone_from(&stemcell.version);
        self
    }

    /// Set the source repository, e.g. `https://github.com/cloudfoundry/bpm-release`.
    pub fn with_github_repository(mut self, repository: impl Into<String>) -> Self {
        self.github_repository = repository.into();
        self
    }

    /// The target stemcell, if one is set.
    pub fn stemcell(&self) -> Option<Stemcell> {
        (!self.stemcell_os.is_empty())
            .then(|| Stemcell::new(&self.stemcell_os, &self.stemcell_version))
    }

    /// Director slug form, `name/version`.
    pub fn release_slug(&self) -> String {
        format!("{}/{}", self.name, self.version)
    }

    /// A lock carrying this spec's identity and nothing else.
    pub fn unverified_lock(&self) -> Lock {
        Lock {
            name: self.name.clone(),
            version: self.version.clone(),
            stemcell: self.stemcell(),
            ..Lock::default()
        }
    }
}

impl fmt::Display for Spec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.name, self.version)?;
        if !self.stemcell_os.is_empty() {
            write!(f, " ({} {})", self.stemcell_os, self.stemcell_version)?;
        }
        Ok(())
    }
}

/// A resolution: one concrete, located release.
///
/// `sha1` is the content hash of the bytes at `remote_source` + `remote_path`
/// once set; an empty `sha1` means resolved but not yet verified.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Lock {
    /// Release name.
    pub name: String,
    /// Exact version.
    pub version: String,
    /// Lowercase hex SHA-1 of the release tarball.
    #[serde(default)]
    pub sha1: String,
    /// Id of the release source holding the tarball.
    #[serde(default)]
    pub remote_source: String,
    /// Source-relative location of the tarball.
    #[serde(default)]
    pub remote_path: String,
    /// Stemcell the lock was resolved for. Never persisted.
    #[serde(skip)]
    pub stemcell: Option<Stemcell>,
}

impl Lock {
    /// Copy of this lock with a different SHA-1.
    pub fn with_sha1(&self, sha1: impl Into<String>) -> Self {
        Self {
            sha1: sha1.into(),
            ..self.clone()
        }
    }

    /// Copy of this lock pointing at a different remote location.
    pub fn with_remote(&self, source: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            remote_source: source.into(),
            remote_path: path.into(),
            ..self.clone()
        }
    }

    /// Exact-version spec for this lock, targeting its stemcell if known.
    pub fn spec(&self) -> Spec {
        let spec = Spec::new(&self.name, &self.version);
        match &self.stemcell {
            Some(stemcell) => spec.with_stemcell(stemcell),
            None => spec,
        }
    }

    /// Whether two locks identify the same bytes: name, version and SHA-1.
    pub fn same_artifact(&self, other: &Self) -> bool {
        self.name == other.name && self.version == other.version && self.sha1 == other.sha1
    }
}

impl fmt::Display for Lock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.name, self.version)?;
        if !self.sha1.is_empty() {
            write!(f, " {}", self.sha1)?;
        }
        if !self.remote_source.is_empty() {
            write!(f, " {}", self.remote_source)?;
        }
        Ok(())
    }
}

/// A release tarball present on local disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Local {
    /// Identity of the tarball, with the SHA-1 of the file contents.
    pub lock: Lock,
    /// Where the tarball lives.
    pub local_path: PathBuf,
}
