//! Manifests embedded in BOSH release and stemcell tarballs.

use serde::{Deserialize, Serialize};

use crate::release::Stemcell;

/// A source package listed in `release.MF`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Package {
    /// Package name.
    pub name: String,
    /// Package version (a fingerprint for most releases).
    #[serde(default)]
    pub version: String,
    /// Fingerprint of the package contents.
    #[serde(default)]
    pub fingerprint: String,
    /// SHA-1 of the package blob.
    #[serde(default)]
    pub sha1: String,
    /// Names of packages this one depends on.
    #[serde(default)]
    pub dependencies: Vec<String>,
}

/// A package compiled against a specific stemcell, listed in `release.MF`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompiledPackage {
    /// Package name.
    pub name: String,
    /// Package version.
    #[serde(default)]
    pub version: String,
    /// Fingerprint of the package contents.
    #[serde(default)]
    pub fingerprint: String,
    /// SHA-1 of the compiled blob.
    #[serde(default)]
    pub sha1: String,
    /// Names of packages this one depends on.
    #[serde(default)]
    pub dependencies: Vec<String>,
    /// Stemcell slug, `os/version`.
    pub stemcell: String,
}

impl CompiledPackage {
    /// The stemcell this package was compiled for, if the slug is well formed.
    pub fn stemcell(&self) -> Option<Stemcell> {
        let (os, version) = self.stemcell.split_once('/')?;
        Some(Stemcell::new(os, version))
    }
}

/// The `release.MF` document at the root of a release tarball.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReleaseManifest {
    /// Release name.
    pub name: String,
    /// Release version.
    pub version: String,
    /// Commit the release was cut from.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub commit_hash: String,
    /// Whether the release was cut from a dirty tree.
    #[serde(default)]
    pub uncommitted_changes: bool,
    /// Packages compiled against a stemcell. Empty for built releases.
    #[serde(default)]
    pub compiled_packages: Vec<CompiledPackage>,
    /// Source packages. Empty for compiled releases.
    #[serde(default)]
    pub packages: Vec<Package>,
}

impl ReleaseManifest {
    /// The stemcell a compiled release targets, taken from its first
    /// compiled package. `None` for built releases.
    pub fn stemcell(&self) -> Option<Stemcell> {
        self.compiled_packages.first().and_then(CompiledPackage::stemcell)
    }
}

/// The `stemcell.MF` document at the root of a stemcell tarball.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StemcellManifest {
    /// Stemcell name, e.g. `bosh-google-kvm-ubuntu-jammy-go_agent`.
    #[serde(default)]
    pub name: String,
    /// Operating system, e.g. `ubuntu-jammy`.
    pub operating_system: String,
    /// Stemcell version.
    pub version: String,
}

impl StemcellManifest {
    /// Stemcell identity of this tarball.
    pub fn stemcell(&self) -> Stemcell {
        Stemcell::new(&self.operating_system, &self.version)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_release_manifest_stemcell() {
        let doc = r"
name: bpm
version: 1.1.21
commit_hash: abc123
compiled_packages:
- name: bpm
  version: deadbeef
  stemcell: alpine/9.0.0
";
        let manifest: ReleaseManifest = serde_yaml::from_str(doc).unwrap();
        assert_eq!(manifest.stemcell(), Some(Stemcell::new("alpine", "9.0.0")));
        assert!(manifest.packages.is_empty());
    }

    #[test]
    fn test_built_release_has_no_stemcell() {
        let doc = "name: bpm\nversion: 1.1.21\npackages:\n- name: bpm\n";
        let manifest: ReleaseManifest = serde_yaml::from_str(doc).unwrap();
        assert_eq!(manifest.stemcell(), None);
    }
}
