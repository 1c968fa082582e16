//! The BOSH director capabilities the engine consumes.
//!
//! Any implementation exposing these operations is interchangeable; the
//! engine never reaches past this interface.

use std::fmt;
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use tokio::io::AsyncWrite;

use crate::error::Result;

pub mod http;
pub mod manifest;

pub use http::{DirectorConfig, HttpDirector};
pub use manifest::{DeploymentManifest, compilation_manifest, staged_stemcell};

/// Where an exported compiled release was written on the director.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ExportedRelease {
    pub blobstore_id: String,
    /// Director digest; either a bare SHA-1 or a `sha256:` multi-digest.
    pub sha1: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct CompiledPackageRef {
    pub stemcell: String,
}

/// A package of a release uploaded to the director.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct DirectorPackage {
    pub name: String,
    #[serde(default)]
    pub compiled_packages: Vec<CompiledPackageRef>,
}

#[async_trait]
pub trait Director: Send + Sync + fmt::Debug {
    async fn upload_stemcell(&self, tarball: &Path) -> Result<()>;

    async fn upload_release(&self, tarball: &Path) -> Result<()>;

    /// A handle to the named deployment. The deployment need not exist yet;
    /// updating it with a manifest creates it.
    async fn find_deployment(&self, name: &str) -> Result<Arc<dyn Deployment>>;

    /// Stream a blobstore object into `sink`, returning the bytes written.
    async fn download_resource(
        &self,
        blobstore_id: &str,
        sink: &mut (dyn AsyncWrite + Unpin + Send),
    ) -> Result<u64>;

    /// Packages of the release `name/version`, or `None` when the director
    /// does not know that release.
    async fn find_release(&self, release_slug: &str) -> Result<Option<Vec<DirectorPackage>>>;

    /// Every uploaded version of the named release.
    async fn release_versions(&self, name: &str) -> Result<Vec<String>>;

    /// Remove unreferenced releases, stemcells and exported blobs.
    async fn cleanup(&self, remove_all: bool) -> Result<()>;
}

#[async_trait]
pub trait Deployment: Send + Sync + fmt::Debug {
    fn name(&self) -> &str;

    /// The deployment's current manifest as YAML.
    async fn manifest(&self) -> Result<String>;

    async fn update(&self, manifest: &str) -> Result<()>;

    /// Compile (if needed) and export `name/version` for `os/version`.
    async fn export_release(&self, release_slug: &str, os_slug: &str) -> Result<ExportedRelease>;

    async fn delete(&self, force: bool) -> Result<()>;
}

/// Whether a director release report satisfies `os_slug`.
///
/// Releases without packages are trivially satisfied; otherwise at least
/// one package must be compiled for the stemcell.
pub fn has_compiled_packages(packages: &[DirectorPackage], os_slug: &str) -> bool {
    packages.is_empty()
        || packages
            .iter()
            .any(|p| p.compiled_packages.iter().any(|c| c.stemcell == os_slug))
}
