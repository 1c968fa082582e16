//! Release sources: places release tarballs can be found.
//!
//! Every backend implements [`ReleaseSource`]. Backends that accept new
//! tarballs additionally implement [`ReleaseUploader`]; the capability is
//! decided when the [`SourceRegistry`] is built from the manifest, so callers
//! never query a source at runtime to see whether it can upload.

use std::fmt;
use std::path::Path;

use async_trait::async_trait;
use tessera_schema::{Local, Lock, Spec};
use tokio::io::AsyncRead;

use crate::error::{ReleaseError, Result};

pub mod aggregate;
pub mod artifactory;
pub mod bosh_io;
pub mod director;
pub mod github;
pub mod object_store;
pub mod registry;
pub mod s3;
pub mod template;

pub use aggregate::MultiReleaseSource;
pub use artifactory::ArtifactoryReleaseSource;
pub use bosh_io::BoshIoReleaseSource;
pub use director::DirectorReleaseSource;
pub use github::GithubReleaseSource;
pub use object_store::{AwsObjectStore, ObjectStore};
pub use registry::SourceRegistry;
pub use s3::S3ReleaseSource;
pub use template::PathTemplate;

/// Static configuration every source exposes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceConfiguration {
    pub id: String,
    /// Whether releases from this source may ship in a product.
    pub publishable: bool,
}

/// Outcome of a lookup that reached the backend successfully.
///
/// Transport failures are the `Err` side of the surrounding `Result`, so a
/// clean miss can never be confused with a failed request.
#[derive(Debug, Clone, PartialEq, Eq)]
#[must_use]
pub enum Match {
    Found(Lock),
    NotFound,
}

impl Match {
    pub fn found(self) -> Option<Lock> {
        match self {
            Self::Found(lock) => Some(lock),
            Self::NotFound => None,
        }
    }

    pub fn is_found(&self) -> bool {
        matches!(self, Self::Found(_))
    }

    /// Turn a miss into [`ReleaseError::NotFound`] naming `spec`.
    pub fn or_not_found(self, spec: &Spec) -> Result<Lock> {
        self.found().ok_or_else(|| ReleaseError::NotFound {
            release: spec.to_string(),
        })
    }
}

#[async_trait]
pub trait ReleaseSource: Send + Sync + fmt::Debug {
    fn configuration(&self) -> SourceConfiguration;

    fn id(&self) -> String {
        self.configuration().id
    }

    /// Find the release with exactly `spec.name` and `spec.version`.
    ///
    /// Compiled sources also require the exact stemcell; source-only
    /// backends ignore it.
    async fn get_matched_release(&self, spec: &Spec) -> Result<Match>;

    /// Find the highest version satisfying the constraint in `spec.version`.
    ///
    /// With `no_download` set the lookup must not touch local disk; the
    /// returned lock may then carry an empty SHA-1.
    async fn find_release_version(&self, spec: &Spec, no_download: bool) -> Result<Match>;

    /// Download the tarball for `lock` into `dir`.
    ///
    /// When `lock.sha1` is set and the downloaded bytes differ, the file is
    /// removed and [`ReleaseError::ChecksumMismatch`] is returned.
    async fn download_release(&self, dir: &Path, lock: &Lock) -> Result<Local>;
}

/// The upload capability, implemented only by writable backends.
#[async_trait]
pub trait ReleaseUploader: Send + Sync + fmt::Debug {
    /// Where a release matching `spec` would be stored.
    fn remote_path(&self, spec: &Spec) -> Result<String>;

    /// Store a tarball and return the lock the source assigns to it.
    async fn upload_release(
        &self,
        spec: &Spec,
        reader: &mut (dyn AsyncRead + Unpin + Send),
    ) -> Result<Lock>;
}

/// Last path segment of a remote path, used as the local file name.
pub(crate) fn file_name_of(remote_path: &str) -> &str {
    let path = remote_path.split(['?', '#']).next().unwrap_or(remote_path);
    path.rsplit('/').next().unwrap_or(path)
}
