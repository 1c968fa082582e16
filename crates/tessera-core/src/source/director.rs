//! A BOSH director viewed as a release source.
//!
//! Releases already uploaded to the director, and compiled there for the
//! deployment's stemcell, can be exported as compiled tarballs. The director
//! never ships in a product, so this source is never publishable.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use tessera_schema::{
    DigestAlgorithm, Local, Lock, MultiDigest, Spec, Stemcell, VersionConstraint,
};
use tokio::io::AsyncRead;
use tracing::{debug, info};

use super::{Match, ReleaseSource, ReleaseUploader, SourceConfiguration};
use crate::director::{Deployment, Director, ExportedRelease, has_compiled_packages};
use crate::error::{ReleaseError, Result};
use crate::io::hashing::{Digests, HashingWriter};

#[derive(Debug, Clone)]
pub struct DirectorReleaseSource {
    id: String,
    director: Arc<dyn Director>,
    deployment: Arc<dyn Deployment>,
    stemcell: Stemcell,
}

impl DirectorReleaseSource {
    pub fn new(
        id: impl Into<String>,
        director: Arc<dyn Director>,
        deployment: Arc<dyn Deployment>,
        stemcell: Stemcell,
    ) -> Self {
        Self {
            id: id.into(),
            director,
            deployment,
            stemcell,
        }
    }

    fn stemcell_for(&self, lock: &Lock) -> Stemcell {
        lock.stemcell.clone().unwrap_or_else(|| self.stemcell.clone())
    }
}

/// The file name compiled tarballs are stored under locally.
pub(crate) fn compiled_file_name(lock: &Lock, stemcell: &Stemcell) -> String {
    format!(
        "{}-{}-{}-{}.tgz",
        lock.name, lock.version, stemcell.os, stemcell.version
    )
}

/// Stream an exported blob to `dest` and check it against the director's
/// digest. A mismatching file is removed before the error is returned.
pub(crate) async fn download_exported(
    director: &dyn Director,
    exported: &ExportedRelease,
    dest: &Path,
    release: &str,
) -> Result<Digests> {
    let expected: MultiDigest = exported.sha1.parse()?;

    let mut writer = HashingWriter::create(dest).await?;
    if let Err(err) = director
        .download_resource(&exported.blobstore_id, &mut writer)
        .await
    {
        tokio::fs::remove_file(dest).await.ok();
        return Err(err);
    }
    let digests = writer.finish().await.map_err(|e| ReleaseError::io(dest, e))?;

    if !expected.matches(&digests.sha1, &digests.sha256) {
        tokio::fs::remove_file(dest).await.ok();
        let actual = match expected.algorithm() {
            DigestAlgorithm::Sha1 => digests.sha1.clone(),
            DigestAlgorithm::Sha256 => format!("sha256:{}", digests.sha256),
        };
        return Err(ReleaseError::ChecksumMismatch {
            release: release.to_string(),
            expected: expected.to_string(),
            actual,
        });
    }
    Ok(digests)
}

#[async_trait]
impl ReleaseSource for DirectorReleaseSource {
    fn configuration(&self) -> SourceConfiguration {
        SourceConfiguration {
            id: self.id.clone(),
            publishable: false,
        }
    }

    async fn get_matched_release(&self, spec: &Spec) -> Result<Match> {
        let os_slug = spec
            .stemcell()
            .unwrap_or_else(|| self.stemcell.clone())
            .slug();
        let Some(packages) = self.director.find_release(&spec.release_slug()).await? else {
            debug!(release = %spec.name, version = %spec.version, "release not on director");
            return Ok(Match::NotFound);
        };
        if !has_compiled_packages(&packages, &os_slug) {
            debug!(
                release = %spec.name,
                version = %spec.version,
                stemcell = %os_slug,
                "release not compiled for stemcell"
            );
            return Ok(Match::NotFound);
        }
        Ok(Match::Found(Lock {
            remote_source: self.id.clone(),
            remote_path: spec.release_slug(),
            ..spec.unverified_lock()
        }))
    }

    async fn find_release_version(&self, spec: &Spec, _no_download: bool) -> Result<Match> {
        let constraint: VersionConstraint = spec.version.parse()?;
        let versions = self.director.release_versions(&spec.name).await?;
        let Some(version) = constraint.highest(versions.iter().map(String::as_str)) else {
            return Ok(Match::NotFound);
        };
        let resolved = Spec {
            version: version.to_string(),
            ..spec.clone()
        };
        self.get_matched_release(&resolved).await
    }

    async fn download_release(&self, dir: &Path, lock: &Lock) -> Result<Local> {
        let stemcell = self.stemcell_for(lock);
        let spec = lock.spec().with_stemcell(&stemcell);
        info!(
            release = %lock.name,
            version = %lock.version,
            stemcell = %stemcell,
            deployment = %self.deployment.name(),
            "exporting release"
        );

        let exported = self
            .deployment
            .export_release(&spec.release_slug(), &stemcell.slug())
            .await
            .map_err(|e| e.context(format!("exporting {spec}")))?;

        let local_path = dir.join(compiled_file_name(lock, &stemcell));
        let digests = download_exported(self.director.as_ref(), &exported, &local_path, &lock.name)
            .await
            .map_err(|e| e.context(format!("downloading exported {spec}")))?;

        Ok(Local {
            lock: lock.with_sha1(digests.sha1),
            local_path,
        })
    }
}

#[async_trait]
impl ReleaseUploader for DirectorReleaseSource {
    fn remote_path(&self, spec: &Spec) -> Result<String> {
        Ok(spec.release_slug())
    }

    async fn upload_release(
        &self,
        spec: &Spec,
        reader: &mut (dyn AsyncRead + Unpin + Send),
    ) -> Result<Lock> {
        let scratch = tempfile::tempdir().map_err(|e| ReleaseError::io(std::env::temp_dir(), e))?;
        let path = scratch.path().join(format!("{}-{}.tgz", spec.name, spec.version));

        let mut writer = HashingWriter::create(&path).await?;
        tokio::io::copy(reader, &mut writer)
            .await
            .map_err(|e| ReleaseError::io(&path, e))?;
        let digests = writer.finish().await.map_err(|e| ReleaseError::io(&path, e))?;

        self.director.upload_release(&path).await?;
        Ok(Lock {
            sha1: digests.sha1,
            remote_source: self.id.clone(),
            remote_path: spec.release_slug(),
            ..spec.unverified_lock()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::director::{CompiledPackageRef, DirectorPackage};
    use crate::io::hashing::digest_bytes;
    use crate::testing::{FakeDeployment, FakeDirector};
    use tempfile::tempdir;

    fn source(director: &Arc<FakeDirector>) -> DirectorReleaseSource {
        let deployment: Arc<dyn Deployment> = director.deployment("cf");
        DirectorReleaseSource::new(
            "director",
            director.clone(),
            deployment,
            Stemcell::new("alpine", "9.0.0"),
        )
    }

    fn compiled_for(stemcell: &str) -> Vec<DirectorPackage> {
        vec![DirectorPackage {
            name: "bpm".into(),
            compiled_packages: vec![CompiledPackageRef {
                stemcell: stemcell.into(),
            }],
        }]
    }

    #[tokio::test]
    async fn test_matches_only_compiled_releases() {
        let director = Arc::new(FakeDirector::default());
        director.add_release("bpm/1.1.21", compiled_for("alpine/9.0.0"));
        director.add_release("uaa/77.0.0", compiled_for("alpine/8.0.0"));
        director.add_release("empty/1.0.0", Vec::new());
        let src = source(&director);
        let stemcell = Stemcell::new("alpine", "9.0.0");

        let found = src
            .get_matched_release(&Spec::new("bpm", "1.1.21").with_stemcell(&stemcell))
            .await
            .unwrap()
            .found()
            .unwrap();
        assert_eq!(found.remote_source, "director");
        assert_eq!(found.remote_path, "bpm/1.1.21");

        let uaa = Spec::new("uaa", "77.0.0").with_stemcell(&stemcell);
        assert_eq!(src.get_matched_release(&uaa).await.unwrap(), Match::NotFound);

        let empty = Spec::new("empty", "1.0.0").with_stemcell(&stemcell);
        assert!(src.get_matched_release(&empty).await.unwrap().is_found());

        let absent = Spec::new("nope", "1.0.0").with_stemcell(&stemcell);
        assert_eq!(src.get_matched_release(&absent).await.unwrap(), Match::NotFound);
        assert!(!src.configuration().publishable);
    }

    #[tokio::test]
    async fn test_download_verifies_sha256_digest() {
        let director = Arc::new(FakeDirector::default());
        director.add_release("bpm/1.1.21", compiled_for("alpine/9.0.0"));
        let src = source(&director);
        let dir = tempdir().unwrap();

        let lock = Lock {
            name: "bpm".into(),
            version: "1.1.21".into(),
            stemcell: Some(Stemcell::new("alpine", "9.0.0")),
            ..Lock::default()
        };
        let local = src.download_release(dir.path(), &lock).await.unwrap();

        let expected = FakeDeployment::exported_bytes("bpm/1.1.21", "alpine/9.0.0");
        assert_eq!(local.lock.sha1, digest_bytes(&expected).sha1);
        assert_eq!(
            local.local_path,
            dir.path().join("bpm-1.1.21-alpine-9.0.0.tgz")
        );
    }

    #[tokio::test]
    async fn test_corrupt_export_is_removed() {
        let director = Arc::new(FakeDirector::default());
        director.corrupt_exports();
        let src = source(&director);
        let dir = tempdir().unwrap();

        let lock = Lock {
            name: "bpm".into(),
            version: "1.1.21".into(),
            ..Lock::default()
        };
        let err = src.download_release(dir.path(), &lock).await.unwrap_err();
        assert!(err.is_checksum_mismatch());
        assert!(!dir.path().join("bpm-1.1.21-alpine-9.0.0.tgz").exists());
    }

    #[tokio::test]
    async fn test_find_release_version_uses_uploaded_versions() {
        let director = Arc::new(FakeDirector::default());
        director.add_release("bpm/1.1.9", Vec::new());
        director.add_release("bpm/1.1.21", Vec::new());
        director.add_release("bpm/2.0.0", Vec::new());
        let src = source(&director);

        let lock = src
            .find_release_version(&Spec::new("bpm", "~1.1"), true)
            .await
            .unwrap()
            .found()
            .unwrap();
        assert_eq!(lock.version, "1.1.21");
    }
}
