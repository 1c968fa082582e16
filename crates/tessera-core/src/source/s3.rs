//! Bucket-backed release source.
//!
//! The same type serves compiled caches and built-release stores; the only
//! difference is whether the path template mentions the stemcell.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use tessera_schema::{Local, Lock, ReleaseSourceConfig, Spec, VersionConstraint};
use tokio::io::{AsyncRead, AsyncReadExt};
use tracing::{debug, info};

use super::{
    Match, ObjectStore, PathTemplate, ReleaseSource, ReleaseUploader, SourceConfiguration,
    file_name_of,
};
use crate::error::{ReleaseError, Result};
use crate::io::hashing::{HashingWriter, digest_bytes, verify_sha1_or_remove};

#[derive(Debug)]
pub struct S3ReleaseSource {
    configuration: SourceConfiguration,
    template: PathTemplate,
    store: Arc<dyn ObjectStore>,
}

impl S3ReleaseSource {
    pub fn new(config: &ReleaseSourceConfig, store: Arc<dyn ObjectStore>) -> Result<Self> {
        let id = config.source_id();
        let template = config
            .path_template
            .parse()
            .map_err(|e: ReleaseError| e.context(format!("release source {id:?}")))?;
        Ok(Self {
            configuration: SourceConfiguration {
                id,
                publishable: config.publishable,
            },
            template,
            store,
        })
    }

    fn lock_for(&self, spec: &Spec, remote_path: String) -> Lock {
        Lock {
            remote_source: self.configuration.id.clone(),
            remote_path,
            ..spec.unverified_lock()
        }
    }

    fn failure(&self, spec: &Spec, err: ReleaseError) -> ReleaseError {
        err.context(format!(
            "error from release source {:?} while looking up {spec}",
            self.configuration.id
        ))
    }
}

#[async_trait]
impl ReleaseSource for S3ReleaseSource {
    fn configuration(&self) -> SourceConfiguration {
        self.configuration.clone()
    }

    async fn get_matched_release(&self, spec: &Spec) -> Result<Match> {
        let key = self.template.render(spec);
        debug!(source = %self.configuration.id, key = %key, "checking for release");
        let exists = self
            .store
            .exists(&key)
            .await
            .map_err(|e| self.failure(spec, e))?;
        Ok(if exists {
            Match::Found(self.lock_for(spec, key))
        } else {
            Match::NotFound
        })
    }

    async fn find_release_version(&self, spec: &Spec, no_download: bool) -> Result<Match> {
        let constraint: VersionConstraint = spec.version.parse()?;
        let keys = self
            .store
            .list(&self.template.prefix(spec))
            .await
            .map_err(|e| self.failure(spec, e))?;

        let versions: Vec<String> = keys
            .iter()
            .filter_map(|key| self.template.extract_version(spec, key))
            .collect();
        let Some(version) = constraint.highest(versions.iter().map(String::as_str)) else {
            return Ok(Match::NotFound);
        };

        let resolved = Spec {
            version: version.to_string(),
            ..spec.clone()
        };
        let lock = self.lock_for(&resolved, self.template.render(&resolved));
        if no_download {
            return Ok(Match::Found(lock));
        }

        let scratch = tempfile::tempdir().map_err(|e| ReleaseError::io(std::env::temp_dir(), e))?;
        let local = self.download_release(scratch.path(), &lock).await?;
        Ok(Match::Found(local.lock))
    }

    async fn download_release(&self, dir: &Path, lock: &Lock) -> Result<Local> {
        let local_path = dir.join(file_name_of(&lock.remote_path));
        info!(
            release = %lock.name,
            version = %lock.version,
            source = %self.configuration.id,
            "downloading release"
        );

        let mut writer = HashingWriter::create(&local_path).await?;
        if let Err(err) = self.store.get(&lock.remote_path, &mut writer).await {
            tokio::fs::remove_file(&local_path).await.ok();
            return Err(err.context(format!("downloading {lock}")));
        }
        let digests = writer
            .finish()
            .await
            .map_err(|e| ReleaseError::io(&local_path, e))?;
        verify_sha1_or_remove(&local_path, &lock.name, &lock.sha1, &digests.sha1).await?;

        Ok(Local {
            lock: lock.with_sha1(digests.sha1),
            local_path,
        })
    }
}

#[async_trait]
impl ReleaseUploader for S3ReleaseSource {
    fn remote_path(&self, spec: &Spec) -> Result<String> {
        Ok(self.template.render(spec))
    }

    async fn upload_release(
        &self,
        spec: &Spec,
        reader: &mut (dyn AsyncRead + Unpin + Send),
    ) -> Result<Lock> {
        let key = self.template.render(spec);
        let mut body = Vec::new();
        reader
            .read_to_end(&mut body)
            .await
            .map_err(|e| ReleaseError::transport(format!("reading {spec} for upload"), e))?;
        let sha1 = digest_bytes(&body).sha1;

        info!(source = %self.configuration.id, key = %key, "uploading release");
        self.store
            .put(&key, body)
            .await
            .map_err(|e| e.context(format!("uploading {spec}")))?;

        Ok(self.lock_for(spec, key).with_sha1(sha1))
    }
}
