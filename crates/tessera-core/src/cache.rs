//! Populate a compiled-release cache from a live deployment.
//!
//! Every lock is looked up in the cache target for the lockfile's stemcell.
//! Hits only refresh the lock's location. Misses are exported from the
//! deployment's director, verified, uploaded to the cache and then locked.

use std::sync::Arc;

use tessera_schema::{KilnfileLock, Lock};
use tracing::{info, warn};

use crate::director::{Director, staged_stemcell};
use crate::error::{ReleaseError, Result};
use crate::reporter::Reporter;
use crate::source::{
    DirectorReleaseSource, Match, MultiReleaseSource, ReleaseSource, ReleaseUploader,
    SourceRegistry,
};

#[derive(Debug, Clone)]
pub struct CacheOptions {
    /// Id of the cache source.
    pub upload_target: String,
    /// Running deployment whose director compiles misses.
    pub deployment: String,
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct CacheReport {
    /// Releases already in the cache.
    pub cached: Vec<Lock>,
    /// Releases exported from the director and uploaded.
    pub uploaded: Vec<Lock>,
    /// Releases left as they were, with the reason.
    pub skipped: Vec<(String, String)>,
}

pub struct CacheSync<'a> {
    registry: &'a SourceRegistry,
    director: Arc<dyn Director>,
    reporter: &'a dyn Reporter,
}

impl<'a> CacheSync<'a> {
    pub fn new(
        registry: &'a SourceRegistry,
        director: Arc<dyn Director>,
        reporter: &'a dyn Reporter,
    ) -> Self {
        Self {
            registry,
            director,
            reporter,
        }
    }

    /// Cache every lock and update it in place. The director is asked to
    /// clean up afterwards whether or not the batch succeeded.
    pub async fn sync(
        &self,
        lockfile: &mut KilnfileLock,
        options: &CacheOptions,
    ) -> Result<CacheReport> {
        let outcome = self.sync_locks(lockfile, options).await;
        if let Err(err) = self.director.cleanup(false).await {
            warn!(error = %err, "director cleanup failed");
        }
        outcome
    }

    async fn sync_locks(
        &self,
        lockfile: &mut KilnfileLock,
        options: &CacheOptions,
    ) -> Result<CacheReport> {
        let deployment = self.director.find_deployment(&options.deployment).await?;
        let manifest = deployment
            .manifest()
            .await
            .map_err(|e| e.context(format!("reading manifest of {}", options.deployment)))?;
        let staged = staged_stemcell(&manifest)?;
        if staged != lockfile.stemcell_criteria {
            return Err(ReleaseError::PlatformMismatch {
                staged,
                locked: lockfile.stemcell_criteria.clone(),
            });
        }

        let target_id = options.upload_target.as_str();
        let cache = MultiReleaseSource::new(vec![self.registry.find_by_id(target_id)?])?;
        let uploader = self.registry.find_uploader(target_id)?;
        let director_source = DirectorReleaseSource::new(
            format!("director:{}", options.deployment),
            Arc::clone(&self.director),
            deployment,
            staged,
        );
        let scratch = tempfile::tempdir().map_err(|e| ReleaseError::io(std::env::temp_dir(), e))?;

        self.reporter.section("Caching");
        let mut report = CacheReport::default();
        for lock in lockfile.stamped_locks() {
            let spec = lock.spec();
            match cache.get_matched_release(&spec).await? {
                Match::Found(remote) => {
                    let sha1 = if lock.remote_source == remote.remote_source
                        && lock.remote_path == remote.remote_path
                        && !lock.sha1.is_empty()
                    {
                        lock.sha1.clone()
                    } else {
                        match cache.download_release(scratch.path(), &remote).await {
                            Ok(local) => {
                                tokio::fs::remove_file(&local.local_path).await.ok();
                                local.lock.sha1
                            }
                            Err(err) => {
                                warn!(release = %lock.name, error = %err, "could not checksum cached release");
                                self.reporter
                                    .failed(&lock.name, &lock.version, &err.to_string());
                                report.skipped.push((lock.name.clone(), err.to_string()));
                                continue;
                            }
                        }
                    };
                    let updated = update_lock(lockfile, &remote.with_sha1(sha1), target_id)?;
                    self.reporter.done(&lock.name, &lock.version, "already cached");
                    report.cached.push(updated);
                }
                Match::NotFound => {
                    if !director_source.get_matched_release(&spec).await?.is_found() {
                        let reason = format!("not compiled on director for {}", staged_slug(&lock));
                        warn!(release = %lock.name, version = %lock.version, "{reason}");
                        self.reporter
                            .warning(&format!("{} {}: {reason}", lock.name, lock.version));
                        report.skipped.push((lock.name.clone(), reason));
                        continue;
                    }
                    let exported = self
                        .export_and_upload(
                            &director_source,
                            uploader.as_ref(),
                            &lock,
                            scratch.path(),
                            target_id,
                        )
                        .await;
                    match exported {
                        Ok(uploaded) => {
                            let updated = update_lock(lockfile, &uploaded, target_id)?;
                            self.reporter.done(&lock.name, &lock.version, "cached");
                            report.uploaded.push(updated);
                        }
                        Err(err) if err.is_checksum_mismatch() => return Err(err),
                        Err(err) => {
                            warn!(release = %lock.name, error = %err, "failed to cache release");
                            self.reporter
                                .failed(&lock.name, &lock.version, &err.to_string());
                            report.skipped.push((lock.name.clone(), err.to_string()));
                        }
                    }
                }
            }
        }
        info!(
            cached = report.cached.len(),
            uploaded = report.uploaded.len(),
            skipped = report.skipped.len(),
            "cache sync finished"
        );
        Ok(report)
    }

    async fn export_and_upload(
        &self,
        director_source: &DirectorReleaseSource,
        uploader: &dyn ReleaseUploader,
        lock: &Lock,
        scratch: &std::path::Path,
        target_id: &str,
    ) -> Result<Lock> {
        let local = director_source.download_release(scratch, lock).await?;
        self.reporter.uploading(&lock.name, &lock.version, target_id);
        let mut file = tokio::fs::File::open(&local.local_path)
            .await
            .map_err(|e| ReleaseError::io(&local.local_path, e))?;
        let uploaded = uploader
            .upload_release(&lock.spec(), &mut file)
            .await
            .map_err(|e| e.context(format!("uploading {} to {target_id}", lock.name)))?;
        drop(file);
        tokio::fs::remove_file(&local.local_path).await.ok();
        Ok(Lock {
            sha1: local.lock.sha1,
            ..uploaded
        })
    }
}

fn staged_slug(lock: &Lock) -> String {
    lock.stemcell
        .as_ref()
        .map_or_else(String::new, tessera_schema::Stemcell::slug)
}

/// Point the lock named by `release` at the cache. A lock that already came
/// from the cache keeps its recorded SHA-1.
fn update_lock(lockfile: &mut KilnfileLock, release: &Lock, target_id: &str) -> Result<Lock> {
    let lock = lockfile.find_mut(&release.name).ok_or_else(|| {
        ReleaseError::InconsistentLockfile(format!("{} is not in the lockfile", release.name))
    })?;
    if lock.remote_source != target_id {
        lock.sha1.clone_from(&release.sha1);
    }
    lock.remote_source.clone_from(&release.remote_source);
    lock.remote_path.clone_from(&release.remote_path);
    Ok(lock.clone())
}
