//! Reconcile a local releases directory with the lockfile.
//!
//! Releases are compared on name, version and SHA-1. Tarballs the lockfile
//! does not mention are only deleted when the caller opts in; missing ones
//! are downloaded through the source each lock names. The lockfile itself
//! is never written.

use std::path::PathBuf;
use std::time::Instant;

use futures::StreamExt;
use tessera_schema::{Local, Lock};
use tracing::{info, warn};

use crate::error::{ReleaseError, Result};
use crate::local::{delete_local_releases, list_local_releases};
use crate::reporter::Reporter;
use crate::source::{MultiReleaseSource, ReleaseSource};

pub const DEFAULT_DOWNLOAD_THREADS: usize = 4;

#[derive(Debug, Clone)]
pub struct FetchOptions {
    pub releases_dir: PathBuf,
    /// Delete local tarballs the lockfile does not mention.
    pub no_confirm: bool,
    pub parallel: usize,
}

/// How local tarballs relate to the lockfile.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct Partition {
    pub present: Vec<Local>,
    pub missing: Vec<Lock>,
    pub extra: Vec<Local>,
}

/// Split `locks` and `local` by `(name, version, sha1)`.
pub fn partition(locks: &[Lock], local: Vec<Local>) -> Partition {
    let mut result = Partition::default();
    for release in local {
        if locks.iter().any(|lock| lock.same_artifact(&release.lock)) {
            result.present.push(release);
        } else {
            result.extra.push(release);
        }
    }
    result.missing = locks
        .iter()
        .filter(|lock| !result.present.iter().any(|p| p.lock.same_artifact(lock)))
        .cloned()
        .collect();
    result
}

#[derive(Debug, Default)]
pub struct FetchReport {
    pub present: Vec<Local>,
    pub downloaded: Vec<Local>,
    /// Unlisted tarballs; `extra_deleted` says whether they are still on disk.
    pub extra: Vec<Local>,
    pub extra_deleted: bool,
}

pub struct Fetcher<'a> {
    sources: &'a MultiReleaseSource,
    reporter: &'a dyn Reporter,
}

impl<'a> Fetcher<'a> {
    pub fn new(sources: &'a MultiReleaseSource, reporter: &'a dyn Reporter) -> Self {
        Self { sources, reporter }
    }

    pub async fn fetch(&self, locks: &[Lock], options: &FetchOptions) -> Result<FetchReport> {
        let start = Instant::now();
        let dir = &options.releases_dir;
        tokio::fs::create_dir_all(dir)
            .await
            .map_err(|e| ReleaseError::io(dir, e))?;

        let local = list_local_releases(dir).await?;
        let Partition {
            present,
            missing,
            extra,
        } = partition(locks, local);
        info!(
            present = present.len(),
            missing = missing.len(),
            extra = extra.len(),
            "compared releases directory with lockfile"
        );

        // Extras go first: a stale tarball may share a file name with the
        // release about to replace it.
        let extra_deleted = if extra.is_empty() {
            false
        } else if options.no_confirm {
            delete_local_releases(&extra, self.reporter).await?;
            true
        } else {
            for release in &extra {
                self.reporter.warning(&format!(
                    "{} is not in the lockfile; rerun with --no-confirm to delete it",
                    release.local_path.display()
                ));
            }
            false
        };

        if !missing.is_empty() {
            self.reporter.section("Fetching");
        }
        let parallel = options.parallel.max(1);
        let results: Vec<Result<Local>> = futures::stream::iter(missing.iter())
            .map(|lock| self.download(lock, options))
            .buffer_unordered(parallel)
            .collect()
            .await;

        let mut downloaded = Vec::with_capacity(results.len());
        for result in results {
            downloaded.push(result?);
        }
        if !downloaded.is_empty() {
            self.reporter
                .summary(downloaded.len(), "fetched", start.elapsed().as_secs_f64());
        }

        Ok(FetchReport {
            present,
            downloaded,
            extra,
            extra_deleted,
        })
    }

    async fn download(&self, lock: &Lock, options: &FetchOptions) -> Result<Local> {
        let located = if lock.remote_source.is_empty() {
            self.sources
                .get_matched_release(&lock.spec())
                .await?
                .or_not_found(&lock.spec())?
                .with_sha1(&lock.sha1)
        } else {
            lock.clone()
        };

        self.reporter.downloading(&lock.name, &lock.version, 0, None);
        match self
            .sources
            .download_release(&options.releases_dir, &located)
            .await
        {
            Ok(local) => {
                self.reporter.done(&lock.name, &lock.version, "fetched");
                Ok(local)
            }
            Err(err) => {
                warn!(release = %lock.name, version = %lock.version, error = %err, "fetch failed");
                self.reporter.failed(&lock.name, &lock.version, &err.to_string());
                Err(err.context(format!("fetching {} {}", lock.name, lock.version)))
            }
        }
    }
}
