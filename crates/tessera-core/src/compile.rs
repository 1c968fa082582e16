//! Compile built releases on a BOSH director and cache the results.
//!
//! A built release is one whose lock points at a non-publishable source.
//! Each is first looked up precompiled in the publishable sources; the rest
//! are uploaded to the director, compiled through throwaway deployments,
//! exported, verified and pushed to the cache target. Deployments created
//! here are always torn down, whatever happened in between.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use futures::StreamExt;
use tessera_schema::{KilnfileLock, Local, Lock, Stemcell};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::director::{Deployment, Director, ExportedRelease, compilation_manifest};
use crate::error::{ReleaseError, Result};
use crate::io::tarball::read_stemcell_manifest;
use crate::pool::DeploymentPool;
use crate::reporter::Reporter;
use crate::source::director::{compiled_file_name, download_exported};
use crate::source::{Match, ReleaseSource, ReleaseUploader, SourceRegistry};

pub const DEPLOYMENT_PREFIX: &str = "compile-built-releases";

#[derive(Debug, Clone)]
pub struct CompileOptions {
    pub stemcell_tarball: PathBuf,
    /// Id of the source compiled tarballs are uploaded to.
    pub upload_target: String,
    /// Where compiled and precompiled tarballs are written.
    pub releases_dir: PathBuf,
    /// Number of compilation deployments, and so of concurrent exports.
    pub parallel: usize,
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct CompileReport {
    /// Built releases already available compiled from a publishable source.
    pub precompiled: Vec<Lock>,
    /// Releases compiled on the director and uploaded to the cache.
    pub compiled: Vec<Lock>,
}

impl CompileReport {
    pub fn is_empty(&self) -> bool {
        self.precompiled.is_empty() && self.compiled.is_empty()
    }
}

pub struct Compiler<'a> {
    registry: &'a SourceRegistry,
    director: Arc<dyn Director>,
    reporter: &'a dyn Reporter,
}

impl<'a> Compiler<'a> {
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

    /// Compile every built release in `lockfile` and rewrite its locks.
    ///
    /// The lockfile is only changed in memory; callers persist it when this
    /// returns `Ok`.
    pub async fn compile(
        &self,
        lockfile: &mut KilnfileLock,
        options: &CompileOptions,
    ) -> Result<CompileReport> {
        let start = Instant::now();
        let built = self.built_releases(lockfile)?;
        if built.is_empty() {
            info!("no built releases in lockfile");
            return Ok(CompileReport::default());
        }
        let uploader = self.registry.find_uploader(&options.upload_target)?;
        tokio::fs::create_dir_all(&options.releases_dir)
            .await
            .map_err(|e| ReleaseError::io(&options.releases_dir, e))?;

        let stemcell = read_stemcell(&options.stemcell_tarball).await?;
        if stemcell != lockfile.stemcell_criteria {
            return Err(ReleaseError::PlatformMismatch {
                staged: stemcell,
                locked: lockfile.stemcell_criteria.clone(),
            });
        }

        let mut report = CompileReport::default();
        let (precompiled, to_compile) = self.find_precompiled(built, options).await?;
        for local in precompiled {
            apply_lock(lockfile, &local.lock)?;
            report.precompiled.push(local.lock);
        }
        if to_compile.is_empty() {
            return Ok(report);
        }

        let mut provisioned = Vec::new();
        let outcome = self
            .compile_on_director(&to_compile, &stemcell, options, uploader.as_ref(), &mut provisioned)
            .await;
        let compiled = self.teardown(&provisioned, outcome).await?;

        for lock in &compiled {
            apply_lock(lockfile, lock)?;
        }
        report.compiled = compiled;
        self.reporter.summary(
            report.compiled.len() + report.precompiled.len(),
            "compiled",
            start.elapsed().as_secs_f64(),
        );
        Ok(report)
    }

    fn built_releases(&self, lockfile: &KilnfileLock) -> Result<Vec<Lock>> {
        let mut built = Vec::new();
        for lock in lockfile.stamped_locks() {
            let source = self
                .registry
                .find_by_id(&lock.remote_source)
                .map_err(|e| e.context(format!("locating source of {}", lock.name)))?;
            if !source.configuration().publishable {
                built.push(lock);
            }
        }
        Ok(built)
    }

    async fn find_precompiled(
        &self,
        built: Vec<Lock>,
        options: &CompileOptions,
    ) -> Result<(Vec<Local>, Vec<Lock>)> {
        let publishable = self.registry.aggregate(true);
        let mut found = Vec::new();
        let mut remaining = Vec::new();
        for lock in built {
            match publishable.get_matched_release(&lock.spec()).await? {
                Match::Found(remote) => {
                    info!(release = %lock.name, version = %lock.version, source = %remote.remote_source, "found precompiled release");
                    let local = publishable
                        .download_release(&options.releases_dir, &remote)
                        .await?;
                    self.reporter
                        .done(&lock.name, &lock.version, "already compiled");
                    found.push(local);
                }
                Match::NotFound => remaining.push(lock),
            }
        }
        Ok((found, remaining))
    }

    async fn compile_on_director(
        &self,
        releases: &[Lock],
        stemcell: &Stemcell,
        options: &CompileOptions,
        uploader: &dyn ReleaseUploader,
        provisioned: &mut Vec<Arc<dyn Deployment>>,
    ) -> Result<Vec<Lock>> {
        self.reporter.section("Uploading");
        self.upload_built(releases).await?;
        self.reporter.info(&format!("uploading stemcell {stemcell}"));
        self.director
            .upload_stemcell(&options.stemcell_tarball)
            .await
            .map_err(|e| e.context(format!("uploading stemcell {stemcell}")))?;

        let parallel = options.parallel.max(1);
        for i in 0..parallel {
            let name = format!("{DEPLOYMENT_PREFIX}-{i}-{}", Uuid::new_v4());
            let manifest = compilation_manifest(&name, releases, stemcell)?;
            let deployment = self.director.find_deployment(&name).await?;
            provisioned.push(Arc::clone(&deployment));
            info!(deployment = %name, "provisioning compilation deployment");
            deployment
                .update(&manifest)
                .await
                .map_err(|e| e.context(format!("deploying {name}")))?;
        }

        self.reporter.section("Compiling");
        let exported = self
            .export_all(releases, stemcell, provisioned.clone())
            .await?;

        let director = self.director.as_ref();
        let downloads: Vec<Result<Local>> = futures::stream::iter(exported)
            .map(|(lock, exported)| async move {
                let dest = options.releases_dir.join(compiled_file_name(&lock, stemcell));
                let digests = download_exported(director, &exported, &dest, &lock.name)
                    .await
                    .map_err(|e| e.context(format!("downloading compiled {}", lock.name)))?;
                self.reporter.done(&lock.name, &lock.version, "compiled");
                Ok(Local {
                    lock: lock.with_sha1(digests.sha1),
                    local_path: dest,
                })
            })
            .buffer_unordered(parallel)
            .collect()
            .await;

        // Nothing reaches the cache unless every export verified.
        let locals = downloads.into_iter().collect::<Result<Vec<Local>>>()?;
        let mut compiled = Vec::with_capacity(locals.len());
        for local in &locals {
            compiled.push(self.upload_to_cache(uploader, local, &options.upload_target).await?);
        }
        Ok(compiled)
    }

    async fn upload_built(&self, releases: &[Lock]) -> Result<()> {
        let scratch = tempfile::tempdir().map_err(|e| ReleaseError::io(std::env::temp_dir(), e))?;
        for lock in releases {
            let source = self.registry.find_by_id(&lock.remote_source)?;
            let local = source
                .download_release(scratch.path(), lock)
                .await
                .map_err(|e| e.context(format!("downloading built {}", lock.name)))?;
            self.reporter
                .uploading(&lock.name, &lock.version, "director");
            self.director
                .upload_release(&local.local_path)
                .await
                .map_err(|e| e.context(format!("uploading {} to director", lock.name)))?;
        }
        Ok(())
    }

    /// One task per release, at most one export per deployment at a time.
    /// The first failure cancels every export still waiting for a deployment.
    async fn export_all(
        &self,
        releases: &[Lock],
        stemcell: &Stemcell,
        deployments: Vec<Arc<dyn Deployment>>,
    ) -> Result<Vec<(Lock, ExportedRelease)>> {
        let pool = DeploymentPool::new(deployments, CancellationToken::new());
        let os_slug = stemcell.slug();

        let mut tasks = JoinSet::new();
        for lock in releases.iter().cloned() {
            let pool = Arc::clone(&pool);
            let os_slug = os_slug.clone();
            tasks.spawn(async move {
                let Some(deployment) = pool.acquire().await else {
                    debug!(release = %lock.name, "export cancelled");
                    return Ok(None);
                };
                let release_slug = format!("{}/{}", lock.name, lock.version);
                match deployment.export_release(&release_slug, &os_slug).await {
                    Ok(exported) => Ok(Some((lock, exported))),
                    Err(err) => {
                        pool.cancel();
                        Err(err.context(format!(
                            "exporting {release_slug} for {os_slug} on {}",
                            deployment.name()
                        )))
                    }
                }
            });
        }

        let mut exported = Vec::with_capacity(releases.len());
        let mut first_error: Option<ReleaseError> = None;
        while let Some(joined) = tasks.join_next().await {
            let outcome = joined.map_err(ReleaseError::from).and_then(|r| r);
            match outcome {
                Ok(Some(done)) => exported.push(done),
                Ok(None) => {}
                Err(err) => {
                    pool.cancel();
                    warn!(error = %err, "export failed");
                    first_error.get_or_insert(err);
                }
            }
        }
        match first_error {
            Some(err) => Err(err),
            None => Ok(exported),
        }
    }

    async fn upload_to_cache(
        &self,
        uploader: &dyn ReleaseUploader,
        local: &Local,
        target: &str,
    ) -> Result<Lock> {
        let lock = &local.lock;
        self.reporter.uploading(&lock.name, &lock.version, target);
        let mut file = tokio::fs::File::open(&local.local_path)
            .await
            .map_err(|e| ReleaseError::io(&local.local_path, e))?;
        let uploaded = uploader
            .upload_release(&lock.spec(), &mut file)
            .await
            .map_err(|e| e.context(format!("uploading {} to {target}", lock.name)))?;
        Ok(Lock {
            sha1: lock.sha1.clone(),
            ..uploaded
        })
    }

    async fn teardown<T>(
        &self,
        deployments: &[Arc<dyn Deployment>],
        outcome: Result<T>,
    ) -> Result<T> {
        let mut failures = Vec::new();
        for deployment in deployments {
            info!(deployment = %deployment.name(), "deleting compilation deployment");
            if let Err(err) = deployment.delete(true).await {
                warn!(deployment = %deployment.name(), error = %err, "failed to delete deployment");
                failures.push(format!("{}: {err}", deployment.name()));
            }
        }
        if let Err(err) = self.director.cleanup(true).await {
            warn!(error = %err, "director cleanup failed");
        }

        if failures.is_empty() {
            return outcome;
        }
        Err(ReleaseError::CleanupFailed {
            message: format!("deleting deployments: {}", failures.join("; ")),
            primary: outcome.err().map(Box::new),
        })
    }
}

async fn read_stemcell(tarball: &Path) -> Result<Stemcell> {
    let tarball = tarball.to_path_buf();
    let manifest = tokio::task::spawn_blocking(move || read_stemcell_manifest(&tarball)).await??;
    Ok(manifest.stemcell())
}

/// Point the lock named by `update` at its new location.
pub(crate) fn apply_lock(lockfile: &mut KilnfileLock, update: &Lock) -> Result<()> {
    let lock = lockfile.find_mut(&update.name).ok_or_else(|| {
        ReleaseError::InconsistentLockfile(format!(
            "compiled release {} {} has no lock",
            update.name, update.version
        ))
    })?;
    lock.remote_source.clone_from(&update.remote_source);
    lock.remote_path.clone_from(&update.remote_path);
    lock.sha1.clone_from(&update.sha1);
    Ok(())
}
