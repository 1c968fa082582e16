//! Single-purpose lockfile edits: bump one release, move every release to a
//! new stemcell, adopt tarballs built locally, and publish a built tarball.
//!
//! None of these write the lockfile; callers save it once the edit succeeds.

use std::path::{Path, PathBuf};

use tessera_schema::{
    ComponentRequirement, Kilnfile, KilnfileLock, Lock, Spec, Stemcell, VersionConstraint,
    parse_lenient,
};
use tracing::{debug, info};

use crate::error::{ReleaseError, Result};
use crate::io::tarball::read_release_manifest;
use crate::local::list_local_releases;
use crate::reporter::Reporter;
use crate::source::{Match, MultiReleaseSource, ReleaseSource, ReleaseUploader, SourceRegistry};

#[derive(Debug, Clone)]
pub struct UpdateReleaseOptions {
    pub name: String,
    /// Constraint overriding the manifest's, usually an exact version.
    pub version: Option<String>,
    /// Resolve without keeping a tarball; sources compute the SHA-1.
    pub without_download: bool,
    pub releases_dir: PathBuf,
    pub publishable_only: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpdateOutcome {
    Unchanged(Lock),
    Updated { from: Lock, to: Lock },
}

#[derive(Debug, Clone)]
pub struct SyncOptions {
    pub releases_dir: PathBuf,
    /// Source the local tarballs will be published to.
    pub source_id: String,
    /// Leave locks alone when the local version matches.
    pub skip_same_version: bool,
}

pub struct LockfileUpdater<'a> {
    registry: &'a SourceRegistry,
    reporter: &'a dyn Reporter,
}

impl<'a> LockfileUpdater<'a> {
    pub fn new(registry: &'a SourceRegistry, reporter: &'a dyn Reporter) -> Self {
        Self { registry, reporter }
    }

    /// Re-resolve one release and rewrite its lock if anything changed.
    pub async fn update_release(
        &self,
        kilnfile: &Kilnfile,
        lockfile: &mut KilnfileLock,
        options: &UpdateReleaseOptions,
    ) -> Result<UpdateOutcome> {
        let name = options.name.as_str();
        let current = lockfile.find(name).cloned().ok_or_else(|| {
            ReleaseError::InconsistentLockfile(format!(
                "no release named {name:?} in the lockfile; names do not usually end in \"-release\""
            ))
        })?;
        let component = kilnfile.component(name).ok_or_else(|| {
            ReleaseError::NotFound {
                release: name.to_string(),
            }
            .context(format!("{name} has no entry in the Kilnfile"))
        })?;

        let sources = self.sources_for(component, options.publishable_only)?;
        let mut spec = component.spec().with_stemcell(&lockfile.stemcell_criteria);
        if let Some(version) = &options.version {
            spec.version.clone_from(version);
        }

        let resolved = if options.without_download {
            sources.find_release_version(&spec, false).await?.or_not_found(&spec)?
        } else {
            let matched = if options.version.is_some() {
                sources.get_matched_release(&spec).await?
            } else {
                sources.find_release_version(&spec, true).await?
            };
            let located = matched.or_not_found(&spec)?;
            tokio::fs::create_dir_all(&options.releases_dir)
                .await
                .map_err(|e| ReleaseError::io(&options.releases_dir, e))?;
            self.reporter.downloading(name, &located.version, 0, None);
            sources
                .download_release(&options.releases_dir, &located)
                .await?
                .lock
        };

        if current.version == resolved.version
            && current.sha1 == resolved.sha1
            && current.remote_source == resolved.remote_source
            && current.remote_path == resolved.remote_path
        {
            self.reporter
                .info(&format!("{name} is already at {}", current.version));
            return Ok(UpdateOutcome::Unchanged(current));
        }

        let lock = lockfile.find_mut(name).ok_or_else(|| {
            ReleaseError::InconsistentLockfile(format!("{name} vanished from the lockfile"))
        })?;
        assign(lock, &resolved);
        let updated = lock.clone();
        info!(release = %name, from = %current.version, to = %updated.version, "updated release");
        self.reporter
            .done(name, &updated.version, &format!("was {}", current.version));
        Ok(UpdateOutcome::Updated {
            from: current,
            to: updated,
        })
    }

    /// Resolve the newest release the Kilnfile allows for `name`, targeting
    /// the locked stemcell. Neither file is changed.
    pub async fn find_release_version(
        &self,
        kilnfile: &Kilnfile,
        lockfile: &KilnfileLock,
        name: &str,
        publishable_only: bool,
    ) -> Result<Lock> {
        let component = kilnfile.component(name).ok_or_else(|| ReleaseError::NotFound {
            release: name.to_string(),
        })?;
        let sources = self.sources_for(component, publishable_only)?;
        let spec = component.spec().with_stemcell(&lockfile.stemcell_criteria);
        debug!(spec = %spec, sources = ?sources.ids(), "finding release version");
        sources
            .find_release_version(&spec, false)
            .await?
            .or_not_found(&spec)
    }

    /// A requirement pinned to a source only consults that source.
    fn sources_for(
        &self,
        component: &ComponentRequirement,
        publishable_only: bool,
    ) -> Result<MultiReleaseSource> {
        if component.release_source.is_empty() {
            Ok(self.registry.aggregate(publishable_only))
        } else {
            MultiReleaseSource::new(vec![self.registry.find_by_id(&component.release_source)?])
        }
    }

    /// Move the lockfile to stemcell `version`, re-matching every release.
    ///
    /// Returns the locks that changed. Versions outside the manifest's
    /// stemcell constraint are ignored.
    pub async fn update_stemcell(
        &self,
        kilnfile: &Kilnfile,
        lockfile: &mut KilnfileLock,
        version: &str,
        releases_dir: &Path,
    ) -> Result<Vec<Lock>> {
        let parsed = parse_lenient(version)?;
        let constraint: VersionConstraint = kilnfile.stemcell_criteria.version.parse()?;
        if !constraint.matches(&parsed) {
            info!(version, constraint = %constraint, "stemcell version outside constraint");
            self.reporter.info(&format!(
                "stemcell {version} does not satisfy {constraint}; nothing to update"
            ));
            return Ok(Vec::new());
        }
        if lockfile.stemcell_criteria.version == version {
            self.reporter
                .info(&format!("already locked to stemcell {version}"));
            return Ok(Vec::new());
        }

        let os = if lockfile.stemcell_criteria.os.is_empty() {
            kilnfile.stemcell_criteria.os.clone()
        } else {
            lockfile.stemcell_criteria.os.clone()
        };
        let stemcell = Stemcell::new(os, version);
        let sources = self.registry.sources();

        self.reporter.section("Updating stemcell");
        let mut resolved = Vec::new();
        for lock in &lockfile.releases {
            let repository = kilnfile
                .component(&lock.name)
                .map(|c| c.github_repository.as_str())
                .unwrap_or_default();
            let spec = Spec::new(&lock.name, &lock.version)
                .with_stemcell(&stemcell)
                .with_github_repository(repository);
            let remote = sources.get_matched_release(&spec).await?.or_not_found(&spec)?;
            if remote.remote_source == lock.remote_source && remote.remote_path == lock.remote_path
            {
                debug!(release = %lock.name, "location unchanged");
                continue;
            }
            tokio::fs::create_dir_all(releases_dir)
                .await
                .map_err(|e| ReleaseError::io(releases_dir, e))?;
            self.reporter.downloading(&lock.name, &lock.version, 0, None);
            let local = sources.download_release(releases_dir, &remote).await?;
            resolved.push(local.lock);
        }

        let mut changed = Vec::with_capacity(resolved.len());
        for release in &resolved {
            let lock = lockfile.find_mut(&release.name).ok_or_else(|| {
                ReleaseError::InconsistentLockfile(format!(
                    "{} vanished from the lockfile",
                    release.name
                ))
            })?;
            assign(lock, release);
            self.reporter.done(&lock.name, &lock.version, "re-locked");
            changed.push(lock.clone());
        }
        lockfile.stemcell_criteria = stemcell;
        info!(stemcell = %lockfile.stemcell_criteria, changed = changed.len(), "updated stemcell");
        Ok(changed)
    }

    /// Point locks at tarballs built locally, as they will be stored once
    /// published to `options.source_id`.
    pub async fn sync_with_local(
        &self,
        lockfile: &mut KilnfileLock,
        options: &SyncOptions,
    ) -> Result<Vec<Lock>> {
        let uploader = self.registry.find_uploader(&options.source_id)?;
        let stemcell = lockfile.stemcell_criteria.clone();
        let mut changed = Vec::new();
        for local in list_local_releases(&options.releases_dir).await? {
            let name = local.lock.name.as_str();
            let lock = lockfile.find_mut(name).ok_or_else(|| {
                ReleaseError::InconsistentLockfile(format!(
                    "{} has no lock for {name}",
                    local.local_path.display()
                ))
            })?;
            if options.skip_same_version && lock.version == local.lock.version {
                debug!(release = %name, version = %lock.version, "same version, skipping");
                continue;
            }
            let spec = Spec::new(name, &local.lock.version).with_stemcell(&stemcell);
            let remote_path = uploader.remote_path(&spec)?;
            lock.version.clone_from(&local.lock.version);
            lock.sha1.clone_from(&local.lock.sha1);
            lock.remote_source.clone_from(&options.source_id);
            lock.remote_path = remote_path;
            self.reporter.done(name, &lock.version, "synced");
            changed.push(lock.clone());
        }
        Ok(changed)
    }

    /// Publish a built release tarball to `source_id`.
    pub async fn upload_release(&self, tarball: &Path, source_id: &str) -> Result<Lock> {
        let path = tarball.to_path_buf();
        let manifest = tokio::task::spawn_blocking(move || read_release_manifest(&path)).await??;
        let version = parse_lenient(&manifest.version).map_err(|_| {
            ReleaseError::Config(format!(
                "release version {:?} is not a semantic version",
                manifest.version
            ))
        })?;
        if !version.pre.is_empty() {
            return Err(ReleaseError::Config(format!(
                "refusing to upload prerelease {} {}",
                manifest.name, manifest.version
            )));
        }

        let target = self.registry.find_by_id(source_id)?;
        let uploader = self.registry.find_uploader(source_id)?;
        let mut spec = Spec::new(&manifest.name, &manifest.version);
        if let Some(stemcell) = manifest.stemcell() {
            spec = spec.with_stemcell(&stemcell);
        }
        if let Match::Found(existing) = target.get_matched_release(&spec).await? {
            return Err(ReleaseError::Config(format!(
                "{} {} already exists on {source_id} at {}",
                manifest.name, manifest.version, existing.remote_path
            )));
        }

        self.reporter
            .uploading(&manifest.name, &manifest.version, source_id);
        let mut file = tokio::fs::File::open(tarball)
            .await
            .map_err(|e| ReleaseError::io(tarball, e))?;
        let lock = uploader.upload_release(&spec, &mut file).await?;
        self.reporter
            .done(&lock.name, &lock.version, &format!("uploaded to {source_id}"));
        Ok(lock)
    }
}

fn assign(lock: &mut Lock, resolved: &Lock) {
    lock.version.clone_from(&resolved.version);
    lock.sha1.clone_from(&resolved.sha1);
    lock.remote_source.clone_from(&resolved.remote_source);
    lock.remote_path.clone_from(&resolved.remote_path);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::hashing::digest_bytes;
    use crate::reporter::NullReporter;
    use crate::source::registry::SourceEntry;
    use crate::testing::{FakeSource, release_tarball_bytes, write_release_tarball};
    use std::sync::Arc;
    use tempfile::tempdir;

    fn kilnfile(releases: &[(&str, &str)]) -> Kilnfile {
        Kilnfile {
            release_sources: Vec::new(),
            releases: releases
                .iter()
                .map(|(name, version)| ComponentRequirement {
                    name: (*name).into(),
                    version: (*version).into(),
                    ..ComponentRequirement::default()
                })
                .collect(),
            stemcell_criteria: Stemcell::new("alpine", "~9"),
        }
    }

    fn lockfile(locks: &[Lock]) -> KilnfileLock {
        KilnfileLock {
            releases: locks.to_vec(),
            stemcell_criteria: Stemcell::new("alpine", "9.0.0"),
        }
    }

    fn locked(name: &str, version: &str, sha1: &str, source: &str) -> Lock {
        Lock {
            name: name.into(),
            version: version.into(),
            sha1: sha1.into(),
            remote_source: source.into(),
            remote_path: format!("{name}/{name}-{version}.tgz"),
            stemcell: None,
        }
    }

    fn registry(sources: Vec<Arc<FakeSource>>) -> SourceRegistry {
        SourceRegistry::new(sources.into_iter().map(SourceEntry::uploading).collect()).unwrap()
    }

    #[tokio::test]
    async fn test_update_release_picks_highest_and_downloads() {
        let old = release_tarball_bytes("bpm", "1.1.20", None);
        let new = release_tarball_bytes("bpm", "1.1.21", None);
        let source = Arc::new(
            FakeSource::new("s3", true)
                .with_release("bpm", "1.1.20", &old)
                .with_release("bpm", "1.1.21", &new),
        );
        let registry = registry(vec![source]);
        let kilnfile = kilnfile(&[("bpm", "~1.1")]);
        let mut lock = lockfile(&[locked("bpm", "1.1.20", &digest_bytes(&old).sha1, "s3")]);
        let dir = tempdir().unwrap();
        let options = UpdateReleaseOptions {
            name: "bpm".into(),
            version: None,
            without_download: false,
            releases_dir: dir.path().to_path_buf(),
            publishable_only: false,
        };

        let outcome = LockfileUpdater::new(&registry, &NullReporter)
            .update_release(&kilnfile, &mut lock, &options)
            .await
            .unwrap();
        let UpdateOutcome::Updated { from, to } = outcome else {
            panic!("expected an update, got {outcome:?}");
        };
        assert_eq!(from.version, "1.1.20");
        assert_eq!(to.version, "1.1.21");
        assert_eq!(to.sha1, digest_bytes(&new).sha1);
        assert_eq!(lock.find("bpm"), Some(&to));
        assert!(dir.path().join("bpm-1.1.21.tgz").exists());
    }

    #[tokio::test]
    async fn test_update_release_without_download_is_noop_when_current() {
        let body = release_tarball_bytes("bpm", "1.1.21", None);
        let source = Arc::new(FakeSource::new("s3", true).with_release("bpm", "1.1.21", &body));
        let registry = registry(vec![source.clone()]);
        let kilnfile = kilnfile(&[("bpm", "")]);
        let mut lock = lockfile(&[locked("bpm", "1.1.21", &digest_bytes(&body).sha1, "s3")]);
        let before = lock.clone();
        let dir = tempdir().unwrap();
        let options = UpdateReleaseOptions {
            name: "bpm".into(),
            version: None,
            without_download: true,
            releases_dir: dir.path().join("releases"),
            publishable_only: false,
        };

        let outcome = LockfileUpdater::new(&registry, &NullReporter)
            .update_release(&kilnfile, &mut lock, &options)
            .await
            .unwrap();
        assert!(matches!(outcome, UpdateOutcome::Unchanged(_)));
        assert_eq!(lock, before);
        assert_eq!(source.download_calls(), 0);
        assert!(!dir.path().join("releases").exists());
    }

    #[tokio::test]
    async fn test_update_release_unknown_name() {
        let registry = registry(vec![Arc::new(FakeSource::new("s3", true))]);
        let mut lock = lockfile(&[]);
        let dir = tempdir().unwrap();
        let options = UpdateReleaseOptions {
            name: "bpm-release".into(),
            version: None,
            without_download: true,
            releases_dir: dir.path().to_path_buf(),
            publishable_only: false,
        };
        let err = LockfileUpdater::new(&registry, &NullReporter)
            .update_release(&kilnfile(&[]), &mut lock, &options)
            .await
            .unwrap_err();
        assert!(matches!(err, ReleaseError::InconsistentLockfile(_)));
        assert!(err.to_string().contains("-release"));
    }

    #[tokio::test]
    async fn test_update_release_requires_a_kilnfile_entry() {
        let body = release_tarball_bytes("bpm", "1.1.21", None);
        let source = Arc::new(FakeSource::new("s3", true).with_release("bpm", "1.1.21", &body));
        let registry = registry(vec![source.clone()]);
        let mut lock = lockfile(&[locked("bpm", "1.1.20", "", "s3")]);
        let before = lock.clone();
        let dir = tempdir().unwrap();
        let options = UpdateReleaseOptions {
            name: "bpm".into(),
            version: Some("1.1.21".into()),
            without_download: false,
            releases_dir: dir.path().to_path_buf(),
            publishable_only: false,
        };

        let err = LockfileUpdater::new(&registry, &NullReporter)
            .update_release(&kilnfile(&[("uaa", "")]), &mut lock, &options)
            .await
            .unwrap_err();
        assert!(err.is_not_found());
        assert_eq!(lock, before);
        assert_eq!(source.total_calls(), 0);
    }

    #[tokio::test]
    async fn test_find_release_version_honours_pin() {
        let old = release_tarball_bytes("bpm", "1.1.20", None);
        let new = release_tarball_bytes("bpm", "1.1.21", None);
        let cache = Arc::new(FakeSource::new("cache", true).with_release("bpm", "1.1.21", &new));
        let built = Arc::new(FakeSource::new("built", false).with_release("bpm", "1.1.20", &old));
        let registry = registry(vec![cache, built]);
        let lock = lockfile(&[locked("bpm", "1.1.19", "", "built")]);
        let updater = LockfileUpdater::new(&registry, &NullReporter);

        let found = updater
            .find_release_version(&kilnfile(&[("bpm", "~1.1")]), &lock, "bpm", false)
            .await
            .unwrap();
        assert_eq!(found.version, "1.1.21");
        assert_eq!(found.remote_source, "cache");
        assert_eq!(found.sha1, digest_bytes(&new).sha1);

        let mut pinned = kilnfile(&[("bpm", "~1.1")]);
        pinned.releases[0].release_source = "built".into();
        let found = updater
            .find_release_version(&pinned, &lock, "bpm", false)
            .await
            .unwrap();
        assert_eq!(found.version, "1.1.20");
        assert_eq!(found.remote_source, "built");
        assert_eq!(lock.find("bpm").unwrap().version, "1.1.19");

        let err = updater
            .find_release_version(&pinned, &lock, "uaa", false)
            .await
            .unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_update_stemcell_relocks_compiled_releases() {
        let built = release_tarball_bytes("uaa", "77.0.0", None);
        let old = release_tarball_bytes("bpm", "1.1.21", Some("alpine/9.0.0"));
        let new = release_tarball_bytes("bpm", "1.1.21", Some("alpine/9.0.1"));
        let source = Arc::new(
            FakeSource::new("cache", true)
                .with_compiled_release("bpm", "1.1.21", &Stemcell::new("alpine", "9.0.0"), &old)
                .with_compiled_release("bpm", "1.1.21", &Stemcell::new("alpine", "9.0.1"), &new)
                .with_release("uaa", "77.0.0", &built),
        );
        let registry = registry(vec![source]);
        let mut lock = lockfile(&[
            Lock {
                remote_path: "bpm/bpm-1.1.21-alpine-9.0.0.tgz".into(),
                ..locked("bpm", "1.1.21", &digest_bytes(&old).sha1, "cache")
            },
            locked("uaa", "77.0.0", &digest_bytes(&built).sha1, "cache"),
        ]);
        let dir = tempdir().unwrap();

        let changed = LockfileUpdater::new(&registry, &NullReporter)
            .update_stemcell(&kilnfile(&[]), &mut lock, "9.0.1", dir.path())
            .await
            .unwrap();
        assert_eq!(changed.len(), 1);
        let bpm = lock.find("bpm").unwrap();
        assert_eq!(bpm.remote_path, "bpm/bpm-1.1.21-alpine-9.0.1.tgz");
        assert_eq!(bpm.sha1, digest_bytes(&new).sha1);
        assert_eq!(lock.find("uaa").unwrap().sha1, digest_bytes(&built).sha1);
        assert_eq!(lock.stemcell_criteria, Stemcell::new("alpine", "9.0.1"));
    }

    #[tokio::test]
    async fn test_update_stemcell_outside_constraint_is_ignored() {
        let registry = registry(vec![Arc::new(FakeSource::new("cache", true))]);
        let mut lock = lockfile(&[locked("bpm", "1.1.21", "abc", "cache")]);
        let before = lock.clone();
        let dir = tempdir().unwrap();

        let changed = LockfileUpdater::new(&registry, &NullReporter)
            .update_stemcell(&kilnfile(&[]), &mut lock, "10.0.0", dir.path())
            .await
            .unwrap();
        assert!(changed.is_empty());
        assert_eq!(lock, before);
    }

    #[tokio::test]
    async fn test_update_stemcell_missing_release_fails() {
        let registry = registry(vec![Arc::new(FakeSource::new("cache", true))]);
        let mut lock = lockfile(&[locked("bpm", "1.1.21", "abc", "cache")]);
        let dir = tempdir().unwrap();

        let err = LockfileUpdater::new(&registry, &NullReporter)
            .update_stemcell(&kilnfile(&[]), &mut lock, "9.0.1", dir.path())
            .await
            .unwrap_err();
        assert!(err.is_not_found());
        assert_eq!(lock.stemcell_criteria.version, "9.0.0");
    }

    #[tokio::test]
    async fn test_sync_with_local() {
        let dir = tempdir().unwrap();
        write_release_tarball(&dir.path().join("bpm.tgz"), "bpm", "1.2.0", None);
        write_release_tarball(&dir.path().join("uaa.tgz"), "uaa", "77.0.0", None);
        let registry = registry(vec![Arc::new(FakeSource::new("built", false))]);
        let mut lock = lockfile(&[
            locked("bpm", "1.1.21", "old", "s3"),
            locked("uaa", "77.0.0", "old", "s3"),
        ]);
        let options = SyncOptions {
            releases_dir: dir.path().to_path_buf(),
            source_id: "built".into(),
            skip_same_version: true,
        };

        let changed = LockfileUpdater::new(&registry, &NullReporter)
            .sync_with_local(&mut lock, &options)
            .await
            .unwrap();
        assert_eq!(changed.len(), 1);
        let bpm = lock.find("bpm").unwrap();
        assert_eq!(bpm.version, "1.2.0");
        assert_eq!(bpm.remote_source, "built");
        assert_eq!(bpm.remote_path, "bpm/bpm-1.2.0-alpine-9.0.0.tgz");
        assert_eq!(
            bpm.sha1,
            crate::io::hashing::sha1_file(&dir.path().join("bpm.tgz")).unwrap()
        );
        assert_eq!(lock.find("uaa").unwrap().sha1, "old");
    }

    #[tokio::test]
    async fn test_sync_with_local_requires_lock() {
        let dir = tempdir().unwrap();
        write_release_tarball(&dir.path().join("nats.tgz"), "nats", "1.0.0", None);
        let registry = registry(vec![Arc::new(FakeSource::new("built", false))]);
        let options = SyncOptions {
            releases_dir: dir.path().to_path_buf(),
            source_id: "built".into(),
            skip_same_version: false,
        };
        let err = LockfileUpdater::new(&registry, &NullReporter)
            .sync_with_local(&mut lockfile(&[]), &options)
            .await
            .unwrap_err();
        assert!(matches!(err, ReleaseError::InconsistentLockfile(_)));
    }

    #[tokio::test]
    async fn test_upload_release() {
        let dir = tempdir().unwrap();
        let tarball = dir.path().join("bpm-1.1.21.tgz");
        write_release_tarball(&tarball, "bpm", "1.1.21", None);
        let source = Arc::new(FakeSource::new("s3", true));
        let registry = registry(vec![source.clone()]);
        let updater = LockfileUpdater::new(&registry, &NullReporter);

        let lock = updater.upload_release(&tarball, "s3").await.unwrap();
        assert_eq!(lock.remote_path, "bpm/bpm-1.1.21.tgz");
        assert_eq!(
            source.object(&lock.remote_path),
            Some(std::fs::read(&tarball).unwrap())
        );

        let err = updater.upload_release(&tarball, "s3").await.unwrap_err();
        assert!(err.to_string().contains("already exists"), "{err}");
        assert_eq!(source.upload_calls(), 1);
    }

    #[tokio::test]
    async fn test_upload_release_rejects_prerelease() {
        let dir = tempdir().unwrap();
        let tarball = dir.path().join("bpm.tgz");
        write_release_tarball(&tarball, "bpm", "1.2.0-rc.1", None);
        let source = Arc::new(FakeSource::new("s3", true));
        let registry = registry(vec![source.clone()]);

        let err = LockfileUpdater::new(&registry, &NullReporter)
            .upload_release(&tarball, "s3")
            .await
            .unwrap_err();
        assert!(err.to_string().contains("prerelease"), "{err}");
        assert_eq!(source.total_calls(), 0);
    }
}
