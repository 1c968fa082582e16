//! In-memory stand-ins for object stores, release sources and directors,
//! plus tarball fixtures.

use std::collections::BTreeMap;
use std::io::Write;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use flate2::Compression;
use flate2::write::GzEncoder;
use tessera_schema::{Local, Lock, Spec, Stemcell, VersionConstraint};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::director::{Deployment, Director, DirectorPackage, ExportedRelease};
use crate::error::{ReleaseError, Result};
use crate::io::hashing::{digest_bytes, verify_sha1_or_remove};
use crate::io::tarball::read_release_manifest;
use crate::source::{
    Match, ObjectStore, ReleaseSource, ReleaseUploader, SourceConfiguration, file_name_of,
};

/// Gzipped tar with fixed metadata, so equal members give equal bytes.
pub fn tarball_bytes(members: &[(&str, &[u8])]) -> Vec<u8> {
    let mut builder = tar::Builder::new(GzEncoder::new(Vec::new(), Compression::default()));
    for (name, body) in members {
        let mut header = tar::Header::new_gnu();
        header.set_size(body.len() as u64);
        header.set_mode(0o644);
        header.set_mtime(0);
        header.set_cksum();
        builder.append_data(&mut header, name, *body).unwrap();
    }
    builder.into_inner().unwrap().finish().unwrap()
}

pub fn write_tarball(path: &Path, members: &[(&str, &[u8])]) {
    let mut file = std::fs::File::create(path).unwrap();
    file.write_all(&tarball_bytes(members)).unwrap();
}

/// A release tarball; compiled for `stemcell` (`os/version`) when given.
pub fn release_tarball_bytes(name: &str, version: &str, stemcell: Option<&str>) -> Vec<u8> {
    let mut manifest = format!("name: {name}\nversion: {version}\n");
    match stemcell {
        Some(stemcell) => manifest.push_str(&format!(
            "compiled_packages:\n- name: {name}\n  version: abc\n  fingerprint: abc\n  sha1: abc\n  stemcell: {stemcell}\n"
        )),
        None => manifest.push_str(&format!("packages:\n- name: {name}\n  version: abc\n")),
    }
    tarball_bytes(&[("./release.MF", manifest.as_bytes())])
}

pub fn write_release_tarball(path: &Path, name: &str, version: &str, stemcell: Option<&str>) {
    std::fs::write(path, release_tarball_bytes(name, version, stemcell)).unwrap();
}

pub fn write_stemcell_tarball(path: &Path, stemcell: &Stemcell) {
    let manifest = format!(
        "name: bosh-{os}\noperating_system: {os}\nversion: \"{version}\"\n",
        os = stemcell.os,
        version = stemcell.version
    );
    write_tarball(path, &[("stemcell.MF", manifest.as_bytes())]);
}

// ---------------------------------------------------------------------------
// Object store
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
pub struct MemoryObjectStore {
    objects: Mutex<BTreeMap<String, Vec<u8>>>,
}

impl MemoryObjectStore {
    pub fn insert(&self, key: &str, body: Vec<u8>) {
        self.objects.lock().unwrap().insert(key.to_string(), body);
    }

    pub fn object(&self, key: &str) -> Option<Vec<u8>> {
        self.objects.lock().unwrap().get(key).cloned()
    }
}

#[async_trait]
impl ObjectStore for MemoryObjectStore {
    async fn exists(&self, key: &str) -> Result<bool> {
        Ok(self.objects.lock().unwrap().contains_key(key))
    }

    async fn list(&self, prefix: &str) -> Result<Vec<String>> {
        Ok(self
            .objects
            .lock()
            .unwrap()
            .keys()
            .filter(|k| k.starts_with(prefix))
            .cloned()
            .collect())
    }

    async fn get(&self, key: &str, sink: &mut (dyn AsyncWrite + Unpin + Send)) -> Result<u64> {
        let body = self
            .object(key)
            .ok_or_else(|| ReleaseError::transport(format!("get {key}"), "no such key"))?;
        sink.write_all(&body)
            .await
            .map_err(|e| ReleaseError::transport(format!("get {key}"), e))?;
        Ok(body.len() as u64)
    }

    async fn put(&self, key: &str, body: Vec<u8>) -> Result<()> {
        self.insert(key, body);
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Release source
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
struct StoredRelease {
    name: String,
    version: String,
    stemcell: Option<Stemcell>,
    body: Vec<u8>,
}

impl StoredRelease {
    fn remote_path(&self) -> String {
        remote_path_for(&self.name, &self.version, self.stemcell.as_ref())
    }

    fn satisfies(&self, spec: &Spec) -> bool {
        self.name == spec.name
            && match &self.stemcell {
                Some(stemcell) => spec.stemcell().as_ref() == Some(stemcell),
                None => true,
            }
    }
}

fn remote_path_for(name: &str, version: &str, stemcell: Option<&Stemcell>) -> String {
    match stemcell {
        Some(s) => format!("{name}/{name}-{version}-{}-{}.tgz", s.os, s.version),
        None => format!("{name}/{name}-{version}.tgz"),
    }
}

/// A release source (and uploader) backed by memory, counting every call.
#[derive(Debug)]
pub struct FakeSource {
    id: String,
    publishable: bool,
    failing: bool,
    releases: Mutex<Vec<StoredRelease>>,
    match_calls: AtomicUsize,
    download_calls: AtomicUsize,
    upload_calls: AtomicUsize,
}

impl FakeSource {
    pub fn new(id: &str, publishable: bool) -> Self {
        Self {
            id: id.to_string(),
            publishable,
            failing: false,
            releases: Mutex::new(Vec::new()),
            match_calls: AtomicUsize::new(0),
            download_calls: AtomicUsize::new(0),
            upload_calls: AtomicUsize::new(0),
        }
    }

    /// A stemcell-agnostic release.
    pub fn with_release(self, name: &str, version: &str, body: &[u8]) -> Self {
        self.store(name, version, None, body.to_vec());
        self
    }

    /// A release compiled for `stemcell`.
    pub fn with_compiled_release(
        self,
        name: &str,
        version: &str,
        stemcell: &Stemcell,
        body: &[u8],
    ) -> Self {
        self.store(name, version, Some(stemcell.clone()), body.to_vec());
        self
    }

    /// Every lookup fails with a transport error.
    pub fn failing(mut self) -> Self {
        self.failing = true;
        self
    }

    fn store(&self, name: &str, version: &str, stemcell: Option<Stemcell>, body: Vec<u8>) {
        let mut releases = self.releases.lock().unwrap();
        releases.retain(|r| {
            !(r.name == name && r.version == version && r.stemcell == stemcell)
        });
        releases.push(StoredRelease {
            name: name.to_string(),
            version: version.to_string(),
            stemcell,
            body,
        });
    }

    pub fn object(&self, remote_path: &str) -> Option<Vec<u8>> {
        self.releases
            .lock()
            .unwrap()
            .iter()
            .find(|r| r.remote_path() == remote_path)
            .map(|r| r.body.clone())
    }

    pub fn match_calls(&self) -> usize {
        self.match_calls.load(Ordering::SeqCst)
    }

    pub fn download_calls(&self) -> usize {
        self.download_calls.load(Ordering::SeqCst)
    }

    pub fn upload_calls(&self) -> usize {
        self.upload_calls.load(Ordering::SeqCst)
    }

    pub fn total_calls(&self) -> usize {
        self.match_calls() + self.download_calls() + self.upload_calls()
    }

    fn check(&self) -> Result<()> {
        if self.failing {
            return Err(ReleaseError::transport(
                format!("querying {}", self.id),
                "connection refused",
            ));
        }
        Ok(())
    }

    fn lock_for(&self, release: &StoredRelease, spec: &Spec) -> Lock {
        Lock {
            name: release.name.clone(),
            version: release.version.clone(),
            sha1: String::new(),
            remote_source: self.id.clone(),
            remote_path: release.remote_path(),
            stemcell: spec.stemcell(),
        }
    }
}

#[async_trait]
impl ReleaseSource for FakeSource {
    fn configuration(&self) -> SourceConfiguration {
        SourceConfiguration {
            id: self.id.clone(),
            publishable: self.publishable,
        }
    }

    async fn get_matched_release(&self, spec: &Spec) -> Result<Match> {
        self.match_calls.fetch_add(1, Ordering::SeqCst);
        self.check()?;
        let releases = self.releases.lock().unwrap();
        Ok(releases
            .iter()
            .find(|r| r.satisfies(spec) && r.version == spec.version)
            .map_or(Match::NotFound, |r| Match::Found(self.lock_for(r, spec))))
    }

    async fn find_release_version(&self, spec: &Spec, no_download: bool) -> Result<Match> {
        self.match_calls.fetch_add(1, Ordering::SeqCst);
        self.check()?;
        let constraint: VersionConstraint = spec.version.parse()?;
        let releases = self.releases.lock().unwrap();
        let candidates: Vec<&StoredRelease> =
            releases.iter().filter(|r| r.satisfies(spec)).collect();
        let Some(version) = constraint.highest(candidates.iter().map(|r| r.version.as_str()))
        else {
            return Ok(Match::NotFound);
        };
        let Some(release) = candidates.iter().find(|r| r.version == version) else {
            return Ok(Match::NotFound);
        };
        let lock = self.lock_for(release, spec);
        Ok(Match::Found(if no_download {
            lock
        } else {
            lock.with_sha1(digest_bytes(&release.body).sha1)
        }))
    }

    async fn download_release(&self, dir: &Path, lock: &Lock) -> Result<Local> {
        self.download_calls.fetch_add(1, Ordering::SeqCst);
        self.check()?;
        let body = self.object(&lock.remote_path).ok_or_else(|| ReleaseError::NotFound {
            release: lock.to_string(),
        })?;
        let local_path = dir.join(file_name_of(&lock.remote_path));
        tokio::fs::write(&local_path, &body)
            .await
            .map_err(|e| ReleaseError::io(&local_path, e))?;
        let sha1 = digest_bytes(&body).sha1;
        verify_sha1_or_remove(&local_path, &lock.name, &lock.sha1, &sha1).await?;
        Ok(Local {
            lock: lock.with_sha1(sha1),
            local_path,
        })
    }
}

#[async_trait]
impl ReleaseUploader for FakeSource {
    fn remote_path(&self, spec: &Spec) -> Result<String> {
        Ok(remote_path_for(
            &spec.name,
            &spec.version,
            spec.stemcell().as_ref(),
        ))
    }

    async fn upload_release(
        &self,
        spec: &Spec,
        reader: &mut (dyn AsyncRead + Unpin + Send),
    ) -> Result<Lock> {
        self.upload_calls.fetch_add(1, Ordering::SeqCst);
        self.check()?;
        let mut body = Vec::new();
        reader
            .read_to_end(&mut body)
            .await
            .map_err(|e| ReleaseError::transport("reading upload", e))?;
        let sha1 = digest_bytes(&body).sha1;
        self.store(&spec.name, &spec.version, spec.stemcell(), body);
        Ok(Lock {
            sha1,
            remote_source: self.id.clone(),
            remote_path: ReleaseUploader::remote_path(self, spec)?,
            ..spec.unverified_lock()
        })
    }
}

// ---------------------------------------------------------------------------
// Director
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
struct DirectorState {
    releases: Mutex<BTreeMap<String, Vec<DirectorPackage>>>,
    blobs: Mutex<BTreeMap<String, Vec<u8>>>,
    manifests: Mutex<BTreeMap<String, String>>,
    uploaded_releases: Mutex<Vec<String>>,
    uploaded_stemcells: Mutex<Vec<String>>,
    updated: Mutex<Vec<String>>,
    deleted: Mutex<Vec<String>>,
    cleanups: Mutex<Vec<bool>>,
    failing_export: Mutex<Option<String>>,
    corrupt_release: Mutex<Option<String>>,
    download_delays: Mutex<BTreeMap<String, Duration>>,
    export_delay: Mutex<Duration>,
    release_lookups: AtomicUsize,
    export_calls: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    corrupt: AtomicBool,
    fail_delete: AtomicBool,
    fail_cleanup: AtomicBool,
}

/// A director whose deployments export deterministic compiled tarballs.
#[derive(Debug, Default)]
pub struct FakeDirector {
    state: Arc<DirectorState>,
}

impl FakeDirector {
    pub fn deployment(&self, name: &str) -> Arc<FakeDeployment> {
        Arc::new(FakeDeployment {
            name: name.to_string(),
            state: Arc::clone(&self.state),
        })
    }

    pub fn add_release(&self, slug: &str, packages: Vec<DirectorPackage>) {
        self.state
            .releases
            .lock()
            .unwrap()
            .insert(slug.to_string(), packages);
    }

    pub fn stage_manifest(&self, deployment: &str, manifest: &str) {
        self.state
            .manifests
            .lock()
            .unwrap()
            .insert(deployment.to_string(), manifest.to_string());
    }

    /// Report digests that do not match the exported bytes.
    pub fn corrupt_exports(&self) {
        self.state.corrupt.store(true, Ordering::SeqCst);
    }

    /// Like `corrupt_exports`, for one release only.
    pub fn corrupt_export_of(&self, release: &str) {
        *self.state.corrupt_release.lock().unwrap() = Some(release.to_string());
    }

    /// Hold back downloads of `release`'s exported blob.
    pub fn delay_download_of(&self, release: &str, delay: Duration) {
        self.state
            .download_delays
            .lock()
            .unwrap()
            .insert(release.to_string(), delay);
    }

    pub fn fail_export_of(&self, release: &str) {
        *self.state.failing_export.lock().unwrap() = Some(release.to_string());
    }

    pub fn set_export_delay(&self, delay: Duration) {
        *self.state.export_delay.lock().unwrap() = delay;
    }

    pub fn fail_deletes(&self) {
        self.state.fail_delete.store(true, Ordering::SeqCst);
    }

    pub fn fail_cleanup(&self) {
        self.state.fail_cleanup.store(true, Ordering::SeqCst);
    }

    pub fn release_lookups(&self) -> usize {
        self.state.release_lookups.load(Ordering::SeqCst)
    }

    pub fn export_calls(&self) -> usize {
        self.state.export_calls.load(Ordering::SeqCst)
    }

    pub fn max_in_flight(&self) -> usize {
        self.state.max_in_flight.load(Ordering::SeqCst)
    }

    pub fn uploaded_releases(&self) -> Vec<String> {
        self.state.uploaded_releases.lock().unwrap().clone()
    }

    pub fn uploaded_stemcells(&self) -> Vec<String> {
        self.state.uploaded_stemcells.lock().unwrap().clone()
    }

    /// Deployments that received a manifest, in update order.
    pub fn updated(&self) -> Vec<String> {
        self.state.updated.lock().unwrap().clone()
    }

    pub fn deleted(&self) -> Vec<String> {
        self.state.deleted.lock().unwrap().clone()
    }

    pub fn cleanups(&self) -> Vec<bool> {
        self.state.cleanups.lock().unwrap().clone()
    }

    pub fn manifest_of(&self, deployment: &str) -> Option<String> {
        self.state.manifests.lock().unwrap().get(deployment).cloned()
    }
}

fn file_label(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

#[async_trait]
impl Director for FakeDirector {
    async fn upload_stemcell(&self, tarball: &Path) -> Result<()> {
        self.state
            .uploaded_stemcells
            .lock()
            .unwrap()
            .push(file_label(tarball));
        Ok(())
    }

    async fn upload_release(&self, tarball: &Path) -> Result<()> {
        let manifest = read_release_manifest(tarball)?;
        self.add_release(
            &format!("{}/{}", manifest.name, manifest.version),
            Vec::new(),
        );
        self.state
            .uploaded_releases
            .lock()
            .unwrap()
            .push(file_label(tarball));
        Ok(())
    }

    async fn find_deployment(&self, name: &str) -> Result<Arc<dyn Deployment>> {
        Ok(self.deployment(name))
    }

    async fn download_resource(
        &self,
        blobstore_id: &str,
        sink: &mut (dyn AsyncWrite + Unpin + Send),
    ) -> Result<u64> {
        let delay = {
            let delays = self.state.download_delays.lock().unwrap();
            delays
                .iter()
                .find(|(release, _)| blobstore_id.starts_with(&format!("blob-{release}/")))
                .map(|(_, delay)| *delay)
        };
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        let body = self
            .state
            .blobs
            .lock()
            .unwrap()
            .get(blobstore_id)
            .cloned()
            .ok_or_else(|| ReleaseError::transport(blobstore_id.to_string(), "no such blob"))?;
        sink.write_all(&body)
            .await
            .map_err(|e| ReleaseError::transport(blobstore_id.to_string(), e))?;
        Ok(body.len() as u64)
    }

    async fn find_release(&self, release_slug: &str) -> Result<Option<Vec<DirectorPackage>>> {
        self.state.release_lookups.fetch_add(1, Ordering::SeqCst);
        Ok(self.state.releases.lock().unwrap().get(release_slug).cloned())
    }

    async fn release_versions(&self, name: &str) -> Result<Vec<String>> {
        Ok(self
            .state
            .releases
            .lock()
            .unwrap()
            .keys()
            .filter_map(|slug| {
                let (n, v) = slug.split_once('/')?;
                (n == name).then(|| v.to_string())
            })
            .collect())
    }

    async fn cleanup(&self, remove_all: bool) -> Result<()> {
        self.state.cleanups.lock().unwrap().push(remove_all);
        if self.state.fail_cleanup.load(Ordering::SeqCst) {
            return Err(ReleaseError::transport("cleanup", "director busy"));
        }
        Ok(())
    }
}

#[derive(Debug)]
pub struct FakeDeployment {
    name: String,
    state: Arc<DirectorState>,
}

impl FakeDeployment {
    /// The compiled tarball exported for `release_slug` on `os_slug`.
    pub fn exported_bytes(release_slug: &str, os_slug: &str) -> Vec<u8> {
        let (name, version) = release_slug.split_once('/').unwrap_or((release_slug, ""));
        release_tarball_bytes(name, version, Some(os_slug))
    }
}

#[async_trait]
impl Deployment for FakeDeployment {
    fn name(&self) -> &str {
        &self.name
    }

    async fn manifest(&self) -> Result<String> {
        self.state
            .manifests
            .lock()
            .unwrap()
            .get(&self.name)
            .cloned()
            .ok_or_else(|| ReleaseError::transport(format!("deployment {}", self.name), "not found"))
    }

    async fn update(&self, manifest: &str) -> Result<()> {
        self.state.updated.lock().unwrap().push(self.name.clone());
        self.state
            .manifests
            .lock()
            .unwrap()
            .insert(self.name.clone(), manifest.to_string());
        Ok(())
    }

    async fn export_release(&self, release_slug: &str, os_slug: &str) -> Result<ExportedRelease> {
        let state = &self.state;
        state.export_calls.fetch_add(1, Ordering::SeqCst);
        let now = state.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        state.max_in_flight.fetch_max(now, Ordering::SeqCst);

        let delay = *state.export_delay.lock().unwrap();
        tokio::time::sleep(delay).await;
        state.in_flight.fetch_sub(1, Ordering::SeqCst);

        let name = release_slug.split('/').next().unwrap_or_default();
        if state.failing_export.lock().unwrap().as_deref() == Some(name) {
            return Err(ReleaseError::DirectorTask {
                task: 42,
                state: "error".into(),
                description: format!("compiling {release_slug} failed"),
            });
        }

        let body = Self::exported_bytes(release_slug, os_slug);
        let corrupt = state.corrupt.load(Ordering::SeqCst)
            || state.corrupt_release.lock().unwrap().as_deref() == Some(name);
        let digest = if corrupt {
            digest_bytes(b"something else").sha256
        } else {
            digest_bytes(&body).sha256
        };
        let blobstore_id = format!("blob-{release_slug}-{os_slug}");
        state.blobs.lock().unwrap().insert(blobstore_id.clone(), body);
        Ok(ExportedRelease {
            blobstore_id,
            sha1: format!("sha256:{digest}"),
        })
    }

    async fn delete(&self, _force: bool) -> Result<()> {
        if self.state.fail_delete.load(Ordering::SeqCst) {
            return Err(ReleaseError::transport(
                format!("deleting {}", self.name),
                "director unreachable",
            ));
        }
        self.state.deleted.lock().unwrap().push(self.name.clone());
        Ok(())
    }
}
