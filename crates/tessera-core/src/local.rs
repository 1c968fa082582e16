//! Release tarballs in a local releases directory.

use std::path::{Path, PathBuf};

use tessera_schema::{Local, Lock};
use tracing::{debug, warn};

use crate::error::{ReleaseError, Result};
use crate::io::hashing::sha1_file;
use crate::io::tarball::read_release_manifest;
use crate::reporter::Reporter;

/// Every `*.tgz` in `dir` with a readable `release.MF`, sorted by name.
///
/// A missing directory is treated as empty. Tarballs without a release
/// manifest are skipped with a warning.
pub async fn list_local_releases(dir: &Path) -> Result<Vec<Local>> {
    let dir = dir.to_path_buf();
    tokio::task::spawn_blocking(move || scan(&dir)).await?
}

fn scan(dir: &Path) -> Result<Vec<Local>> {
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(err) => return Err(ReleaseError::io(dir, err)),
    };

    let mut paths: Vec<PathBuf> = entries
        .filter_map(|e| e.ok().map(|e| e.path()))
        .filter(|p| p.is_file() && p.extension().is_some_and(|ext| ext == "tgz"))
        .collect();
    paths.sort();

    let mut releases = Vec::with_capacity(paths.len());
    for path in paths {
        let manifest = match read_release_manifest(&path) {
            Ok(manifest) => manifest,
            Err(err) => {
                warn!(path = %path.display(), error = %err, "skipping unreadable release tarball");
                continue;
            }
        };
        let sha1 = sha1_file(&path)?;
        debug!(path = %path.display(), release = %manifest.name, version = %manifest.version, "found local release");
        releases.push(Local {
            lock: Lock {
                stemcell: manifest.stemcell(),
                name: manifest.name,
                version: manifest.version,
                sha1,
                ..Lock::default()
            },
            local_path: path,
        });
    }
    releases.sort_by(|a, b| a.lock.name.cmp(&b.lock.name));
    Ok(releases)
}

/// Remove the given tarballs from disk.
pub async fn delete_local_releases(releases: &[Local], reporter: &dyn Reporter) -> Result<()> {
    for release in releases {
        reporter.removing(&release.lock.name, &release.lock.version);
        tokio::fs::remove_file(&release.local_path)
            .await
            .map_err(|e| ReleaseError::io(&release.local_path, e))?;
    }
    Ok(())
}
