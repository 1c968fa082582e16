//! Streaming SHA-1 and SHA-256 computation.
//!
//! Release tarballs are identified by SHA-1 in lockfiles while directors
//! report SHA-256 for exported blobs, so every sink computes both at once.

use std::io::Read;
use std::path::Path;
use std::pin::Pin;
use std::task::{Context, Poll};

use sha1::Sha1;
use sha2::{Digest, Sha256};
use tokio::fs::File;
use tokio::io::{AsyncWrite, AsyncWriteExt};

use crate::error::{ReleaseError, Result};

/// Hex digests and size of a byte stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Digests {
    pub sha1: String,
    pub sha256: String,
    pub size: u64,
}

#[derive(Clone, Default)]
struct DualHasher {
    sha1: Sha1,
    sha256: Sha256,
    size: u64,
}

impl std::fmt::Debug for DualHasher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DualHasher").field("size", &self.size).finish_non_exhaustive()
    }
}

impl DualHasher {
    fn update(&mut self, bytes: &[u8]) {
        self.sha1.update(bytes);
        self.sha256.update(bytes);
        self.size += bytes.len() as u64;
    }

    fn finish(self) -> Digests {
        Digests {
            sha1: hex::encode(self.sha1.finalize()),
            sha256: hex::encode(self.sha256.finalize()),
            size: self.size,
        }
    }
}

/// An [`AsyncWrite`] adapter that hashes everything written through it.
#[derive(Debug)]
pub struct HashingWriter<W> {
    inner: W,
    hasher: DualHasher,
}

impl<W> HashingWriter<W> {
    pub fn new(inner: W) -> Self {
        Self {
            inner,
            hasher: DualHasher::default(),
        }
    }

    pub fn bytes_written(&self) -> u64 {
        self.hasher.size
    }
}

impl<W: AsyncWrite + Unpin> HashingWriter<W> {
    /// Flush the inner writer and return the digests of everything written.
    pub async fn finish(mut self) -> std::io::Result<Digests> {
        self.inner.flush().await?;
        Ok(self.hasher.finish())
    }
}

impl HashingWriter<File> {
    /// Create (or truncate) `path` and hash everything written to it.
    pub async fn create(path: &Path) -> Result<Self> {
        let file = File::create(path)
            .await
            .map_err(|e| ReleaseError::io(path, e))?;
        Ok(Self::new(file))
    }
}

impl<W: AsyncWrite + Unpin> AsyncWrite for HashingWriter<W> {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<std::io::Result<usize>> {
        let this = self.get_mut();
        let poll = Pin::new(&mut this.inner).poll_write(cx, buf);
        if let Poll::Ready(Ok(written)) = poll {
            this.hasher.update(&buf[..written]);
        }
        poll
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        Pin::new(&mut self.get_mut().inner).poll_flush(cx)
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        Pin::new(&mut self.get_mut().inner).poll_shutdown(cx)
    }
}

/// Hash a byte slice.
pub fn digest_bytes(bytes: &[u8]) -> Digests {
    let mut hasher = DualHasher::default();
    hasher.update(bytes);
    hasher.finish()
}

/// SHA-1 of a file on disk, reading it in chunks.
pub fn sha1_file(path: &Path) -> Result<String> {
    let mut file = std::fs::File::open(path).map_err(|e| ReleaseError::io(path, e))?;
    let mut hasher = Sha1::new();
    let mut buf = vec![0u8; 64 * 1024];
    loop {
        let n = file.read(&mut buf).map_err(|e| ReleaseError::io(path, e))?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(hex::encode(hasher.finalize()))
}

/// Fail with [`ReleaseError::ChecksumMismatch`] when `actual` differs from a
/// non-empty `expected`, deleting `path` first so no corrupt tarball remains.
pub async fn verify_sha1_or_remove(
    path: &Path,
    release: &str,
    expected: &str,
    actual: &str,
) -> Result<()> {
    if expected.is_empty() || expected.eq_ignore_ascii_case(actual) {
        return Ok(());
    }
    tokio::fs::remove_file(path).await.ok();
    Err(ReleaseError::ChecksumMismatch {
        release: release.to_string(),
        expected: expected.to_string(),
        actual: actual.to_string(),
    })
}
