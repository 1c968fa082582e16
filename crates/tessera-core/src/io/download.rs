//! Streaming HTTP downloads.
//!
//! Bytes are hashed as they are written so a tarball is never read twice.

use std::path::Path;

use futures::StreamExt;
use reqwest::{Client, RequestBuilder};
use tokio::io::AsyncWriteExt;

use crate::Reporter;
use crate::error::{ReleaseError, Result};
use crate::io::hashing::{Digests, HashingWriter};

/// Request for a single tarball download.
#[derive(Debug, Clone, Copy)]
pub struct DownloadRequest<'a> {
    pub client: &'a Client,
    pub url: &'a str,
    pub dest: &'a Path,
    pub release: &'a str,
    pub version: &'a str,
}

impl DownloadRequest<'_> {
    /// Download to `dest`, returning the digests of what was written.
    ///
    /// A partially written file is removed when the transfer fails.
    pub async fn execute(self, reporter: &dyn Reporter) -> Result<Digests> {
        let request = self.client.get(self.url);
        self.execute_request(request, reporter).await
    }

    /// Like [`execute`](Self::execute), for a request the caller prepared
    /// (credentials, `Accept` headers).
    pub async fn execute_request(
        self,
        request: RequestBuilder,
        reporter: &dyn Reporter,
    ) -> Result<Digests> {
        let result = self.stream(request, reporter).await;
        if result.is_err() {
            tokio::fs::remove_file(self.dest).await.ok();
        }
        result
    }

    async fn stream(self, request: RequestBuilder, reporter: &dyn Reporter) -> Result<Digests> {
        let response = request
            .header(reqwest::header::USER_AGENT, crate::USER_AGENT)
            .send()
            .await?
            .error_for_status()?;

        let total = response.content_length();
        let mut writer = HashingWriter::create(self.dest).await?;
        let mut stream = response.bytes_stream();

        reporter.downloading(self.release, self.version, 0, total);
        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            writer
                .write_all(&chunk)
                .await
                .map_err(|e| ReleaseError::io(self.dest, e))?;
            reporter.downloading(self.release, self.version, writer.bytes_written(), total);
        }

        writer
            .finish()
            .await
            .map_err(|e| ReleaseError::io(self.dest, e))
    }
}
