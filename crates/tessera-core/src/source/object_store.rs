//! Minimal object-store seam used by [`super::S3ReleaseSource`].

use std::fmt;

use async_trait::async_trait;
use aws_sdk_s3 as s3;
use aws_sdk_s3::config::{Credentials, Region};
use aws_sdk_s3::error::DisplayErrorContext;
use aws_sdk_s3::primitives::ByteStream;
use tessera_schema::ReleaseSourceConfig;
use tokio::io::{AsyncWrite, AsyncWriteExt};

use crate::error::{ReleaseError, Result};

const DEFAULT_REGION: &str = "us-east-1";

#[async_trait]
pub trait ObjectStore: Send + Sync + fmt::Debug {
    async fn exists(&self, key: &str) -> Result<bool>;

    /// Every key starting with `prefix`.
    async fn list(&self, prefix: &str) -> Result<Vec<String>>;

    /// Stream the object into `sink`, returning the number of bytes written.
    async fn get(&self, key: &str, sink: &mut (dyn AsyncWrite + Unpin + Send)) -> Result<u64>;

    async fn put(&self, key: &str, body: Vec<u8>) -> Result<()>;
}

/// Bucket access through the AWS SDK. Works against any S3-compatible
/// endpoint when `endpoint` is configured.
pub struct AwsObjectStore {
    client: s3::Client,
    bucket: String,
}

impl fmt::Debug for AwsObjectStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AwsObjectStore")
            .field("bucket", &self.bucket)
            .finish_non_exhaustive()
    }
}

impl AwsObjectStore {
    pub fn new(config: &ReleaseSourceConfig) -> Result<Self> {
        if config.bucket.is_empty() {
            return Err(ReleaseError::Config(format!(
                "release source {:?} has no bucket",
                config.source_id()
            )));
        }

        let region = if config.region.is_empty() {
            DEFAULT_REGION.to_string()
        } else {
            config.region.clone()
        };
        let credentials = Credentials::new(
            &config.access_key_id,
            &config.secret_access_key,
            None,
            None,
            "kilnfile",
        );

        let mut builder = s3::Config::builder()
            .behavior_version_latest()
            .region(Region::new(region))
            .credentials_provider(credentials);
        if !config.endpoint.is_empty() {
            builder = builder
                .endpoint_url(&config.endpoint)
                .force_path_style(true);
        }

        Ok(Self {
            client: s3::Client::from_conf(builder.build()),
            bucket: config.bucket.clone(),
        })
    }

    fn failure(&self, op: &str, key: &str, err: impl std::error::Error) -> ReleaseError {
        ReleaseError::transport(
            format!("s3 {op} s3://{}/{key}", self.bucket),
            DisplayErrorContext(err).to_string(),
        )
    }
}

#[async_trait]
impl ObjectStore for AwsObjectStore {
    async fn exists(&self, key: &str) -> Result<bool> {
        match self
            .client
            .head_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
        {
            Ok(_) => Ok(true),
            Err(err) if err.as_service_error().is_some_and(|e| e.is_not_found()) => Ok(false),
            Err(err) => Err(self.failure("head", key, err)),
        }
    }

    async fn list(&self, prefix: &str) -> Result<Vec<String>> {
        let mut keys = Vec::new();
        let mut token: Option<String> = None;
        loop {
            let resp = self
                .client
                .list_objects_v2()
                .bucket(&self.bucket)
                .prefix(prefix)
                .set_continuation_token(token.take())
                .send()
                .await
                .map_err(|e| self.failure("list", prefix, e))?;

            keys.extend(
                resp.contents()
                    .iter()
                    .filter_map(|o| o.key().map(str::to_string)),
            );
            match resp.next_continuation_token() {
                Some(next) => token = Some(next.to_string()),
                None => break,
            }
        }
        Ok(keys)
    }

    async fn get(&self, key: &str, sink: &mut (dyn AsyncWrite + Unpin + Send)) -> Result<u64> {
        let resp = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| self.failure("get", key, e))?;

        let mut body = resp.body;
        let mut written = 0u64;
        while let Some(chunk) = body
            .try_next()
            .await
            .map_err(|e| self.failure("get", key, e))?
        {
            sink.write_all(&chunk)
                .await
                .map_err(|e| ReleaseError::transport(format!("writing s3://{}/{key}", self.bucket), e))?;
            written += chunk.len() as u64;
        }
        sink.flush()
            .await
            .map_err(|e| ReleaseError::transport(format!("writing s3://{}/{key}", self.bucket), e))?;
        Ok(written)
    }

    async fn put(&self, key: &str, body: Vec<u8>) -> Result<()> {
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .body(ByteStream::from(body))
            .send()
            .await
            .map_err(|e| self.failure("put", key, e))?;
        Ok(())
    }
}
