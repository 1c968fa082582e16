//! Artifactory-backed release source.
//!
//! Keys are laid out by the path template exactly like bucket keys. Metadata
//! and folder listings come from the storage API, bytes from the repository
//! itself.

use std::path::Path;

use async_trait::async_trait;
use reqwest::header::USER_AGENT;
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::Deserialize;
use tessera_schema::{Local, Lock, ReleaseSourceConfig, Spec, VersionConstraint};
use tokio::io::{AsyncRead, AsyncReadExt};
use tracing::{debug, info};

use super::{
    Match, PathTemplate, ReleaseSource, ReleaseUploader, SourceConfiguration, file_name_of,
};
use crate::error::{ReleaseError, Result};
use crate::io::download::DownloadRequest;
use crate::io::hashing::{digest_bytes, verify_sha1_or_remove};
use crate::reporter::NullReporter;

#[derive(Debug, Default, Deserialize)]
struct FileInfo {
    #[serde(default)]
    checksums: Checksums,
}

#[derive(Debug, Default, Deserialize)]
struct Checksums {
    #[serde(default)]
    sha1: String,
}

#[derive(Debug, Deserialize)]
struct FolderInfo {
    #[serde(default)]
    children: Vec<FolderChild>,
}

#[derive(Debug, Deserialize)]
struct FolderChild {
    uri: String,
    #[serde(default)]
    folder: bool,
}

#[derive(Debug, Clone)]
pub struct ArtifactoryReleaseSource {
    configuration: SourceConfiguration,
    host: String,
    repo: String,
    username: String,
    password: String,
    template: PathTemplate,
    client: Client,
}

impl ArtifactoryReleaseSource {
    pub fn new(config: &ReleaseSourceConfig, client: Client) -> Result<Self> {
        let id = config.source_id();
        if config.artifactory_host.is_empty() || config.repo.is_empty() {
            return Err(ReleaseError::Config(format!(
                "artifactory release source {id:?} needs artifactory_host and repo"
            )));
        }
        let template = config
            .path_template
            .parse()
            .map_err(|e: ReleaseError| e.context(format!("release source {id:?}")))?;
        Ok(Self {
            configuration: SourceConfiguration {
                id,
                publishable: config.publishable,
            },
            host: config.artifactory_host.trim_end_matches('/').to_string(),
            repo: config.repo.clone(),
            username: config.username.clone(),
            password: config.password.clone(),
            template,
            client,
        })
    }

    fn storage_url(&self, path: &str) -> String {
        format!("{}/api/storage/{}/{}", self.host, self.repo, path.trim_start_matches('/'))
    }

    fn artifact_url(&self, path: &str) -> String {
        format!("{}/artifactory/{}/{}", self.host, self.repo, path.trim_start_matches('/'))
    }

    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        let request = request.header(USER_AGENT, crate::USER_AGENT);
        if self.username.is_empty() {
            request
        } else {
            request.basic_auth(&self.username, Some(&self.password))
        }
    }

    /// Storage API document at `path`; `None` when Artifactory has nothing there.
    async fn storage<T: serde::de::DeserializeOwned>(&self, path: &str) -> Result<Option<T>> {
        let url = self.storage_url(path);
        debug!(source = %self.configuration.id, url = %url, "querying artifactory");
        let response = self.authorized(self.client.get(&url)).send().await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let body = response.error_for_status()?.text().await?;
        serde_json::from_str(&body)
            .map(Some)
            .map_err(|e| ReleaseError::transport(format!("decoding response from {url}"), e))
    }

    fn lock_for(&self, spec: &Spec, remote_path: String, sha1: String) -> Lock {
        Lock {
            sha1,
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
impl ReleaseSource for ArtifactoryReleaseSource {
    fn configuration(&self) -> SourceConfiguration {
        self.configuration.clone()
    }

    async fn get_matched_release(&self, spec: &Spec) -> Result<Match> {
        let key = self.template.render(spec);
        let info: Option<FileInfo> = self.storage(&key).await.map_err(|e| self.failure(spec, e))?;
        Ok(info.map_or(Match::NotFound, |info| {
            Match::Found(self.lock_for(spec, key, info.checksums.sha1))
        }))
    }

    async fn find_release_version(&self, spec: &Spec, _no_download: bool) -> Result<Match> {
        let constraint: VersionConstraint = spec.version.parse()?;
        let rendered = self.template.render(spec);
        let folder = rendered.rsplit_once('/').map_or("", |(dir, _)| dir);
        let listing: Option<FolderInfo> =
            self.storage(folder).await.map_err(|e| self.failure(spec, e))?;
        let Some(listing) = listing else {
            return Ok(Match::NotFound);
        };

        let candidates: Vec<(String, String)> = listing
            .children
            .iter()
            .filter(|child| !child.folder)
            .filter_map(|child| {
                let name = child.uri.trim_start_matches('/');
                let key = if folder.is_empty() {
                    name.to_string()
                } else {
                    format!("{folder}/{name}")
                };
                let version = self.template.extract_version(spec, &key)?;
                Some((version, key))
            })
            .collect();
        let Some(version) = constraint.highest(candidates.iter().map(|(v, _)| v.as_str())) else {
            return Ok(Match::NotFound);
        };
        let Some((_, key)) = candidates.iter().find(|(v, _)| v == version) else {
            return Ok(Match::NotFound);
        };

        // Artifactory keeps checksums, so the SHA-1 never needs a download.
        let info: FileInfo = self
            .storage(key)
            .await
            .map_err(|e| self.failure(spec, e))?
            .unwrap_or_default();
        let resolved = Spec {
            version: version.to_string(),
            ..spec.clone()
        };
        Ok(Match::Found(self.lock_for(&resolved, key.clone(), info.checksums.sha1)))
    }

    async fn download_release(&self, dir: &Path, lock: &Lock) -> Result<Local> {
        let local_path = dir.join(file_name_of(&lock.remote_path));
        info!(
            release = %lock.name,
            version = %lock.version,
            source = %self.configuration.id,
            "downloading release"
        );

        let url = self.artifact_url(&lock.remote_path);
        let digests = DownloadRequest {
            client: &self.client,
            url: &url,
            dest: &local_path,
            release: &lock.name,
            version: &lock.version,
        }
        .execute_request(self.authorized(self.client.get(&url)), &NullReporter)
        .await
        .map_err(|e| e.context(format!("downloading {lock} from artifactory")))?;
        verify_sha1_or_remove(&local_path, &lock.name, &lock.sha1, &digests.sha1).await?;

        Ok(Local {
            lock: lock.with_sha1(digests.sha1),
            local_path,
        })
    }
}

#[async_trait]
impl ReleaseUploader for ArtifactoryReleaseSource {
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
        let response = self
            .authorized(self.client.put(self.artifact_url(&key)))
            .header("X-Checksum-Sha1", &sha1)
            .body(body)
            .send()
            .await
            .map_err(|e| ReleaseError::from(e).context(format!("uploading {spec}")))?;
        let status = response.status();
        if status != StatusCode::CREATED {
            let detail = response.text().await.unwrap_or_default();
            return Err(ReleaseError::transport(
                format!("uploading {spec} to {} ({status})", self.configuration.id),
                detail,
            ));
        }

        Ok(self.lock_for(spec, key, sha1))
    }
}
