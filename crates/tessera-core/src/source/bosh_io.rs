//! The public bosh.io release index.
//!
//! Read-only. Releases are addressed by GitHub repository, so a release name
//! is looked up under the organisations and repository suffixes release
//! authors commonly use.

use std::path::Path;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use tessera_schema::{Local, Lock, Spec, VersionConstraint};
use tracing::{debug, info};

use super::{Match, ReleaseSource, SourceConfiguration};
use crate::Reporter;
use crate::error::{ReleaseError, Result};
use crate::io::download::DownloadRequest;
use crate::io::hashing::verify_sha1_or_remove;
use crate::reporter::NullReporter;

pub const DEFAULT_SERVER: &str = "https://bosh.io";

pub const ORGANIZATIONS: &[&str] = &[
    "cloudfoundry",
    "pivotal-cf",
    "cloudfoundry-incubator",
    "pivotal-cf-experimental",
    "bosh-packages",
    "cppforlife",
    "vito",
    "flavorjones",
    "xoebus",
    "dpb587",
    "jamlo",
    "concourse",
    "cf-platform-eng",
    "starkandwayne",
    "cloudfoundry-community",
    "vmware",
    "DataDog",
    "Dynatrace",
    "SAP",
    "hybris",
    "minio",
    "rakutentech",
    "frodenas",
];

pub const SUFFIXES: &[&str] = &["-release", "-boshrelease", "-bosh-release", ""];

#[derive(Debug, Clone, Deserialize)]
struct ReleaseRecord {
    version: String,
    #[serde(default)]
    sha1: String,
}

#[derive(Debug, Clone)]
pub struct BoshIoReleaseSource {
    configuration: SourceConfiguration,
    server: String,
    organizations: Vec<String>,
    client: Client,
}

impl BoshIoReleaseSource {
    pub fn new(id: impl Into<String>, publishable: bool, client: Client) -> Self {
        Self {
            configuration: SourceConfiguration {
                id: id.into(),
                publishable,
            },
            server: DEFAULT_SERVER.to_string(),
            organizations: ORGANIZATIONS.iter().map(ToString::to_string).collect(),
            client,
        }
    }

    /// Point at a different index server (a mirror, or a test double).
    pub fn with_server(mut self, server: impl Into<String>) -> Self {
        self.server = server.into().trim_end_matches('/').to_string();
        self
    }

    /// Restrict which GitHub organisations are queried.
    pub fn with_organizations<I, S>(mut self, organizations: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.organizations = organizations.into_iter().map(Into::into).collect();
        self
    }

    fn repositories<'a>(&'a self, name: &'a str) -> impl Iterator<Item = String> + 'a {
        self.organizations.iter().flat_map(move |org| {
            SUFFIXES
                .iter()
                .map(move |suffix| format!("github.com/{org}/{name}{suffix}"))
        })
    }

    /// All published versions of `repository`, newest first. Unknown
    /// repositories yield an empty list.
    async fn releases(&self, repository: &str) -> Result<Vec<ReleaseRecord>> {
        let url = format!("{}/api/v1/releases/{repository}", self.server);
        let response = self
            .client
            .get(&url)
            .header(reqwest::header::USER_AGENT, crate::USER_AGENT)
            .send()
            .await?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(Vec::new());
        }
        let response = response.error_for_status()?;
        let body = response.text().await?;
        if body.trim() == "null" {
            return Ok(Vec::new());
        }
        serde_json::from_str(&body)
            .map_err(|e| ReleaseError::transport(format!("decoding response from {url}"), e))
    }

    fn lock_for(&self, spec: &Spec, repository: &str, version: &str, sha1: &str) -> Lock {
        Lock {
            name: spec.name.clone(),
            version: version.to_string(),
            sha1: sha1.to_string(),
            remote_source: self.configuration.id.clone(),
            remote_path: format!("{}/d/{repository}?v={version}", self.server),
            stemcell: None,
        }
    }
}

#[async_trait]
impl ReleaseSource for BoshIoReleaseSource {
    fn configuration(&self) -> SourceConfiguration {
        self.configuration.clone()
    }

    async fn get_matched_release(&self, spec: &Spec) -> Result<Match> {
        for repository in self.repositories(&spec.name) {
            // An unreachable candidate is just another miss here; only the
            // repository that actually hosts the release matters.
            let releases = match self.releases(&repository).await {
                Ok(releases) => releases,
                Err(err) => {
                    debug!(repository = %repository, error = %err, "skipping repository");
                    continue;
                }
            };
            if let Some(record) = releases.iter().find(|r| r.version == spec.version) {
                return Ok(Match::Found(self.lock_for(
                    spec,
                    &repository,
                    &record.version,
                    &record.sha1,
                )));
            }
        }
        Ok(Match::NotFound)
    }

    async fn find_release_version(&self, spec: &Spec, _no_download: bool) -> Result<Match> {
        let constraint: VersionConstraint = spec.version.parse()?;
        for repository in self.repositories(&spec.name) {
            let releases = self
                .releases(&repository)
                .await
                .map_err(|e| e.context(format!("listing {repository} on {}", self.server)))?;
            let best = constraint
                .highest(releases.iter().map(|r| r.version.as_str()))
                .and_then(|v| releases.iter().find(|r| r.version == v));
            if let Some(record) = best {
                // bosh.io publishes trusted checksums, so nothing is downloaded.
                return Ok(Match::Found(self.lock_for(
                    spec,
                    &repository,
                    &record.version,
                    &record.sha1,
                )));
            }
        }
        Ok(Match::NotFound)
    }

    async fn download_release(&self, dir: &Path, lock: &Lock) -> Result<Local> {
        let local_path = dir.join(format!("{}-{}.tgz", lock.name, lock.version));
        info!(
            release = %lock.name,
            version = %lock.version,
            source = %self.configuration.id,
            "downloading release"
        );

        let reporter: &dyn Reporter = &NullReporter;
        let digests = DownloadRequest {
            client: &self.client,
            url: &lock.remote_path,
            dest: &local_path,
            release: &lock.name,
            version: &lock.version,
        }
        .execute(reporter)
        .await
        .map_err(|e| e.context(format!("downloading {lock}")))?;
        verify_sha1_or_remove(&local_path, &lock.name, &lock.sha1, &digests.sha1).await?;

        Ok(Local {
            lock: lock.with_sha1(digests.sha1),
            local_path,
        })
    }
}
