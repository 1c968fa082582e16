//! Release tarballs attached as assets to GitHub releases.
//!
//! A source covers one organisation. Only requirements that name a
//! `github_repository` inside that organisation are looked up; everything
//! else is a clean miss so the next source gets a turn.

use std::path::Path;

use async_trait::async_trait;
use reqwest::header::{ACCEPT, USER_AGENT};
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::Deserialize;
use tessera_schema::{Local, Lock, ReleaseSourceConfig, Spec, VersionConstraint, parse_lenient};
use tracing::{debug, info, warn};

use super::{Match, ReleaseSource, SourceConfiguration};
use crate::error::{ReleaseError, Result};
use crate::io::download::DownloadRequest;
use crate::io::hashing::verify_sha1_or_remove;
use crate::reporter::NullReporter;

pub const DEFAULT_API: &str = "https://api.github.com";

const PER_PAGE: usize = 100;

/// Consecutive listing pages without a better match before the search stops.
const FRUITLESS_PAGES: usize = 2;

#[derive(Debug, Clone, Deserialize)]
struct GithubRelease {
    tag_name: String,
    #[serde(default)]
    assets: Vec<GithubAsset>,
}

#[derive(Debug, Clone, Deserialize)]
struct GithubAsset {
    id: u64,
    name: String,
    browser_download_url: String,
}

impl GithubRelease {
    fn version(&self) -> &str {
        self.tag_name.trim_start_matches('v')
    }

    /// The tarball for `name`, accepting the `name-vX.Y.Z.tgz` spelling too.
    fn asset_for(&self, name: &str) -> Option<&GithubAsset> {
        let version = self.version();
        let expected = format!("{name}-{version}.tgz");
        let prefixed = format!("{name}-v{version}.tgz");
        self.assets
            .iter()
            .find(|a| a.name == expected || a.name == prefixed)
    }
}

#[derive(Debug, Clone)]
pub struct GithubReleaseSource {
    configuration: SourceConfiguration,
    org: String,
    token: String,
    api: String,
    client: Client,
}

impl GithubReleaseSource {
    pub fn new(config: &ReleaseSourceConfig, client: Client) -> Result<Self> {
        let mut missing = Vec::new();
        if config.github_token.is_empty() {
            missing.push("github_token");
        }
        if config.org.is_empty() {
            missing.push("org");
        }
        if !missing.is_empty() {
            return Err(ReleaseError::Config(format!(
                "github release source {:?} is missing {}",
                config.source_id(),
                missing.join(" and ")
            )));
        }
        Ok(Self {
            configuration: SourceConfiguration {
                id: config.source_id(),
                publishable: config.publishable,
            },
            org: config.org.clone(),
            token: config.github_token.clone(),
            api: DEFAULT_API.to_string(),
            client,
        })
    }

    /// Point at a different API root (GitHub Enterprise, or a test double).
    pub fn with_api(mut self, api: impl Into<String>) -> Self {
        self.api = api.into().trim_end_matches('/').to_string();
        self
    }

    fn get(&self, url: &str) -> RequestBuilder {
        self.client
            .get(url)
            .bearer_auth(&self.token)
            .header(USER_AGENT, crate::USER_AGENT)
    }

    /// Owner and repository of `spec`, when it lives in this organisation.
    fn repository_of(&self, spec: &Spec) -> Option<(String, String)> {
        let (owner, repo) = owner_and_repo(&spec.github_repository)?;
        owner.eq_ignore_ascii_case(&self.org).then_some((owner, repo))
    }

    async fn release_by_tag(
        &self,
        owner: &str,
        repo: &str,
        tag: &str,
    ) -> Result<Option<GithubRelease>> {
        let url = format!("{}/repos/{owner}/{repo}/releases/tags/{tag}", self.api);
        let response = self
            .get(&url)
            .header(ACCEPT, "application/vnd.github+json")
            .send()
            .await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        Ok(Some(response.error_for_status()?.json().await?))
    }

    /// Releases are tagged either `vX.Y.Z` or `X.Y.Z`.
    async fn tagged_release(
        &self,
        owner: &str,
        repo: &str,
        version: &str,
    ) -> Result<Option<GithubRelease>> {
        let version = version.trim_start_matches('v');
        if let Some(release) = self.release_by_tag(owner, repo, &format!("v{version}")).await? {
            return Ok(Some(release));
        }
        self.release_by_tag(owner, repo, version).await
    }

    /// Walk the release listing newest first, keeping the highest release
    /// the constraint accepts.
    async fn highest_release(
        &self,
        owner: &str,
        repo: &str,
        constraint: &VersionConstraint,
    ) -> Result<Option<GithubRelease>> {
        let mut best: Option<(semver::Version, GithubRelease)> = None;
        let mut fruitless = 0;
        let mut page = 1;
        while fruitless < FRUITLESS_PAGES {
            let url = format!(
                "{}/repos/{owner}/{repo}/releases?per_page={PER_PAGE}&page={page}",
                self.api
            );
            let releases: Vec<GithubRelease> = self
                .get(&url)
                .header(ACCEPT, "application/vnd.github+json")
                .send()
                .await?
                .error_for_status()?
                .json()
                .await?;
            if releases.is_empty() {
                break;
            }

            let mut improved = false;
            for release in releases {
                let Ok(version) = parse_lenient(&release.tag_name) else {
                    continue;
                };
                if !constraint.matches(&version) {
                    continue;
                }
                if best.as_ref().is_some_and(|(b, _)| version <= *b) {
                    continue;
                }
                best = Some((version, release));
                improved = true;
            }
            fruitless = if improved { 0 } else { fruitless + 1 };
            page += 1;
        }
        Ok(best.map(|(_, release)| release))
    }

    fn lock_for(&self, spec: &Spec, release: &GithubRelease, repo: &str) -> Option<Lock> {
        let Some(asset) = release.asset_for(&spec.name) else {
            warn!(
                release = %spec.name,
                tag = %release.tag_name,
                repository = %repo,
                "github release has no matching tarball asset"
            );
            return None;
        };
        Some(Lock {
            name: spec.name.clone(),
            version: release.version().to_string(),
            sha1: String::new(),
            remote_source: self.configuration.id.clone(),
            remote_path: asset.browser_download_url.clone(),
            stemcell: None,
        })
    }
}

/// `owner` and `repo` from `https://github.com/owner/repo`,
/// `github.com/owner/repo`, `git@github.com:owner/repo.git` or any URL
/// whose path starts with them.
pub(crate) fn owner_and_repo(uri: &str) -> Option<(String, String)> {
    let path = if let Some(rest) = uri.strip_prefix("git@") {
        rest.split_once(':')?.1
    } else if let Some((_, rest)) = uri.split_once("://") {
        rest.split_once('/')?.1
    } else {
        uri.split_once('/')?.1
    };
    let mut parts = path.split('/').filter(|p| !p.is_empty());
    let owner = parts.next()?;
    let repo = parts.next()?.trim_end_matches(".git");
    (!repo.is_empty()).then(|| (owner.to_string(), repo.to_string()))
}

#[async_trait]
impl ReleaseSource for GithubReleaseSource {
    fn configuration(&self) -> SourceConfiguration {
        self.configuration.clone()
    }

    async fn get_matched_release(&self, spec: &Spec) -> Result<Match> {
        let Some((owner, repo)) = self.repository_of(spec) else {
            return Ok(Match::NotFound);
        };
        let release = self
            .tagged_release(&owner, &repo, &spec.version)
            .await
            .map_err(|e| e.context(format!("looking up {spec} in {owner}/{repo}")))?;
        Ok(release
            .and_then(|r| self.lock_for(spec, &r, &repo))
            .map_or(Match::NotFound, Match::Found))
    }

    async fn find_release_version(&self, spec: &Spec, no_download: bool) -> Result<Match> {
        let Some((owner, repo)) = self.repository_of(spec) else {
            return Ok(Match::NotFound);
        };
        let constraint: VersionConstraint = spec.version.parse()?;
        let release = self
            .highest_release(&owner, &repo, &constraint)
            .await
            .map_err(|e| e.context(format!("listing releases of {owner}/{repo}")))?;
        let Some(lock) = release.and_then(|r| self.lock_for(spec, &r, &repo)) else {
            return Ok(Match::NotFound);
        };
        if no_download {
            return Ok(Match::Found(lock));
        }

        // GitHub publishes no checksums for assets.
        let scratch = tempfile::tempdir().map_err(|e| ReleaseError::io(std::env::temp_dir(), e))?;
        let local = self.download_release(scratch.path(), &lock).await?;
        Ok(Match::Found(local.lock))
    }

    async fn download_release(&self, dir: &Path, lock: &Lock) -> Result<Local> {
        let (owner, repo) = owner_and_repo(&lock.remote_path).ok_or_else(|| {
            ReleaseError::InconsistentLockfile(format!(
                "{} has remote_path {:?}, which is not a GitHub release asset URL",
                lock.name, lock.remote_path
            ))
        })?;
        let release = self
            .tagged_release(&owner, &repo, &lock.version)
            .await?
            .ok_or_else(|| ReleaseError::NotFound {
                release: lock.to_string(),
            })?;
        let asset = release.asset_for(&lock.name).ok_or_else(|| ReleaseError::NotFound {
            release: format!("{} asset of {owner}/{repo} {}", lock.name, release.tag_name),
        })?;

        let local_path = dir.join(format!("{}-{}.tgz", lock.name, lock.version));
        info!(
            release = %lock.name,
            version = %lock.version,
            source = %self.configuration.id,
            "downloading release"
        );
        let url = format!("{}/repos/{owner}/{repo}/releases/assets/{}", self.api, asset.id);
        debug!(url = %url, "fetching release asset");
        let digests = DownloadRequest {
            client: &self.client,
            url: &url,
            dest: &local_path,
            release: &lock.name,
            version: &lock.version,
        }
        .execute_request(
            self.get(&url).header(ACCEPT, "application/octet-stream"),
            &NullReporter,
        )
        .await
        .map_err(|e| e.context(format!("downloading {lock}")))?;
        verify_sha1_or_remove(&local_path, &lock.name, &lock.sha1, &digests.sha1).await?;

        Ok(Local {
            lock: lock.with_sha1(digests.sha1),
            local_path,
        })
    }
}
