//! BOSH director client over its REST API.
//!
//! Long-running operations answer with a redirect to a task; the client
//! follows the task until it settles. Authentication is resolved from the
//! director's `/info` endpoint: UAA client credentials when the director
//! advertises UAA, HTTP basic otherwise.

use std::fmt;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use futures::StreamExt;
use reqwest::{Body, Client, Method, RequestBuilder, StatusCode, header};
use serde::Deserialize;
use serde_json::json;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::Mutex;
use tokio_util::io::ReaderStream;
use tracing::{debug, info};

use super::{Deployment, Director, DirectorPackage, ExportedRelease};
use crate::error::{ReleaseError, Result};

/// Connection settings, built once by the caller.
#[derive(Clone)]
pub struct DirectorConfig {
    pub url: String,
    pub client: String,
    pub client_secret: String,
    /// PEM bundle trusted in addition to the system roots.
    pub ca_cert: Option<String>,
    pub poll_interval: Duration,
    pub request_timeout: Option<Duration>,
}

impl fmt::Debug for DirectorConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DirectorConfig")
            .field("url", &self.url)
            .field("client", &self.client)
            .field("ca_cert", &self.ca_cert.is_some())
            .field("poll_interval", &self.poll_interval)
            .finish_non_exhaustive()
    }
}

impl DirectorConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            client: String::new(),
            client_secret: String::new(),
            ca_cert: None,
            poll_interval: Duration::from_secs(1),
            request_timeout: None,
        }
    }
}

#[derive(Debug, Clone)]
enum Auth {
    Anonymous,
    Basic,
    Bearer { token: String, expires: Instant },
}

#[derive(Debug, Deserialize)]
struct Info {
    #[serde(default)]
    user_authentication: Option<UserAuthentication>,
}

#[derive(Debug, Deserialize)]
struct UserAuthentication {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    options: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct Task {
    id: u64,
    state: String,
    #[serde(default)]
    description: String,
    #[serde(default)]
    result: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ReleaseDetails {
    #[serde(default)]
    packages: Vec<DirectorPackage>,
}

#[derive(Debug, Deserialize)]
struct ReleaseSummary {
    name: String,
    #[serde(default)]
    release_versions: Vec<ReleaseVersion>,
}

#[derive(Debug, Deserialize)]
struct ReleaseVersion {
    version: String,
}

#[derive(Debug, Deserialize)]
struct DeploymentDetails {
    #[serde(default)]
    manifest: String,
}

struct Inner {
    config: DirectorConfig,
    http: Client,
    auth: Mutex<Option<Auth>>,
}

impl fmt::Debug for Inner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Inner")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Clone)]
pub struct HttpDirector {
    inner: Arc<Inner>,
}

impl HttpDirector {
    pub fn new(config: DirectorConfig) -> Result<Self> {
        let mut builder = Client::builder()
            .user_agent(crate::USER_AGENT)
            .redirect(reqwest::redirect::Policy::none());
        if let Some(pem) = &config.ca_cert {
            for cert in reqwest::Certificate::from_pem_bundle(pem.as_bytes())? {
                builder = builder.add_root_certificate(cert);
            }
        }
        if let Some(timeout) = config.request_timeout {
            builder = builder.timeout(timeout);
        }
        Ok(Self {
            inner: Arc::new(Inner {
                config,
                http: builder.build()?,
                auth: Mutex::new(None),
            }),
        })
    }
}

impl Inner {
    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.config.url.trim_end_matches('/'))
    }

    async fn resolve_auth(&self) -> Result<Auth> {
        let mut cached = self.auth.lock().await;
        if let Some(auth) = cached.as_ref() {
            let fresh = match auth {
                Auth::Bearer { expires, .. } => Instant::now() < *expires,
                Auth::Anonymous | Auth::Basic => true,
            };
            if fresh {
                return Ok(auth.clone());
            }
        }

        let auth = if self.config.client.is_empty() {
            Auth::Anonymous
        } else {
            let info: Info = self
                .http
                .get(self.url("/info"))
                .send()
                .await?
                .error_for_status()?
                .json()
                .await?;
            match info.user_authentication {
                Some(ua) if ua.kind == "uaa" => {
                    let uaa = ua.options.get("url").and_then(|u| u.as_str()).ok_or_else(|| {
                        ReleaseError::Config("director advertises UAA without a URL".to_string())
                    })?;
                    self.fetch_token(uaa).await?
                }
                _ => Auth::Basic,
            }
        };
        *cached = Some(auth.clone());
        Ok(auth)
    }

    async fn fetch_token(&self, uaa: &str) -> Result<Auth> {
        let token: TokenResponse = self
            .http
            .post(format!("{}/oauth/token", uaa.trim_end_matches('/')))
            .basic_auth(&self.config.client, Some(&self.config.client_secret))
            .form(&[("grant_type", "client_credentials")])
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        // Refresh a little early so a token never expires mid-request.
        let lifetime = Duration::from_secs(token.expires_in.unwrap_or(300).saturating_sub(30));
        Ok(Auth::Bearer {
            token: token.access_token,
            expires: Instant::now() + lifetime,
        })
    }

    async fn request(&self, method: Method, path: &str) -> Result<RequestBuilder> {
        let builder = self.http.request(method, self.url(path));
        Ok(match self.resolve_auth().await? {
            Auth::Anonymous => builder,
            Auth::Basic => {
                builder.basic_auth(&self.config.client, Some(&self.config.client_secret))
            }
            Auth::Bearer { token, .. } => builder.bearer_auth(token),
        })
    }

    /// Send a request that starts a director task and wait for it to finish.
    async fn run_task(&self, request: RequestBuilder, what: &str) -> Result<Task> {
        let response = request.send().await?;
        let status = response.status();
        let id = if status.is_redirection() {
            response
                .headers()
                .get(header::LOCATION)
                .and_then(|v| v.to_str().ok())
                .and_then(|loc| loc.trim_end_matches('/').rsplit('/').next())
                .and_then(|id| id.parse::<u64>().ok())
        } else if status.is_success() {
            response.json::<Task>().await.ok().map(|t| t.id)
        } else {
            let body = response.text().await.unwrap_or_default();
            return Err(ReleaseError::transport(
                format!("{what} was rejected by the director ({status})"),
                body,
            ));
        };
        let id = id.ok_or_else(|| {
            ReleaseError::transport(what, "director response did not reference a task")
        })?;

        debug!(task = id, "{what} started");
        self.wait_for_task(id).await
    }

    async fn wait_for_task(&self, id: u64) -> Result<Task> {
        loop {
            let task: Task = self
                .request(Method::GET, &format!("/tasks/{id}"))
                .await?
                .send()
                .await?
                .error_for_status()?
                .json()
                .await?;
            match task.state.as_str() {
                "done" => return Ok(task),
                "error" | "cancelled" | "timeout" => {
                    return Err(ReleaseError::DirectorTask {
                        task: id,
                        description: task.result.unwrap_or(task.description),
                        state: task.state,
                    });
                }
                _ => tokio::time::sleep(self.config.poll_interval).await,
            }
        }
    }

    async fn task_result(&self, id: u64) -> Result<String> {
        Ok(self
            .request(Method::GET, &format!("/tasks/{id}/output"))
            .await?
            .query(&[("type", "result")])
            .send()
            .await?
            .error_for_status()?
            .text()
            .await?)
    }

    async fn upload_tarball(&self, path: &str, tarball: &Path) -> Result<()> {
        let file = tokio::fs::File::open(tarball)
            .await
            .map_err(|e| ReleaseError::io(tarball, e))?;
        let len = file
            .metadata()
            .await
            .map_err(|e| ReleaseError::io(tarball, e))?
            .len();
        let request = self
            .request(Method::POST, path)
            .await?
            .header(header::CONTENT_TYPE, "application/x-compressed")
            .header(header::CONTENT_LENGTH, len)
            .body(Body::wrap_stream(ReaderStream::new(file)));
        info!(tarball = %tarball.display(), "uploading to director");
        self.run_task(request, &format!("uploading {}", tarball.display()))
            .await?;
        Ok(())
    }
}

#[async_trait]
impl Director for HttpDirector {
    async fn upload_stemcell(&self, tarball: &Path) -> Result<()> {
        self.inner.upload_tarball("/stemcells", tarball).await
    }

    async fn upload_release(&self, tarball: &Path) -> Result<()> {
        self.inner.upload_tarball("/releases", tarball).await
    }

    async fn find_deployment(&self, name: &str) -> Result<Arc<dyn Deployment>> {
        Ok(Arc::new(HttpDeployment {
            inner: Arc::clone(&self.inner),
            name: name.to_string(),
        }))
    }

    async fn download_resource(
        &self,
        blobstore_id: &str,
        sink: &mut (dyn AsyncWrite + Unpin + Send),
    ) -> Result<u64> {
        let response = self
            .inner
            .request(Method::GET, &format!("/resources/{blobstore_id}"))
            .await?
            .send()
            .await?
            .error_for_status()?;

        let mut stream = response.bytes_stream();
        let mut written = 0u64;
        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            sink.write_all(&chunk).await.map_err(|e| {
                ReleaseError::transport(format!("writing resource {blobstore_id}"), e)
            })?;
            written += chunk.len() as u64;
        }
        sink.flush()
            .await
            .map_err(|e| ReleaseError::transport(format!("writing resource {blobstore_id}"), e))?;
        Ok(written)
    }

    async fn find_release(&self, release_slug: &str) -> Result<Option<Vec<DirectorPackage>>> {
        let (name, version) = release_slug.split_once('/').ok_or_else(|| {
            ReleaseError::Config(format!("release slug {release_slug:?} is not name/version"))
        })?;
        let response = self
            .inner
            .request(Method::GET, &format!("/releases/{name}"))
            .await?
            .query(&[("version", version)])
            .send()
            .await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let details: ReleaseDetails = response.error_for_status()?.json().await?;
        Ok(Some(details.packages))
    }

    async fn release_versions(&self, name: &str) -> Result<Vec<String>> {
        let releases: Vec<ReleaseSummary> = self
            .inner
            .request(Method::GET, "/releases")
            .await?
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        Ok(releases
            .into_iter()
            .filter(|r| r.name == name)
            .flat_map(|r| r.release_versions.into_iter().map(|v| v.version))
            .collect())
    }

    async fn cleanup(&self, remove_all: bool) -> Result<()> {
        let request = self
            .inner
            .request(Method::POST, "/cleanup")
            .await?
            .json(&json!({ "config": { "remove_all": remove_all } }));
        self.inner.run_task(request, "cleanup").await?;
        Ok(())
    }
}

#[derive(Debug)]
struct HttpDeployment {
    inner: Arc<Inner>,
    name: String,
}

#[async_trait]
impl Deployment for HttpDeployment {
    fn name(&self) -> &str {
        &self.name
    }

    async fn manifest(&self) -> Result<String> {
        let details: DeploymentDetails = self
            .inner
            .request(Method::GET, &format!("/deployments/{}", self.name))
            .await?
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        Ok(details.manifest)
    }

    async fn update(&self, manifest: &str) -> Result<()> {
        let request = self
            .inner
            .request(Method::POST, "/deployments")
            .await?
            .header(header::CONTENT_TYPE, "text/yaml")
            .body(manifest.to_string());
        self.inner
            .run_task(request, &format!("deploying {}", self.name))
            .await?;
        Ok(())
    }

    async fn export_release(&self, release_slug: &str, os_slug: &str) -> Result<ExportedRelease> {
        let malformed = || {
            ReleaseError::Config(format!(
                "cannot export {release_slug:?} for {os_slug:?}: expected name/version slugs"
            ))
        };
        let (release_name, release_version) = release_slug.split_once('/').ok_or_else(malformed)?;
        let (stemcell_os, stemcell_version) = os_slug.split_once('/').ok_or_else(malformed)?;

        let request = self
            .inner
            .request(Method::POST, "/releases/export")
            .await?
            .json(&json!({
                "deployment_name": self.name,
                "release_name": release_name,
                "release_version": release_version,
                "stemcell_os": stemcell_os,
                "stemcell_version": stemcell_version,
            }));
        let task = self
            .inner
            .run_task(request, &format!("exporting {release_slug} for {os_slug}"))
            .await?;
        let output = self.inner.task_result(task.id).await?;
        serde_json::from_str(output.trim()).map_err(|e| {
            ReleaseError::transport(format!("decoding export result of task {}", task.id), e)
        })
    }

    async fn delete(&self, force: bool) -> Result<()> {
        let request = self
            .inner
            .request(Method::DELETE, &format!("/deployments/{}", self.name))
            .await?
            .query(&[("force", force)]);
        self.inner
            .run_task(request, &format!("deleting {}", self.name))
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::{Matcher, Server};

    fn director(server: &Server) -> HttpDirector {
        let mut config = DirectorConfig::new(server.url());
        config.poll_interval = Duration::from_millis(1);
        HttpDirector::new(config).unwrap()
    }

    #[tokio::test]
    async fn test_export_follows_task_and_reads_result() {
        let mut server = Server::new_async().await;
        let export = server
            .mock("POST", "/releases/export")
            .match_body(Matcher::PartialJson(json!({
                "deployment_name": "compile-0",
                "release_name": "bpm",
                "stemcell_version": "9.0.0",
            })))
            .with_status(302)
            .with_header("location", "/tasks/7")
            .create_async()
            .await;
        let _task = server
            .mock("GET", "/tasks/7")
            .with_status(200)
            .with_body(r#"{"id": 7, "state": "done", "description": "export release"}"#)
            .create_async()
            .await;
        let _output = server
            .mock("GET", "/tasks/7/output")
            .match_query(Matcher::UrlEncoded("type".into(), "result".into()))
            .with_status(200)
            .with_body(r#"{"blobstore_id": "blob-1", "sha1": "sha256:abc"}"#)
            .create_async()
            .await;

        let deployment = director(&server).find_deployment("compile-0").await.unwrap();
        let exported = deployment
            .export_release("bpm/1.1.21", "alpine/9.0.0")
            .await
            .unwrap();
        assert_eq!(exported.blobstore_id, "blob-1");
        assert_eq!(exported.sha1, "sha256:abc");
        export.assert_async().await;
    }

    #[tokio::test]
    async fn test_failed_task_is_reported() {
        let mut server = Server::new_async().await;
        let _delete = server
            .mock("DELETE", "/deployments/compile-0")
            .match_query(Matcher::UrlEncoded("force".into(), "true".into()))
            .with_status(302)
            .with_header("location", "/tasks/9")
            .create_async()
            .await;
        let _task = server
            .mock("GET", "/tasks/9")
            .with_status(200)
            .with_body(r#"{"id": 9, "state": "error", "description": "delete deployment", "result": "locked"}"#)
            .create_async()
            .await;

        let deployment = director(&server).find_deployment("compile-0").await.unwrap();
        let err = deployment.delete(true).await.unwrap_err();
        assert!(matches!(
            err,
            ReleaseError::DirectorTask { task: 9, ref description, .. } if description == "locked"
        ));
    }

    #[tokio::test]
    async fn test_find_release() {
        let mut server = Server::new_async().await;
        let _found = server
            .mock("GET", "/releases/bpm")
            .match_query(Matcher::UrlEncoded("version".into(), "1.1.21".into()))
            .with_status(200)
            .with_body(r#"{"packages": [{"name": "bpm", "compiled_packages": [{"stemcell": "alpine/9.0.0"}]}]}"#)
            .create_async()
            .await;
        let _missing = server
            .mock("GET", "/releases/nope")
            .match_query(Matcher::Any)
            .with_status(404)
            .create_async()
            .await;

        let director = director(&server);
        let packages = director.find_release("bpm/1.1.21").await.unwrap().unwrap();
        assert_eq!(packages[0].compiled_packages[0].stemcell, "alpine/9.0.0");
        assert_eq!(director.find_release("nope/1.0.0").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_uaa_token_is_used() {
        let mut server = Server::new_async().await;
        let uaa = format!("{}/uaa", server.url());
        let _info = server
            .mock("GET", "/info")
            .with_status(200)
            .with_body(
                json!({"user_authentication": {"type": "uaa", "options": {"url": uaa}}})
                    .to_string(),
            )
            .create_async()
            .await;
        let token = server
            .mock("POST", "/uaa/oauth/token")
            .with_status(200)
            .with_body(r#"{"access_token": "secret-token", "expires_in": 3600}"#)
            .expect(1)
            .create_async()
            .await;
        let manifest = server
            .mock("GET", "/deployments/cf")
            .match_header("authorization", "Bearer secret-token")
            .with_status(200)
            .with_body(r#"{"manifest": "name: cf\n"}"#)
            .expect(2)
            .create_async()
            .await;

        let mut config = DirectorConfig::new(server.url());
        config.client = "admin".into();
        config.client_secret = "hunter2".into();
        let director = HttpDirector::new(config).unwrap();
        let deployment = director.find_deployment("cf").await.unwrap();

        assert_eq!(deployment.manifest().await.unwrap(), "name: cf\n");
        assert_eq!(deployment.manifest().await.unwrap(), "name: cf\n");
        token.assert_async().await;
        manifest.assert_async().await;
    }
}
