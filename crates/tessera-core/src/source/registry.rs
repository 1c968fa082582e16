//! Builds release sources from a Kilnfile and keeps track of which of them
//! accept uploads.

use std::sync::Arc;

use reqwest::Client;
use tessera_schema::{Kilnfile, ReleaseSourceConfig, SourceKind};

use super::{
    ArtifactoryReleaseSource, AwsObjectStore, BoshIoReleaseSource, GithubReleaseSource,
    MultiReleaseSource, ReleaseSource, ReleaseUploader, S3ReleaseSource,
};
use crate::error::{ReleaseError, Result};

/// A configured source, with its upload capability when it has one.
#[derive(Debug, Clone)]
pub struct SourceEntry {
    source: Arc<dyn ReleaseSource>,
    uploader: Option<Arc<dyn ReleaseUploader>>,
}

impl SourceEntry {
    pub fn read_only(source: Arc<dyn ReleaseSource>) -> Self {
        Self {
            source,
            uploader: None,
        }
    }

    pub fn uploading<S>(source: Arc<S>) -> Self
    where
        S: ReleaseSource + ReleaseUploader + 'static,
    {
        Self {
            source: source.clone(),
            uploader: Some(source),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct SourceRegistry {
    sources: MultiReleaseSource,
    uploaders: Vec<(String, Arc<dyn ReleaseUploader>)>,
}

impl SourceRegistry {
    pub fn new(entries: Vec<SourceEntry>) -> Result<Self> {
        let uploaders = entries
            .iter()
            .filter_map(|e| e.uploader.clone().map(|u| (e.source.id(), u)))
            .collect();
        let sources = MultiReleaseSource::new(entries.into_iter().map(|e| e.source).collect())?;
        Ok(Self { sources, uploaders })
    }

    /// Instantiate every `release_sources` entry in manifest order.
    pub fn from_kilnfile(kilnfile: &Kilnfile, client: &Client) -> Result<Self> {
        let entries = kilnfile
            .release_sources
            .iter()
            .map(|config| build_entry(config, client))
            .collect::<Result<Vec<_>>>()?;
        Self::new(entries)
    }

    /// All sources in manifest order.
    pub fn sources(&self) -> &MultiReleaseSource {
        &self.sources
    }

    pub fn aggregate(&self, publishable_only: bool) -> MultiReleaseSource {
        self.sources.filter(publishable_only)
    }

    pub fn find_by_id(&self, id: &str) -> Result<Arc<dyn ReleaseSource>> {
        self.sources.find_by_id(id)
    }

    pub fn find_uploader(&self, id: &str) -> Result<Arc<dyn ReleaseUploader>> {
        // Unknown ids get the same error as any other lookup.
        self.sources.find_by_id(id)?;
        self.uploaders
            .iter()
            .find(|(uploader_id, _)| uploader_id == id)
            .map(|(_, uploader)| Arc::clone(uploader))
            .ok_or_else(|| {
                ReleaseError::Config(format!("release source {id:?} does not accept uploads"))
            })
    }
}

fn build_entry(config: &ReleaseSourceConfig, client: &Client) -> Result<SourceEntry> {
    match config.kind {
        SourceKind::S3 => {
            let store = Arc::new(AwsObjectStore::new(config)?);
            Ok(SourceEntry::uploading(Arc::new(S3ReleaseSource::new(
                config, store,
            )?)))
        }
        SourceKind::BoshIo => {
            let mut source =
                BoshIoReleaseSource::new(config.source_id(), config.publishable, client.clone());
            if !config.endpoint.is_empty() {
                source = source.with_server(&config.endpoint);
            }
            Ok(SourceEntry::read_only(Arc::new(source)))
        }
        SourceKind::Github => Ok(SourceEntry::read_only(Arc::new(GithubReleaseSource::new(
            config,
            client.clone(),
        )?))),
        SourceKind::Artifactory => Ok(SourceEntry::uploading(Arc::new(
            ArtifactoryReleaseSource::new(config, client.clone())?,
        ))),
        SourceKind::Unsupported => {
            let supported = [
                SourceKind::S3,
                SourceKind::BoshIo,
                SourceKind::Github,
                SourceKind::Artifactory,
            ];
            Err(ReleaseError::Config(format!(
                "release source {:?} has an unsupported type; expected one of: {}",
                config.id,
                supported.map(SourceKind::as_str).join(", ")
            )))
        }
    }
}
