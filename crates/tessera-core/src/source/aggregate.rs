//! An ordered group of release sources queried as one.

use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use tessera_schema::{Local, Lock, Spec};
use tracing::debug;

use super::{Match, ReleaseSource, SourceConfiguration};
use crate::error::{ReleaseError, Result};

/// Sources in lookup order. Ids are unique within an aggregate.
#[derive(Debug, Clone, Default)]
pub struct MultiReleaseSource {
    sources: Vec<Arc<dyn ReleaseSource>>,
}

impl MultiReleaseSource {
    pub fn new(sources: Vec<Arc<dyn ReleaseSource>>) -> Result<Self> {
        let mut seen = HashSet::new();
        for source in &sources {
            let id = source.id();
            if !seen.insert(id.clone()) {
                return Err(ReleaseError::Config(format!(
                    "release source id {id:?} is configured more than once"
                )));
            }
        }
        Ok(Self { sources })
    }

    pub fn sources(&self) -> &[Arc<dyn ReleaseSource>] {
        &self.sources
    }

    pub fn ids(&self) -> Vec<String> {
        self.sources.iter().map(|s| s.id()).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }

    pub fn find_by_id(&self, id: &str) -> Result<Arc<dyn ReleaseSource>> {
        self.sources
            .iter()
            .find(|s| s.id() == id)
            .cloned()
            .ok_or_else(|| ReleaseError::SourceNotFound {
                id: id.to_string(),
                available: self.ids(),
            })
    }

    /// A narrowed aggregate, keeping order.
    #[must_use]
    pub fn filter(&self, publishable_only: bool) -> Self {
        Self {
            sources: self
                .sources
                .iter()
                .filter(|s| !publishable_only || s.configuration().publishable)
                .cloned()
                .collect(),
        }
    }

    fn scoped(source: &dyn ReleaseSource, err: ReleaseError) -> ReleaseError {
        err.context(format!("error from release source {:?}", source.id()))
    }
}

#[async_trait]
impl ReleaseSource for MultiReleaseSource {
    fn configuration(&self) -> SourceConfiguration {
        SourceConfiguration {
            id: self.ids().join(","),
            publishable: self.sources.iter().all(|s| s.configuration().publishable),
        }
    }

    async fn get_matched_release(&self, spec: &Spec) -> Result<Match> {
        for source in &self.sources {
            match source.get_matched_release(spec).await {
                Ok(Match::Found(lock)) => return Ok(Match::Found(lock)),
                Ok(Match::NotFound) => {
                    debug!(source = %source.id(), release = %spec, "not in source");
                }
                Err(err) => return Err(Self::scoped(source.as_ref(), err)),
            }
        }
        Ok(Match::NotFound)
    }

    async fn find_release_version(&self, spec: &Spec, no_download: bool) -> Result<Match> {
        for source in &self.sources {
            match source.find_release_version(spec, no_download).await {
                Ok(Match::Found(lock)) => return Ok(Match::Found(lock)),
                Ok(Match::NotFound) => continue,
                Err(err) => return Err(Self::scoped(source.as_ref(), err)),
            }
        }
        Ok(Match::NotFound)
    }

    async fn download_release(&self, dir: &Path, lock: &Lock) -> Result<Local> {
        let source = self.find_by_id(&lock.remote_source)?;
        source
            .download_release(dir, lock)
            .await
            .map_err(|e| Self::scoped(source.as_ref(), e))
    }
}
