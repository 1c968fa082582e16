//! Deployment manifests: the throwaway ones used for compilation and the
//! staged ones whose stemcell must agree with the lockfile.

use serde::{Deserialize, Serialize};
use tessera_schema::{Lock, Stemcell};

use crate::error::{ReleaseError, Result};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestRelease {
    pub name: String,
    pub version: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestStemcell {
    #[serde(default)]
    pub alias: String,
    #[serde(default)]
    pub os: String,
    #[serde(default)]
    pub version: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdatePolicy {
    pub canaries: u32,
    pub max_in_flight: u32,
    pub canary_watch_time: String,
    pub update_watch_time: String,
}

impl Default for UpdatePolicy {
    fn default() -> Self {
        Self {
            canaries: 1,
            max_in_flight: 1,
            canary_watch_time: "1000-1001".to_string(),
            update_watch_time: "1000-1001".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DeploymentManifest {
    pub name: String,
    #[serde(default)]
    pub releases: Vec<ManifestRelease>,
    #[serde(default)]
    pub stemcells: Vec<ManifestStemcell>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub update: Option<UpdatePolicy>,
    #[serde(default)]
    pub instance_groups: Vec<serde_yaml::Value>,
}

/// A deployment with no instances that exists only so the director will
/// compile `releases` against `stemcell` on export.
pub fn compilation_manifest(name: &str, releases: &[Lock], stemcell: &Stemcell) -> Result<String> {
    let manifest = DeploymentManifest {
        name: name.to_string(),
        releases: releases
            .iter()
            .map(|l| ManifestRelease {
                name: l.name.clone(),
                version: l.version.clone(),
            })
            .collect(),
        stemcells: vec![ManifestStemcell {
            alias: "default".to_string(),
            os: stemcell.os.clone(),
            version: stemcell.version.clone(),
        }],
        update: Some(UpdatePolicy::default()),
        instance_groups: Vec::new(),
    };
    serde_yaml::to_string(&manifest)
        .map_err(|e| ReleaseError::Config(format!("rendering manifest for {name}: {e}")))
}

/// The stemcell a deployment manifest is staged with.
pub fn staged_stemcell(manifest: &str) -> Result<Stemcell> {
    let parsed: DeploymentManifest = serde_yaml::from_str(manifest)
        .map_err(|e| ReleaseError::Config(format!("parsing deployment manifest: {e}")))?;
    let stemcell = parsed.stemcells.into_iter().next().ok_or_else(|| {
        ReleaseError::Config(format!("deployment {:?} has no stemcells", parsed.name))
    })?;
    Ok(Stemcell::new(stemcell.os, stemcell.version))
}
