//! Update-release command

use std::path::PathBuf;

use anyhow::{Context as _, Result};
use tessera_core::ops::{LockfileUpdater, UpdateOutcome, UpdateReleaseOptions};

use crate::ops::Context;

pub async fn update_release(
    mut ctx: Context,
    name: String,
    version: Option<String>,
    without_download: bool,
    releases_dir: PathBuf,
    publishable_only: bool,
) -> Result<()> {
    let options = UpdateReleaseOptions {
        name,
        version,
        without_download,
        releases_dir,
        publishable_only,
    };
    let outcome = LockfileUpdater::new(&ctx.registry, ctx.reporter.as_ref())
        .update_release(&ctx.kilnfile, &mut ctx.lockfile, &options)
        .await
        .with_context(|| format!("updating {}", options.name))?;

    match outcome {
        UpdateOutcome::Unchanged(_) => Ok(()),
        UpdateOutcome::Updated { .. } => ctx.save_lockfile(),
    }
}
