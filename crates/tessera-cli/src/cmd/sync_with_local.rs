//! Sync-with-local command

use std::path::PathBuf;

use anyhow::{Context as _, Result};
use tessera_core::ops::{LockfileUpdater, SyncOptions};

use crate::ops::Context;

pub async fn sync_with_local(
    mut ctx: Context,
    source_id: String,
    releases_dir: PathBuf,
    skip_same_version: bool,
) -> Result<()> {
    let options = SyncOptions {
        releases_dir,
        source_id,
        skip_same_version,
    };
    let changed = LockfileUpdater::new(&ctx.registry, ctx.reporter.as_ref())
        .sync_with_local(&mut ctx.lockfile, &options)
        .await
        .with_context(|| format!("syncing with {}", options.releases_dir.display()))?;

    if changed.is_empty() {
        ctx.reporter.info("lockfile already matches local releases");
        return Ok(());
    }
    ctx.save_lockfile()
}
