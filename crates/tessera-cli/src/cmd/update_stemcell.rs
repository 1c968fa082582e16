//! Update-stemcell command

use std::path::Path;

use anyhow::{Context as _, Result};
use tessera_core::ops::LockfileUpdater;

use crate::ops::Context;

pub async fn update_stemcell(mut ctx: Context, version: &str, releases_dir: &Path) -> Result<()> {
    let before = ctx.lockfile.stemcell_criteria.clone();
    LockfileUpdater::new(&ctx.registry, ctx.reporter.as_ref())
        .update_stemcell(&ctx.kilnfile, &mut ctx.lockfile, version, releases_dir)
        .await
        .with_context(|| format!("updating stemcell to {version}"))?;

    if ctx.lockfile.stemcell_criteria == before {
        return Ok(());
    }
    ctx.save_lockfile()
}
