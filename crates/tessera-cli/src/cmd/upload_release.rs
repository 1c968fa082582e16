//! Upload-release command

use std::path::Path;

use anyhow::{Context as _, Result};
use tessera_core::ops::LockfileUpdater;

use crate::ops::Context;

pub async fn upload_release(ctx: &Context, tarball: &Path, source_id: &str) -> Result<()> {
    let lock = LockfileUpdater::new(&ctx.registry, ctx.reporter.as_ref())
        .upload_release(tarball, source_id)
        .await
        .with_context(|| format!("uploading {}", tarball.display()))?;
    ctx.reporter.info(&format!(
        "{} {} stored at {} (sha1 {})",
        lock.name, lock.version, lock.remote_path, lock.sha1
    ));
    Ok(())
}
