//! Find-release-version command

use anyhow::{Context as _, Result};
use serde_json::json;
use tessera_core::ops::LockfileUpdater;

use crate::ops::Context;

/// Print the newest release the Kilnfile allows as one JSON line.
pub async fn find_release_version(
    ctx: &Context,
    name: &str,
    publishable_only: bool,
) -> Result<()> {
    let lock = LockfileUpdater::new(&ctx.registry, ctx.reporter.as_ref())
        .find_release_version(&ctx.kilnfile, &ctx.lockfile, name, publishable_only)
        .await
        .with_context(|| format!("finding a version of {name}"))?;
    let line = json!({
        "version": lock.version,
        "remote_path": lock.remote_path,
        "source": lock.remote_source,
        "sha": lock.sha1,
    });
    println!("{line}");
    Ok(())
}
