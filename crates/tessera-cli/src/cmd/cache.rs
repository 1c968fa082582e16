//! Cache-releases command

use anyhow::{Context as _, Result};
use tessera_core::cache::{CacheOptions, CacheSync};

use crate::DirectorArgs;
use crate::ops::Context;

/// Export what a running deployment compiled into the cache source
pub async fn cache_releases(
    mut ctx: Context,
    director: &DirectorArgs,
    upload_target: String,
    deployment: String,
) -> Result<()> {
    let director = Context::director(director)?;
    let options = CacheOptions {
        upload_target,
        deployment,
    };
    let report = CacheSync::new(&ctx.registry, director, ctx.reporter.as_ref())
        .sync(&mut ctx.lockfile, &options)
        .await
        .with_context(|| format!("caching releases of {}", options.deployment))?;

    ctx.save_lockfile()?;
    for (name, reason) in &report.skipped {
        ctx.reporter.warning(&format!("{name} was not cached: {reason}"));
    }
    ctx.reporter.info(&format!(
        "{} already cached, {} uploaded to {}",
        report.cached.len(),
        report.uploaded.len(),
        options.upload_target
    ));
    Ok(())
}
