//! Fetch command

use std::path::PathBuf;

use anyhow::{Context as _, Result};
use tessera_core::fetch::{FetchOptions, Fetcher};

use crate::ops::Context;

/// Bring the releases directory in line with the lockfile
pub async fn fetch(
    ctx: &Context,
    releases_dir: PathBuf,
    no_confirm: bool,
    parallel: usize,
    publishable_only: bool,
) -> Result<()> {
    let sources = ctx.registry.aggregate(publishable_only);
    let options = FetchOptions {
        releases_dir,
        no_confirm,
        parallel,
    };
    let report = Fetcher::new(&sources, ctx.reporter.as_ref())
        .fetch(&ctx.lockfile.stamped_locks(), &options)
        .await
        .context("fetching releases")?;

    if report.downloaded.is_empty() {
        ctx.reporter.info(&format!(
            "all {} releases already in {}",
            report.present.len(),
            options.releases_dir.display()
        ));
    }
    Ok(())
}
