//! Compile-built-releases command

use std::path::PathBuf;

use anyhow::{Context as _, Result};
use tessera_core::compile::{CompileOptions, Compiler};

use crate::DirectorArgs;
use crate::ops::Context;

/// Compile every built release on the director and lock the results
pub async fn compile_built_releases(
    mut ctx: Context,
    director: &DirectorArgs,
    stemcell_tarball: PathBuf,
    upload_target: String,
    releases_dir: PathBuf,
    parallel: usize,
) -> Result<()> {
    let director = Context::director(director)?;
    let options = CompileOptions {
        stemcell_tarball,
        upload_target,
        releases_dir,
        parallel,
    };
    let report = Compiler::new(&ctx.registry, director, ctx.reporter.as_ref())
        .compile(&mut ctx.lockfile, &options)
        .await
        .context("compiling built releases")?;

    if report.is_empty() {
        ctx.reporter.info("no built releases to compile");
        return Ok(());
    }
    ctx.save_lockfile()
}
