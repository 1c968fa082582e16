//! tessera CLI

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use tessera_cli::cmd;
use tessera_cli::ops::Context;
use tessera_cli::{Cli, Commands};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let ctx = Context::load(&cli.kilnfile, &cli.lockfile_path())?;

    match cli.command {
        Commands::Fetch {
            releases_dir,
            no_confirm,
            parallel,
            publishable_only,
        } => cmd::fetch::fetch(&ctx, releases_dir, no_confirm, parallel, publishable_only).await,
        Commands::CacheReleases {
            upload_target_id,
            name,
            director,
        } => cmd::cache::cache_releases(ctx, &director, upload_target_id, name).await,
        Commands::CompileBuiltReleases {
            stemcell_file,
            upload_target_id,
            releases_dir,
            parallel,
            director,
        } => {
            cmd::compile::compile_built_releases(
                ctx,
                &director,
                stemcell_file,
                upload_target_id,
                releases_dir,
                parallel,
            )
            .await
        }
        Commands::UpdateRelease {
            name,
            version,
            without_download,
            releases_dir,
            publishable_only,
        } => {
            cmd::update_release::update_release(
                ctx,
                name,
                version,
                without_download,
                releases_dir,
                publishable_only,
            )
            .await
        }
        Commands::UpdateStemcell {
            version,
            releases_dir,
        } => cmd::update_stemcell::update_stemcell(ctx, &version, &releases_dir).await,
        Commands::SyncWithLocal {
            source_id,
            releases_dir,
            skip_same_version,
        } => {
            cmd::sync_with_local::sync_with_local(ctx, source_id, releases_dir, skip_same_version)
                .await
        }
        Commands::FindReleaseVersion {
            release,
            publishable_only,
        } => {
            cmd::find_release_version::find_release_version(&ctx, &release, publishable_only)
                .await
        }
        Commands::UploadRelease {
            local_path,
            upload_target_id,
        } => cmd::upload_release::upload_release(&ctx, &local_path, &upload_target_id).await,
    }
}
