//! tessera - BOSH release locking and caching
//!
//! Keeps a product's `Kilnfile.lock` honest: resolves releases against the
//! configured release sources, fetches the locked tarballs, and turns
//! built releases into compiled ones cached for a stemcell.
//!
//! # Files
//!
//! ```text
//! Kilnfile        # release sources, desired releases, stemcell criteria
//! Kilnfile.lock   # one lock per release plus the locked stemcell
//! releases/       # fetched tarballs
//! ```

#![allow(missing_docs)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::doc_markdown)]

pub mod cmd;
pub mod ops;
pub mod ui;

pub use tessera_core::USER_AGENT;

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(name = "tessera")]
#[command(author, version, about = "tessera - BOSH release locking and caching")]
pub struct Cli {
    /// Path to the Kilnfile
    #[arg(long, global = true, default_value = "Kilnfile")]
    pub kilnfile: PathBuf,

    /// Path to the lockfile (defaults to the Kilnfile path with `.lock`)
    #[arg(long, global = true)]
    pub lockfile: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

impl Cli {
    pub fn lockfile_path(&self) -> PathBuf {
        self.lockfile.clone().unwrap_or_else(|| {
            let mut path = self.kilnfile.clone().into_os_string();
            path.push(".lock");
            PathBuf::from(path)
        })
    }
}

/// Connection to a BOSH director, with the BOSH CLI's environment variables
/// as fallbacks.
#[derive(Debug, Clone, Args)]
pub struct DirectorArgs {
    /// Director URL
    #[arg(long = "bosh-environment", env = "BOSH_ENVIRONMENT")]
    pub environment: String,

    /// Director or UAA client
    #[arg(long = "bosh-client", env = "BOSH_CLIENT", default_value = "")]
    pub client: String,

    /// Director or UAA client secret
    #[arg(
        long = "bosh-client-secret",
        env = "BOSH_CLIENT_SECRET",
        default_value = "",
        hide_env_values = true
    )]
    pub client_secret: String,

    /// CA certificate: a PEM bundle or a path to one
    #[arg(long = "bosh-ca-cert", env = "BOSH_CA_CERT")]
    pub ca_cert: Option<String>,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Download locked release tarballs into a directory
    Fetch {
        /// Directory holding release tarballs
        #[arg(long = "releases-directory", default_value = "releases")]
        releases_dir: PathBuf,
        /// Delete tarballs the lockfile does not mention
        #[arg(long)]
        no_confirm: bool,
        /// Concurrent downloads
        #[arg(long, default_value_t = tessera_core::fetch::DEFAULT_DOWNLOAD_THREADS)]
        parallel: usize,
        /// Only fetch from publishable release sources
        #[arg(long = "allow-only-publishable-releases")]
        publishable_only: bool,
    },
    /// Export compiled releases from a running deployment into a cache source
    CacheReleases {
        /// Release source receiving compiled releases
        #[arg(long)]
        upload_target_id: String,
        /// Deployment whose director compiled the releases
        #[arg(long)]
        name: String,
        #[command(flatten)]
        director: DirectorArgs,
    },
    /// Compile built releases on a director and cache them
    CompileBuiltReleases {
        /// Stemcell tarball to compile against
        #[arg(long)]
        stemcell_file: PathBuf,
        /// Release source receiving compiled releases
        #[arg(long)]
        upload_target_id: String,
        /// Directory for compiled tarballs
        #[arg(long = "releases-directory", default_value = "releases")]
        releases_dir: PathBuf,
        /// Number of compilation deployments
        #[arg(long, default_value_t = 4)]
        parallel: usize,
        #[command(flatten)]
        director: DirectorArgs,
    },
    /// Re-resolve one release and update its lock
    UpdateRelease {
        /// Release name
        #[arg(long)]
        name: String,
        /// Version or constraint overriding the Kilnfile's
        #[arg(long)]
        version: Option<String>,
        /// Resolve without downloading the tarball
        #[arg(long)]
        without_download: bool,
        #[arg(long = "releases-directory", default_value = "releases")]
        releases_dir: PathBuf,
        /// Only consider publishable release sources
        #[arg(long = "allow-only-publishable-releases")]
        publishable_only: bool,
    },
    /// Move the lockfile to a new stemcell version
    UpdateStemcell {
        /// Stemcell version
        #[arg(long)]
        version: String,
        #[arg(long = "releases-directory", default_value = "releases")]
        releases_dir: PathBuf,
    },
    /// Point locks at release tarballs built locally
    SyncWithLocal {
        /// Release source the tarballs will be uploaded to
        #[arg(long = "assume-release-source")]
        source_id: String,
        #[arg(long = "releases-directory", default_value = "releases")]
        releases_dir: PathBuf,
        /// Leave locks whose version already matches
        #[arg(long)]
        skip_same_version: bool,
    },
    /// Print the newest release the Kilnfile allows, as JSON
    FindReleaseVersion {
        /// Release name
        #[arg(long)]
        release: String,
        /// Only consider publishable release sources
        #[arg(long = "allow-only-publishable-releases")]
        publishable_only: bool,
    },
    /// Upload a built release tarball to a release source
    UploadRelease {
        /// Release tarball
        #[arg(long)]
        local_path: PathBuf,
        /// Release source receiving the tarball
        #[arg(long)]
        upload_target_id: String,
    },
}
