//! Error taxonomy shared by every engine component.

use std::path::{Path, PathBuf};

use tessera_schema::{SchemaError, Stemcell};
use thiserror::Error;

/// Boxed error used for backend failures whose concrete type varies.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Result alias used throughout the crate.
pub type Result<T, E = ReleaseError> = std::result::Result<T, E>;

#[derive(Error, Debug)]
pub enum ReleaseError {
    /// No configured source has the release.
    #[error("{release} not found in any release source")]
    NotFound { release: String },

    #[error("release source {id:?} not found; configured sources: {}", .available.join(", "))]
    SourceNotFound { id: String, available: Vec<String> },

    /// Downloaded or exported bytes do not match the expected digest. The
    /// offending file has already been removed when this is returned.
    #[error("checksum mismatch for {release}: expected {expected}, got {actual}")]
    ChecksumMismatch {
        release: String,
        expected: String,
        actual: String,
    },

    #[error("inconsistent lockfile: {0}")]
    InconsistentLockfile(String),

    #[error("staged stemcell ({staged}) and lock stemcell ({locked}) do not match")]
    PlatformMismatch { staged: Stemcell, locked: Stemcell },

    #[error("{context}: {cause}")]
    Transport {
        context: String,
        #[source]
        cause: BoxError,
    },

    #[error("director task {task} finished in state {state:?}: {description}")]
    DirectorTask {
        task: u64,
        state: String,
        description: String,
    },

    /// Tearing down compilation deployments failed. `primary` carries the
    /// error that was already in flight, if any.
    #[error("{}", cleanup_message(.message, .primary.as_deref()))]
    CleanupFailed {
        message: String,
        primary: Option<Box<ReleaseError>>,
    },

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("invalid tarball {path}: {message}")]
    Tarball { path: PathBuf, message: String },

    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Schema(#[from] SchemaError),

    #[error("background task failed: {0}")]
    Join(#[from] tokio::task::JoinError),

    #[error("{context}: {error}")]
    Context {
        context: String,
        #[source]
        error: Box<ReleaseError>,
    },
}

impl ReleaseError {
    pub fn io(path: impl AsRef<Path>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.as_ref().to_path_buf(),
            source,
        }
    }

    pub fn transport(context: impl Into<String>, cause: impl Into<BoxError>) -> Self {
        Self::Transport {
            context: context.into(),
            cause: cause.into(),
        }
    }

    /// Wrap this error with a description of what was being attempted.
    #[must_use]
    pub fn context(self, context: impl Into<String>) -> Self {
        Self::Context {
            context: context.into(),
            error: Box::new(self),
        }
    }

    /// The innermost error, looking through [`ReleaseError::Context`] layers.
    pub fn root(&self) -> &Self {
        match self {
            Self::Context { error, .. } => error.root(),
            other => other,
        }
    }

    pub fn is_checksum_mismatch(&self) -> bool {
        matches!(self.root(), Self::ChecksumMismatch { .. })
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self.root(), Self::NotFound { .. })
    }
}

impl From<reqwest::Error> for ReleaseError {
    fn from(err: reqwest::Error) -> Self {
        let context = match err.url() {
            Some(url) => format!("HTTP request to {url} failed"),
            None => "HTTP request failed".to_string(),
        };
        Self::transport(context, err)
    }
}

fn cleanup_message(message: &str, primary: Option<&ReleaseError>) -> String {
    match primary {
        Some(primary) => format!("{primary}; additionally, cleanup failed: {message}"),
        None => format!("cleanup failed: {message}"),
    }
}
