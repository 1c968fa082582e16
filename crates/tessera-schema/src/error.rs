//! Schema errors.

use std::path::PathBuf;

use thiserror::Error;

/// Errors raised while reading, writing or validating schema documents.
#[derive(Debug, Error)]
pub enum SchemaError {
    /// A file could not be read or written.
    #[error("failed to access {path}: {source}")]
    Io {
        /// Path that was being accessed.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// A YAML document could not be parsed.
    #[error("failed to parse {path}: {source}")]
    Parse {
        /// Path of the offending document.
        path: PathBuf,
        /// Underlying YAML error.
        #[source]
        source: serde_yaml::Error,
    },

    /// A document could not be serialized back to YAML.
    #[error("failed to serialize document: {0}")]
    Serialize(#[from] serde_yaml::Error),

    /// A version constraint string is not understood.
    #[error("invalid version constraint {constraint:?}: {reason}")]
    Constraint {
        /// The constraint as written.
        constraint: String,
        /// Why it was rejected.
        reason: String,
    },

    /// A version string is not a valid (lenient) semantic version.
    #[error("invalid version {0:?}")]
    Version(String),

    /// A digest string is malformed.
    #[error("invalid digest {0:?}")]
    Digest(String),
}
