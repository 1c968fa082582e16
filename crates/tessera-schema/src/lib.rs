//! Shared types for tessera.
//!
//! This crate holds everything that is persisted or exchanged between the
//! engine and its callers: release identities (`Spec`, `Lock`, `Local`),
//! the `Kilnfile` manifest and its lockfile, digest parsing and the version
//! constraint dialect used by manifests.

pub mod bosh;
pub mod error;
pub mod hash;
pub mod kilnfile;
pub mod release;
pub mod version;

pub use bosh::{CompiledPackage, ReleaseManifest, StemcellManifest};
pub use error::SchemaError;
pub use hash::{DigestAlgorithm, MultiDigest};
pub use kilnfile::{ComponentRequirement, Kilnfile, KilnfileLock, ReleaseSourceConfig, SourceKind};
pub use release::{Local, Lock, Spec, Stemcell};
pub use version::{VersionConstraint, parse_lenient};
