pub mod cache;
pub mod compile;
pub mod director;
pub mod error;
pub mod fetch;
pub mod io;
pub mod local;
pub mod ops;
pub mod pool;
pub mod source;

pub mod reporter;

#[cfg(test)]
mod testing;

pub use error::{ReleaseError, Result};
pub use reporter::{NullReporter, Reporter};
pub use source::{Match, ReleaseSource, ReleaseUploader};

/// User agent sent to bosh.io and the director
pub const USER_AGENT: &str = concat!("tessera/", env!("CARGO_PKG_VERSION"));
