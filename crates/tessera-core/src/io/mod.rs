//! I/O helpers: hashing sinks, HTTP downloads and tarball inspection.

pub mod download;
pub mod hashing;
pub mod tarball;

pub use hashing::{Digests, HashingWriter, sha1_file};
