//! Shared command plumbing.

pub mod context;

pub use context::Context;
