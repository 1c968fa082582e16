//! Reporter trait for dependency injection
//!
//! Engine components report progress through this trait so they stay
//! decoupled from any particular terminal rendering.

pub trait Reporter: Send + Sync {
    /// Indicates a new phase has started (e.g. "Fetching", "Exporting").
    fn section(&self, title: &str);

    /// Updates the progress of a download.
    fn downloading(&self, release: &str, version: &str, current: u64, total: Option<u64>);

    /// A release is being pushed to a director or a cache.
    fn uploading(&self, release: &str, version: &str, target: &str);

    /// A local release tarball is being deleted.
    fn removing(&self, release: &str, version: &str);

    /// Marks a release operation as successfully completed.
    fn done(&self, release: &str, version: &str, detail: &str);

    /// Marks a release operation as failed with a specific reason.
    fn failed(&self, release: &str, version: &str, reason: &str);

    fn info(&self, msg: &str);

    fn warning(&self, msg: &str);

    /// Display a final summary of multiple operations.
    fn summary(&self, count: usize, action: &str, elapsed_secs: f64);
}

impl<T: Reporter + ?Sized> Reporter for std::sync::Arc<T> {
    fn section(&self, title: &str) {
        (**self).section(title);
    }
    fn downloading(&self, release: &str, version: &str, current: u64, total: Option<u64>) {
        (**self).downloading(release, version, current, total);
    }
    fn uploading(&self, release: &str, version: &str, target: &str) {
        (**self).uploading(release, version, target);
    }
    fn removing(&self, release: &str, version: &str) {
        (**self).removing(release, version);
    }
    fn done(&self, release: &str, version: &str, detail: &str) {
        (**self).done(release, version, detail);
    }
    fn failed(&self, release: &str, version: &str, reason: &str) {
        (**self).failed(release, version, reason);
    }
    fn info(&self, msg: &str) {
        (**self).info(msg);
    }
    fn warning(&self, msg: &str) {
        (**self).warning(msg);
    }
    fn summary(&self, count: usize, action: &str, elapsed_secs: f64) {
        (**self).summary(count, action, elapsed_secs);
    }
}

/// A no-op reporter for silent operations (e.g., testing).
#[derive(Debug, Clone, Copy)]
pub struct NullReporter;

impl Reporter for NullReporter {
    fn section(&self, _: &str) {}
    fn downloading(&self, _: &str, _: &str, _: u64, _: Option<u64>) {}
    fn uploading(&self, _: &str, _: &str, _: &str) {}
    fn removing(&self, _: &str, _: &str) {}
    fn done(&self, _: &str, _: &str, _: &str) {}
    fn failed(&self, _: &str, _: &str, _: &str) {}
    fn info(&self, _: &str) {}
    fn warning(&self, _: &str) {}
    fn summary(&self, _: usize, _: &str, _: f64) {}
}
