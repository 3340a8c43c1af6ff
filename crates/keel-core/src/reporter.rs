//! Reporter trait for dependency injection
//!
//! Lets the executor report progress without being coupled to a terminal.

use keel_schema::{PackageName, Version};

pub trait Reporter: Send + Sync {
    /// A new phase has started (e.g. "Resolving", "Installing").
    fn section(&self, title: &str);

    /// The artifact for a package is being fetched.
    fn fetching(&self, name: &PackageName, version: &Version);

    /// A transient fetch failure is about to be retried.
    fn retrying(&self, name: &PackageName, version: &Version, attempt: u32, reason: &str);

    /// Install steps for a package are running.
    fn installing(&self, name: &PackageName, version: &Version);

    /// Marks a package operation as successfully completed.
    fn done(&self, name: &PackageName, version: &Version, detail: &str);

    /// A package was not attempted (already installed, halted, cancelled...).
    fn skipped(&self, name: &PackageName, version: &Version, reason: &str);

    /// Marks a package operation as failed with a specific reason.
    fn failed(&self, name: &PackageName, version: &Version, reason: &str);

    /// Updates the state of a package to 'removing'.
    fn removing(&self, name: &PackageName, version: &Version);

    fn info(&self, msg: &str);

    fn warning(&self, msg: &str);

    fn error(&self, msg: &str);

    /// Display a final summary of multiple operations.
    fn summary(&self, count: usize, action: &str, elapsed_secs: f64);
}

impl<T: Reporter + ?Sized> Reporter for std::sync::Arc<T> {
    fn section(&self, title: &str) {
        (**self).section(title);
    }
    fn fetching(&self, name: &PackageName, version: &Version) {
        (**self).fetching(name, version);
    }
    fn retrying(&self, name: &PackageName, version: &Version, attempt: u32, reason: &str) {
        (**self).retrying(name, version, attempt, reason);
    }
    fn installing(&self, name: &PackageName, version: &Version) {
        (**self).installing(name, version);
    }
    fn done(&self, name: &PackageName, version: &Version, detail: &str) {
        (**self).done(name, version, detail);
    }
    fn skipped(&self, name: &PackageName, version: &Version, reason: &str) {
        (**self).skipped(name, version, reason);
    }
    fn failed(&self, name: &PackageName, version: &Version, reason: &str) {
        (**self).failed(name, version, reason);
    }
    fn removing(&self, name: &PackageName, version: &Version) {
        (**self).removing(name, version);
    }
    fn info(&self, msg: &str) {
        (**self).info(msg);
    }
    fn warning(&self, msg: &str) {
        (**self).warning(msg);
    }
    fn error(&self, msg: &str) {
        (**self).error(msg);
    }
    fn summary(&self, count: usize, action: &str, elapsed_secs: f64) {
        (**self).summary(count, action, elapsed_secs);
    }
}

/// A no-op reporter for silent operations (e.g., testing).
#[derive(Debug, Clone, Copy, Default)]
pub struct NullReporter;

impl Reporter for NullReporter {
    fn section(&self, _: &str) {}
    fn fetching(&self, _: &PackageName, _: &Version) {}
    fn retrying(&self, _: &PackageName, _: &Version, _: u32, _: &str) {}
    fn installing(&self, _: &PackageName, _: &Version) {}
    fn done(&self, _: &PackageName, _: &Version, _: &str) {}
    fn skipped(&self, _: &PackageName, _: &Version, _: &str) {}
    fn failed(&self, _: &PackageName, _: &Version, _: &str) {}
    fn removing(&self, _: &PackageName, _: &Version) {}
    fn info(&self, _: &str) {}
    fn warning(&self, _: &str) {}
    fn error(&self, _: &str) {}
    fn summary(&self, _: usize, _: &str, _: f64) {}
}
