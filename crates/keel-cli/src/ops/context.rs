//! Shared installation context.
//!
//! Groups the collaborators every operation needs so they can be swapped for
//! fakes in tests.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use keel_core::io::{DefaultFetcher, FetchError, Fetcher, RetryPolicy, Sha256Verifier, Verifier};
use keel_core::{InstallActions, Layout, Reporter, ShellActions};

use crate::store::DbHandle;

/// Knobs for one `apply` run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct InstallOptions {
    pub retry: RetryPolicy,
    /// Run independent layers concurrently when their write paths are disjoint.
    pub parallel: bool,
    /// Roll back freshly installed dependencies whose dependents all failed.
    pub rollback_orphans: bool,
}

/// Groups common state used during installation operations.
#[derive(Clone)]
pub struct Context {
    pub db: DbHandle,
    pub layout: Layout,
    pub fetcher: Arc<dyn Fetcher>,
    pub verifier: Arc<dyn Verifier>,
    pub actions: Arc<dyn InstallActions>,
    pub reporter: Arc<dyn Reporter>,
}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Context")
            .field("layout", &self.layout)
            .finish_non_exhaustive()
    }
}

impl Context {
    pub fn new(
        db: DbHandle,
        layout: Layout,
        fetcher: Arc<dyn Fetcher>,
        actions: Arc<dyn InstallActions>,
        reporter: Arc<dyn Reporter>,
    ) -> Self {
        Self {
            db,
            layout,
            fetcher,
            verifier: Arc::new(Sha256Verifier),
            actions,
            reporter,
        }
    }

    /// The production wiring: network/file fetcher and `/bin/sh` steps.
    pub fn standard(
        db: DbHandle,
        layout: Layout,
        fetch_timeout: Duration,
        install_timeout: Duration,
        reporter: Arc<dyn Reporter>,
    ) -> Result<Self, FetchError> {
        let fetcher = DefaultFetcher::new(fetch_timeout)?;
        let actions = ShellActions::new(layout.log_dir(), install_timeout);
        Ok(Self::new(
            db,
            layout,
            Arc::new(fetcher),
            Arc::new(actions),
            reporter,
        ))
    }
}
