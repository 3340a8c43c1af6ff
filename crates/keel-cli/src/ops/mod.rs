//! Package operations: install, remove.

pub mod context;
pub mod error;
pub mod install;
pub mod remove;

pub use context::{Context, InstallOptions};
pub use error::{InstallError, RemoveError};
pub use install::{InstallReport, Outcome, ReportEntry, RunStatus, SkipReason, apply};
pub use remove::uninstall;
