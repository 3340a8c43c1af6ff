//! Domain-specific errors for package operations

use keel_core::ActionError;
use keel_core::io::{ExtractError, FetchError};
use thiserror::Error;

use crate::store::DbError;

#[derive(Error, Debug)]
pub enum InstallError {
    #[error("checksum mismatch: expected {expected}, got {actual}")]
    Integrity { expected: String, actual: String },

    #[error("gave up after {attempts} attempts: {source}")]
    FetchExhausted { attempts: u32, source: FetchError },

    #[error("Download failed: {0}")]
    Fetch(FetchError),

    #[error("Unpack failed: {0}")]
    Unpack(#[from] ExtractError),

    #[error("Install script failed: {0}")]
    Script(#[from] ActionError),

    #[error("State database error: {0}")]
    Db(#[from] DbError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl InstallError {
    /// Whether this failure must stop the whole plan, not just its dependents.
    pub fn halts_plan(&self) -> bool {
        matches!(self, Self::Integrity { .. })
    }
}

#[derive(Error, Debug)]
pub enum RemoveError {
    #[error("package '{0}' is not installed")]
    NotInstalled(String),

    #[error("'{name}' is required by: {}", .dependents.join(", "))]
    HasDependents {
        name: String,
        dependents: Vec<String>,
    },

    #[error("State database error: {0}")]
    Db(#[from] DbError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
