//! keel - a dependency-aware package installer
#![allow(missing_docs)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::doc_markdown)]
#![allow(clippy::missing_panics_doc)]
//!
//! Resolves `name@constraint` requests against a registry of package
//! versions, installs the resulting plan in dependency order and records
//! what is installed in a local state database.
//!
//! # Architecture
//!
//! - **Registry** (`keel-schema`): every available version of every package.
//! - **Resolver** (`keel-core`): picks one version per name and orders them.
//! - **Executor** ([`ops::apply`]): fetch, verify, unpack, install, record.
//! - **State store** ([`store`]): SQLite behind a single-writer actor.
//!
//! # Directory Layout
//!
//! ```text
//! ~/.keel/
//! ├── store/        # Package prefixes by name/version
//! ├── cache/        # Verified artifacts by sha256
//! ├── tmp/          # Unpack scratch space
//! ├── logs/         # Install and test step output
//! ├── registry.toml # Available packages
//! ├── config.toml   # Optional settings
//! └── state.db      # SQLite database
//! ```

pub mod cmd;
pub mod config;
pub mod ops;
pub mod store;
pub mod ui;

pub use crate::config::Config;
pub use crate::store::DbHandle;

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(name = "keel")]
#[command(author, version, about = "keel - a dependency-aware package installer")]
pub struct Cli {
    /// keel home directory
    #[arg(long, global = true, env = "KEEL_HOME")]
    pub home: Option<PathBuf>,

    /// Registry file (defaults to <home>/registry.toml)
    #[arg(long, global = true, env = "KEEL_REGISTRY")]
    pub registry: Option<PathBuf>,

    /// Suppress non-essential output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Resolve and install packages with their dependencies
    Install {
        /// Package specs: pkg or pkg@constraint
        #[arg(required = true)]
        packages: Vec<String>,
        /// Run independent packages concurrently
        #[arg(long)]
        parallel: bool,
        /// Remove freshly installed dependencies whose dependents all failed
        #[arg(long)]
        rollback_orphans: bool,
    },
    /// Print the install plan for packages
    Resolve {
        /// Package specs: pkg or pkg@constraint
        #[arg(required = true)]
        packages: Vec<String>,
        /// Resolve only; do not read the state database
        #[arg(long)]
        dry_run: bool,
    },
    /// Remove an installed package
    Uninstall {
        /// Package name
        package: String,
        /// Remove even if installed packages depend on it
        #[arg(long, short = 'f')]
        force: bool,
    },
    /// List installed packages
    List {
        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },
    /// Show package info
    Info {
        /// Package name
        package: String,
    },
    /// View package history
    History {
        /// Package name
        package: String,
    },
    /// Run an installed package's test steps
    Test {
        /// Package name
        package: String,
    },
    /// Download the registry
    Update {
        /// Registry URL (overrides registry_url in config.toml)
        #[arg(long, env = "KEEL_REGISTRY_URL")]
        url: Option<String>,
    },
    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        shell: clap_complete::Shell,
    },
}

/// Process exit status for a command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Exit {
    Success,
    /// Any error not covered below.
    Error,
    /// The request could not be resolved; nothing was installed.
    Resolution,
    /// Installation failed and nothing succeeded.
    InstallFailed,
    /// Some packages installed, others failed or were skipped.
    Partial,
}

impl Exit {
    pub fn code(self) -> u8 {
        match self {
            Self::Success => 0,
            Self::Error => 1,
            Self::Resolution => 2,
            Self::InstallFailed => 3,
            Self::Partial => 4,
        }
    }
}

impl From<ops::RunStatus> for Exit {
    fn from(status: ops::RunStatus) -> Self {
        match status {
            ops::RunStatus::Success => Self::Success,
            ops::RunStatus::Failed => Self::InstallFailed,
            ops::RunStatus::Partial => Self::Partial,
        }
    }
}

impl From<Exit> for std::process::ExitCode {
    fn from(exit: Exit) -> Self {
        Self::from(exit.code())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_install() {
        let cli = Cli::try_parse_from(["keel", "--home", "/tmp/k", "install", "a@>=1.0", "b"]).unwrap();
        assert_eq!(cli.home, Some(PathBuf::from("/tmp/k")));
        match cli.command {
            Commands::Install { packages, parallel, .. } => {
                assert_eq!(packages, vec!["a@>=1.0", "b"]);
                assert!(!parallel);
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn test_exit_codes() {
        assert_eq!(Exit::from(ops::RunStatus::Success).code(), 0);
        assert_eq!(Exit::Resolution.code(), 2);
        assert_eq!(Exit::from(ops::RunStatus::Failed).code(), 3);
        assert_eq!(Exit::from(ops::RunStatus::Partial).code(), 4);
    }
}
