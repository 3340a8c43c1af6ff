//! Command implementations.
//!
//! Each command returns an [`Exit`](crate::Exit) for outcomes the user must
//! be able to tell apart, and an `anyhow::Error` for everything else.

pub mod completions;
pub mod history;
pub mod info;
pub mod install;
pub mod list;
pub mod resolve;
pub mod uninstall;
pub mod update;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context as _, Result};
use keel_core::{Layout, try_keel_home};
use keel_schema::{Dependency, PackageIndex};

use crate::config::Config;
use crate::store::DbHandle;
use crate::ui::ConsoleReporter;

/// Everything a command needs from the global flags and `config.toml`.
#[derive(Debug, Clone)]
pub struct Session {
    pub layout: Layout,
    pub config: Config,
    pub registry_path: PathBuf,
    pub quiet: bool,
}

impl Session {
    /// Build a session. `home` and `registry` come from the CLI (or their
    /// environment variables) and take precedence over `config.toml`.
    pub fn new(home: Option<PathBuf>, registry: Option<PathBuf>, quiet: bool) -> Result<Self> {
        let home = home
            .or_else(try_keel_home)
            .context("could not determine keel home; set KEEL_HOME or pass --home")?;
        let layout = Layout::new(home);
        let config = Config::load(&layout.config_path())?;
        let registry_path = registry
            .or_else(|| config.registry.clone())
            .unwrap_or_else(|| layout.registry_path());

        Ok(Self {
            layout,
            config,
            registry_path,
            quiet,
        })
    }

    pub fn load_registry(&self) -> Result<PackageIndex> {
        PackageIndex::load(&self.registry_path).with_context(|| {
            format!(
                "failed to load registry {} (run 'keel update' or pass --registry)",
                self.registry_path.display()
            )
        })
    }

    /// Create the home layout and open the state database.
    pub fn open_db(&self) -> Result<DbHandle> {
        self.layout
            .ensure()
            .with_context(|| format!("failed to create {}", self.layout.home().display()))?;
        DbHandle::spawn(&self.layout.db_path()).context("failed to open state database")
    }

    pub fn reporter(&self) -> Arc<ConsoleReporter> {
        Arc::new(ConsoleReporter::new(self.quiet))
    }
}

/// Parse `name` / `name@constraint` arguments.
pub fn parse_specs(specs: &[String]) -> Result<Vec<Dependency>> {
    specs
        .iter()
        .map(|s| Dependency::parse(s).with_context(|| format!("invalid package spec '{s}'")))
        .collect()
}
