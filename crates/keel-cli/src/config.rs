//! User configuration from `<home>/config.toml`.
//!
//! Every field is optional. A missing file means defaults; a malformed one is
//! an error. CLI flags override what is loaded here.
//!
//! ```toml
//! registry = "/srv/keel/registry.toml"
//! registry_url = "https://example.com/keel/registry.toml"
//! parallel = true
//! rollback_orphans = false
//! install_timeout_secs = 1800
//!
//! [retry]
//! max_retries = 3
//! base_delay_ms = 500
//! backoff_multiplier = 2.0
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use keel_core::io::RetryPolicy;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::ops::InstallOptions;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("invalid config {}: {source}", .path.display())]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Registry file; defaults to `<home>/registry.toml`.
    pub registry: Option<PathBuf>,
    /// Where `keel update` downloads the registry from.
    pub registry_url: Option<String>,
    pub parallel: bool,
    pub rollback_orphans: bool,
    pub install_timeout_secs: u64,
    pub fetch_timeout_secs: u64,
    pub retry: RetryConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            registry: None,
            registry_url: None,
            parallel: false,
            rollback_orphans: false,
            install_timeout_secs: 1800,
            fetch_timeout_secs: 300,
            retry: RetryConfig::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RetryConfig {
    pub max_retries: u32,
    pub base_delay_ms: u64,
    pub backoff_multiplier: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        let policy = RetryPolicy::default();
        Self {
            max_retries: policy.max_retries,
            base_delay_ms: policy.base_delay.as_millis() as u64,
            backoff_multiplier: policy.backoff_multiplier,
        }
    }
}

impl RetryConfig {
    pub fn policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_retries: self.max_retries,
            base_delay: Duration::from_millis(self.base_delay_ms),
            backoff_multiplier: self.backoff_multiplier,
        }
    }
}

impl Config {
    /// Load from `path`, falling back to defaults if it does not exist.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = match std::fs::read_to_string(path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Self::default()),
            Err(source) => {
                return Err(ConfigError::Io {
                    path: path.to_path_buf(),
                    source,
                });
            }
        };
        toml::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn install_options(&self) -> InstallOptions {
        InstallOptions {
            retry: self.retry.policy(),
            parallel: self.parallel,
            rollback_orphans: self.rollback_orphans,
        }
    }

    pub fn install_timeout(&self) -> Duration {
        Duration::from_secs(self.install_timeout_secs)
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_file_is_default() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = Config::load(&dir.path().join("config.toml")).unwrap();
        assert_eq!(cfg, Config::default());
        assert_eq!(cfg.install_options().retry, RetryPolicy::default());
    }

    #[test]
    fn test_partial_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            "parallel = true\n[retry]\nmax_retries = 7\nbase_delay_ms = 10\n",
        )
        .unwrap();

        let cfg = Config::load(&path).unwrap();
        assert!(cfg.parallel);
        assert!(!cfg.rollback_orphans);
        let policy = cfg.retry.policy();
        assert_eq!(policy.max_retries, 7);
        assert_eq!(policy.base_delay, Duration::from_millis(10));
        assert!((policy.backoff_multiplier - 2.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_unknown_key_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "paralel = true\n").unwrap();
        assert!(matches!(
            Config::load(&path),
            Err(ConfigError::Parse { .. })
        ));
    }
}
