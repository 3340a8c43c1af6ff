use dirs::home_dir;
use keel_schema::{PackageName, Sha256Digest, Version};
use std::path::{Path, PathBuf};

/// Returns the keel home directory, or None if the user's home cannot be resolved.
///
/// `KEEL_HOME` takes precedence over `~/.keel`.
pub fn try_keel_home() -> Option<PathBuf> {
    if let Some(val) = std::env::var_os("KEEL_HOME") {
        return Some(PathBuf::from(val));
    }
    home_dir().map(|h| h.join(".keel"))
}

/// On-disk layout rooted at a keel home directory.
///
/// ```text
/// <home>/
/// ├── store/<name>/<version>/   # package prefixes
/// ├── cache/<sha256>            # verified source artifacts
/// ├── tmp/                      # unpack scratch space (same volume as store)
/// ├── logs/                     # install/test step output
/// ├── registry.toml
/// ├── config.toml
/// └── state.db
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Layout {
    home: PathBuf,
}

impl Layout {
    pub fn new(home: impl Into<PathBuf>) -> Self {
        Self { home: home.into() }
    }

    pub fn home(&self) -> &Path {
        &self.home
    }

    /// `SQLite` database path: <home>/state.db
    pub fn db_path(&self) -> PathBuf {
        self.home.join("state.db")
    }

    /// Package store path: <home>/store
    pub fn store_path(&self) -> PathBuf {
        self.home.join("store")
    }

    /// Cache path: <home>/cache
    pub fn cache_path(&self) -> PathBuf {
        self.home.join("cache")
    }

    /// Temp path: <home>/tmp
    pub fn tmp_path(&self) -> PathBuf {
        self.home.join("tmp")
    }

    /// Logs directory: <home>/logs
    pub fn log_dir(&self) -> PathBuf {
        self.home.join("logs")
    }

    pub fn registry_path(&self) -> PathBuf {
        self.home.join("registry.toml")
    }

    pub fn config_path(&self) -> PathBuf {
        self.home.join("config.toml")
    }

    /// Install prefix for one package version: <home>/store/<name>/<version>
    pub fn prefix(&self, name: &PackageName, version: &Version) -> PathBuf {
        self.store_path()
            .join(name.as_str())
            .join(version.to_string())
    }

    /// Cached artifact location, keyed by content hash.
    pub fn cached_artifact(&self, digest: &Sha256Digest) -> PathBuf {
        self.cache_path().join(digest.as_str())
    }

    /// Create every directory in the layout.
    ///
    /// # Errors
    ///
    /// Returns the first IO error encountered.
    pub fn ensure(&self) -> std::io::Result<()> {
        for dir in [
            self.store_path(),
            self.cache_path(),
            self.tmp_path(),
            self.log_dir(),
        ] {
            std::fs::create_dir_all(dir)?;
        }
        Ok(())
    }
}

/// Generate a step log path for a package
pub fn step_log_path(log_dir: &Path, phase: &str, name: &PackageName, version: &Version) -> PathBuf {
    let timestamp = chrono::Utc::now().format("%Y%m%d-%H%M%S");
    log_dir.join(format!("{phase}-{name}-{version}-{timestamp}.log"))
}

/// Extract the filename from a URL.
///
/// # Example
///
/// ```
/// use keel_core::paths::filename_from_url;
///
/// assert_eq!(filename_from_url("https://example.com/path/to/file.tar.gz"), "file.tar.gz");
/// assert_eq!(filename_from_url(""), "");
/// ```
pub fn filename_from_url(url: &str) -> &str {
    url.split('/').next_back().unwrap_or("")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prefix_layout() {
        let layout = Layout::new("/opt/keel");
        let prefix = layout.prefix(&PackageName::new("Grpc"), &Version::new(0, 6, 0));
        assert_eq!(prefix, PathBuf::from("/opt/keel/store/grpc/0.6.0"));
    }

    #[test]
    fn test_ensure_creates_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let layout = Layout::new(dir.path().join("home"));
        layout.ensure().unwrap();
        assert!(layout.store_path().is_dir());
        assert!(layout.cache_path().is_dir());
        assert!(layout.tmp_path().is_dir());
        assert!(layout.log_dir().is_dir());
    }
}
