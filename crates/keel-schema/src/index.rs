//! The artifact registry.
//!
//! [`Registry`] is the read interface the resolver consumes. [`PackageIndex`]
//! is the concrete in-memory implementation, loaded from a TOML file with one
//! `[[package]]` table per available version:
//!
//! ```toml
//! [[package]]
//! name = "grpc_ruby"
//! version = "0.6.0"
//! url = "https://github.com/grpc/grpc/archive/release-0_6_0.tar.gz"
//! sha256 = "0671c8b264bd0b087b7699da24b4251fb998657ceb516aa672419aa709f6fb19"
//! homepage = "http://www.grpc.io/"
//! depends_on = ["grpc"]
//! install = ["gem install grpc"]
//! ```

use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;

use crate::spec::{Dependency, PackageSpec};
use crate::types::{PackageName, Sha256Digest, Version};

/// Errors raised while loading or querying a registry.
#[derive(Error, Debug)]
pub enum RegistryError {
    /// No package with this name is known.
    #[error("package '{0}' not found in registry")]
    NotFound(PackageName),

    /// The registry file could not be read.
    #[error("IO error reading registry: {0}")]
    Io(#[from] io::Error),

    /// The registry file is not valid TOML for this schema.
    #[error("registry parse error: {0}")]
    Parse(#[from] toml::de::Error),

    /// A package entry parsed but carries invalid data.
    #[error("invalid registry entry '{package}': {reason}")]
    Invalid {
        /// `name@version` or just the name of the offending entry.
        package: String,
        /// What was wrong with it.
        reason: String,
    },
}

/// Read access to available package versions.
pub trait Registry {
    /// All available versions of `name`, newest first.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::NotFound`] if the name is unknown.
    fn lookup(&self, name: &PackageName) -> Result<&[PackageSpec], RegistryError>;
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct IndexFile {
    #[serde(default)]
    package: Vec<RawPackage>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawPackage {
    name: String,
    version: String,
    url: String,
    sha256: String,
    #[serde(default)]
    depends_on: Vec<String>,
    #[serde(default)]
    install: Vec<String>,
    #[serde(default)]
    test: Vec<String>,
    #[serde(default)]
    homepage: Option<String>,
    #[serde(default)]
    writes: Vec<PathBuf>,
}

impl RawPackage {
    fn into_spec(self) -> Result<PackageSpec, RegistryError> {
        let invalid = |reason: String| RegistryError::Invalid {
            package: format!("{}@{}", self.name, self.version),
            reason,
        };

        let name = PackageName::new(&self.name);
        name.check().map_err(|e| invalid(e.to_string()))?;
        if self.url.trim().is_empty() {
            return Err(invalid("empty url".to_string()));
        }

        let version = Version::parse(&self.version).map_err(|e| invalid(e.to_string()))?;
        let sha256 = Sha256Digest::new(&self.sha256).map_err(|e| invalid(e.to_string()))?;
        let dependencies = self
            .depends_on
            .iter()
            .map(|d| Dependency::parse(d))
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| invalid(e.to_string()))?;

        Ok(PackageSpec {
            name,
            version,
            url: self.url,
            sha256,
            dependencies,
            install: self.install,
            test: self.test,
            homepage: self.homepage,
            writes: self.writes,
        })
    }
}

/// In-memory registry keyed by package name.
#[derive(Debug, Clone, Default)]
pub struct PackageIndex {
    packages: BTreeMap<PackageName, Vec<PackageSpec>>,
}

impl PackageIndex {
    /// An empty index.
    pub fn new() -> Self {
        Self::default()
    }

    /// Load an index from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError`] if the file cannot be read or any entry is
    /// invalid.
    pub fn load(path: &Path) -> Result<Self, RegistryError> {
        let text = fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }

    /// Parse an index from TOML text.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::Parse`] for malformed TOML and
    /// [`RegistryError::Invalid`] for bad versions, digests, dependency
    /// specifiers or duplicate versions.
    pub fn from_toml_str(text: &str) -> Result<Self, RegistryError> {
        let file: IndexFile = toml::from_str(text)?;
        let mut index = Self::new();
        for raw in file.package {
            index.insert(raw.into_spec()?)?;
        }
        Ok(index)
    }

    /// Add one version of a package, keeping versions sorted newest first.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::Invalid`] if this exact version is already
    /// present.
    pub fn insert(&mut self, spec: PackageSpec) -> Result<(), RegistryError> {
        let versions = self.packages.entry(spec.name.clone()).or_default();
        if versions.iter().any(|v| v.version == spec.version) {
            return Err(RegistryError::Invalid {
                package: spec.id(),
                reason: "duplicate version".to_string(),
            });
        }
        let pos = versions.partition_point(|v| v.version > spec.version);
        versions.insert(pos, spec);
        Ok(())
    }

    /// Builder-style [`insert`](Self::insert).
    ///
    /// # Errors
    ///
    /// Same as [`insert`](Self::insert).
    pub fn with(mut self, spec: PackageSpec) -> Result<Self, RegistryError> {
        self.insert(spec)?;
        Ok(self)
    }

    /// All package names, sorted.
    pub fn names(&self) -> impl Iterator<Item = &PackageName> {
        self.packages.keys()
    }

    /// Number of distinct package names.
    pub fn len(&self) -> usize {
        self.packages.len()
    }

    /// Whether the index has no packages.
    pub fn is_empty(&self) -> bool {
        self.packages.is_empty()
    }

    /// Total number of versions across all packages.
    pub fn version_count(&self) -> usize {
        self.packages.values().map(Vec::len).sum()
    }
}

impl Registry for PackageIndex {
    fn lookup(&self, name: &PackageName) -> Result<&[PackageSpec], RegistryError> {
        self.packages
            .get(name)
            .map(Vec::as_slice)
            .ok_or_else(|| RegistryError::NotFound(name.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SHA: &str = "0671c8b264bd0b087b7699da24b4251fb998657ceb516aa672419aa709f6fb19";

    fn sample() -> String {
        format!(
            r#"
[[package]]
name = "grpc_ruby"
version = "0.6"
url = "https://github.com/grpc/grpc/archive/release-0_6_0.tar.gz"
sha256 = "{SHA}"
homepage = "http://www.grpc.io/"
depends_on = ["grpc"]
install = ["gem install grpc"]

[[package]]
name = "grpc"
version = "0.5.0"
url = "https://example.com/grpc-0.5.0.tar.gz"
sha256 = "{SHA}"

[[package]]
name = "grpc"
version = "0.6.1"
url = "https://example.com/grpc-0.6.1.tar.gz"
sha256 = "{SHA}"
depends_on = ["openssl@>=1.0"]
"#
        )
    }

    #[test]
    fn test_load_and_lookup() {
        let index = PackageIndex::from_toml_str(&sample()).unwrap();
        assert_eq!(index.len(), 2);
        assert_eq!(index.version_count(), 3);

        let ruby = index.lookup(&PackageName::new("grpc_ruby")).unwrap();
        assert_eq!(ruby[0].version, Version::new(0, 6, 0));
        assert_eq!(ruby[0].dependencies, vec![Dependency::any("grpc")]);
        assert_eq!(ruby[0].install, vec!["gem install grpc".to_string()]);
        assert_eq!(ruby[0].homepage.as_deref(), Some("http://www.grpc.io/"));
    }

    #[test]
    fn test_versions_sorted_newest_first() {
        let index = PackageIndex::from_toml_str(&sample()).unwrap();
        let grpc = index.lookup(&PackageName::new("GRPC")).unwrap();
        let versions: Vec<String> = grpc.iter().map(|s| s.version.to_string()).collect();
        assert_eq!(versions, vec!["0.6.1", "0.5.0"]);
    }

    #[test]
    fn test_unknown_package() {
        let index = PackageIndex::from_toml_str(&sample()).unwrap();
        let err = index.lookup(&PackageName::new("zlib")).unwrap_err();
        assert!(matches!(err, RegistryError::NotFound(name) if name == "zlib"));
    }

    #[test]
    fn test_rejects_bad_checksum() {
        let text = r#"
[[package]]
name = "broken"
version = "1.0.0"
url = "https://example.com/broken.tar.gz"
sha256 = "abc"
"#;
        let err = PackageIndex::from_toml_str(text).unwrap_err();
        assert!(matches!(err, RegistryError::Invalid { .. }));
    }

    #[test]
    fn test_rejects_duplicate_version() {
        let text = format!(
            r#"
[[package]]
name = "dup"
version = "1.0"
url = "a"
sha256 = "{SHA}"

[[package]]
name = "dup"
version = "1.0.0"
url = "b"
sha256 = "{SHA}"
"#
        );
        let err = PackageIndex::from_toml_str(&text).unwrap_err();
        assert!(err.to_string().contains("duplicate version"));
    }

    #[test]
    fn test_rejects_path_like_name() {
        for name in ["../../outside", "a/b", ".hidden", ""] {
            let text = format!(
                r#"
[[package]]
name = "{name}"
version = "1.0.0"
url = "https://example.com/x.tar.gz"
sha256 = "{SHA}"
"#
            );
            let err = PackageIndex::from_toml_str(&text).unwrap_err();
            assert!(
                matches!(err, RegistryError::Invalid { .. }),
                "{name:?} accepted"
            );
        }
    }

    #[test]
    fn test_rejects_path_like_dependency() {
        let text = format!(
            r#"
[[package]]
name = "app"
version = "1.0.0"
url = "https://example.com/app.tar.gz"
sha256 = "{SHA}"
depends_on = ["../escape"]
"#
        );
        let err = PackageIndex::from_toml_str(&text).unwrap_err();
        assert!(err.to_string().contains("must not contain"));
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("registry.toml");
        fs::write(&path, sample()).unwrap();
        let index = PackageIndex::load(&path).unwrap();
        assert!(!index.is_empty());
    }
}
