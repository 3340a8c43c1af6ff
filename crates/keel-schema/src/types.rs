//! Newtypes for package identity: names, versions and content digests.

use std::borrow::Borrow;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// A normalized package name.
///
/// Package names are automatically lowercased to ensure consistent lookups
/// and comparisons, so `GRPC` and `grpc` refer to the same package.
///
/// # Example
///
/// ```
/// use keel_schema::PackageName;
///
/// let name = PackageName::new("GRPC_Ruby");
/// assert_eq!(name.as_str(), "grpc_ruby");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub struct PackageName(String);

impl PackageName {
    /// Create a new package name, normalizing to lowercase and trimming whitespace.
    pub fn new(name: &str) -> Self {
        Self(name.trim().to_lowercase())
    }

    /// Get the normalized package name as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Check that the name can stand as a single directory name under the
    /// install root.
    ///
    /// # Errors
    ///
    /// Returns [`NameError`] for empty names, names containing `/`, `\` or
    /// `..`, and names starting with `.`.
    pub fn check(&self) -> Result<(), NameError> {
        let name = self.as_str();
        if name.is_empty() {
            return Err(NameError::Empty);
        }
        if name.contains(['/', '\\']) || name.contains("..") || name.starts_with('.') {
            return Err(NameError::PathLike(name.to_string()));
        }
        Ok(())
    }
}

/// Error produced when a package name cannot be used on disk.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum NameError {
    /// The name is empty after trimming.
    #[error("empty package name")]
    Empty,

    /// The name contains a path separator, `..`, or a leading dot.
    #[error("package name '{0}' must not contain '/', '\\', '..' or start with '.'")]
    PathLike(String),
}

impl fmt::Display for PackageName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::ops::Deref for PackageName {
    type Target = str;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl AsRef<str> for PackageName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl AsRef<std::path::Path> for PackageName {
    fn as_ref(&self) -> &std::path::Path {
        std::path::Path::new(&self.0)
    }
}

impl Borrow<str> for PackageName {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl PartialEq<str> for PackageName {
    fn eq(&self, other: &str) -> bool {
        self.0 == other.to_lowercase()
    }
}

impl PartialEq<&str> for PackageName {
    fn eq(&self, other: &&str) -> bool {
        self.0 == other.to_lowercase()
    }
}

impl From<&str> for PackageName {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for PackageName {
    fn from(s: String) -> Self {
        Self::new(&s)
    }
}

impl From<PackageName> for String {
    fn from(name: PackageName) -> Self {
        name.0
    }
}

/// A concrete package version.
///
/// Wraps [`semver::Version`] but accepts the shorter forms commonly found in
/// package recipes: `0.6` becomes `0.6.0`, `v1` becomes `1.0.0`.
///
/// # Example
///
/// ```
/// use keel_schema::Version;
///
/// let version: Version = "0.6".parse().unwrap();
/// assert_eq!(version.to_string(), "0.6.0");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Version(semver::Version);

impl Version {
    /// Build a version from its three numeric components.
    pub fn new(major: u64, minor: u64, patch: u64) -> Self {
        Self(semver::Version::new(major, minor, patch))
    }

    /// Parse a version, padding missing minor/patch components with zero.
    ///
    /// # Errors
    ///
    /// Returns the underlying [`semver::Error`] when the padded string is still
    /// not a valid semantic version.
    pub fn parse(s: &str) -> Result<Self, semver::Error> {
        let trimmed = s.trim();
        let trimmed = trimmed.strip_prefix('v').unwrap_or(trimmed);

        let split_at = trimmed.find(['-', '+']).unwrap_or(trimmed.len());
        let (core, rest) = trimmed.split_at(split_at);
        let padded = match core.split('.').count() {
            1 => format!("{core}.0.0{rest}"),
            2 => format!("{core}.0{rest}"),
            _ => trimmed.to_string(),
        };

        semver::Version::parse(&padded).map(Self)
    }

    /// Borrow the underlying semantic version.
    pub fn as_semver(&self) -> &semver::Version {
        &self.0
    }
}

impl FromStr for Version {
    type Err = semver::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl From<semver::Version> for Version {
    fn from(v: semver::Version) -> Self {
        Self(v)
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

impl Serialize for Version {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for Version {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::parse(&s).map_err(serde::de::Error::custom)
    }
}

/// Error produced when a string is not a valid SHA-256 digest.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum DigestError {
    /// The digest does not have exactly 64 hex characters.
    #[error("invalid SHA256 digest: expected 64 hex characters, got {0}")]
    Length(usize),

    /// The digest contains characters outside `[0-9a-fA-F]`.
    #[error("invalid SHA256 digest: contains non-hex characters in '{0}'")]
    NonHex(String),
}

/// A validated SHA256 digest (64 lowercase hex characters).
///
/// This newtype ensures that all digests in the system are validated at
/// deserialization time, preventing invalid hex strings from propagating
/// through the installer.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct Sha256Digest(String);

impl Sha256Digest {
    /// Create a new digest, validating the input.
    ///
    /// Accepts strings with or without a `sha256:` prefix and normalizes to
    /// lowercase.
    ///
    /// # Errors
    ///
    /// Returns [`DigestError`] if the digest is not exactly 64 hex characters.
    pub fn new(s: &str) -> Result<Self, DigestError> {
        let hex = s.trim();
        let hex = hex.strip_prefix("sha256:").unwrap_or(hex);

        if hex.len() != 64 {
            return Err(DigestError::Length(hex.len()));
        }
        if !hex.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(DigestError::NonHex(s.to_string()));
        }

        Ok(Self(hex.to_lowercase()))
    }

    /// Build a digest from raw hash output bytes.
    pub fn from_bytes(bytes: &[u8; 32]) -> Self {
        Self(hex::encode(bytes))
    }

    /// Get the digest as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl<'de> Deserialize<'de> for Sha256Digest {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::new(&s).map_err(serde::de::Error::custom)
    }
}

impl fmt::Display for Sha256Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for Sha256Digest {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl FromStr for Sha256Digest {
    type Err = DigestError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_package_name_normalizes() {
        let name = PackageName::new("  Grpc ");
        assert_eq!(name, "grpc");
        assert_eq!(name.as_str(), "grpc");
    }

    #[test]
    fn test_package_name_check() {
        assert!(PackageName::new("grpc_ruby").check().is_ok());
        assert!(PackageName::new("libfoo-1.2").check().is_ok());
        assert_eq!(PackageName::new("  ").check(), Err(NameError::Empty));
        for bad in ["../../outside", "a/b", "a\\b", ".hidden", "a..b"] {
            assert!(
                matches!(PackageName::new(bad).check(), Err(NameError::PathLike(_))),
                "{bad} accepted"
            );
        }
    }

    #[test]
    fn test_version_padding() {
        assert_eq!(Version::parse("0.6").unwrap(), Version::new(0, 6, 0));
        assert_eq!(Version::parse("v2").unwrap(), Version::new(2, 0, 0));
        assert_eq!(Version::parse("1.2.3").unwrap(), Version::new(1, 2, 3));
        assert_eq!(
            Version::parse("1.2-rc.1").unwrap().to_string(),
            "1.2.0-rc.1"
        );
        assert!(Version::parse("release-0_6_0").is_err());
    }

    #[test]
    fn test_version_ordering() {
        let older = Version::parse("1.9.0").unwrap();
        let newer = Version::parse("1.10.0").unwrap();
        assert!(newer > older);
    }

    #[test]
    fn test_digest_validation() {
        let hex = "0671c8b264bd0b087b7699da24b4251fb998657ceb516aa672419aa709f6fb19";
        let digest = Sha256Digest::new(&format!("sha256:{}", hex.to_uppercase())).unwrap();
        assert_eq!(digest.as_str(), hex);

        assert_eq!(Sha256Digest::new("abc"), Err(DigestError::Length(3)));
        let bad = "z".repeat(64);
        assert!(matches!(Sha256Digest::new(&bad), Err(DigestError::NonHex(_))));
    }
}
