//! Package metadata: one [`PackageSpec`] per available version.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use crate::constraint::{Constraint, ConstraintError};
use crate::types::{NameError, PackageName, Sha256Digest, Version};

/// Errors produced while parsing a `name@constraint` specifier.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum SpecError {
    /// Nothing before the `@`.
    #[error("invalid package specifier '{0}': missing package name")]
    MissingName(String),

    /// An `@` with nothing after it.
    #[error("invalid package specifier '{0}': missing constraint after @")]
    MissingConstraint(String),

    /// The constraint part did not parse.
    #[error(transparent)]
    Constraint(#[from] ConstraintError),

    /// The name cannot be used as an install directory.
    #[error(transparent)]
    Name(#[from] NameError),
}

/// A named requirement on another package: `grpc` or `openssl@>=1.1`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dependency {
    /// The package required.
    pub name: PackageName,
    /// Versions of that package that are acceptable.
    pub constraint: Constraint,
}

impl Dependency {
    /// A requirement with no version restriction.
    pub fn any(name: impl Into<PackageName>) -> Self {
        Self {
            name: name.into(),
            constraint: Constraint::any(),
        }
    }

    /// Parse a specifier like `grpc` or `grpc@>=0.6`.
    ///
    /// # Errors
    ///
    /// Returns [`SpecError`] if either side of the `@` is empty, the name
    /// looks like a path, or the constraint is malformed.
    pub fn parse(spec: &str) -> Result<Self, SpecError> {
        let spec = spec.trim();
        let dep = match spec.split_once('@') {
            Some((name, constraint)) => {
                if name.trim().is_empty() {
                    return Err(SpecError::MissingName(spec.to_string()));
                }
                if constraint.trim().is_empty() {
                    return Err(SpecError::MissingConstraint(spec.to_string()));
                }
                Self {
                    name: PackageName::new(name),
                    constraint: Constraint::parse(constraint)?,
                }
            }
            None if spec.is_empty() => return Err(SpecError::MissingName(spec.to_string())),
            None => Self::any(spec),
        };
        dep.name.check()?;
        Ok(dep)
    }
}

impl fmt::Display for Dependency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.constraint.is_any() {
            write!(f, "{}", self.name)
        } else {
            write!(f, "{}@{}", self.name, self.constraint)
        }
    }
}

impl FromStr for Dependency {
    type Err = SpecError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

/// Declared metadata for one version of one installable unit.
///
/// Immutable once loaded from the registry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageSpec {
    /// Package name.
    pub name: PackageName,
    /// The concrete version this spec describes.
    pub version: Version,
    /// Where the source artifact is fetched from (URL or local path).
    pub url: String,
    /// Expected SHA-256 of the fetched artifact.
    pub sha256: Sha256Digest,
    /// Requirements on other packages, in declaration order.
    pub dependencies: Vec<Dependency>,
    /// Shell steps that install the unpacked source into `$PREFIX`.
    pub install: Vec<String>,
    /// Shell steps that check an installed package works.
    pub test: Vec<String>,
    /// Project homepage, informational only.
    pub homepage: Option<String>,
    /// Paths outside the package prefix that install steps write to.
    pub writes: Vec<PathBuf>,
}

impl PackageSpec {
    /// A minimal spec with no dependencies or steps.
    pub fn new(
        name: impl Into<PackageName>,
        version: Version,
        url: &str,
        sha256: Sha256Digest,
    ) -> Self {
        Self {
            name: name.into(),
            version,
            url: url.to_string(),
            sha256,
            dependencies: Vec::new(),
            install: Vec::new(),
            test: Vec::new(),
            homepage: None,
            writes: Vec::new(),
        }
    }

    /// Append a dependency, builder style.
    pub fn with_dependency(mut self, dependency: Dependency) -> Self {
        self.dependencies.push(dependency);
        self
    }

    /// Append install steps, builder style.
    pub fn with_install_steps<I, S>(mut self, steps: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.install.extend(steps.into_iter().map(Into::into));
        self
    }

    /// `name@version`, for logs and messages.
    pub fn id(&self) -> String {
        format!("{}@{}", self.name, self.version)
    }
}
