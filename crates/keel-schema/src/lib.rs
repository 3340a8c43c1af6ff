//! Shared types and registry format for keel.
//!
//! This crate holds everything both the resolver and the installer agree on:
//! normalized package names, versions, checksums, the version [`Constraint`]
//! algebra, [`PackageSpec`] metadata and the [`Registry`] read interface.

pub mod constraint;
pub mod index;
pub mod spec;
pub mod types;

// Re-exports
pub use constraint::{Constraint, ConstraintError, Range};
pub use index::{PackageIndex, Registry, RegistryError};
pub use spec::{Dependency, PackageSpec, SpecError};
pub use types::{DigestError, NameError, PackageName, Sha256Digest, Version};
