//! The resolved install plan: a dependency-ordered list of concrete versions.

use std::collections::{HashMap, HashSet};
use std::path::PathBuf;

use keel_schema::{PackageName, PackageSpec, Version};
use thiserror::Error;

use crate::paths::Layout;

/// One package version scheduled for installation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlanEntry {
    pub name: PackageName,
    pub version: Version,
    pub spec: PackageSpec,
    /// Direct dependency names, in declaration order.
    pub dependencies: Vec<PackageName>,
}

impl PlanEntry {
    pub fn new(spec: PackageSpec) -> Self {
        Self {
            name: spec.name.clone(),
            version: spec.version.clone(),
            dependencies: spec.dependencies.iter().map(|d| d.name.clone()).collect(),
            spec,
        }
    }

    pub fn id(&self) -> String {
        format!("{}@{}", self.name, self.version)
    }
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum PlanError {
    #[error("package '{0}' appears more than once in the plan")]
    Duplicate(PackageName),

    #[error("'{dependent}' is ordered before its dependency '{dependency}'")]
    OutOfOrder {
        dependent: PackageName,
        dependency: PackageName,
    },

    #[error("'{dependent}' depends on '{dependency}', which is not in the plan")]
    Missing {
        dependent: PackageName,
        dependency: PackageName,
    },
}

/// Dependency-ordered install plan.
///
/// Every entry appears after all of its dependencies. Built by the resolver
/// or validated through [`ResolvedPlan::from_entries`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResolvedPlan {
    entries: Vec<PlanEntry>,
    requested: Vec<PackageName>,
}

impl ResolvedPlan {
    /// Wrap entries that are already known to be ordered.
    pub(crate) fn from_resolved(entries: Vec<PlanEntry>, requested: Vec<PackageName>) -> Self {
        let mut seen = HashSet::new();
        let requested = requested
            .into_iter()
            .filter(|n| seen.insert(n.clone()))
            .collect();
        Self { entries, requested }
    }

    /// Build a plan from hand-assembled entries, checking the ordering.
    ///
    /// # Errors
    ///
    /// Returns [`PlanError`] if a name repeats, a dependency is missing, or a
    /// dependency comes after its dependent.
    pub fn from_entries(
        entries: Vec<PlanEntry>,
        requested: Vec<PackageName>,
    ) -> Result<Self, PlanError> {
        let plan = Self::from_resolved(entries, requested);
        plan.validate()?;
        Ok(plan)
    }

    /// Check that every dependency precedes its dependent.
    ///
    /// # Errors
    ///
    /// See [`ResolvedPlan::from_entries`].
    pub fn validate(&self) -> Result<(), PlanError> {
        let mut index = HashMap::with_capacity(self.entries.len());
        for (i, entry) in self.entries.iter().enumerate() {
            if index.insert(&entry.name, i).is_some() {
                return Err(PlanError::Duplicate(entry.name.clone()));
            }
        }
        for (i, entry) in self.entries.iter().enumerate() {
            for dep in &entry.dependencies {
                match index.get(dep) {
                    None => {
                        return Err(PlanError::Missing {
                            dependent: entry.name.clone(),
                            dependency: dep.clone(),
                        });
                    }
                    Some(&j) if j >= i => {
                        return Err(PlanError::OutOfOrder {
                            dependent: entry.name.clone(),
                            dependency: dep.clone(),
                        });
                    }
                    Some(_) => {}
                }
            }
        }
        Ok(())
    }

    pub fn entries(&self) -> &[PlanEntry] {
        &self.entries
    }

    pub fn iter(&self) -> std::slice::Iter<'_, PlanEntry> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Names the user asked for, deduplicated, in request order.
    pub fn requested(&self) -> &[PackageName] {
        &self.requested
    }

    pub fn is_requested(&self, name: &PackageName) -> bool {
        self.requested.contains(name)
    }

    pub fn position(&self, name: &PackageName) -> Option<usize> {
        self.entries.iter().position(|e| &e.name == name)
    }

    pub fn get(&self, name: &PackageName) -> Option<&PlanEntry> {
        self.entries.iter().find(|e| &e.name == name)
    }

    /// Indices of every entry that depends on `idx`, directly or transitively.
    pub fn dependents_of(&self, idx: usize) -> Vec<usize> {
        let mut affected = HashSet::from([idx]);
        let mut out = Vec::new();
        // Dependents always come later, so a single forward sweep suffices.
        for (i, entry) in self.entries.iter().enumerate().skip(idx + 1) {
            let hit = entry.dependencies.iter().any(|d| {
                self.position(d)
                    .is_some_and(|j| affected.contains(&j))
            });
            if hit {
                affected.insert(i);
                out.push(i);
            }
        }
        out
    }

    /// Group entries into layers where each layer depends only on earlier ones.
    ///
    /// Entries within a layer keep plan order.
    pub fn layers(&self) -> Vec<Vec<usize>> {
        let mut depth: Vec<usize> = Vec::with_capacity(self.entries.len());
        for entry in &self.entries {
            let d = entry
                .dependencies
                .iter()
                .filter_map(|dep| self.position(dep))
                .map(|j| depth[j] + 1)
                .max()
                .unwrap_or(0);
            depth.push(d);
        }

        let mut layers: Vec<Vec<usize>> = Vec::new();
        for (i, d) in depth.into_iter().enumerate() {
            if layers.len() <= d {
                layers.resize_with(d + 1, Vec::new);
            }
            layers[d].push(i);
        }
        layers
    }

    /// Every path an entry's install may touch: its prefix plus declared writes.
    pub fn write_paths(&self, idx: usize, layout: &Layout) -> Vec<PathBuf> {
        let entry = &self.entries[idx];
        let mut paths = vec![layout.prefix(&entry.name, &entry.version)];
        paths.extend(entry.spec.writes.iter().cloned());
        paths
    }

    /// Whether no two entries in `layer` write to the same or nested paths.
    pub fn disjoint_writes(&self, layer: &[usize], layout: &Layout) -> bool {
        let sets: Vec<Vec<PathBuf>> = layer
            .iter()
            .map(|&i| self.write_paths(i, layout))
            .collect();
        for (a, left) in sets.iter().enumerate() {
            for right in &sets[a + 1..] {
                let overlap = left
                    .iter()
                    .any(|l| right.iter().any(|r| l.starts_with(r) || r.starts_with(l)));
                if overlap {
                    return false;
                }
            }
        }
        true
    }
}

impl<'a> IntoIterator for &'a ResolvedPlan {
    type Item = &'a PlanEntry;
    type IntoIter = std::slice::Iter<'a, PlanEntry>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}
