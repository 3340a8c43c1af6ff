//! Constraint resolution.
//!
//! [`resolve`] turns a set of requested `(name, constraint)` pairs into a
//! [`ResolvedPlan`] in two passes:
//!
//! 1. **Selection.** Starting from the requested names, walk the registry
//!    through the currently selected versions, intersect every constraint
//!    that reaches a name, and pick the newest version inside the
//!    intersection. Picking a different version changes which constraints
//!    flow downstream, so selection repeats until nothing changes. A name
//!    whose constraints cannot be met keeps its previous pick for the round;
//!    it only becomes an error once the rest of the selection has settled.
//! 2. **Ordering.** A depth-first traversal with three-color marking over the
//!    selected graph. A back-edge to an in-progress node is a cycle. Nodes are
//!    appended on completion, so dependencies always precede dependents.
//!
//! Resolution is pure: it never touches the filesystem or the network.

use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::fmt;

use keel_schema::constraint::{compare_lower, compare_upper};
use keel_schema::{
    Constraint, Dependency, PackageName, PackageSpec, Range, Registry, RegistryError, Version,
};
use thiserror::Error;
use tracing::debug;

use crate::plan::{PlanEntry, ResolvedPlan};

/// Who imposed a requirement.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Requester {
    /// The user asked for it directly.
    User,
    /// A selected package version declared it as a dependency.
    Package(PackageName, Version),
}

impl fmt::Display for Requester {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::User => f.write_str("requested"),
            Self::Package(name, version) => write!(f, "{name}@{version}"),
        }
    }
}

/// A constraint on one package together with its origin.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Requirement {
    pub constraint: Constraint,
    pub required_by: Requester,
}

/// Why no version of a package can satisfy everyone.
///
/// Always names the two tightest constraints: the one with the highest lower
/// bound and the one with the lowest upper bound. When a single constraint
/// contradicts itself both fields hold it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConflictReport {
    pub package: PackageName,
    pub lower: Requirement,
    pub upper: Requirement,
}

impl ConflictReport {
    /// The two conflicting constraints, lower-bounding one first.
    pub fn constraints(&self) -> [&Constraint; 2] {
        [&self.lower.constraint, &self.upper.constraint]
    }
}

impl fmt::Display for ConflictReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "no version of {} satisfies both '{}' ({}) and '{}' ({})",
            self.package,
            self.lower.constraint,
            self.lower.required_by,
            self.upper.constraint,
            self.upper.required_by
        )
    }
}

#[derive(Error, Debug)]
pub enum ResolveError {
    #[error("package '{name}' not found (required by {required_by})")]
    NotFound {
        name: PackageName,
        required_by: Requester,
    },

    #[error("circular dependency: {}", format_cycle(.members))]
    Cycle { members: Vec<PackageName> },

    #[error("version conflict: {0}")]
    Conflict(ConflictReport),

    #[error("no version of {name} matches '{constraint}' (available: {})", format_versions(.available))]
    NoMatchingVersion {
        name: PackageName,
        constraint: String,
        available: Vec<Version>,
    },

    #[error("version selection did not settle for: {}", format_names(.names))]
    DidNotConverge { names: Vec<PackageName> },

    #[error(transparent)]
    Registry(#[from] RegistryError),
}

fn format_cycle(members: &[PackageName]) -> String {
    let mut path: Vec<&str> = members.iter().map(PackageName::as_str).collect();
    if let Some(first) = members.first() {
        path.push(first.as_str());
    }
    path.join(" -> ")
}

fn format_versions(versions: &[Version]) -> String {
    if versions.is_empty() {
        return "none".to_string();
    }
    versions
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

fn format_names(names: &[PackageName]) -> String {
    names
        .iter()
        .map(PackageName::as_str)
        .collect::<Vec<_>>()
        .join(", ")
}

type Selection<'r> = BTreeMap<PackageName, &'r PackageSpec>;

/// Resolve requested packages into a dependency-ordered install plan.
///
/// Policy: the newest version satisfying every constraint is selected.
///
/// # Errors
///
/// - [`ResolveError::NotFound`] if any reachable name is unknown.
/// - [`ResolveError::Conflict`] if constraints on a name cannot intersect.
/// - [`ResolveError::NoMatchingVersion`] if they intersect but no available
///   version lies inside.
/// - [`ResolveError::Cycle`] if the selected graph has a cycle.
/// - [`ResolveError::DidNotConverge`] if version selection oscillates.
pub fn resolve<R: Registry + ?Sized>(
    registry: &R,
    requested: &[Dependency],
) -> Result<ResolvedPlan, ResolveError> {
    let selected = select_versions(registry, requested)?;
    let plan = order(requested, &selected)?;
    debug!(packages = plan.len(), "resolved install plan");
    Ok(plan)
}

fn select_versions<'r, R: Registry + ?Sized>(
    registry: &'r R,
    requested: &[Dependency],
) -> Result<Selection<'r>, ResolveError> {
    let mut selected: Selection<'r> = BTreeMap::new();
    let mut seen_states: HashSet<Vec<(PackageName, Version)>> = HashSet::new();

    loop {
        let requirements = collect_requirements(requested, &selected);

        let mut next: Selection<'r> = BTreeMap::new();
        let mut blocked: Vec<ResolveError> = Vec::new();
        for (name, reqs) in &requirements {
            match choose(registry, name, reqs) {
                Ok(spec) => {
                    next.insert(name.clone(), spec);
                }
                Err(e @ ResolveError::Registry(_)) => return Err(e),
                Err(e) => {
                    // Requirements may still come from provisional picks;
                    // hold the previous choice until the selection settles.
                    debug!(package = %name, error = %e, "selection blocked this round");
                    if let Some(prev) = selected.get(name) {
                        next.insert(name.clone(), *prev);
                    }
                    blocked.push(e);
                }
            }
        }

        let changed: Vec<PackageName> = next
            .iter()
            .filter(|(name, spec)| {
                selected
                    .get(*name)
                    .is_none_or(|prev| prev.version != spec.version)
            })
            .map(|(name, _)| name.clone())
            .chain(
                selected
                    .keys()
                    .filter(|name| !next.contains_key(*name))
                    .cloned(),
            )
            .collect();

        // Once nothing moves, every requester is at its settled version and
        // a blocked name is a real failure.
        if changed.is_empty() {
            return match blocked.into_iter().next() {
                Some(err) => Err(err),
                None => Ok(next),
            };
        }

        let state = next
            .iter()
            .map(|(name, spec)| (name.clone(), spec.version.clone()))
            .collect();
        if !seen_states.insert(state) {
            return Err(blocked
                .into_iter()
                .next()
                .unwrap_or(ResolveError::DidNotConverge { names: changed }));
        }

        debug!(changed = changed.len(), "version selection round");
        selected = next;
    }
}

/// Gather every constraint reaching each name, following the current
/// selection outward from the requested names in breadth-first order.
fn collect_requirements(
    requested: &[Dependency],
    selected: &Selection<'_>,
) -> BTreeMap<PackageName, Vec<Requirement>> {
    let mut requirements: BTreeMap<PackageName, Vec<Requirement>> = BTreeMap::new();
    let mut queue = VecDeque::new();

    for dep in requested {
        requirements
            .entry(dep.name.clone())
            .or_default()
            .push(Requirement {
                constraint: dep.constraint.clone(),
                required_by: Requester::User,
            });
        queue.push_back(dep.name.clone());
    }

    let mut expanded = HashSet::new();
    while let Some(name) = queue.pop_front() {
        if !expanded.insert(name.clone()) {
            continue;
        }
        let Some(spec) = selected.get(&name) else {
            continue;
        };
        for dep in &spec.dependencies {
            requirements
                .entry(dep.name.clone())
                .or_default()
                .push(Requirement {
                    constraint: dep.constraint.clone(),
                    required_by: Requester::Package(spec.name.clone(), spec.version.clone()),
                });
            queue.push_back(dep.name.clone());
        }
    }

    requirements
}

fn choose<'r, R: Registry + ?Sized>(
    registry: &'r R,
    name: &PackageName,
    reqs: &[Requirement],
) -> Result<&'r PackageSpec, ResolveError> {
    let available = registry.lookup(name).map_err(|e| match e {
        RegistryError::NotFound(_) => ResolveError::NotFound {
            name: name.clone(),
            required_by: reqs[0].required_by.clone(),
        },
        other => ResolveError::Registry(other),
    })?;
    pick(name, reqs, available)
}

fn pick<'r>(
    name: &PackageName,
    reqs: &[Requirement],
    available: &'r [PackageSpec],
) -> Result<&'r PackageSpec, ResolveError> {
    let range = reqs
        .iter()
        .fold(Range::any(), |acc, r| acc.intersect(r.constraint.range()));

    if range.is_empty() {
        return Err(ResolveError::Conflict(tightest_conflict(name, reqs)));
    }

    available
        .iter()
        .filter(|spec| range.contains(&spec.version))
        .max_by(|a, b| a.version.cmp(&b.version))
        .ok_or_else(|| ResolveError::NoMatchingVersion {
            name: name.clone(),
            constraint: reqs
                .iter()
                .map(|r| r.constraint.to_string())
                .collect::<Vec<_>>()
                .join(", "),
            available: available.iter().map(|s| s.version.clone()).collect(),
        })
}

/// Pick the requirement with the highest lower bound and the one with the
/// lowest upper bound. Ties go to the exclusive bound, then to the earliest
/// requirement.
fn tightest_conflict(name: &PackageName, reqs: &[Requirement]) -> ConflictReport {
    if let Some(alone) = reqs.iter().find(|r| r.constraint.range().is_empty()) {
        return ConflictReport {
            package: name.clone(),
            lower: alone.clone(),
            upper: alone.clone(),
        };
    }

    let mut lower = &reqs[0];
    let mut upper = &reqs[0];
    for req in &reqs[1..] {
        let range = req.constraint.range();
        if compare_lower(&range.lower, &lower.constraint.range().lower) == Ordering::Greater {
            lower = req;
        }
        if compare_upper(&range.upper, &upper.constraint.range().upper) == Ordering::Less {
            upper = req;
        }
    }

    ConflictReport {
        package: name.clone(),
        lower: lower.clone(),
        upper: upper.clone(),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mark {
    InProgress,
    Done,
}

fn order(requested: &[Dependency], selected: &Selection<'_>) -> Result<ResolvedPlan, ResolveError> {
    let mut marks: HashMap<PackageName, Mark> = HashMap::new();
    let mut path: Vec<PackageName> = Vec::new();
    let mut entries = Vec::with_capacity(selected.len());

    for dep in requested {
        visit(&dep.name, selected, &mut marks, &mut path, &mut entries)?;
    }

    let requested_names = requested.iter().map(|d| d.name.clone()).collect();
    Ok(ResolvedPlan::from_resolved(entries, requested_names))
}

fn visit(
    name: &PackageName,
    selected: &Selection<'_>,
    marks: &mut HashMap<PackageName, Mark>,
    path: &mut Vec<PackageName>,
    entries: &mut Vec<PlanEntry>,
) -> Result<(), ResolveError> {
    match marks.get(name) {
        Some(Mark::Done) => return Ok(()),
        Some(Mark::InProgress) => {
            let start = path.iter().position(|n| n == name).unwrap_or(0);
            return Err(ResolveError::Cycle {
                members: path[start..].to_vec(),
            });
        }
        None => {}
    }

    // Selection covers every reachable name once it has settled.
    let Some(spec) = selected.get(name) else {
        let required_by = path
            .last()
            .and_then(|parent| selected.get(parent))
            .map_or(Requester::User, |s| {
                Requester::Package(s.name.clone(), s.version.clone())
            });
        return Err(ResolveError::NotFound {
            name: name.clone(),
            required_by,
        });
    };

    marks.insert(name.clone(), Mark::InProgress);
    path.push(name.clone());

    for dep in &spec.dependencies {
        visit(&dep.name, selected, marks, path, entries)?;
    }

    path.pop();
    marks.insert(name.clone(), Mark::Done);
    entries.push(PlanEntry::new((*spec).clone()));
    Ok(())
}
