//! Version constraints as intervals.
//!
//! Constraints are written in `semver` requirement syntax (`>=2.0`, `<1.5`,
//! `^1.2`, `~1.2.3`, `1.*`, `>=1.0, <2.0`). Each one is normalized into a
//! single [`Range`] so that intersections and emptiness are exact, which the
//! resolver needs to explain conflicts rather than just detect them.
//!
//! A bare version without an operator (`1.2.3`, `1.2`) pins that version or
//! version prefix, matching how package specs such as `grpc@0.6.0` are read.

use std::cmp::Ordering;
use std::fmt;
use std::ops::Bound;
use std::str::FromStr;

use semver::{Comparator, Op, VersionReq};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::types::Version;

/// Errors produced while parsing a constraint.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum ConstraintError {
    /// The expression is not valid `semver` requirement syntax.
    #[error("invalid version constraint '{raw}': {reason}")]
    Syntax {
        /// The expression as written.
        raw: String,
        /// Parser message.
        reason: String,
    },

    /// The expression uses an operator this resolver cannot model.
    #[error("unsupported operator in version constraint '{0}'")]
    Unsupported(String),
}

/// A contiguous interval of versions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Range {
    /// Lowest admissible version.
    pub lower: Bound<semver::Version>,
    /// Highest admissible version.
    pub upper: Bound<semver::Version>,
}

impl Range {
    /// The range that admits every version.
    pub fn any() -> Self {
        Self {
            lower: Bound::Unbounded,
            upper: Bound::Unbounded,
        }
    }

    /// Whether `version` lies inside the range.
    pub fn contains(&self, version: &Version) -> bool {
        let v = version.as_semver();
        let above = match &self.lower {
            Bound::Unbounded => true,
            Bound::Included(lo) => v >= lo,
            Bound::Excluded(lo) => v > lo,
        };
        let below = match &self.upper {
            Bound::Unbounded => true,
            Bound::Included(hi) => v <= hi,
            Bound::Excluded(hi) => v < hi,
        };
        above && below
    }

    /// Whether no version can satisfy the range.
    pub fn is_empty(&self) -> bool {
        match (&self.lower, &self.upper) {
            (Bound::Included(lo), Bound::Included(hi)) => lo > hi,
            (Bound::Included(lo) | Bound::Excluded(lo), Bound::Included(hi) | Bound::Excluded(hi)) => {
                lo >= hi
            }
            _ => false,
        }
    }

    /// The overlap of two ranges (possibly empty).
    pub fn intersect(&self, other: &Self) -> Self {
        let lower = if compare_lower(&self.lower, &other.lower) == Ordering::Less {
            other.lower.clone()
        } else {
            self.lower.clone()
        };
        let upper = if compare_upper(&self.upper, &other.upper) == Ordering::Greater {
            other.upper.clone()
        } else {
            self.upper.clone()
        };
        Self { lower, upper }
    }
}

/// Order two lower bounds by how much they restrict: greater means tighter.
pub fn compare_lower(a: &Bound<semver::Version>, b: &Bound<semver::Version>) -> Ordering {
    match (a, b) {
        (Bound::Unbounded, Bound::Unbounded) => Ordering::Equal,
        (Bound::Unbounded, _) => Ordering::Less,
        (_, Bound::Unbounded) => Ordering::Greater,
        (Bound::Included(x), Bound::Included(y)) | (Bound::Excluded(x), Bound::Excluded(y)) => {
            x.cmp(y)
        }
        (Bound::Included(x), Bound::Excluded(y)) => x.cmp(y).then(Ordering::Less),
        (Bound::Excluded(x), Bound::Included(y)) => x.cmp(y).then(Ordering::Greater),
    }
}

/// Order two upper bounds by position: less means tighter.
pub fn compare_upper(a: &Bound<semver::Version>, b: &Bound<semver::Version>) -> Ordering {
    match (a, b) {
        (Bound::Unbounded, Bound::Unbounded) => Ordering::Equal,
        (Bound::Unbounded, _) => Ordering::Greater,
        (_, Bound::Unbounded) => Ordering::Less,
        (Bound::Included(x), Bound::Included(y)) | (Bound::Excluded(x), Bound::Excluded(y)) => {
            x.cmp(y)
        }
        (Bound::Included(x), Bound::Excluded(y)) => x.cmp(y).then(Ordering::Greater),
        (Bound::Excluded(x), Bound::Included(y)) => x.cmp(y).then(Ordering::Less),
    }
}

/// A parsed version constraint together with its original spelling.
///
/// # Example
///
/// ```
/// use keel_schema::{Constraint, Version};
///
/// let newer: Constraint = ">=2.0".parse().unwrap();
/// let older: Constraint = "<1.5".parse().unwrap();
///
/// assert!(newer.matches(&Version::new(2, 1, 0)));
/// assert!(newer.range().intersect(older.range()).is_empty());
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Constraint {
    raw: String,
    range: Range,
}

impl Constraint {
    /// The constraint that admits every version (`*`).
    pub fn any() -> Self {
        Self {
            raw: "*".to_string(),
            range: Range::any(),
        }
    }

    /// Parse a constraint expression.
    ///
    /// # Errors
    ///
    /// Returns [`ConstraintError`] for malformed expressions or operators that
    /// cannot be expressed as a single interval.
    pub fn parse(raw: &str) -> Result<Self, ConstraintError> {
        let raw = raw.trim();
        if raw.is_empty() || raw == "*" || raw == "latest" {
            return Ok(Self::any());
        }

        // A bare version pins it instead of taking semver's implicit caret.
        let expr = if raw.starts_with(|c: char| c.is_ascii_digit())
            && !raw.contains([',', '*', 'x', 'X'])
        {
            format!("={raw}")
        } else {
            raw.to_string()
        };

        let req = VersionReq::parse(&expr).map_err(|e| ConstraintError::Syntax {
            raw: raw.to_string(),
            reason: e.to_string(),
        })?;

        let mut range = Range::any();
        for comparator in &req.comparators {
            let bounds = comparator_range(comparator)
                .ok_or_else(|| ConstraintError::Unsupported(raw.to_string()))?;
            range = range.intersect(&bounds);
        }

        Ok(Self {
            raw: raw.to_string(),
            range,
        })
    }

    /// Build a constraint that admits exactly one version.
    pub fn exact(version: &Version) -> Self {
        let v = version.as_semver().clone();
        Self {
            raw: format!("={version}"),
            range: Range {
                lower: Bound::Included(v.clone()),
                upper: Bound::Included(v),
            },
        }
    }

    /// Whether `version` satisfies the constraint.
    pub fn matches(&self, version: &Version) -> bool {
        self.range.contains(version)
    }

    /// The interval this constraint admits.
    pub fn range(&self) -> &Range {
        &self.range
    }

    /// The expression as it was written.
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// Whether this constraint admits every version.
    pub fn is_any(&self) -> bool {
        self.range == Range::any()
    }
}

impl Default for Constraint {
    fn default() -> Self {
        Self::any()
    }
}

impl fmt::Display for Constraint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

impl FromStr for Constraint {
    type Err = ConstraintError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl Serialize for Constraint {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.raw)
    }
}

impl<'de> Deserialize<'de> for Constraint {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::parse(&s).map_err(serde::de::Error::custom)
    }
}

fn version(major: u64, minor: u64, patch: u64, pre: &semver::Prerelease) -> semver::Version {
    let mut v = semver::Version::new(major, minor, patch);
    v.pre = pre.clone();
    v
}

/// Translate one comparator into an interval. Returns `None` for operators
/// added to `semver` after this was written.
fn comparator_range(c: &Comparator) -> Option<Range> {
    let none = semver::Prerelease::EMPTY;
    let major = c.major;
    let floor = version(major, c.minor.unwrap_or(0), c.patch.unwrap_or(0), &c.pre);

    // Exclusive ceiling of the most specific component that was written.
    let next_component = match (c.minor, c.patch) {
        (None, _) => version(major + 1, 0, 0, &none),
        (Some(minor), None) => version(major, minor + 1, 0, &none),
        (Some(minor), Some(patch)) => version(major, minor, patch + 1, &none),
    };

    let range = match c.op {
        Op::Exact => match c.patch {
            Some(_) => Range {
                lower: Bound::Included(floor.clone()),
                upper: Bound::Included(floor),
            },
            None => Range {
                lower: Bound::Included(floor),
                upper: Bound::Excluded(next_component),
            },
        },
        Op::Greater => match c.patch {
            Some(_) => Range {
                lower: Bound::Excluded(floor),
                upper: Bound::Unbounded,
            },
            None => Range {
                lower: Bound::Included(next_component),
                upper: Bound::Unbounded,
            },
        },
        Op::GreaterEq => Range {
            lower: Bound::Included(floor),
            upper: Bound::Unbounded,
        },
        Op::Less => Range {
            lower: Bound::Unbounded,
            upper: Bound::Excluded(floor),
        },
        Op::LessEq => match c.patch {
            Some(_) => Range {
                lower: Bound::Unbounded,
                upper: Bound::Included(floor),
            },
            None => Range {
                lower: Bound::Unbounded,
                upper: Bound::Excluded(next_component),
            },
        },
        Op::Tilde => {
            let ceiling = match c.minor {
                Some(minor) => version(major, minor + 1, 0, &none),
                None => version(major + 1, 0, 0, &none),
            };
            Range {
                lower: Bound::Included(floor),
                upper: Bound::Excluded(ceiling),
            }
        }
        Op::Caret => {
            let ceiling = match (major, c.minor, c.patch) {
                (0, Some(0), Some(patch)) => version(0, 0, patch + 1, &none),
                (0, Some(0), None) => version(0, 1, 0, &none),
                (0, Some(minor), _) => version(0, minor + 1, 0, &none),
                _ => version(major + 1, 0, 0, &none),
            };
            Range {
                lower: Bound::Included(floor),
                upper: Bound::Excluded(ceiling),
            }
        }
        Op::Wildcard => Range {
            lower: Bound::Included(floor),
            upper: Bound::Excluded(next_component),
        },
        _ => return None,
    };

    Some(range)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn v(s: &str) -> Version {
        Version::parse(s).unwrap()
    }

    fn c(s: &str) -> Constraint {
        Constraint::parse(s).unwrap()
    }

    #[test]
    fn test_any() {
        assert!(c("*").is_any());
        assert!(c("").matches(&v("0.0.1")));
        assert!(c("latest").matches(&v("99.0.0")));
    }

    #[test]
    fn test_bare_version_is_exact() {
        let pinned = c("0.6.0");
        assert!(pinned.matches(&v("0.6.0")));
        assert!(!pinned.matches(&v("0.6.1")));

        let prefix = c("1.2");
        assert!(prefix.matches(&v("1.2.9")));
        assert!(!prefix.matches(&v("1.3.0")));
    }

    #[test]
    fn test_operators() {
        assert!(c(">=2.0").matches(&v("2.0.0")));
        assert!(!c(">=2.0").matches(&v("1.9.9")));
        assert!(c("<1.5").matches(&v("1.4.9")));
        assert!(!c("<1.5").matches(&v("1.5.0")));
        assert!(!c(">1.2").matches(&v("1.2.7")));
        assert!(c(">1.2").matches(&v("1.3.0")));
        assert!(c("<=1.5").matches(&v("1.5.3")));
        assert!(c("~1.2.3").matches(&v("1.2.9")));
        assert!(!c("~1.2.3").matches(&v("1.3.0")));
        assert!(c("^0.2.3").matches(&v("0.2.9")));
        assert!(!c("^0.2.3").matches(&v("0.3.0")));
        assert!(c("^1.2").matches(&v("1.9.0")));
        assert!(c("1.*").matches(&v("1.7.0")));
        assert!(!c("1.*").matches(&v("2.0.0")));
    }

    #[test]
    fn test_compound_range() {
        let range = c(">=1.0, <2.0");
        assert!(range.matches(&v("1.5.0")));
        assert!(!range.matches(&v("2.0.0")));
        assert!(!range.matches(&v("0.9.0")));
    }

    #[test]
    fn test_intersection_emptiness() {
        let newer = c(">=2.0");
        let older = c("<1.5");
        assert!(newer.range().intersect(older.range()).is_empty());

        let touching = c(">=1.5").range().intersect(c("<=1.5.0").range());
        assert!(!touching.is_empty());

        let open = c(">1.5.0").range().intersect(c("<=1.5.0").range());
        assert!(open.is_empty());

        assert!(c(">=2.0, <1.0").range().is_empty());
    }

    #[test]
    fn test_bound_tightness() {
        let included = Bound::Included(semver::Version::new(1, 0, 0));
        let excluded = Bound::Excluded(semver::Version::new(1, 0, 0));
        assert_eq!(compare_lower(&excluded, &included), Ordering::Greater);
        assert_eq!(compare_upper(&excluded, &included), Ordering::Less);
        assert_eq!(compare_lower(&Bound::Unbounded, &included), Ordering::Less);
        assert_eq!(compare_upper(&Bound::Unbounded, &included), Ordering::Greater);
    }

    #[test]
    fn test_invalid() {
        assert!(matches!(
            Constraint::parse(">>1"),
            Err(ConstraintError::Syntax { .. })
        ));
    }

    #[test]
    fn test_display_keeps_spelling() {
        assert_eq!(c(">=2.0").to_string(), ">=2.0");
        assert_eq!(c("0.6.0").to_string(), "0.6.0");
    }
}
