//! Package catalog: normalized records, typed dependency edges, and the
//! provider seam.
//!
//! # Overview
//!
//! A [`Catalog`] is the immutable, per-invocation store of every
//! [`PackageRecord`] the provider produced, sorted by FMRI so downstream
//! graph construction and snapshot comparison are deterministic. Providers
//! implement [`CatalogSource`]; the engine never touches transport or file
//! formats directly.
//!
//! # Design
//!
//! Dependency kinds form a closed enumeration consumed by exhaustive
//! matching. Only `require` and `require-any` edges drive recursive
//! expansion; every kind can appear in non-recursive listings subject to
//! type filters.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::error::EngineError;
use crate::fmri::Fmri;

// ---------------------------------------------------------------------------
// Dependency types
// ---------------------------------------------------------------------------

/// The closed set of dependency kinds a record may declare.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DependencyType {
    Require,
    RequireAny,
    Optional,
    Incorporate,
    Conditional,
    Group,
    GroupAny,
    Origin,
    Parent,
    Exclude,
}

/// Every variant, in declaration order. Used for help text and filters.
pub const ALL_DEPENDENCY_TYPES: [DependencyType; 10] = [
    DependencyType::Require,
    DependencyType::RequireAny,
    DependencyType::Optional,
    DependencyType::Incorporate,
    DependencyType::Conditional,
    DependencyType::Group,
    DependencyType::GroupAny,
    DependencyType::Origin,
    DependencyType::Parent,
    DependencyType::Exclude,
];

impl DependencyType {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Require => "require",
            Self::RequireAny => "require-any",
            Self::Optional => "optional",
            Self::Incorporate => "incorporate",
            Self::Conditional => "conditional",
            Self::Group => "group",
            Self::GroupAny => "group-any",
            Self::Origin => "origin",
            Self::Parent => "parent",
            Self::Exclude => "exclude",
        }
    }

    /// Whether edges of this kind are followed during recursive expansion.
    #[must_use]
    pub const fn expands(self) -> bool {
        matches!(self, Self::Require | Self::RequireAny)
    }
}

impl fmt::Display for DependencyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A dependency-type string outside the closed enumeration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown dependency type '{0}'")]
pub struct UnknownDependencyType(pub String);

impl FromStr for DependencyType {
    type Err = UnknownDependencyType;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ALL_DEPENDENCY_TYPES
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| UnknownDependencyType(s.to_string()))
    }
}

// ---------------------------------------------------------------------------
// Records
// ---------------------------------------------------------------------------

/// One declared dependency: a target (name, optionally with an "at or
/// before" version bound carried as its `@version` part) and a kind.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DependencyEdge {
    #[serde(rename = "fmri")]
    target: Fmri,
    #[serde(rename = "type")]
    dep_type: DependencyType,
}

impl DependencyEdge {
    #[must_use]
    pub const fn new(target: Fmri, dep_type: DependencyType) -> Self {
        Self { target, dep_type }
    }

    #[must_use]
    pub const fn target(&self) -> &Fmri {
        &self.target
    }

    #[must_use]
    pub const fn dep_type(&self) -> DependencyType {
        self.dep_type
    }
}

/// One package and the dependency edges it declares. Immutable after load;
/// edges are sorted by target then kind at construction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageRecord {
    fmri: Fmri,
    depends: Vec<DependencyEdge>,
}

impl PackageRecord {
    #[must_use]
    pub fn new(fmri: Fmri, mut depends: Vec<DependencyEdge>) -> Self {
        depends.sort_by(|a, b| {
            a.target
                .cmp(&b.target)
                .then_with(|| a.dep_type.cmp(&b.dep_type))
        });
        Self { fmri, depends }
    }

    #[must_use]
    pub const fn fmri(&self) -> &Fmri {
        &self.fmri
    }

    #[must_use]
    pub fn depends(&self) -> &[DependencyEdge] {
        &self.depends
    }
}

// ---------------------------------------------------------------------------
// Warnings
// ---------------------------------------------------------------------------

/// A non-fatal defect noticed during load: the record survived, possibly
/// degraded (bound dropped, edge skipped). Rendered to stderr by the CLI.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LoadWarning {
    pub origin: String,
    pub message: String,
}

impl LoadWarning {
    #[must_use]
    pub fn new(origin: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            origin: origin.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for LoadWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.origin, self.message)
    }
}

// ---------------------------------------------------------------------------
// Catalog
// ---------------------------------------------------------------------------

/// The normalized store of all package records for one invocation.
///
/// Records are sorted by FMRI; a duplicate FMRI keeps the first occurrence
/// and retains a warning. Two catalogs with equal `records()` slices are
/// interchangeable for every query in this crate.
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    records: Vec<PackageRecord>,
    warnings: Vec<LoadWarning>,
}

impl Catalog {
    /// Normalize `records` (sort, drop duplicate FMRIs) and attach the
    /// provider's warnings.
    #[must_use]
    pub fn new(mut records: Vec<PackageRecord>, mut warnings: Vec<LoadWarning>) -> Self {
        records.sort_by(|a, b| a.fmri().cmp(b.fmri()));
        let mut deduped: Vec<PackageRecord> = Vec::with_capacity(records.len());
        for record in records {
            if deduped.last().is_some_and(|prev| prev.fmri() == record.fmri()) {
                warnings.push(LoadWarning::new(
                    record.fmri().to_string(),
                    "duplicate record for this FMRI, keeping the first",
                ));
                continue;
            }
            deduped.push(record);
        }
        Self {
            records: deduped,
            warnings,
        }
    }

    #[must_use]
    pub fn records(&self) -> &[PackageRecord] {
        &self.records
    }

    #[must_use]
    pub fn warnings(&self) -> &[LoadWarning] {
        &self.warnings
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Provider seam
// ---------------------------------------------------------------------------

/// External data provider for package records.
///
/// `token` must be cheap relative to `load`: the cache layer calls it on
/// every invocation to decide whether a snapshot is still valid, and only
/// falls back to `load` on mismatch.
pub trait CatalogSource {
    /// Human-readable description for logs (path, mode).
    fn describe(&self) -> String;

    /// Current staleness token for the underlying data. Token equality with
    /// a snapshot's stored token means the snapshot is reusable.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::SourceUnavailable`] when the source state
    /// cannot be inspected at all.
    fn token(&self) -> Result<String, EngineError>;

    /// Produce every package record, applying the malformed-record policy:
    /// load-critical defects fail, cosmetic ones degrade with warnings.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::SourceUnavailable`] or
    /// [`EngineError::MalformedRecord`].
    fn load(&self) -> Result<Catalog, EngineError>;
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
