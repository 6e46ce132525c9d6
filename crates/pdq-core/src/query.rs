//! Query engine: the three traversals over the dependency graph.
//!
//! # Overview
//!
//! [`depends`] walks outgoing edges (what a package requires), [`dependants`]
//! walks incoming edges (what requires a package), and [`no_dependants`]
//! reports the packages nothing requires, optionally extended by the
//! ring-fence closure. All three produce an ordered stream of
//! [`ResultRecord`]s: each resolved root at depth 0 with no edge type, then
//! edge records at depth 1 and below, children in name-then-version order.
//!
//! # Design
//!
//! One depth-first walker serves both edge directions. Roots are marked
//! visited before expansion begins, so a cycle back to a root is flagged
//! rather than re-entered. Only require and require-any edges to known
//! packages are expanded; everything else is emitted as a non-expandable
//! record. Flags record why expansion stopped: a repeat
//! ([`ResultFlag::AlreadyExpanded`]) or the depth cap
//! ([`ResultFlag::DepthTruncated`]).

use std::collections::{BTreeMap, BTreeSet, HashSet};

use petgraph::Direction;
use petgraph::graph::NodeIndex;
use serde::{Deserialize, Serialize};
use tracing::instrument;

use crate::catalog::DependencyType;
use crate::error::EngineError;
use crate::fmri::Fmri;
use crate::graph::{DependencyGraph, TypeFilter};
use crate::ringfence::ring_fence;

// ---------------------------------------------------------------------------
// Options
// ---------------------------------------------------------------------------

/// Which query is being run. Used for option validation and log context.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Depends,
    Dependants,
    NoDependants,
}

impl Operation {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Depends => "depends",
            Self::Dependants => "dependants",
            Self::NoDependants => "no-dependants",
        }
    }
}

/// Output shape: an indented tree, or a flat deduplicated name list.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ListingMode {
    #[default]
    Tree,
    Names,
    NamesWithTypes,
}

/// Traversal controls shared by all queries.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryOpts {
    /// Expand require / require-any targets transitively.
    pub recurse: bool,
    /// Deepest depth to emit (minimum 1; the CLI enforces this). Edges whose
    /// expansion would go deeper are flagged instead of expanded.
    pub max_depth: Option<usize>,
    /// Expand a target once per distinct path instead of once per traversal.
    /// Targets on the current path are still flagged, which breaks cycles.
    pub allow_repeats: bool,
    /// Require full FMRI equality when resolving the queried package.
    pub exact: bool,
    /// Edge filter applied before emission and expansion.
    pub filter: TypeFilter,
    pub listing: ListingMode,
}

/// Reject option combinations the engine cannot honor, before any catalog
/// or graph work happens.
///
/// # Errors
///
/// `UnsupportedOption` when latest mode is combined with a reverse or leaf
/// query, or with recursion over a package that is not fully versioned.
pub fn validate_options(
    op: Operation,
    latest: bool,
    recurse: bool,
    target: Option<&Fmri>,
) -> Result<(), EngineError> {
    if latest && op != Operation::Depends {
        return Err(EngineError::UnsupportedOption {
            reason: format!(
                "latest mode supports only the depends operation, not {}",
                op.as_str()
            ),
        });
    }
    if latest && recurse && target.is_none_or(|fmri| fmri.version().is_none()) {
        return Err(EngineError::UnsupportedOption {
            reason: "recursion in latest mode requires a fully versioned package".to_string(),
        });
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Result stream
// ---------------------------------------------------------------------------

/// Why a record was not expanded further.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ResultFlag {
    #[default]
    None,
    AlreadyExpanded,
    DepthTruncated,
}

impl ResultFlag {
    #[must_use]
    #[allow(clippy::trivially_copy_pass_by_ref)] // serde's skip_serializing_if requires &T -> bool
    pub const fn is_none(&self) -> bool {
        matches!(self, Self::None)
    }
}

/// One line of query output: an FMRI at a depth, with the edge type it was
/// reached by (roots and leaf listings carry none) and an expansion flag.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResultRecord {
    pub fmri: Fmri,
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub dep_type: Option<DependencyType>,
    pub depth: usize,
    #[serde(default, skip_serializing_if = "ResultFlag::is_none")]
    pub flag: ResultFlag,
}

/// One entry of a flat names listing; `types` is populated only in
/// names-with-types mode.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NamesEntry {
    pub fmri: Fmri,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub types: Vec<DependencyType>,
}

/// A complete query result in its requested shape.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Listing {
    Tree(Vec<ResultRecord>),
    Names(Vec<NamesEntry>),
}

impl Listing {
    #[must_use]
    pub fn len(&self) -> usize {
        match self {
            Self::Tree(records) => records.len(),
            Self::Names(entries) => entries.len(),
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

// ---------------------------------------------------------------------------
// Traversal
// ---------------------------------------------------------------------------

struct Walker<'g> {
    graph: &'g DependencyGraph,
    opts: &'g QueryOpts,
    direction: Direction,
    expanded: HashSet<NodeIndex>,
    path: Vec<NodeIndex>,
    records: Vec<ResultRecord>,
}

impl<'g> Walker<'g> {
    fn new(graph: &'g DependencyGraph, opts: &'g QueryOpts, direction: Direction) -> Self {
        Self {
            graph,
            opts,
            direction,
            expanded: HashSet::new(),
            path: Vec::new(),
            records: Vec::new(),
        }
    }

    fn walk(mut self, roots: &[Fmri]) -> Vec<ResultRecord> {
        let root_nodes: Vec<NodeIndex> =
            roots.iter().filter_map(|fmri| self.graph.node(fmri)).collect();
        // All roots count as visited before any expansion begins.
        self.expanded.extend(&root_nodes);
        for &root in &root_nodes {
            self.records.push(ResultRecord {
                fmri: self.graph.fmri(root).clone(),
                dep_type: None,
                depth: 0,
                flag: ResultFlag::None,
            });
            self.path.push(root);
            self.expand(root, 0);
            self.path.pop();
        }
        self.records
    }

    fn edges(&self, idx: NodeIndex) -> Vec<(NodeIndex, DependencyType)> {
        match self.direction {
            Direction::Outgoing => self.graph.outgoing(idx, &self.opts.filter),
            Direction::Incoming => self.graph.incoming(idx, &self.opts.filter),
        }
    }

    fn expand(&mut self, idx: NodeIndex, depth: usize) {
        let child_depth = depth + 1;
        for (other, dep_type) in self.edges(idx) {
            let expandable =
                self.opts.recurse && dep_type.expands() && self.graph.is_package(other);
            if !expandable {
                self.emit(other, dep_type, child_depth, ResultFlag::None);
                continue;
            }

            let repeated = if self.opts.allow_repeats {
                self.path.contains(&other)
            } else {
                self.expanded.contains(&other)
            };
            if repeated {
                self.emit(other, dep_type, child_depth, ResultFlag::AlreadyExpanded);
                continue;
            }

            // Expanding `other` would emit records at child_depth + 1.
            let capped = self.opts.max_depth.is_some_and(|max| child_depth >= max);
            if capped && !self.edges(other).is_empty() {
                self.emit(other, dep_type, child_depth, ResultFlag::DepthTruncated);
                continue;
            }

            self.emit(other, dep_type, child_depth, ResultFlag::None);
            self.expanded.insert(other);
            self.path.push(other);
            self.expand(other, child_depth);
            self.path.pop();
        }
    }

    fn emit(&mut self, idx: NodeIndex, dep_type: DependencyType, depth: usize, flag: ResultFlag) {
        self.records.push(ResultRecord {
            fmri: self.graph.fmri(idx).clone(),
            dep_type: Some(dep_type),
            depth,
            flag,
        });
    }
}

/// Deduplicate edge records into a sorted flat listing; roots are dropped.
fn names_listing(records: &[ResultRecord], with_types: bool) -> Vec<NamesEntry> {
    let mut seen: BTreeMap<Fmri, BTreeSet<DependencyType>> = BTreeMap::new();
    for record in records {
        let Some(dep_type) = record.dep_type else {
            continue;
        };
        seen.entry(record.fmri.clone()).or_default().insert(dep_type);
    }
    seen.into_iter()
        .map(|(fmri, types)| NamesEntry {
            fmri,
            types: if with_types {
                types.into_iter().collect()
            } else {
                Vec::new()
            },
        })
        .collect()
}

fn finish(records: Vec<ResultRecord>, mode: ListingMode) -> Listing {
    match mode {
        ListingMode::Tree => Listing::Tree(records),
        ListingMode::Names => Listing::Names(names_listing(&records, false)),
        ListingMode::NamesWithTypes => Listing::Names(names_listing(&records, true)),
    }
}

// ---------------------------------------------------------------------------
// Operations
// ---------------------------------------------------------------------------

/// What `pkg` depends on: each resolved root at depth 0, its outgoing edges
/// passing the filter at depth 1, and (with `recurse`) the require /
/// require-any closure below them.
///
/// # Errors
///
/// `PackageNotFound` when `pkg` resolves to no cataloged package.
#[instrument(skip(graph, opts), fields(pkg = %pkg))]
pub fn depends(
    graph: &DependencyGraph,
    pkg: &Fmri,
    opts: &QueryOpts,
) -> Result<Listing, EngineError> {
    let roots = resolve_roots(graph, pkg, opts)?;
    let records = Walker::new(graph, opts, Direction::Outgoing).walk(&roots);
    Ok(finish(records, opts.listing))
}

/// What depends on `pkg`: the mirror of [`depends`] over incoming edges.
/// Emitted FMRIs are the edge sources (the dependants); expansion follows
/// each dependant's own incoming require / require-any edges.
///
/// # Errors
///
/// `PackageNotFound` when `pkg` resolves to no cataloged package.
#[instrument(skip(graph, opts), fields(pkg = %pkg))]
pub fn dependants(
    graph: &DependencyGraph,
    pkg: &Fmri,
    opts: &QueryOpts,
) -> Result<Listing, EngineError> {
    let roots = resolve_roots(graph, pkg, opts)?;
    let records = Walker::new(graph, opts, Direction::Incoming).walk(&roots);
    Ok(finish(records, opts.listing))
}

/// Packages nothing requires, restricted to `names` when non-empty, at
/// depth 0. With `recurse`, the ring-fence closure additions follow at
/// depth 1 so the emitter can present them as a separate section.
///
/// An unrestricted type filter defaults to require / require-any here:
/// "nothing depends on it" counts expanding edges only.
///
/// # Errors
///
/// None today; `Result` keeps the query surface uniform.
#[instrument(skip(graph, opts), fields(names = names.len()))]
pub fn no_dependants(
    graph: &DependencyGraph,
    names: &[String],
    opts: &QueryOpts,
) -> Result<Listing, EngineError> {
    let filter = if opts.filter.is_unrestricted() {
        TypeFilter::expanding()
    } else {
        opts.filter.clone()
    };
    let mut leaves = graph.leaves(&filter);
    if !names.is_empty() {
        leaves.retain(|fmri| names.iter().any(|name| name == fmri.name()));
    }

    let mut records: Vec<ResultRecord> = leaves
        .iter()
        .map(|fmri| ResultRecord {
            fmri: fmri.clone(),
            dep_type: None,
            depth: 0,
            flag: ResultFlag::None,
        })
        .collect();

    if opts.recurse {
        let additions = ring_fence(graph, &leaves, &filter);
        records.extend(additions.into_iter().map(|fmri| ResultRecord {
            fmri,
            dep_type: None,
            depth: 1,
            flag: ResultFlag::None,
        }));
    }

    Ok(match opts.listing {
        ListingMode::Tree => Listing::Tree(records),
        ListingMode::Names | ListingMode::NamesWithTypes => {
            let flat: BTreeSet<Fmri> = records.into_iter().map(|r| r.fmri).collect();
            Listing::Names(
                flat.into_iter()
                    .map(|fmri| NamesEntry {
                        fmri,
                        types: Vec::new(),
                    })
                    .collect(),
            )
        }
    })
}

fn resolve_roots(
    graph: &DependencyGraph,
    pkg: &Fmri,
    opts: &QueryOpts,
) -> Result<Vec<Fmri>, EngineError> {
    let roots = graph.resolve(pkg, opts.exact);
    if roots.is_empty() {
        return Err(EngineError::PackageNotFound {
            fmri: pkg.to_string(),
        });
    }
    Ok(roots)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
