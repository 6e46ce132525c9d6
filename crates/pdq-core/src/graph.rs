//! Immutable dependency graph over the catalog.
//!
//! # Overview
//!
//! Nodes are FMRIs, edges are typed and point from dependent to dependency.
//! The graph is built once from a [`Catalog`] and never mutated; the query
//! engine and ring-fence analyzer borrow it. Edge targets that resolve to
//! no known package are retained as unresolved leaf nodes: they can be
//! reported but never expanded, and they are invisible to [`resolve`] and
//! [`leaves`].
//!
//! [`resolve`]: DependencyGraph::resolve
//! [`leaves`]: DependencyGraph::leaves
//!
//! # Design
//!
//! petgraph's `DiGraph` holds the topology; a full-FMRI node map and a
//! name-keyed index (versions ascending) make resolution O(bucket). A
//! blake3 hash over the sorted edge list identifies the topology for
//! logging and latest-mode cache keys.

#![allow(clippy::module_name_repetitions)]

use std::collections::HashMap;

use petgraph::Direction;
use petgraph::graph::{DiGraph, NodeIndex};
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use crate::catalog::{Catalog, DependencyType};
use crate::fmri::Fmri;

// ---------------------------------------------------------------------------
// Type filter
// ---------------------------------------------------------------------------

/// Edge filter by dependency type.
///
/// Include and exclude lists are mutually exclusive in intent; when both
/// are supplied the include list wins and the exclude list is ignored.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypeFilter {
    include: Vec<DependencyType>,
    exclude: Vec<DependencyType>,
}

impl TypeFilter {
    #[must_use]
    pub const fn new(include: Vec<DependencyType>, exclude: Vec<DependencyType>) -> Self {
        Self { include, exclude }
    }

    /// Pass everything.
    #[must_use]
    pub const fn any() -> Self {
        Self::new(Vec::new(), Vec::new())
    }

    /// Pass only the kinds that drive recursive expansion.
    #[must_use]
    pub fn expanding() -> Self {
        Self::new(
            vec![DependencyType::Require, DependencyType::RequireAny],
            Vec::new(),
        )
    }

    #[must_use]
    pub fn is_unrestricted(&self) -> bool {
        self.include.is_empty() && self.exclude.is_empty()
    }

    #[must_use]
    pub fn passes(&self, dep_type: DependencyType) -> bool {
        if self.include.is_empty() {
            !self.exclude.contains(&dep_type)
        } else {
            self.include.contains(&dep_type)
        }
    }
}

// ---------------------------------------------------------------------------
// Graph
// ---------------------------------------------------------------------------

/// What a node stands for: a cataloged package, or a dependency target
/// nothing in the catalog satisfies.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum NodeKind {
    Package(Fmri),
    Unresolved(Fmri),
}

impl NodeKind {
    const fn fmri(&self) -> &Fmri {
        match self {
            Self::Package(fmri) | Self::Unresolved(fmri) => fmri,
        }
    }
}

/// The immutable dependency graph.
#[derive(Debug, Clone)]
pub struct DependencyGraph {
    graph: DiGraph<NodeKind, DependencyType>,
    node_map: HashMap<Fmri, NodeIndex>,
    by_name: HashMap<String, Vec<NodeIndex>>,
    content_hash: String,
}

impl DependencyGraph {
    /// Build the graph from a catalog: one node per record, one node per
    /// unsatisfied edge target, edges deduplicated on (from, to, type).
    #[must_use]
    #[instrument(skip(catalog), fields(packages = catalog.len()))]
    pub fn from_catalog(catalog: &Catalog) -> Self {
        let mut graph = DiGraph::new();
        let mut node_map: HashMap<Fmri, NodeIndex> = HashMap::new();
        // Catalog records are FMRI-sorted, so each bucket is version-ascending.
        let mut by_name: HashMap<String, Vec<NodeIndex>> = HashMap::new();

        for record in catalog.records() {
            let fmri = record.fmri().clone();
            let idx = graph.add_node(NodeKind::Package(fmri.clone()));
            by_name.entry(fmri.name().to_string()).or_default().push(idx);
            node_map.insert(fmri, idx);
        }

        for record in catalog.records() {
            let Some(&from) = node_map.get(record.fmri()) else {
                continue;
            };
            for edge in record.depends() {
                let to = resolve_target(
                    &mut graph,
                    &mut node_map,
                    &by_name,
                    edge.target(),
                );
                let duplicate = graph
                    .edges_connecting(from, to)
                    .any(|e| *e.weight() == edge.dep_type());
                if !duplicate {
                    graph.add_edge(from, to, edge.dep_type());
                }
            }
        }

        let content_hash = hash_edges(&graph);
        debug!(
            nodes = graph.node_count(),
            edges = graph.edge_count(),
            content_hash = %content_hash,
            "built dependency graph"
        );

        Self {
            graph,
            node_map,
            by_name,
            content_hash,
        }
    }

    /// All known package FMRIs matching the query.
    ///
    /// Exact matching requires every version component the query carries to
    /// match (a versionless query matches all versions of the name).
    /// Non-exact matching returns every version at or before the query's
    /// bound. Sorted ascending; unresolved targets never appear.
    #[must_use]
    pub fn resolve(&self, query: &Fmri, exact: bool) -> Vec<Fmri> {
        self.by_name.get(query.name()).map_or_else(Vec::new, |bucket| {
            bucket
                .iter()
                .map(|&idx| self.fmri(idx))
                .filter(|candidate| {
                    if exact {
                        candidate.matches_exact(query)
                    } else {
                        candidate.matches_at_or_before(query)
                    }
                })
                .cloned()
                .collect()
        })
    }

    /// Node index for a fully resolved FMRI.
    #[must_use]
    pub fn node(&self, fmri: &Fmri) -> Option<NodeIndex> {
        self.node_map.get(fmri).copied()
    }

    /// FMRI carried by a node (package or unresolved target).
    #[must_use]
    pub fn fmri(&self, idx: NodeIndex) -> &Fmri {
        self.graph[idx].fmri()
    }

    /// Whether the node is a cataloged package (expandable) rather than an
    /// unresolved target (reportable only).
    #[must_use]
    pub fn is_package(&self, idx: NodeIndex) -> bool {
        matches!(self.graph[idx], NodeKind::Package(_))
    }

    /// Outgoing edges passing the filter, sorted by target FMRI then type.
    #[must_use]
    pub fn outgoing(&self, idx: NodeIndex, filter: &TypeFilter) -> Vec<(NodeIndex, DependencyType)> {
        self.neighbors(idx, Direction::Outgoing, filter)
    }

    /// Incoming edges passing the filter, sorted by source FMRI then type.
    #[must_use]
    pub fn incoming(&self, idx: NodeIndex, filter: &TypeFilter) -> Vec<(NodeIndex, DependencyType)> {
        self.neighbors(idx, Direction::Incoming, filter)
    }

    fn neighbors(
        &self,
        idx: NodeIndex,
        direction: Direction,
        filter: &TypeFilter,
    ) -> Vec<(NodeIndex, DependencyType)> {
        use petgraph::visit::EdgeRef;

        let mut out: Vec<(NodeIndex, DependencyType)> = self
            .graph
            .edges_directed(idx, direction)
            .filter(|e| filter.passes(*e.weight()))
            .map(|e| {
                let other = match direction {
                    Direction::Outgoing => e.target(),
                    Direction::Incoming => e.source(),
                };
                (other, *e.weight())
            })
            .collect();
        out.sort_by(|a, b| self.fmri(a.0).cmp(self.fmri(b.0)).then_with(|| a.1.cmp(&b.1)));
        out
    }

    /// Package nodes with no incoming edge passing the filter, sorted.
    ///
    /// With [`TypeFilter::expanding`] this is exactly the set of packages
    /// nothing requires.
    #[must_use]
    pub fn leaves(&self, filter: &TypeFilter) -> Vec<Fmri> {
        let mut out: Vec<Fmri> = self
            .graph
            .node_indices()
            .filter(|&idx| self.is_package(idx))
            .filter(|&idx| {
                !self
                    .graph
                    .edges_directed(idx, Direction::Incoming)
                    .any(|e| filter.passes(*e.weight()))
            })
            .map(|idx| self.fmri(idx).clone())
            .collect();
        out.sort();
        out
    }

    /// Every package node index. Order is insertion order (catalog order).
    pub fn package_nodes(&self) -> impl Iterator<Item = NodeIndex> + '_ {
        self.graph
            .node_indices()
            .filter(|&idx| self.is_package(idx))
    }

    #[must_use]
    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    #[must_use]
    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    /// blake3 over the sorted edge list; stable for equal topologies.
    #[must_use]
    pub fn content_hash(&self) -> &str {
        &self.content_hash
    }

    pub(crate) const fn inner(&self) -> &DiGraph<NodeKind, DependencyType> {
        &self.graph
    }
}

/// Find the node an edge target binds to: the highest known version
/// satisfying the target's bound, or a dedicated unresolved node.
fn resolve_target(
    graph: &mut DiGraph<NodeKind, DependencyType>,
    node_map: &mut HashMap<Fmri, NodeIndex>,
    by_name: &HashMap<String, Vec<NodeIndex>>,
    target: &Fmri,
) -> NodeIndex {
    let best = by_name.get(target.name()).and_then(|bucket| {
        bucket
            .iter()
            .copied()
            .filter(|&idx| graph[idx].fmri().matches_at_or_before(target))
            .last()
    });
    best.unwrap_or_else(|| {
        *node_map
            .entry(target.clone())
            .or_insert_with(|| graph.add_node(NodeKind::Unresolved(target.clone())))
    })
}

/// Hash the edge topology: sorted `from(type)to` lines, NUL separated.
fn hash_edges(graph: &DiGraph<NodeKind, DependencyType>) -> String {
    use petgraph::visit::EdgeRef;

    let mut lines: Vec<String> = graph
        .edge_references()
        .map(|e| {
            format!(
                "{}\x00{}\x00{}",
                graph[e.source()].fmri(),
                e.weight().as_str(),
                graph[e.target()].fmri()
            )
        })
        .collect();
    lines.sort();

    let mut hasher = blake3::Hasher::new();
    for line in &lines {
        hasher.update(line.as_bytes());
        hasher.update(b"\n");
    }
    hasher.finalize().to_hex().to_string()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
