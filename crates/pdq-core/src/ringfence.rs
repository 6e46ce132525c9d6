//! Ring-fence closure: what else becomes removable with the leaf set.
//!
//! # Overview
//!
//! Starting from an initial candidate set (packages nothing requires), the
//! analyzer computes the closure of packages whose every expanding dependant
//! already sits inside the closure, then reports the closure minus the
//! initial set. Removing the initial set would leave exactly these packages
//! dependency-free.
//!
//! # Design
//!
//! The fixpoint runs over strongly connected components of the subgraph of
//! edges passing the filter, so a cycle whose only dependants are inside the
//! closure is absorbed as a unit, and a cycle with no external dependants at
//! all is absorbed unconditionally. A component with no external dependants
//! that is not a cycle is an ordinary leaf and is left alone; if it belongs
//! in the result, it was already part of the initial set. Edges to
//! unresolved targets are excluded up front, so those nodes are isolated
//! singletons and never absorbed. Each pass either grows the closure or
//! stops, giving O(V * E) worst case.

use std::collections::HashSet;

use petgraph::Direction;
use petgraph::algo::tarjan_scc;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::EdgeRef;
use tracing::{debug, instrument};

use crate::fmri::Fmri;
use crate::graph::{DependencyGraph, TypeFilter};

/// Packages that would become dependency-free once `initial` is removed,
/// sorted by name then version. Running the analyzer again with
/// `initial` extended by its own output yields nothing new.
#[must_use]
#[instrument(skip_all, fields(initial = initial.len()))]
pub fn ring_fence(graph: &DependencyGraph, initial: &[Fmri], filter: &TypeFilter) -> Vec<Fmri> {
    let inner = graph.inner();

    // Mirror of the topology restricted to passing edges between packages.
    // Node indices align with the source graph.
    let mut passing: DiGraph<(), ()> =
        DiGraph::with_capacity(inner.node_count(), inner.edge_count());
    for _ in inner.node_indices() {
        passing.add_node(());
    }
    for edge in inner.edge_references() {
        if filter.passes(*edge.weight()) && graph.is_package(edge.target()) {
            passing.add_edge(edge.source(), edge.target(), ());
        }
    }

    let sccs = tarjan_scc(&passing);
    let mut scc_of = vec![0; passing.node_count()];
    for (sid, members) in sccs.iter().enumerate() {
        for &member in members {
            scc_of[member.index()] = sid;
        }
    }
    let cyclic: Vec<bool> = sccs
        .iter()
        .map(|members| {
            members.len() > 1 || members.iter().any(|&m| passing.contains_edge(m, m))
        })
        .collect();

    let initial_nodes: HashSet<NodeIndex> =
        initial.iter().filter_map(|fmri| graph.node(fmri)).collect();
    let mut in_closure = vec![false; sccs.len()];
    for &node in &initial_nodes {
        in_closure[scc_of[node.index()]] = true;
    }

    loop {
        let mut changed = false;
        for (sid, members) in sccs.iter().enumerate() {
            if in_closure[sid] {
                continue;
            }
            let mut external = 0usize;
            let mut all_inside = true;
            for &member in members {
                for edge in passing.edges_directed(member, Direction::Incoming) {
                    let source_scc = scc_of[edge.source().index()];
                    if source_scc == sid {
                        continue;
                    }
                    external += 1;
                    if !in_closure[source_scc] {
                        all_inside = false;
                    }
                }
            }
            if all_inside && (external > 0 || cyclic[sid]) {
                in_closure[sid] = true;
                changed = true;
            }
        }
        if !changed {
            break;
        }
    }

    let mut additions: Vec<Fmri> = passing
        .node_indices()
        .filter(|node| in_closure[scc_of[node.index()]] && !initial_nodes.contains(node))
        .map(|node| graph.fmri(node).clone())
        .collect();
    additions.sort();
    debug!(additions = additions.len(), "ring-fence closure computed");
    additions
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
