//! Join clause ordering.
//!
//! Joins render in creation order, except that a join is moved after every
//! join its parent or ON clause depends on. The result is the stable
//! topological order keyed by creation index.

use std::collections::{BTreeSet, HashMap};

use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::Direction;

use super::graph::{JoinGraph, JoinId, ScopeId};

/// Order the joins of `scope` accepted by `include`.
pub fn join_order(graph: &JoinGraph, scope: ScopeId, include: impl Fn(JoinId) -> bool) -> Vec<JoinId> {
    let selected: Vec<JoinId> = graph.joins(scope).into_iter().filter(|id| include(*id)).collect();

    let mut deps: DiGraph<JoinId, ()> = DiGraph::new();
    let index: HashMap<JoinId, NodeIndex> = selected.iter().map(|id| (*id, deps.add_node(*id))).collect();
    for id in &selected {
        for dep in graph.dependencies(*id) {
            if let Some(&from) = index.get(&dep) {
                deps.add_edge(from, index[id], ());
            }
        }
    }

    let mut in_degree: HashMap<NodeIndex, usize> = index
        .values()
        .map(|&n| (n, deps.neighbors_directed(n, Direction::Incoming).count()))
        .collect();
    let mut ready: BTreeSet<JoinId> = selected
        .iter()
        .filter(|id| in_degree[&index[*id]] == 0)
        .copied()
        .collect();

    let mut ordered = Vec::with_capacity(selected.len());
    while let Some(next) = ready.pop_first() {
        ordered.push(next);
        for succ in deps.neighbors_directed(index[&next], Direction::Outgoing) {
            if let Some(degree) = in_degree.get_mut(&succ) {
                *degree -= 1;
                if *degree == 0 {
                    ready.insert(deps[succ]);
                }
            }
        }
    }

    // A cycle never survives resolution; keep any leftovers in creation order.
    if ordered.len() < selected.len() {
        log::warn!("join dependency cycle in scope {}", scope.0);
        for id in selected {
            if !ordered.contains(&id) {
                ordered.push(id);
            }
        }
    }
    ordered
}
