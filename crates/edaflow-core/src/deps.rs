//! Module dependency analysis over DEPENDENCY edges.
//!
//! Builds a projection graph holding every MODULE node and every DEPENDENCY
//! edge, runs Tarjan's SCC algorithm, and reports:
//!
//! - `cycles`: components with more than one module
//! - `self_loops`: modules that instantiate themselves
//! - `order`: the condensation in topological order, dependents first, each
//!   component as a sorted group of ids
//!
//! Cycles are data. This analysis never fails.

use std::collections::HashMap;

use petgraph::algo::tarjan_scc;
use petgraph::graph::{DiGraph, NodeIndex};
use serde::{Deserialize, Serialize};

use crate::edge::EdgeKind;
use crate::graph::DesignGraph;
use crate::id::NodeId;
use crate::node::NodeKind;

/// Result of [`DesignGraph::analyze_dependencies`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DependencyReport {
    pub cycles: Vec<Vec<NodeId>>,
    pub self_loops: Vec<NodeId>,
    pub order: Vec<Vec<NodeId>>,
}

impl DependencyReport {
    pub fn is_acyclic(&self) -> bool {
        self.cycles.is_empty() && self.self_loops.is_empty()
    }

    /// Index of the component containing `id` within `order`.
    pub fn position(&self, id: &str) -> Option<usize> {
        self.order
            .iter()
            .position(|group| group.iter().any(|m| m.as_str() == id))
    }
}

impl DesignGraph {
    pub fn analyze_dependencies(&self) -> DependencyReport {
        let mut ids: Vec<&NodeId> = self.nodes_of_kind(NodeKind::Module).map(|n| &n.id).collect();
        let dep_edges: Vec<(&NodeId, &NodeId)> = self
            .edges()
            .filter(|e| e.kind == EdgeKind::Dependency)
            .map(|e| (&e.source_id, &e.target_id))
            .collect();
        for &(s, t) in &dep_edges {
            ids.push(s);
            ids.push(t);
        }
        ids.sort();
        ids.dedup();

        let mut projection: DiGraph<&NodeId, ()> = DiGraph::with_capacity(ids.len(), dep_edges.len());
        let mut slot: HashMap<&NodeId, NodeIndex> = HashMap::with_capacity(ids.len());
        for id in ids {
            slot.insert(id, projection.add_node(id));
        }

        let mut self_loops = Vec::new();
        let mut sorted_edges = dep_edges;
        sorted_edges.sort();
        for (s, t) in sorted_edges {
            if s == t {
                self_loops.push(s.clone());
                continue;
            }
            if let (Some(&a), Some(&b)) = (slot.get(s), slot.get(t)) {
                projection.add_edge(a, b, ());
            }
        }

        // Tarjan emits components in reverse topological order.
        let order: Vec<Vec<NodeId>> = tarjan_scc(&projection)
            .into_iter()
            .rev()
            .map(|component| {
                let mut group: Vec<NodeId> =
                    component.into_iter().map(|i| projection[i].clone()).collect();
                group.sort();
                group
            })
            .collect();

        let mut cycles: Vec<Vec<NodeId>> = order.iter().filter(|g| g.len() > 1).cloned().collect();
        cycles.sort();

        if !cycles.is_empty() || !self_loops.is_empty() {
            tracing::warn!(
                cycles = cycles.len(),
                self_loops = self_loops.len(),
                "module dependency cycles detected"
            );
        }

        DependencyReport {
            cycles,
            self_loops,
            order,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::edge::GraphEdge;
    use crate::node::GraphNode;

    fn modules(names: &[&str]) -> Vec<GraphNode> {
        names
            .iter()
            .map(|n| GraphNode::new(NodeId::module(n), NodeKind::Module, *n))
            .collect()
    }

    fn dep(a: &str, b: &str) -> GraphEdge {
        GraphEdge::dependency(NodeId::module(a), NodeId::module(b))
    }

    #[test]
    fn acyclic_order_puts_dependents_first() {
        let (graph, _) = DesignGraph::from_parts(
            modules(&["top", "mid", "leaf", "lone"]),
            vec![dep("top", "mid"), dep("mid", "leaf"), dep("top", "leaf")],
        );
        let report = graph.analyze_dependencies();
        assert!(report.is_acyclic());
        assert_eq!(report.order.len(), 4);
        assert!(report.order.iter().all(|g| g.len() == 1));

        let top = report.position("module:top").unwrap();
        let mid = report.position("module:mid").unwrap();
        let leaf = report.position("module:leaf").unwrap();
        assert!(top < mid && mid < leaf);
        assert!(report.position("module:lone").is_some());
    }

    #[test]
    fn three_cycle_is_one_component() {
        let (graph, _) = DesignGraph::from_parts(
            modules(&["a", "b", "c", "top", "d"]),
            vec![
                dep("a", "b"),
                dep("b", "c"),
                dep("c", "a"),
                dep("top", "a"),
                dep("c", "d"),
            ],
        );
        let report = graph.analyze_dependencies();
        assert_eq!(
            report.cycles,
            vec![vec![NodeId::module("a"), NodeId::module("b"), NodeId::module("c")]]
        );
        let cyc = report.position("module:a").unwrap();
        assert_eq!(report.position("module:b"), Some(cyc));
        assert!(report.position("module:top").unwrap() < cyc);
        assert!(cyc < report.position("module:d").unwrap());
    }

    #[test]
    fn self_instantiation_is_a_self_loop() {
        let (graph, _) = DesignGraph::from_parts(modules(&["r"]), vec![dep("r", "r")]);
        let report = graph.analyze_dependencies();
        assert!(report.cycles.is_empty());
        assert_eq!(report.self_loops, vec![NodeId::module("r")]);
        assert!(!report.is_acyclic());
        assert_eq!(report.order, vec![vec![NodeId::module("r")]]);
    }

    #[test]
    fn other_edge_kinds_are_ignored() {
        let (graph, _) = DesignGraph::from_parts(
            modules(&["a", "b"]),
            vec![
                dep("a", "b"),
                GraphEdge::hierarchy(NodeId::module("b"), NodeId::module("a")),
            ],
        );
        assert!(graph.analyze_dependencies().is_acyclic());
    }

    #[test]
    fn empty_graph_reports_nothing() {
        assert_eq!(DesignGraph::new().analyze_dependencies(), DependencyReport::default());
    }
}
