//! Bounded-depth neighbourhood extraction.
//!
//! [`DesignGraph::get_context`] is the single mechanism that keeps the amount
//! of design context handed to a consumer independent of total design size.
//! The traversal is an undirected breadth-first search over every edge kind,
//! so the returned node set can only grow with depth, and a visited set keeps
//! it finite on cyclic graphs.

use std::collections::{HashSet, VecDeque};

use petgraph::graph::NodeIndex;
use petgraph::visit::EdgeRef;
use petgraph::Direction;
use serde::{Deserialize, Serialize};

use crate::edge::GraphEdge;
use crate::error::CoreError;
use crate::graph::DesignGraph;
use crate::id::NodeId;
use crate::node::GraphNode;

/// The induced subgraph around a root node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Subgraph {
    pub root: NodeId,
    pub depth: usize,
    /// Visited nodes in BFS order; the root comes first.
    pub nodes: Vec<GraphNode>,
    /// Every edge whose endpoints are both in `nodes`.
    pub edges: Vec<GraphEdge>,
}

impl Subgraph {
    pub fn contains(&self, id: &str) -> bool {
        self.nodes.iter().any(|n| n.id.as_str() == id)
    }

    pub fn node_ids(&self) -> impl Iterator<Item = &NodeId> + '_ {
        self.nodes.iter().map(|n| &n.id)
    }
}

impl DesignGraph {
    /// Returns the subgraph reachable from `key` within `depth` hops, following
    /// edges of any kind in either direction.
    ///
    /// `key` is a node id, or the name of a module. Depth 0 yields the node
    /// alone (plus any self-loop edge on it).
    pub fn get_context(&self, key: &str, depth: usize) -> Result<Subgraph, CoreError> {
        let root = self
            .resolve_key(key)
            .and_then(|id| self.index_of(id.as_str()))
            .ok_or_else(|| CoreError::NodeNotFound {
                key: key.to_string(),
            })?;

        let order = self.bfs_undirected(root, depth);
        let members: HashSet<NodeIndex<u32>> = order.iter().copied().collect();

        let raw = self.raw();
        let mut edges = Vec::new();
        for &idx in &order {
            for edge in raw.edges_directed(idx, Direction::Outgoing) {
                if members.contains(&edge.target()) {
                    edges.push(edge.weight().clone());
                }
            }
        }

        let nodes: Vec<GraphNode> = order
            .iter()
            .filter_map(|&idx| self.node_at(idx).cloned())
            .collect();

        tracing::debug!(
            root = %nodes.first().map(|n| n.id.as_str()).unwrap_or(key),
            depth,
            nodes = nodes.len(),
            edges = edges.len(),
            "extracted context"
        );

        Ok(Subgraph {
            root: nodes
                .first()
                .map(|n| n.id.clone())
                .unwrap_or_else(|| NodeId::new(key)),
            depth,
            nodes,
            edges,
        })
    }

    /// Breadth-first visit order up to `depth` hops, ignoring edge direction.
    fn bfs_undirected(&self, root: NodeIndex<u32>, depth: usize) -> Vec<NodeIndex<u32>> {
        let raw = self.raw();
        let mut visited = HashSet::from([root]);
        let mut order = vec![root];
        let mut queue = VecDeque::from([(root, 0usize)]);

        while let Some((idx, dist)) = queue.pop_front() {
            if dist == depth {
                continue;
            }
            let neighbours = raw
                .edges_directed(idx, Direction::Outgoing)
                .map(|e| e.target())
                .chain(
                    raw.edges_directed(idx, Direction::Incoming)
                        .map(|e| e.source()),
                );
            for next in neighbours {
                if visited.insert(next) {
                    order.push(next);
                    queue.push_back((next, dist + 1));
                }
            }
        }

        order
    }
}
