//! DesignGraph: the typed, in-memory design graph store.
//!
//! [`DesignGraph`] owns every [`GraphNode`] and [`GraphEdge`]. Storage is an
//! arena (`StableGraph`) addressed by index plus an id -> index map, so cyclic
//! structures need no owning references and every traversal carries its own
//! visited set.
//!
//! # Mutation and queries
//!
//! All mutations go through [`DesignGraph::add`] (and
//! [`DesignGraph::remove_source`] for re-indexing). Queries take `&self`, so a
//! finished graph can be shared behind an `Arc` and queried from any number of
//! threads while the borrow checker keeps writers out. Query operations live
//! in [`crate::context`], [`crate::hierarchy`], [`crate::pattern`], and
//! [`crate::deps`].
//!
//! Invariants, checked in debug builds after every mutation:
//! - no duplicate node id
//! - every edge endpoint is present in the node map
//! - at most one edge per `(source, target, kind)`

use std::collections::{BTreeMap, BTreeSet, HashMap};

use indexmap::IndexMap;
use petgraph::graph::{EdgeIndex, NodeIndex};
use petgraph::stable_graph::StableGraph;
use petgraph::visit::EdgeRef;
use petgraph::{Directed, Direction};
use serde::Serialize;

use crate::edge::{EdgeKey, EdgeKind, GraphEdge};
use crate::error::CoreError;
use crate::id::NodeId;
use crate::node::{GraphNode, NodeKind};

/// Outcome of merging a batch of nodes and edges.
#[derive(Debug, Default)]
pub struct AddReport {
    pub nodes_added: usize,
    pub nodes_updated: usize,
    pub edges_added: usize,
    pub edges_updated: usize,
    /// Edges refused because an endpoint was missing. The rest of the batch
    /// was still ingested.
    pub rejected: Vec<CoreError>,
}

impl AddReport {
    pub fn is_clean(&self) -> bool {
        self.rejected.is_empty()
    }
}

/// Aggregate counts for reporting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GraphStats {
    pub node_count: usize,
    pub edge_count: usize,
    pub nodes_by_kind: BTreeMap<NodeKind, usize>,
    pub edges_by_kind: BTreeMap<EdgeKind, usize>,
    pub source_files: usize,
}

/// The design graph container.
#[derive(Debug, Clone, Default)]
pub struct DesignGraph {
    graph: StableGraph<GraphNode, GraphEdge, Directed, u32>,
    index: IndexMap<NodeId, NodeIndex<u32>>,
}

impl DesignGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a graph from a batch, returning the merge report alongside it.
    pub fn from_parts(
        nodes: impl IntoIterator<Item = GraphNode>,
        edges: impl IntoIterator<Item = GraphEdge>,
    ) -> (Self, AddReport) {
        let mut graph = DesignGraph::new();
        let report = graph.add(nodes, edges);
        (graph, report)
    }

    // -----------------------------------------------------------------------
    // Mutation
    // -----------------------------------------------------------------------

    /// Merges nodes and edges into the graph.
    ///
    /// Nodes are merged first, so edges in the same batch may reference them.
    /// A node whose id already exists replaces the stored node (latest parse
    /// wins). An edge whose key already exists replaces the stored attributes.
    /// Edges with a missing endpoint are rejected and reported; they never
    /// abort the batch.
    pub fn add(
        &mut self,
        nodes: impl IntoIterator<Item = GraphNode>,
        edges: impl IntoIterator<Item = GraphEdge>,
    ) -> AddReport {
        let mut report = AddReport::default();

        for node in nodes {
            if self.upsert_node(node) {
                report.nodes_added += 1;
            } else {
                report.nodes_updated += 1;
            }
        }

        for edge in edges {
            match self.upsert_edge(edge) {
                Ok(true) => report.edges_added += 1,
                Ok(false) => report.edges_updated += 1,
                Err(err) => {
                    tracing::warn!("rejected edge: {}", err);
                    report.rejected.push(err);
                }
            }
        }

        #[cfg(debug_assertions)]
        self.assert_consistency();

        report
    }

    /// Inserts or replaces a single node. Returns `true` if it was new.
    fn upsert_node(&mut self, node: GraphNode) -> bool {
        match self.index.get(&node.id) {
            Some(&idx) => {
                // Index entries always point at live nodes.
                if let Some(slot) = self.graph.node_weight_mut(idx) {
                    *slot = node;
                }
                false
            }
            None => {
                let id = node.id.clone();
                let idx = self.graph.add_node(node);
                self.index.insert(id, idx);
                true
            }
        }
    }

    /// Inserts or replaces a single edge. Returns `Ok(true)` if it was new.
    fn upsert_edge(&mut self, edge: GraphEdge) -> Result<bool, CoreError> {
        let source = self.index.get(&edge.source_id).copied();
        let target = self.index.get(&edge.target_id).copied();
        let (source, target) = match (source, target) {
            (Some(s), Some(t)) => (s, t),
            (None, _) => {
                return Err(CoreError::DanglingEdge {
                    missing: edge.source_id.clone(),
                    source_id: edge.source_id,
                    target_id: edge.target_id,
                    kind: edge.kind,
                })
            }
            (_, None) => {
                return Err(CoreError::DanglingEdge {
                    missing: edge.target_id.clone(),
                    source_id: edge.source_id,
                    target_id: edge.target_id,
                    kind: edge.kind,
                })
            }
        };

        if let Some(existing) = self.find_edge(source, target, edge.kind) {
            if let Some(slot) = self.graph.edge_weight_mut(existing) {
                *slot = edge;
            }
            return Ok(false);
        }

        self.graph.add_edge(source, target, edge);
        Ok(true)
    }

    /// Removes every node whose `source_file` attribute equals `path`,
    /// together with all incident edges. Returns the number of nodes removed.
    pub fn remove_source(&mut self, path: &str) -> usize {
        let doomed: Vec<NodeId> = self
            .nodes()
            .filter(|n| n.attr_str("source_file") == Some(path))
            .map(|n| n.id.clone())
            .collect();

        for id in &doomed {
            if let Some(idx) = self.index.shift_remove(id) {
                self.graph.remove_node(idx);
            }
        }

        #[cfg(debug_assertions)]
        self.assert_consistency();

        doomed.len()
    }

    // -----------------------------------------------------------------------
    // Read-only accessors
    // -----------------------------------------------------------------------

    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.index.contains_key(id)
    }

    pub fn get_node(&self, id: &str) -> Option<&GraphNode> {
        self.index
            .get(id)
            .and_then(|&idx| self.graph.node_weight(idx))
    }

    /// Looks up an edge by its identity.
    pub fn get_edge(&self, source: &str, target: &str, kind: EdgeKind) -> Option<&GraphEdge> {
        let s = *self.index.get(source)?;
        let t = *self.index.get(target)?;
        self.find_edge(s, t, kind)
            .and_then(|e| self.graph.edge_weight(e))
    }

    /// All nodes, in id-insertion order.
    pub fn nodes(&self) -> impl Iterator<Item = &GraphNode> + '_ {
        self.index
            .values()
            .filter_map(move |&idx| self.graph.node_weight(idx))
    }

    /// All edges, in edge-index order.
    pub fn edges(&self) -> impl Iterator<Item = &GraphEdge> + '_ {
        self.graph
            .edge_indices()
            .filter_map(move |e| self.graph.edge_weight(e))
    }

    pub fn nodes_of_kind(&self, kind: NodeKind) -> impl Iterator<Item = &GraphNode> + '_ {
        self.nodes().filter(move |n| n.kind == kind)
    }

    /// Outgoing edges of `id`, optionally restricted to one kind.
    pub fn outgoing(&self, id: &str, kind: Option<EdgeKind>) -> Vec<&GraphEdge> {
        self.edges_directed(id, Direction::Outgoing, kind)
    }

    /// Incoming edges of `id`, optionally restricted to one kind.
    pub fn incoming(&self, id: &str, kind: Option<EdgeKind>) -> Vec<&GraphEdge> {
        self.edges_directed(id, Direction::Incoming, kind)
    }

    fn edges_directed(
        &self,
        id: &str,
        dir: Direction,
        kind: Option<EdgeKind>,
    ) -> Vec<&GraphEdge> {
        let Some(&idx) = self.index.get(id) else {
            return Vec::new();
        };
        self.graph
            .edges_directed(idx, dir)
            .map(|e| e.weight())
            .filter(|w| kind.map_or(true, |k| w.kind == k))
            .collect()
    }

    /// Resolves a user-supplied key to a node id.
    ///
    /// An exact id wins. Otherwise the key is tried as a module name, so
    /// `"leaf"` finds `module:leaf`.
    pub fn resolve_key(&self, key: &str) -> Option<&NodeId> {
        if let Some((id, _)) = self.index.get_key_value(key) {
            return Some(id);
        }
        self.index
            .get_key_value(NodeId::module(key).as_str())
            .map(|(id, _)| id)
    }

    pub fn stats(&self) -> GraphStats {
        let mut nodes_by_kind = BTreeMap::new();
        let mut files = BTreeSet::new();
        for node in self.nodes() {
            *nodes_by_kind.entry(node.kind).or_insert(0) += 1;
            if let Some(file) = node.attr_str("source_file") {
                files.insert(file);
            }
        }
        let mut edges_by_kind = BTreeMap::new();
        for edge in self.edges() {
            *edges_by_kind.entry(edge.kind).or_insert(0) += 1;
        }
        GraphStats {
            node_count: self.node_count(),
            edge_count: self.edge_count(),
            nodes_by_kind,
            edges_by_kind,
            source_files: files.len(),
        }
    }

    // -----------------------------------------------------------------------
    // Crate-internal index access for the query modules
    // -----------------------------------------------------------------------

    pub(crate) fn index_of(&self, id: &str) -> Option<NodeIndex<u32>> {
        self.index.get(id).copied()
    }

    pub(crate) fn node_at(&self, idx: NodeIndex<u32>) -> Option<&GraphNode> {
        self.graph.node_weight(idx)
    }

    pub(crate) fn raw(&self) -> &StableGraph<GraphNode, GraphEdge, Directed, u32> {
        &self.graph
    }

    fn find_edge(
        &self,
        source: NodeIndex<u32>,
        target: NodeIndex<u32>,
        kind: EdgeKind,
    ) -> Option<EdgeIndex<u32>> {
        self.graph
            .edges_directed(source, Direction::Outgoing)
            .find(|e| e.target() == target && e.weight().kind == kind)
            .map(|e| e.id())
    }

    // -----------------------------------------------------------------------
    // Debug consistency assertion
    // -----------------------------------------------------------------------

    /// Verifies the id index and the arena agree and that no edge key is
    /// duplicated.
    ///
    /// Only called in debug builds (via `cfg(debug_assertions)`).
    #[cfg(debug_assertions)]
    fn assert_consistency(&self) {
        assert_eq!(
            self.index.len(),
            self.graph.node_count(),
            "id index and node arena disagree on node count"
        );
        for (id, &idx) in &self.index {
            let node = self
                .graph
                .node_weight(idx)
                .unwrap_or_else(|| panic!("index entry {} points at a vacant slot", id));
            assert_eq!(&node.id, id, "node stored under the wrong id");
        }
        let mut keys = std::collections::HashSet::new();
        for e in self.graph.edge_indices() {
            let (source, target) = self.graph.edge_endpoints(e).expect("live edge has endpoints");
            let w = &self.graph[e];
            assert_eq!(self.index.get(&w.source_id), Some(&source));
            assert_eq!(self.index.get(&w.target_id), Some(&target));
            assert!(keys.insert(w.key()), "duplicate edge key {:?}", w.key());
        }
    }
}

/// Graphs compare as sets: node and edge order never matters.
impl PartialEq for DesignGraph {
    fn eq(&self, other: &Self) -> bool {
        if self.node_count() != other.node_count() || self.edge_count() != other.edge_count() {
            return false;
        }
        if !self
            .nodes()
            .all(|n| other.get_node(n.id.as_str()) == Some(n))
        {
            return false;
        }
        let theirs: HashMap<EdgeKey, &GraphEdge> =
            other.edges().map(|e| (e.key(), e)).collect();
        self.edges()
            .all(|e| theirs.get(&e.key()).is_some_and(|t| *t == e))
    }
}
