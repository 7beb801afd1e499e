//! Persisted graph format.
//!
//! A [`GraphDocument`] is the JSON shape consumers store on disk:
//!
//! ```json
//! { "nodes": [{"id", "kind", "name", "attributes"}],
//!   "edges": [{"source_id", "target_id", "kind", "attributes"}] }
//! ```
//!
//! Serialization sorts nodes by id and edges by key so the same graph always
//! produces the same bytes. Deserialization is strict: a document with an
//! edge pointing at a missing node is corrupt and is refused.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::edge::GraphEdge;
use crate::error::CoreError;
use crate::graph::DesignGraph;
use crate::node::GraphNode;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GraphDocument {
    #[serde(default)]
    pub nodes: Vec<GraphNode>,
    #[serde(default)]
    pub edges: Vec<GraphEdge>,
}

impl GraphDocument {
    pub fn into_graph(self) -> Result<DesignGraph, CoreError> {
        let (graph, mut report) = DesignGraph::from_parts(self.nodes, self.edges);
        if report.rejected.is_empty() {
            Ok(graph)
        } else {
            Err(report.rejected.swap_remove(0))
        }
    }
}

impl DesignGraph {
    pub fn to_document(&self) -> GraphDocument {
        let mut nodes: Vec<GraphNode> = self.nodes().cloned().collect();
        nodes.sort_by(|a, b| a.id.cmp(&b.id));
        let mut edges: Vec<GraphEdge> = self.edges().cloned().collect();
        edges.sort_by_key(GraphEdge::key);
        GraphDocument { nodes, edges }
    }

    /// Encodes the whole graph as pretty-printed JSON.
    pub fn serialize(&self) -> Result<String, CoreError> {
        Ok(serde_json::to_string_pretty(&self.to_document())?)
    }

    /// Decodes a graph previously produced by [`DesignGraph::serialize`].
    pub fn deserialize(text: &str) -> Result<DesignGraph, CoreError> {
        let doc: GraphDocument = serde_json::from_str(text)?;
        doc.into_graph()
    }

    pub fn save(&self, path: &Path) -> Result<(), CoreError> {
        let text = self.serialize()?;
        std::fs::write(path, text).map_err(|source| CoreError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        tracing::info!(
            path = %path.display(),
            nodes = self.node_count(),
            edges = self.edge_count(),
            "saved design graph"
        );
        Ok(())
    }

    pub fn load(path: &Path) -> Result<DesignGraph, CoreError> {
        let text = std::fs::read_to_string(path).map_err(|source| CoreError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let graph = DesignGraph::deserialize(&text)?;
        tracing::debug!(
            path = %path.display(),
            nodes = graph.node_count(),
            edges = graph.edge_count(),
            "loaded design graph"
        );
        Ok(graph)
    }
}
