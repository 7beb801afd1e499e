//! Edge types for the design graph.
//!
//! Edges reference nodes by [`NodeId`] only. The identity of an edge is its
//! [`EdgeKey`] `(source, target, kind)`: merging an edge with an existing key
//! replaces the attributes instead of adding a parallel edge, which keeps
//! re-parsing an unchanged file idempotent.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::id::NodeId;
use crate::node::{AttrValue, Attributes};

/// Relationship carried by an edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EdgeKind {
    /// Containment: a module owns a port, signal, or instance.
    Hierarchy,
    /// A signal or port bound to an instance (or an instance bound to the
    /// port of the module it instantiates).
    Connection,
    /// Module A instantiates module B.
    Dependency,
}

impl EdgeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EdgeKind::Hierarchy => "HIERARCHY",
            EdgeKind::Connection => "CONNECTION",
            EdgeKind::Dependency => "DEPENDENCY",
        }
    }

    pub const ALL: [EdgeKind; 3] = [
        EdgeKind::Hierarchy,
        EdgeKind::Connection,
        EdgeKind::Dependency,
    ];
}

impl fmt::Display for EdgeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identity of an edge within a graph.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EdgeKey {
    pub source: NodeId,
    pub target: NodeId,
    pub kind: EdgeKind,
}

/// A directed, typed edge between two nodes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphEdge {
    pub source_id: NodeId,
    pub target_id: NodeId,
    pub kind: EdgeKind,
    #[serde(default)]
    pub attributes: Attributes,
}

impl GraphEdge {
    pub fn new(source_id: NodeId, target_id: NodeId, kind: EdgeKind) -> Self {
        GraphEdge {
            source_id,
            target_id,
            kind,
            attributes: Attributes::new(),
        }
    }

    pub fn hierarchy(parent: NodeId, child: NodeId) -> Self {
        GraphEdge::new(parent, child, EdgeKind::Hierarchy)
    }

    pub fn connection(from: NodeId, to: NodeId) -> Self {
        GraphEdge::new(from, to, EdgeKind::Connection)
    }

    pub fn dependency(user: NodeId, used: NodeId) -> Self {
        GraphEdge::new(user, used, EdgeKind::Dependency)
    }

    pub fn with_attr(mut self, key: &str, value: impl Into<AttrValue>) -> Self {
        self.attributes.insert(key.to_string(), value.into());
        self
    }

    pub fn key(&self) -> EdgeKey {
        EdgeKey {
            source: self.source_id.clone(),
            target: self.target_id.clone(),
            kind: self.kind,
        }
    }
}
