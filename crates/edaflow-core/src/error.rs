//! Core error types for edaflow-core.
//!
//! Uses `thiserror` for structured, matchable error variants. Structural
//! problems that are expected in real designs (cycles, dangling edges during a
//! bulk merge) are reported as data by the graph operations; these variants
//! cover the cases where a single request cannot be satisfied.

use std::path::PathBuf;

use thiserror::Error;

use crate::edge::EdgeKind;
use crate::id::NodeId;

/// Core errors produced by the edaflow-core crate.
#[derive(Debug, Error)]
pub enum CoreError {
    /// A node key did not resolve to any node in the graph.
    #[error("node not found: '{key}'")]
    NodeNotFound { key: String },

    /// An edge references an endpoint that is not in the graph.
    #[error("dangling {kind} edge {source_id} -> {target_id}: missing endpoint '{missing}'")]
    DanglingEdge {
        source_id: NodeId,
        target_id: NodeId,
        kind: EdgeKind,
        missing: NodeId,
    },

    /// A persisted graph document could not be encoded or decoded.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Reading or writing a persisted graph document failed.
    #[error("i/o error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}
