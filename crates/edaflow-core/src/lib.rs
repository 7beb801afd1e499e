pub mod id;
pub mod node;
pub mod edge;
pub mod error;
pub mod graph;
pub mod context;
pub mod hierarchy;
pub mod pattern;
pub mod deps;
pub mod persist;

// Re-export commonly used types
pub use id::NodeId;
pub use node::{AttrValue, Attributes, GraphNode, NodeKind};
pub use edge::{EdgeKey, EdgeKind, GraphEdge};
pub use error::CoreError;
pub use graph::{AddReport, DesignGraph, GraphStats};
pub use context::Subgraph;
pub use hierarchy::{Hierarchy, HierarchyAnomaly, HierarchyNode};
pub use pattern::NamePattern;
pub use deps::DependencyReport;
pub use persist::GraphDocument;
