//! Node types for the design graph.
//!
//! The node kind set is closed: every graph algorithm matches on
//! [`NodeKind`] exhaustively. Free-form facts about a construct (port
//! direction, bit width, source location) live in [`Attributes`], an ordered
//! map so serialized output is deterministic.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::id::NodeId;

/// The structural role of a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NodeKind {
    /// A module definition.
    Module,
    /// A port declared by a module.
    Port,
    /// An internal net or variable of a module.
    Signal,
    /// A placement of one module inside another.
    Instance,
}

impl NodeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            NodeKind::Module => "MODULE",
            NodeKind::Port => "PORT",
            NodeKind::Signal => "SIGNAL",
            NodeKind::Instance => "INSTANCE",
        }
    }

    pub const ALL: [NodeKind; 4] = [
        NodeKind::Module,
        NodeKind::Port,
        NodeKind::Signal,
        NodeKind::Instance,
    ];
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for NodeKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "module" => Ok(NodeKind::Module),
            "port" => Ok(NodeKind::Port),
            "signal" => Ok(NodeKind::Signal),
            "instance" => Ok(NodeKind::Instance),
            _ => Err(format!(
                "unknown node kind '{}', expected module/port/signal/instance",
                s
            )),
        }
    }
}

/// A single attribute value: a scalar or a list of strings.
///
/// Serialized untagged, so a persisted document reads naturally
/// (`"width": 8`, `"direction": "input"`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AttrValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    List(Vec<String>),
}

impl AttrValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            AttrValue::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            AttrValue::Int(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[String]> {
        match self {
            AttrValue::List(items) => Some(items),
            _ => None,
        }
    }
}

impl From<bool> for AttrValue {
    fn from(v: bool) -> Self {
        AttrValue::Bool(v)
    }
}

impl From<i64> for AttrValue {
    fn from(v: i64) -> Self {
        AttrValue::Int(v)
    }
}

impl From<usize> for AttrValue {
    fn from(v: usize) -> Self {
        AttrValue::Int(i64::try_from(v).unwrap_or(i64::MAX))
    }
}

/// JSON has no infinities or NaN: infinities clamp to the nearest finite
/// value and NaN is kept as text.
impl From<f64> for AttrValue {
    fn from(v: f64) -> Self {
        if v.is_nan() {
            AttrValue::Text(v.to_string())
        } else {
            AttrValue::Float(v.clamp(f64::MIN, f64::MAX))
        }
    }
}

impl From<&str> for AttrValue {
    fn from(v: &str) -> Self {
        AttrValue::Text(v.to_string())
    }
}

impl From<String> for AttrValue {
    fn from(v: String) -> Self {
        AttrValue::Text(v)
    }
}

impl From<Vec<String>> for AttrValue {
    fn from(v: Vec<String>) -> Self {
        AttrValue::List(v)
    }
}

/// Ordered attribute map shared by nodes and edges.
pub type Attributes = BTreeMap<String, AttrValue>;

/// A node in the design graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphNode {
    /// Unique, stable key.
    pub id: NodeId,
    pub kind: NodeKind,
    pub name: String,
    #[serde(default)]
    pub attributes: Attributes,
}

impl GraphNode {
    pub fn new(id: NodeId, kind: NodeKind, name: impl Into<String>) -> Self {
        GraphNode {
            id,
            kind,
            name: name.into(),
            attributes: Attributes::new(),
        }
    }

    /// Builder-style attribute insertion.
    pub fn with_attr(mut self, key: &str, value: impl Into<AttrValue>) -> Self {
        self.attributes.insert(key.to_string(), value.into());
        self
    }

    pub fn attr(&self, key: &str) -> Option<&AttrValue> {
        self.attributes.get(key)
    }

    /// Convenience accessor for string attributes.
    pub fn attr_str(&self, key: &str) -> Option<&str> {
        self.attributes.get(key).and_then(AttrValue::as_str)
    }
}
