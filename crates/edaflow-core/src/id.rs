//! Stable string identifiers for design graph nodes.
//!
//! Ids are derived from names, never from insertion order, so parsing the same
//! source twice yields the same keys. The helpers here fix the id scheme used
//! by the parser:
//!
//! | kind     | id                             |
//! |----------|--------------------------------|
//! | module   | `module:<name>`                |
//! | port     | `port:<module>.<name>`         |
//! | signal   | `signal:<module>.<name>`       |
//! | instance | `instance:<module>.<instance>` |

use std::borrow::Borrow;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Stable node identifier. A thin newtype over the string key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(pub String);

impl NodeId {
    pub fn new(key: impl Into<String>) -> Self {
        NodeId(key.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Id of a module definition.
    pub fn module(name: &str) -> Self {
        NodeId(format!("module:{name}"))
    }

    /// Id of a port declared by `module`.
    pub fn port(module: &str, name: &str) -> Self {
        NodeId(format!("port:{module}.{name}"))
    }

    /// Id of an internal signal declared in `module`.
    pub fn signal(module: &str, name: &str) -> Self {
        NodeId(format!("signal:{module}.{name}"))
    }

    /// Id of an instance placed inside `module`.
    pub fn instance(module: &str, name: &str) -> Self {
        NodeId(format!("instance:{module}.{name}"))
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Borrow<str> for NodeId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl AsRef<str> for NodeId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl From<&str> for NodeId {
    fn from(key: &str) -> Self {
        NodeId(key.to_string())
    }
}

impl From<String> for NodeId {
    fn from(key: String) -> Self {
        NodeId(key)
    }
}
