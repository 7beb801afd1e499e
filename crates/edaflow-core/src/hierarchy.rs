//! Elaborated design hierarchy.
//!
//! [`DesignGraph::get_hierarchy`] walks HIERARCHY edges from a module and
//! descends through each INSTANCE into the module it instantiates (named by
//! the instance's `module_type` attribute). Real designs are DAGs, but a
//! malformed one can instantiate its own ancestor, so the walk tracks both
//! the current ancestor path and the set of already-expanded nodes:
//!
//! - revisiting an ancestor records [`HierarchyAnomaly::Cycle`] and prunes
//!   that branch
//! - revisiting any other node emits it with `shared = true` and no children

use std::collections::HashSet;

use petgraph::graph::NodeIndex;
use petgraph::visit::EdgeRef;
use petgraph::Direction;
use serde::{Deserialize, Serialize};

use crate::edge::EdgeKind;
use crate::error::CoreError;
use crate::graph::DesignGraph;
use crate::id::NodeId;
use crate::node::{GraphNode, NodeKind};

/// A node in the elaborated hierarchy tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HierarchyNode {
    pub id: NodeId,
    pub name: String,
    pub kind: NodeKind,
    /// For instances: the module this instance elaborates into, when known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub definition: Option<NodeId>,
    /// Already expanded elsewhere in this tree; children omitted.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub shared: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<HierarchyNode>,
}

impl HierarchyNode {
    /// Total nodes in this subtree, including `self`.
    pub fn size(&self) -> usize {
        let mut stack = vec![self];
        let mut count = 0;
        while let Some(n) = stack.pop() {
            count += 1;
            stack.extend(&n.children);
        }
        count
    }

    /// Depth-first search for a descendant (or self) by id.
    pub fn find(&self, id: &str) -> Option<&HierarchyNode> {
        let mut stack = vec![self];
        while let Some(n) = stack.pop() {
            if n.id.as_str() == id {
                return Some(n);
            }
            stack.extend(n.children.iter().rev());
        }
        None
    }
}

// Deep instance chains would otherwise recurse once per level on drop.
impl Drop for HierarchyNode {
    fn drop(&mut self) {
        let mut stack = std::mem::take(&mut self.children);
        while let Some(mut n) = stack.pop() {
            stack.append(&mut n.children);
        }
    }
}

/// Structural problems found while walking the hierarchy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum HierarchyAnomaly {
    /// `path` starts and ends at the same node.
    Cycle { path: Vec<NodeId> },
}

/// Result of [`DesignGraph::get_hierarchy`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Hierarchy {
    pub root: HierarchyNode,
    #[serde(default)]
    pub anomalies: Vec<HierarchyAnomaly>,
}

impl Hierarchy {
    pub fn has_cycles(&self) -> bool {
        self.anomalies
            .iter()
            .any(|a| matches!(a, HierarchyAnomaly::Cycle { .. }))
    }
}

struct Walk<'g> {
    graph: &'g DesignGraph,
    path: Vec<NodeIndex<u32>>,
    on_path: HashSet<NodeIndex<u32>>,
    expanded: HashSet<NodeIndex<u32>>,
    anomalies: Vec<HierarchyAnomaly>,
}

/// A node whose children are still being walked.
struct Frame {
    out: HierarchyNode,
    pending: std::vec::IntoIter<NodeIndex<u32>>,
}

enum Entered {
    Leaf(HierarchyNode),
    Open(Frame),
}

impl DesignGraph {
    /// Returns the hierarchy tree rooted at `key` (a node id or module name).
    pub fn get_hierarchy(&self, key: &str) -> Result<Hierarchy, CoreError> {
        let root = self
            .resolve_key(key)
            .and_then(|id| self.index_of(id.as_str()))
            .ok_or_else(|| CoreError::NodeNotFound {
                key: key.to_string(),
            })?;

        let mut walk = Walk {
            graph: self,
            path: Vec::new(),
            on_path: HashSet::new(),
            expanded: HashSet::new(),
            anomalies: Vec::new(),
        };
        let tree = walk.run(root).ok_or_else(|| CoreError::NodeNotFound {
            key: key.to_string(),
        })?;

        if !walk.anomalies.is_empty() {
            tracing::warn!(
                root = %tree.id,
                anomalies = walk.anomalies.len(),
                "hierarchy contains cycles"
            );
        }

        Ok(Hierarchy {
            root: tree,
            anomalies: walk.anomalies,
        })
    }

    /// The module an instance elaborates into, if it is in the graph.
    pub(crate) fn definition_of(&self, instance: &GraphNode) -> Option<NodeIndex<u32>> {
        let module_type = instance.attr_str("module_type")?;
        self.index_of(NodeId::module(module_type).as_str())
    }
}

impl Walk<'_> {
    /// Walks the tree under `root` with an explicit stack, so instance
    /// chains of any depth are safe. `path` mirrors the open frames.
    fn run(&mut self, root: NodeIndex<u32>) -> Option<HierarchyNode> {
        let mut stack = match self.enter(root)? {
            Entered::Leaf(out) => return Some(out),
            Entered::Open(frame) => {
                self.push_path(root);
                vec![frame]
            }
        };

        loop {
            let next = stack.last_mut()?.pending.next();
            match next {
                Some(child) => match self.enter(child) {
                    None => {}
                    Some(Entered::Leaf(out)) => {
                        if let Some(top) = stack.last_mut() {
                            top.out.children.push(out);
                        }
                    }
                    Some(Entered::Open(frame)) => {
                        self.push_path(child);
                        stack.push(frame);
                    }
                },
                None => {
                    let done = stack.pop()?;
                    self.pop_path();
                    match stack.last_mut() {
                        Some(parent) => parent.out.children.push(done.out),
                        None => return Some(done.out),
                    }
                }
            }
        }
    }

    /// Prepares `idx` for the walk; `None` when the branch is pruned by a cycle.
    fn enter(&mut self, idx: NodeIndex<u32>) -> Option<Entered> {
        let node = self.graph.node_at(idx)?;

        if self.on_path.contains(&idx) {
            let pos = self.path.iter().position(|&p| p == idx)?;
            let mut path: Vec<NodeId> = self.path[pos..]
                .iter()
                .filter_map(|&p| self.graph.node_at(p).map(|n| n.id.clone()))
                .collect();
            path.push(node.id.clone());
            self.anomalies.push(HierarchyAnomaly::Cycle { path });
            return None;
        }

        let definition = match node.kind {
            NodeKind::Instance => self.graph.definition_of(node),
            _ => None,
        };
        let mut out = HierarchyNode {
            id: node.id.clone(),
            name: node.name.clone(),
            kind: node.kind,
            definition: definition.and_then(|d| self.graph.node_at(d).map(|n| n.id.clone())),
            shared: false,
            children: Vec::new(),
        };

        if !self.expanded.insert(idx) {
            out.shared = true;
            return Some(Entered::Leaf(out));
        }

        let mut next: Vec<NodeIndex<u32>> = self
            .graph
            .raw()
            .edges_directed(idx, Direction::Outgoing)
            .filter(|e| e.weight().kind == EdgeKind::Hierarchy)
            .map(|e| e.target())
            .collect();
        next.sort_by(|a, b| {
            let a = self.graph.node_at(*a).map(|n| &n.id);
            let b = self.graph.node_at(*b).map(|n| &n.id);
            a.cmp(&b)
        });
        next.extend(definition);

        Some(Entered::Open(Frame {
            out,
            pending: next.into_iter(),
        }))
    }

    fn push_path(&mut self, idx: NodeIndex<u32>) {
        self.path.push(idx);
        self.on_path.insert(idx);
    }

    fn pop_path(&mut self) {
        if let Some(idx) = self.path.pop() {
            self.on_path.remove(&idx);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::edge::GraphEdge;

    fn module(name: &str) -> GraphNode {
        GraphNode::new(NodeId::module(name), NodeKind::Module, name)
    }

    fn instance(parent: &str, name: &str, ty: &str) -> GraphNode {
        GraphNode::new(NodeId::instance(parent, name), NodeKind::Instance, name)
            .with_attr("module_type", ty)
    }

    fn owns(parent: &str, child: NodeId) -> GraphEdge {
        GraphEdge::hierarchy(NodeId::module(parent), child)
    }

    #[test]
    fn elaborates_instances_into_modules() {
        let (graph, _) = DesignGraph::from_parts(
            vec![
                module("top"),
                module("leaf"),
                instance("top", "u0", "leaf"),
                GraphNode::new(NodeId::port("leaf", "a"), NodeKind::Port, "a"),
            ],
            vec![
                owns("top", NodeId::instance("top", "u0")),
                owns("leaf", NodeId::port("leaf", "a")),
            ],
        );

        let h = graph.get_hierarchy("top").unwrap();
        assert!(h.anomalies.is_empty());
        let u0 = &h.root.children[0];
        assert_eq!(u0.kind, NodeKind::Instance);
        assert_eq!(u0.definition.as_ref().unwrap().as_str(), "module:leaf");
        let leaf = &u0.children[0];
        assert_eq!(leaf.id.as_str(), "module:leaf");
        assert_eq!(leaf.children[0].id.as_str(), "port:leaf.a");
        assert_eq!(h.root.size(), 4);
    }

    #[test]
    fn second_instance_of_same_module_is_shared() {
        let (graph, _) = DesignGraph::from_parts(
            vec![
                module("top"),
                module("leaf"),
                instance("top", "u0", "leaf"),
                instance("top", "u1", "leaf"),
            ],
            vec![
                owns("top", NodeId::instance("top", "u0")),
                owns("top", NodeId::instance("top", "u1")),
            ],
        );

        let h = graph.get_hierarchy("module:top").unwrap();
        assert!(h.anomalies.is_empty());
        let u0_leaf = &h.root.children[0].children[0];
        let u1_leaf = &h.root.children[1].children[0];
        assert!(!u0_leaf.shared);
        assert!(u1_leaf.shared);
    }

    #[test]
    fn self_instantiation_is_reported_as_cycle() {
        let (graph, _) = DesignGraph::from_parts(
            vec![module("a"), module("b"), instance("a", "ub", "b"), instance("b", "ua", "a")],
            vec![
                owns("a", NodeId::instance("a", "ub")),
                owns("b", NodeId::instance("b", "ua")),
            ],
        );

        let h = graph.get_hierarchy("a").unwrap();
        assert!(h.has_cycles());
        let HierarchyAnomaly::Cycle { path } = &h.anomalies[0];
        assert_eq!(path.first(), path.last());
        assert_eq!(path.first().unwrap().as_str(), "module:a");
        // a -> ub -> b -> ua, with the back edge to a pruned.
        assert_eq!(h.root.size(), 4);
        assert!(h.root.find("instance:b.ua").unwrap().children.is_empty());
    }

    #[test]
    fn unresolved_instance_has_no_definition() {
        let (graph, _) = DesignGraph::from_parts(
            vec![module("top"), instance("top", "g0", "AND2X1")],
            vec![owns("top", NodeId::instance("top", "g0"))],
        );
        let h = graph.get_hierarchy("top").unwrap();
        assert!(h.root.children[0].definition.is_none());
        assert!(h.root.children[0].children.is_empty());
    }

    #[test]
    fn serialized_tree_omits_empty_fields() {
        let (graph, _) = DesignGraph::from_parts(vec![module("solo")], vec![]);
        let h = graph.get_hierarchy("solo").unwrap();
        let json = serde_json::to_value(&h).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "root": {"id": "module:solo", "name": "solo", "kind": "MODULE"},
                "anomalies": []
            })
        );
    }

    #[test]
    fn very_deep_instance_chain_is_walked() {
        const DEPTH: usize = 20_000;
        let mut nodes = Vec::with_capacity(DEPTH * 2 + 1);
        let mut edges = Vec::with_capacity(DEPTH);
        for i in 0..DEPTH {
            let name = format!("m{i}");
            nodes.push(module(&name));
            nodes.push(instance(&name, "u", &format!("m{}", i + 1)));
            edges.push(owns(&name, NodeId::instance(&name, "u")));
        }
        nodes.push(module(&format!("m{DEPTH}")));
        let (graph, _) = DesignGraph::from_parts(nodes, edges);

        let h = graph.get_hierarchy("m0").unwrap();
        assert!(h.anomalies.is_empty());
        assert_eq!(h.root.size(), DEPTH * 2 + 1);

        let mut cur = &h.root;
        let mut levels = 0;
        while let Some(child) = cur.children.first() {
            cur = child;
            levels += 1;
        }
        assert_eq!(levels, DEPTH * 2);
        assert_eq!(cur.id.as_str(), format!("module:m{DEPTH}"));
    }
}
