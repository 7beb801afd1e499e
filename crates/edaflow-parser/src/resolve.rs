//! Cross-file resolution pass.
//!
//! Per-file parsing cannot know whether `leaf u0 (...)` refers to a module
//! defined elsewhere. Once every file has been merged, this pass looks up
//! each INSTANCE's `module_type` in the aggregate graph and derives:
//!
//! - one DEPENDENCY edge per (parent module, child module) pair, carrying
//!   `instance_count` and the sorted `instances` names;
//! - CONNECTION edges from the instance to each child PORT it binds, by name,
//!   by position (`index` attribute), or all of them for `.*`.
//!
//! Types with no MODULE node (library cells, black boxes) are counted in
//! [`Resolution::unresolved_types`]; they are not errors.

use std::collections::{BTreeMap, HashMap};

use edaflow_core::{AddReport, DesignGraph, EdgeKind, GraphEdge, GraphNode, NodeId, NodeKind};

/// Derived edges plus resolution statistics.
#[derive(Debug, Clone, Default)]
pub struct Resolution {
    pub edges: Vec<GraphEdge>,
    pub resolved_instances: usize,
    pub unresolved_instances: usize,
    /// Unresolved `module_type` → number of instances using it.
    pub unresolved_types: BTreeMap<String, usize>,
}

impl Resolution {
    pub fn dependency_count(&self) -> usize {
        self.edges
            .iter()
            .filter(|e| e.kind == EdgeKind::Dependency)
            .count()
    }

    /// Merges the derived edges into `graph`.
    pub fn apply(&self, graph: &mut DesignGraph) -> AddReport {
        graph.add(std::iter::empty(), self.edges.iter().cloned())
    }
}

/// The ports of one module, by name and by declaration order.
struct PortTable {
    by_index: BTreeMap<i64, NodeId>,
    all: Vec<NodeId>,
}

fn port_table(graph: &DesignGraph, module: &NodeId) -> PortTable {
    let mut table = PortTable {
        by_index: BTreeMap::new(),
        all: Vec::new(),
    };
    for edge in graph.outgoing(module.as_str(), Some(EdgeKind::Hierarchy)) {
        let Some(port) = graph.get_node(edge.target_id.as_str()) else {
            continue;
        };
        if port.kind != NodeKind::Port {
            continue;
        }
        if let Some(index) = port.attr("index").and_then(|v| v.as_int()) {
            table.by_index.insert(index, port.id.clone());
        }
        table.all.push(port.id.clone());
    }
    table.all.sort();
    table
}

/// Computes DEPENDENCY and instance→port CONNECTION edges for `graph`.
pub fn resolve_dependencies(graph: &DesignGraph) -> Resolution {
    let mut resolution = Resolution::default();
    let mut uses: BTreeMap<(NodeId, NodeId), Vec<String>> = BTreeMap::new();
    let mut ports: HashMap<NodeId, PortTable> = HashMap::new();

    let mut instances: Vec<&GraphNode> = graph.nodes_of_kind(NodeKind::Instance).collect();
    instances.sort_by(|a, b| a.id.cmp(&b.id));

    for inst in instances {
        let (Some(parent), Some(module_type)) = (inst.attr_str("module"), inst.attr_str("module_type"))
        else {
            continue;
        };
        let child = NodeId::module(module_type);
        if !graph.contains(child.as_str()) {
            resolution.unresolved_instances += 1;
            *resolution
                .unresolved_types
                .entry(module_type.to_string())
                .or_insert(0) += 1;
            continue;
        }
        resolution.resolved_instances += 1;
        uses.entry((NodeId::module(parent), child.clone()))
            .or_default()
            .push(inst.name.clone());

        let table = ports
            .entry(child.clone())
            .or_insert_with(|| port_table(graph, &child));
        let bindings = inst
            .attr("connections")
            .and_then(|v| v.as_list())
            .unwrap_or_default();
        for binding in bindings {
            if binding == "*" {
                for port in &table.all {
                    resolution.edges.push(
                        GraphEdge::connection(inst.id.clone(), port.clone()).with_attr("expr", "*"),
                    );
                }
                continue;
            }
            // `.pin()` leaves the port unconnected.
            let Some((pin, expr)) = binding.split_once('=').filter(|(_, e)| !e.is_empty()) else {
                continue;
            };
            let target = match pin.parse::<i64>() {
                Ok(index) => table.by_index.get(&index).cloned(),
                Err(_) => {
                    let id = NodeId::port(module_type, pin);
                    graph.contains(id.as_str()).then_some(id)
                }
            };
            if let Some(port) = target {
                resolution
                    .edges
                    .push(GraphEdge::connection(inst.id.clone(), port).with_attr("expr", expr));
            }
        }
    }

    for ((parent, child), mut names) in uses {
        names.sort();
        resolution.edges.push(
            GraphEdge::dependency(parent, child)
                .with_attr("instance_count", names.len())
                .with_attr("instances", names),
        );
    }

    tracing::debug!(
        resolved = resolution.resolved_instances,
        unresolved = resolution.unresolved_instances,
        edges = resolution.edges.len(),
        "resolved instance types"
    );
    resolution
}

/// Runs the pass and merges its edges into `graph`.
pub fn resolve_into(graph: &mut DesignGraph) -> Resolution {
    let resolution = resolve_dependencies(graph);
    let report = resolution.apply(graph);
    if !report.is_clean() {
        tracing::warn!(rejected = report.rejected.len(), "resolution produced dangling edges");
    }
    resolution
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parse::parse_source;
    use edaflow_core::AttrValue;
    use tokio_util::sync::CancellationToken;

    fn graph_of(sources: &[&str]) -> DesignGraph {
        let mut graph = DesignGraph::new();
        for (i, src) in sources.iter().enumerate() {
            let parsed = parse_source(&format!("f{i}.v"), src, &CancellationToken::new()).unwrap();
            let report = graph.add(parsed.nodes, parsed.edges);
            assert!(report.is_clean());
        }
        graph
    }

    #[test]
    fn dependency_edge_counts_instances() {
        let mut graph = graph_of(&[
            "module leaf(input a, output y);\nendmodule",
            "module top;\n wire x, z;\n leaf u1 (.a(x), .y(z));\n leaf u0 (x, z);\n ram r0 ();\nendmodule",
        ]);
        let res = resolve_into(&mut graph);

        assert_eq!(res.resolved_instances, 2);
        assert_eq!(res.unresolved_instances, 1);
        assert_eq!(res.unresolved_types.get("ram"), Some(&1));
        assert_eq!(res.dependency_count(), 1);

        let dep = graph
            .get_edge("module:top", "module:leaf", EdgeKind::Dependency)
            .unwrap();
        assert_eq!(dep.attributes.get("instance_count"), Some(&AttrValue::Int(2)));
        assert_eq!(
            dep.attributes.get("instances"),
            Some(&AttrValue::List(vec!["u0".into(), "u1".into()]))
        );
    }

    #[test]
    fn named_and_positional_bindings_reach_child_ports() {
        let mut graph = graph_of(&[
            "module leaf(input a, output y);\nendmodule",
            "module top;\n wire x, z;\n leaf u1 (.a(x), .y(), .nope(z));\n leaf u0 (x, z);\nendmodule",
        ]);
        resolve_into(&mut graph);

        let named = graph
            .get_edge("instance:top.u1", "port:leaf.a", EdgeKind::Connection)
            .unwrap();
        assert_eq!(named.attributes.get("expr"), Some(&AttrValue::from("x")));
        assert!(graph
            .get_edge("instance:top.u1", "port:leaf.y", EdgeKind::Connection)
            .is_none());
        let positional = graph
            .get_edge("instance:top.u0", "port:leaf.y", EdgeKind::Connection)
            .unwrap();
        assert_eq!(positional.attributes.get("expr"), Some(&AttrValue::from("z")));
        assert_eq!(graph.outgoing("instance:top.u1", Some(EdgeKind::Connection)).len(), 1);
        assert_eq!(graph.outgoing("instance:top.u0", Some(EdgeKind::Connection)).len(), 2);
    }

    #[test]
    fn wildcard_binds_every_port() {
        let mut graph = graph_of(&[
            "module leaf(input a, b, output y);\nendmodule",
            "module top;\n leaf u0 (.*);\nendmodule",
        ]);
        resolve_into(&mut graph);
        assert_eq!(graph.outgoing("instance:top.u0", Some(EdgeKind::Connection)).len(), 3);
    }

    #[test]
    fn resolution_is_idempotent() {
        let mut graph = graph_of(&[
            "module leaf(input a);\nendmodule",
            "module top;\n leaf u0 (.a(1'b0));\nendmodule",
        ]);
        resolve_into(&mut graph);
        let edges = graph.edge_count();
        let again = resolve_into(&mut graph);
        assert_eq!(graph.edge_count(), edges);
        assert_eq!(again.dependency_count(), 1);
    }
}
