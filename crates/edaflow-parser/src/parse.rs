//! Per-file parsing: text in, nodes/edges/diagnostics out.
//!
//! A file's result describes only that file's declarations. Instances keep
//! their `module_type` as an attribute; turning it into DEPENDENCY edges is
//! the job of [`crate::resolve`], once every file has been parsed.

use std::collections::{BTreeMap, HashMap};

use edaflow_core::{GraphEdge, GraphNode, NodeId, NodeKind};
use tokio_util::sync::CancellationToken;

use crate::error::{DiagnosticKind, ParseDiagnostic, ParseError};
use crate::lexer::{tokenize, Issue};
use crate::verilog::{module_spans, scan_module, width_of, Head, ModuleDecl, PortRef};

/// Everything one source file contributes to the design graph.
#[derive(Debug, Clone)]
pub struct ParsedFile {
    pub path: String,
    /// blake3 digest of the raw file bytes.
    pub fingerprint: blake3::Hash,
    pub modules: Vec<String>,
    pub nodes: Vec<GraphNode>,
    pub edges: Vec<GraphEdge>,
    pub diagnostics: Vec<ParseDiagnostic>,
}

impl ParsedFile {
    /// A file that produced no declarations, e.g. one that was too large.
    pub fn empty(path: &str, fingerprint: blake3::Hash) -> Self {
        ParsedFile {
            path: path.to_string(),
            fingerprint,
            modules: Vec::new(),
            nodes: Vec::new(),
            edges: Vec::new(),
            diagnostics: Vec::new(),
        }
    }
}

/// Parses raw bytes, decoding invalid UTF-8 lossily with a diagnostic.
pub fn parse_bytes(
    path: &str,
    bytes: &[u8],
    cancel: &CancellationToken,
) -> Result<ParsedFile, ParseError> {
    match std::str::from_utf8(bytes) {
        Ok(text) => parse_source(path, text, cancel),
        Err(err) => {
            let text = String::from_utf8_lossy(bytes);
            let mut parsed = parse_source(path, &text, cancel)?;
            parsed.fingerprint = blake3::hash(bytes);
            parsed.diagnostics.insert(
                0,
                ParseDiagnostic::new(
                    DiagnosticKind::InvalidEncoding,
                    path,
                    0,
                    format!("invalid UTF-8 at byte {}; decoded lossily", err.valid_up_to()),
                ),
            );
            Ok(parsed)
        }
    }
}

/// Parses one file's text.
///
/// Never fails on content. Returns [`ParseError::Cancelled`] if `cancel`
/// fires; the partial result is dropped.
pub fn parse_source(
    path: &str,
    text: &str,
    cancel: &CancellationToken,
) -> Result<ParsedFile, ParseError> {
    if cancel.is_cancelled() {
        return Err(ParseError::Cancelled);
    }

    let mut parsed = ParsedFile::empty(path, blake3::hash(text.as_bytes()));
    let (tokens, lex_issues) = tokenize(text);
    let (spans, span_issues) = module_spans(&tokens);
    let mut issues: Vec<Issue> = lex_issues;
    issues.extend(span_issues);

    let mut seen: HashMap<String, u32> = HashMap::new();
    for span in &spans {
        if cancel.is_cancelled() {
            return Err(ParseError::Cancelled);
        }
        if let Some(first) = seen.get(&span.name) {
            issues.push(Issue {
                kind: DiagnosticKind::DuplicateModule,
                line: span.line_start,
                message: format!(
                    "module '{}' already defined at line {first}; later definition skipped",
                    span.name
                ),
            });
            continue;
        }
        seen.insert(span.name.clone(), span.line_start);

        let (decl, module_issues) = scan_module(&tokens, span, cancel)?;
        issues.extend(module_issues);
        emit_module(path, &decl, &mut parsed);
        parsed.modules.push(decl.name);
    }

    issues.sort_by_key(|i| i.line);
    for issue in issues {
        tracing::debug!(path, line = issue.line, kind = issue.kind.as_str(), "{}", issue.message);
        parsed
            .diagnostics
            .push(ParseDiagnostic::new(issue.kind, path, issue.line, issue.message));
    }

    tracing::debug!(
        path,
        modules = parsed.modules.len(),
        nodes = parsed.nodes.len(),
        edges = parsed.edges.len(),
        diagnostics = parsed.diagnostics.len(),
        "parsed source file"
    );
    Ok(parsed)
}

fn head_attrs(mut node: GraphNode, head: &Head) -> GraphNode {
    if let Some(net) = &head.net_type {
        node = node.with_attr("net_type", net.as_str());
    }
    if !head.packed.is_empty() {
        node = node.with_attr("range", head.packed.concat());
    }
    if let Some(width) = width_of(head) {
        node = node.with_attr("width", width);
    }
    node
}

/// Converts one scanned module into nodes and edges.
fn emit_module(path: &str, m: &ModuleDecl, out: &mut ParsedFile) {
    let module_id = NodeId::module(&m.name);
    let mut module = GraphNode::new(module_id.clone(), NodeKind::Module, m.name.as_str())
        .with_attr("source_file", path)
        .with_attr("line_start", i64::from(m.line_start))
        .with_attr("line_end", i64::from(m.line_end));
    if !m.parameters.is_empty() {
        module = module.with_attr("parameters", m.parameters.clone());
    }
    out.nodes.push(module);

    // Local names that a connection expression can refer to.
    let mut locals: HashMap<&str, NodeId> = HashMap::new();

    for port in &m.ports {
        let id = NodeId::port(&m.name, &port.name);
        let mut node = GraphNode::new(id.clone(), NodeKind::Port, port.name.as_str())
            .with_attr("source_file", path)
            .with_attr("line", i64::from(port.line))
            .with_attr("module", m.name.as_str());
        if let Some(dir) = &port.head.direction {
            node = node.with_attr("direction", dir.as_str());
        }
        if let Some(index) = port.index {
            node = node.with_attr("index", index);
        }
        out.nodes.push(head_attrs(node, &port.head));
        out.edges.push(GraphEdge::hierarchy(module_id.clone(), id.clone()));
        locals.insert(&port.name, id);
    }

    for signal in &m.signals {
        let id = NodeId::signal(&m.name, &signal.name);
        let node = GraphNode::new(id.clone(), NodeKind::Signal, signal.name.as_str())
            .with_attr("source_file", path)
            .with_attr("line", i64::from(signal.line))
            .with_attr("module", m.name.as_str());
        out.nodes.push(head_attrs(node, &signal.head));
        out.edges.push(GraphEdge::hierarchy(module_id.clone(), id.clone()));
        locals.insert(&signal.name, id);
    }

    for inst in &m.instances {
        let id = NodeId::instance(&m.name, &inst.name);
        let connections: Vec<String> = inst
            .connections
            .iter()
            .map(|c| match &c.port {
                PortRef::Named(port) => format!("{port}={}", c.expr),
                PortRef::Positional(index) => format!("{index}={}", c.expr),
                PortRef::Wildcard => "*".to_string(),
            })
            .collect();
        let mut node = GraphNode::new(id.clone(), NodeKind::Instance, inst.name.as_str())
            .with_attr("source_file", path)
            .with_attr("line", i64::from(inst.line))
            .with_attr("module", m.name.as_str())
            .with_attr("module_type", inst.module_type.as_str())
            .with_attr("connections", connections);
        if let Some(overrides) = &inst.parameter_overrides {
            node = node.with_attr("parameter_overrides", overrides.as_str());
        }
        if let Some(array) = &inst.array {
            node = node.with_attr("range", array.as_str());
        }
        out.nodes.push(node);
        out.edges.push(GraphEdge::hierarchy(module_id.clone(), id.clone()));

        // One CONNECTION edge per local net; pins sharing a net are listed
        // together in `port`.
        let mut bound: BTreeMap<&NodeId, Vec<String>> = BTreeMap::new();
        for conn in &inst.connections {
            let Some(source) = conn.base.as_deref().and_then(|b| locals.get(b)) else {
                continue;
            };
            let pin = match &conn.port {
                PortRef::Named(port) => port.clone(),
                PortRef::Positional(index) => index.to_string(),
                PortRef::Wildcard => continue,
            };
            bound.entry(source).or_default().push(pin);
        }
        for (source, pins) in bound {
            out.edges.push(
                GraphEdge::connection(source.clone(), id.clone()).with_attr("port", pins.join(",")),
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use edaflow_core::{AttrValue, EdgeKind};

    fn parse(src: &str) -> ParsedFile {
        parse_source("rtl/t.v", src, &CancellationToken::new()).unwrap()
    }

    fn node<'a>(p: &'a ParsedFile, id: &str) -> &'a GraphNode {
        p.nodes
            .iter()
            .find(|n| n.id.as_str() == id)
            .unwrap_or_else(|| panic!("missing node {id}"))
    }

    const TWO_MODULES: &str = "\
module leaf(input a, output [3:0] y);
endmodule

module top(input clk, output [3:0] q);
  wire n;
  leaf u0 (.a(n), .y(q));
endmodule
";

    #[test]
    fn emits_modules_ports_signals_instances() {
        let p = parse(TWO_MODULES);
        assert_eq!(p.modules, vec!["leaf", "top"]);
        assert!(p.diagnostics.is_empty());

        let top = node(&p, "module:top");
        assert_eq!(top.attr_str("source_file"), Some("rtl/t.v"));
        assert_eq!(top.attr("line_start"), Some(&AttrValue::Int(4)));
        assert_eq!(top.attr("line_end"), Some(&AttrValue::Int(7)));

        let q = node(&p, "port:top.q");
        assert_eq!(q.attr_str("direction"), Some("output"));
        assert_eq!(q.attr("width"), Some(&AttrValue::Int(4)));
        assert_eq!(q.attr("index"), Some(&AttrValue::Int(1)));

        let u0 = node(&p, "instance:top.u0");
        assert_eq!(u0.attr_str("module_type"), Some("leaf"));
        assert_eq!(
            u0.attr("connections").and_then(AttrValue::as_list),
            Some(&["a=n".to_string(), "y=q".to_string()][..])
        );
        assert_eq!(node(&p, "signal:top.n").attr("width"), Some(&AttrValue::Int(1)));
    }

    #[test]
    fn hierarchy_and_connection_edges() {
        let p = parse(TWO_MODULES);
        let hier: Vec<(&str, &str)> = p
            .edges
            .iter()
            .filter(|e| e.kind == EdgeKind::Hierarchy)
            .map(|e| (e.source_id.as_str(), e.target_id.as_str()))
            .collect();
        assert!(hier.contains(&("module:top", "instance:top.u0")));
        assert!(hier.contains(&("module:top", "signal:top.n")));
        assert!(hier.contains(&("module:leaf", "port:leaf.a")));

        let conn: Vec<&GraphEdge> = p.edges.iter().filter(|e| e.kind == EdgeKind::Connection).collect();
        assert_eq!(conn.len(), 2);
        let from_n = conn.iter().find(|e| e.source_id.as_str() == "signal:top.n").unwrap();
        assert_eq!(from_n.target_id.as_str(), "instance:top.u0");
        assert_eq!(from_n.attributes.get("port"), Some(&AttrValue::from("a")));
        // No DEPENDENCY edges before cross-file resolution.
        assert!(p.edges.iter().all(|e| e.kind != EdgeKind::Dependency));
    }

    #[test]
    fn shared_net_lists_all_pins_on_one_edge() {
        let p = parse("module t(input x);\n  cell c0 (.a(x), .b(x[0]), .c(x & 1));\nendmodule");
        let conn: Vec<&GraphEdge> = p.edges.iter().filter(|e| e.kind == EdgeKind::Connection).collect();
        assert_eq!(conn.len(), 1);
        assert_eq!(conn[0].attributes.get("port"), Some(&AttrValue::from("a,b")));
    }

    #[test]
    fn reparse_is_identical() {
        let a = parse(TWO_MODULES);
        let b = parse(TWO_MODULES);
        assert_eq!(a.nodes, b.nodes);
        assert_eq!(a.edges, b.edges);
        assert_eq!(a.fingerprint, b.fingerprint);
    }

    #[test]
    fn duplicate_module_in_one_file_keeps_first() {
        let p = parse("module m(input a);\nendmodule\nmodule m(input b);\nendmodule\n");
        assert_eq!(p.modules, vec!["m"]);
        assert!(p.nodes.iter().any(|n| n.id.as_str() == "port:m.a"));
        assert!(!p.nodes.iter().any(|n| n.id.as_str() == "port:m.b"));
        assert_eq!(p.diagnostics[0].kind, DiagnosticKind::DuplicateModule);
        assert_eq!(p.diagnostics[0].line, 3);
    }

    #[test]
    fn invalid_utf8_is_decoded_lossily() {
        let mut bytes = b"module m; // caf".to_vec();
        bytes.push(0xff);
        bytes.extend_from_slice(b"\nendmodule\n");
        let p = parse_bytes("m.v", &bytes, &CancellationToken::new()).unwrap();
        assert_eq!(p.modules, vec!["m"]);
        assert_eq!(p.diagnostics[0].kind, DiagnosticKind::InvalidEncoding);
        assert_eq!(p.fingerprint, blake3::hash(&bytes));
    }

    #[test]
    fn cancelled_parse_returns_error() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let err = parse_source("x.v", TWO_MODULES, &cancel).unwrap_err();
        assert!(matches!(err, ParseError::Cancelled));
    }
}
