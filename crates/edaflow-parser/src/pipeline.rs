//! Parallel indexing pipeline.
//!
//! # Architecture
//!
//! An index call runs in three phases:
//!
//! 1. **Parse.** Each source is read, fingerprinted and parsed on the
//!    indexer's rayon pool (`max_workers` threads). Workers only read shared
//!    state; a file whose fingerprint matches the previous index is not
//!    parsed again.
//! 2. **Merge.** After the join, a single writer retracts the previous nodes
//!    of every changed file, then merges the new results in path order. A
//!    module name already owned by another file is diagnosed and the later
//!    copy dropped, so the first definition in path order wins.
//! 3. **Resolve.** The cross-file pass derives DEPENDENCY and instance→port
//!    CONNECTION edges over the whole graph.
//!
//! Cancellation is checked by the workers and again at the join. A cancelled
//! call returns [`ParseError::Cancelled`] and leaves the graph untouched.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::{Path, PathBuf};

use edaflow_core::{DesignGraph, GraphNode, NodeId, NodeKind};
use rayon::prelude::*;
use serde::Serialize;
use tokio_util::sync::CancellationToken;

use crate::config::ParserConfig;
use crate::error::{DiagnosticKind, ParseDiagnostic, ParseError};
use crate::parse::{parse_bytes, parse_source, ParsedFile};
use crate::resolve::resolve_into;

/// One unit of parse work.
#[derive(Debug, Clone)]
pub enum Source {
    /// A file on disk.
    Path(PathBuf),
    /// In-memory text under a logical path.
    Text { path: String, text: String },
}

impl Source {
    pub fn key(&self) -> String {
        match self {
            Source::Path(p) => path_key(p),
            Source::Text { path, .. } => path.clone(),
        }
    }
}

fn path_key(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

enum Outcome {
    Unchanged,
    Parsed(ParsedFile),
}

/// Summary of one index call.
#[derive(Debug, Clone, Default, Serialize)]
pub struct IndexReport {
    pub files_seen: usize,
    pub files_parsed: usize,
    pub files_unchanged: usize,
    pub modules: usize,
    pub nodes_removed: usize,
    pub nodes_added: usize,
    pub nodes_updated: usize,
    pub edges_added: usize,
    pub rejected_edges: usize,
    pub resolved_instances: usize,
    pub unresolved_instances: usize,
    pub unresolved_types: BTreeMap<String, usize>,
    pub diagnostics: Vec<ParseDiagnostic>,
}

/// Incremental indexer. Holds the worker pool and per-file fingerprints so
/// repeated calls only reparse what changed.
pub struct Indexer {
    config: ParserConfig,
    pool: rayon::ThreadPool,
    fingerprints: HashMap<String, blake3::Hash>,
    /// Module name → file that defines it.
    owners: HashMap<String, String>,
}

impl Indexer {
    pub fn new(config: ParserConfig) -> Result<Self, ParseError> {
        config.validate()?;
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(config.max_workers)
            .thread_name(|i| format!("edaflow-parse-{i}"))
            .build()?;
        Ok(Indexer {
            config,
            pool,
            fingerprints: HashMap::new(),
            owners: HashMap::new(),
        })
    }

    pub fn config(&self) -> &ParserConfig {
        &self.config
    }

    /// Indexes files on disk.
    pub fn index_paths(
        &mut self,
        graph: &mut DesignGraph,
        paths: &[PathBuf],
        cancel: &CancellationToken,
    ) -> Result<IndexReport, ParseError> {
        let jobs = paths.iter().cloned().map(Source::Path).collect();
        self.run(graph, jobs, cancel)
    }

    /// Indexes in-memory `(path, text)` pairs.
    pub fn index_sources(
        &mut self,
        graph: &mut DesignGraph,
        sources: impl IntoIterator<Item = (String, String)>,
        cancel: &CancellationToken,
    ) -> Result<IndexReport, ParseError> {
        let jobs = sources
            .into_iter()
            .map(|(path, text)| Source::Text { path, text })
            .collect();
        self.run(graph, jobs, cancel)
    }

    /// Drops everything a file contributed. Returns the number of nodes
    /// removed.
    pub fn forget(&mut self, graph: &mut DesignGraph, path: &str) -> usize {
        self.fingerprints.remove(path);
        self.owners.retain(|_, owner| *owner != path);
        let removed = graph.remove_source(path);
        resolve_into(graph);
        removed
    }

    fn run(
        &mut self,
        graph: &mut DesignGraph,
        mut jobs: Vec<Source>,
        cancel: &CancellationToken,
    ) -> Result<IndexReport, ParseError> {
        jobs.sort_by_key(Source::key);
        jobs.dedup_by_key(|job| job.key());
        tracing::info!(files = jobs.len(), workers = self.config.max_workers, "indexing");

        // Phase 1: parse in parallel.
        let results: Vec<Result<Outcome, ParseError>> = self
            .pool
            .install(|| jobs.par_iter().map(|job| self.load(job, cancel)).collect());
        if cancel.is_cancelled() {
            tracing::info!("indexing cancelled; results discarded");
            return Err(ParseError::Cancelled);
        }

        let mut report = IndexReport {
            files_seen: jobs.len(),
            ..IndexReport::default()
        };
        let mut parsed = Vec::new();
        for result in results {
            match result? {
                Outcome::Unchanged => report.files_unchanged += 1,
                Outcome::Parsed(file) => parsed.push(file),
            }
        }
        report.files_parsed = parsed.len();

        if parsed.is_empty() {
            tracing::info!(unchanged = report.files_unchanged, "nothing to merge");
            return Ok(report);
        }

        // Phase 2: single-writer merge.
        for file in &parsed {
            report.nodes_removed += graph.remove_source(&file.path);
            self.owners.retain(|_, owner| *owner != file.path);
        }
        for file in parsed {
            self.merge(graph, file, &mut report);
        }

        // Phase 3: cross-file resolution.
        let resolution = resolve_into(graph);
        report.resolved_instances = resolution.resolved_instances;
        report.unresolved_instances = resolution.unresolved_instances;
        report.unresolved_types = resolution.unresolved_types;

        tracing::info!(
            parsed = report.files_parsed,
            unchanged = report.files_unchanged,
            modules = report.modules,
            nodes = graph.node_count(),
            edges = graph.edge_count(),
            diagnostics = report.diagnostics.len(),
            "index complete"
        );
        Ok(report)
    }

    /// Reads and parses one source on a worker thread.
    fn load(&self, job: &Source, cancel: &CancellationToken) -> Result<Outcome, ParseError> {
        if cancel.is_cancelled() {
            return Err(ParseError::Cancelled);
        }
        let key = job.key();
        let unchanged = |fp: &blake3::Hash| self.fingerprints.get(&key) == Some(fp);

        match job {
            Source::Path(path) => {
                let io = |source| ParseError::Io {
                    path: path.clone(),
                    source,
                };
                let len = std::fs::metadata(path).map_err(io)?.len();
                if len > self.config.max_file_bytes {
                    let fp = blake3::hash(format!("{key}:{len}").as_bytes());
                    if unchanged(&fp) {
                        return Ok(Outcome::Unchanged);
                    }
                    return Ok(Outcome::Parsed(self.too_large(&key, fp, len)));
                }
                let bytes = std::fs::read(path).map_err(io)?;
                if unchanged(&blake3::hash(&bytes)) {
                    return Ok(Outcome::Unchanged);
                }
                parse_bytes(&key, &bytes, cancel).map(Outcome::Parsed)
            }
            Source::Text { path, text } => {
                let fp = blake3::hash(text.as_bytes());
                if unchanged(&fp) {
                    return Ok(Outcome::Unchanged);
                }
                let len = text.len() as u64;
                if len > self.config.max_file_bytes {
                    return Ok(Outcome::Parsed(self.too_large(path, fp, len)));
                }
                parse_source(path, text, cancel).map(Outcome::Parsed)
            }
        }
    }

    fn too_large(&self, path: &str, fingerprint: blake3::Hash, len: u64) -> ParsedFile {
        let mut file = ParsedFile::empty(path, fingerprint);
        file.diagnostics.push(ParseDiagnostic::new(
            DiagnosticKind::FileTooLarge,
            path,
            0,
            format!("{len} bytes exceeds limit of {}", self.config.max_file_bytes),
        ));
        file
    }

    fn merge(&mut self, graph: &mut DesignGraph, mut file: ParsedFile, report: &mut IndexReport) {
        let mut dropped: HashSet<String> = HashSet::new();
        for module in &file.modules {
            match self.owners.get(module) {
                Some(owner) if *owner != file.path => {
                    let line = graph
                        .get_node(NodeId::module(module).as_str())
                        .and_then(|n| n.attr("line_start"))
                        .and_then(|v| v.as_int())
                        .unwrap_or(0);
                    file.diagnostics.push(ParseDiagnostic::new(
                        DiagnosticKind::DuplicateModule,
                        &file.path,
                        0,
                        format!("module '{module}' already defined in {owner}:{line}; skipped"),
                    ));
                    dropped.insert(module.clone());
                }
                _ => {
                    self.owners.insert(module.clone(), file.path.clone());
                    report.modules += 1;
                }
            }
        }

        let (nodes, edges) = if dropped.is_empty() {
            (file.nodes, file.edges)
        } else {
            let owned_by_dropped = |n: &GraphNode| {
                let module = match n.kind {
                    NodeKind::Module => Some(n.name.as_str()),
                    _ => n.attr_str("module"),
                };
                module.is_some_and(|m| dropped.contains(m))
            };
            let gone: HashSet<NodeId> = file
                .nodes
                .iter()
                .filter(|&n| owned_by_dropped(n))
                .map(|n| n.id.clone())
                .collect();
            let nodes: Vec<GraphNode> = file.nodes.into_iter().filter(|n| !gone.contains(&n.id)).collect();
            let edges = file
                .edges
                .into_iter()
                .filter(|e| !gone.contains(&e.source_id) && !gone.contains(&e.target_id))
                .collect();
            (nodes, edges)
        };

        for diag in &file.diagnostics {
            tracing::warn!(path = %diag.path, line = diag.line, kind = diag.kind.as_str(), "{}", diag.message);
        }

        let added = graph.add(nodes, edges);
        report.nodes_added += added.nodes_added;
        report.nodes_updated += added.nodes_updated;
        report.edges_added += added.edges_added;
        report.rejected_edges += added.rejected.len();
        report.diagnostics.append(&mut file.diagnostics);
        self.fingerprints.insert(file.path, file.fingerprint);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use edaflow_core::EdgeKind;

    fn indexer() -> Indexer {
        Indexer::new(ParserConfig {
            max_workers: 2,
            ..ParserConfig::default()
        })
        .unwrap()
    }

    fn src(path: &str, text: &str) -> (String, String) {
        (path.to_string(), text.to_string())
    }

    #[test]
    fn unchanged_files_are_skipped() {
        let mut idx = indexer();
        let mut graph = DesignGraph::new();
        let cancel = CancellationToken::new();
        let files = vec![
            src("a.v", "module leaf(input a);\nendmodule"),
            src("b.v", "module top;\n leaf u0 (.a(1'b1));\nendmodule"),
        ];

        let first = idx.index_sources(&mut graph, files.clone(), &cancel).unwrap();
        assert_eq!(first.files_parsed, 2);
        assert_eq!(first.modules, 2);
        let nodes = graph.node_count();
        let edges = graph.edge_count();

        let second = idx.index_sources(&mut graph, files, &cancel).unwrap();
        assert_eq!(second.files_parsed, 0);
        assert_eq!(second.files_unchanged, 2);
        assert_eq!(graph.node_count(), nodes);
        assert_eq!(graph.edge_count(), edges);
    }

    #[test]
    fn changed_file_replaces_its_nodes() {
        let mut idx = indexer();
        let mut graph = DesignGraph::new();
        let cancel = CancellationToken::new();
        idx.index_sources(
            &mut graph,
            vec![
                src("a.v", "module leaf(input a, input b);\nendmodule"),
                src("b.v", "module top;\n leaf u0 (.a(1'b1));\nendmodule"),
            ],
            &cancel,
        )
        .unwrap();
        assert!(graph.contains("port:leaf.b"));

        let report = idx
            .index_sources(&mut graph, vec![src("a.v", "module leaf(input a);\nendmodule")], &cancel)
            .unwrap();
        assert_eq!(report.files_parsed, 1);
        assert!(!graph.contains("port:leaf.b"));
        // The dependency from the unchanged file is re-derived.
        assert!(graph
            .get_edge("module:top", "module:leaf", EdgeKind::Dependency)
            .is_some());
        assert!(graph
            .get_edge("instance:top.u0", "port:leaf.a", EdgeKind::Connection)
            .is_some());
    }

    #[test]
    fn duplicate_module_across_files_keeps_first_path() {
        let mut idx = indexer();
        let mut graph = DesignGraph::new();
        let report = idx
            .index_sources(
                &mut graph,
                vec![
                    src("b.v", "module m(input from_b);\nendmodule"),
                    src("a.v", "module m(input from_a);\nendmodule"),
                ],
                &CancellationToken::new(),
            )
            .unwrap();
        assert_eq!(report.modules, 1);
        assert!(graph.contains("port:m.from_a"));
        assert!(!graph.contains("port:m.from_b"));
        assert_eq!(graph.get_node("module:m").unwrap().attr_str("source_file"), Some("a.v"));
        assert_eq!(report.diagnostics.len(), 1);
        assert_eq!(report.diagnostics[0].kind, DiagnosticKind::DuplicateModule);
        assert_eq!(report.diagnostics[0].path, "b.v");
    }

    #[test]
    fn oversized_source_is_diagnosed() {
        let mut idx = Indexer::new(ParserConfig {
            max_workers: 1,
            max_file_bytes: 8,
            ..ParserConfig::default()
        })
        .unwrap();
        let mut graph = DesignGraph::new();
        let report = idx
            .index_sources(
                &mut graph,
                vec![src("big.v", "module big;\nendmodule")],
                &CancellationToken::new(),
            )
            .unwrap();
        assert!(graph.is_empty());
        assert_eq!(report.diagnostics[0].kind, DiagnosticKind::FileTooLarge);
    }

    #[test]
    fn cancelled_index_leaves_graph_untouched() {
        let mut idx = indexer();
        let mut graph = DesignGraph::new();
        let cancel = CancellationToken::new();
        cancel.cancel();
        let err = idx
            .index_sources(&mut graph, vec![src("a.v", "module a;\nendmodule")], &cancel)
            .unwrap_err();
        assert!(matches!(err, ParseError::Cancelled));
        assert!(graph.is_empty());

        // Nothing was recorded, so a later call parses the file.
        let report = idx
            .index_sources(
                &mut graph,
                vec![src("a.v", "module a;\nendmodule")],
                &CancellationToken::new(),
            )
            .unwrap();
        assert_eq!(report.files_parsed, 1);
    }

    #[test]
    fn forget_removes_a_file() {
        let mut idx = indexer();
        let mut graph = DesignGraph::new();
        idx.index_sources(
            &mut graph,
            vec![src("a.v", "module a(input x);\nendmodule")],
            &CancellationToken::new(),
        )
        .unwrap();
        assert_eq!(idx.forget(&mut graph, "a.v"), 2);
        assert!(graph.is_empty());
    }
}
