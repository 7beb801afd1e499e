//! edaflow command-line interface.
//!
//! Provides the `edaflow` binary: index HDL sources into a design graph,
//! query a saved graph, reduce tool logs, and replay recorded tool logs
//! through a feedback session. Results are printed as JSON on stdout;
//! logs go to stderr and are filtered by `RUST_LOG` (default
//! `edaflow=info`).

mod config;
mod error;
mod replay;

use std::io::Write;
use std::path::{Path, PathBuf};
use std::process;
use std::sync::Arc;

use clap::{Parser, Subcommand, ValueEnum};
use serde::Serialize;
use serde_json::json;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use edaflow_core::{DesignGraph, NamePattern, NodeKind};
use edaflow_feedback::{FeedbackSession, HeuristicClassifier};
use edaflow_logs::LogReducer;
use edaflow_parser::{discover_sources, Indexer};

use crate::config::EdaflowConfig;
use crate::error::CliError;
use crate::replay::{ReplayPlanner, ReplayRunner};

/// Design-graph indexing and log-driven feedback for HDL projects.
#[derive(Parser)]
#[command(name = "edaflow", version, about = "HDL design graph and EDA log tools")]
struct Cli {
    /// TOML configuration file (default: ./edaflow.toml if present).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Parse HDL sources and save the resolved design graph.
    Index {
        /// Files or directories to index.
        #[arg(required = true)]
        paths: Vec<PathBuf>,

        /// Where to write the graph.
        #[arg(short, long, default_value = "graph.json")]
        out: PathBuf,
    },

    /// Print the neighbourhood of a node.
    Context {
        #[arg(short, long)]
        graph: PathBuf,

        /// Node id or module name.
        node: String,

        #[arg(short, long, default_value_t = 1)]
        depth: usize,
    },

    /// Print the instance hierarchy below a module.
    Hierarchy {
        #[arg(short, long)]
        graph: PathBuf,

        module: String,
    },

    /// Find nodes by name (glob with `*`/`?`, substring otherwise).
    Find {
        #[arg(short, long)]
        graph: PathBuf,

        pattern: String,

        #[arg(short, long)]
        ignore_case: bool,

        #[arg(short, long, value_enum)]
        kind: Option<KindArg>,
    },

    /// Report module dependency order and cycles.
    Deps {
        #[arg(short, long)]
        graph: PathBuf,
    },

    /// Reduce a tool log to a bounded summary.
    ReduceLog {
        log: PathBuf,

        /// Write the summary here instead of stdout.
        #[arg(short, long)]
        out: Option<PathBuf>,
    },

    /// Run a feedback session over recorded logs, one per iteration.
    Replay {
        #[arg(short, long)]
        task: String,

        #[arg(required = true)]
        logs: Vec<PathBuf>,

        /// Design graph handed to the planner as context.
        #[arg(short, long, requires = "focus")]
        graph: Option<PathBuf>,

        /// Node the design context is centred on.
        #[arg(short, long, requires = "graph")]
        focus: Option<String>,

        /// Write the session history here instead of stdout.
        #[arg(short, long)]
        out: Option<PathBuf>,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum KindArg {
    Module,
    Port,
    Signal,
    Instance,
}

impl From<KindArg> for NodeKind {
    fn from(kind: KindArg) -> Self {
        match kind {
            KindArg::Module => NodeKind::Module,
            KindArg::Port => NodeKind::Port,
            KindArg::Signal => NodeKind::Signal,
            KindArg::Instance => NodeKind::Instance,
        }
    }
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("edaflow=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let code = match run(cli) {
        Ok(()) => 0,
        Err(err) => {
            eprintln!("Error: {}", err);
            err.exit_code()
        }
    };
    process::exit(code);
}

fn run(cli: Cli) -> Result<(), CliError> {
    let config = EdaflowConfig::load(cli.config.as_deref())?;

    match cli.command {
        Commands::Index { paths, out } => run_index(&config, &paths, &out),
        Commands::Context { graph, node, depth } => {
            let graph = DesignGraph::load(&graph)?;
            emit(&graph.get_context(&node, depth)?, None)
        }
        Commands::Hierarchy { graph, module } => {
            let graph = DesignGraph::load(&graph)?;
            emit(&graph.get_hierarchy(&module)?, None)
        }
        Commands::Find {
            graph,
            pattern,
            ignore_case,
            kind,
        } => {
            let graph = DesignGraph::load(&graph)?;
            let pattern = NamePattern::new(&pattern)
                .case_insensitive(ignore_case)
                .kind(kind.map(NodeKind::from));
            emit(&graph.find_matching(&pattern), None)
        }
        Commands::Deps { graph } => {
            let graph = DesignGraph::load(&graph)?;
            emit(&graph.analyze_dependencies(), None)
        }
        Commands::ReduceLog { log, out } => {
            let reducer = LogReducer::new(config.reducer.clone())?;
            let summary = reducer.reduce_file(&log, &CancellationToken::new())?;
            emit(&summary, out.as_deref())
        }
        Commands::Replay {
            task,
            logs,
            graph,
            focus,
            out,
        } => run_replay(&config, task, logs, graph.zip(focus), out.as_deref()),
    }
}

/// Execute the index subcommand: discover, parse, resolve, save.
fn run_index(config: &EdaflowConfig, paths: &[PathBuf], out: &Path) -> Result<(), CliError> {
    let files = discover_sources(paths, &config.parser)?;
    tracing::info!(files = files.len(), "indexing");

    let mut indexer = Indexer::new(config.parser.clone())?;
    let mut graph = DesignGraph::new();
    let report = indexer.index_paths(&mut graph, &files, &CancellationToken::new())?;
    graph.save(out)?;

    emit(
        &json!({
            "graph": out,
            "report": report,
            "stats": graph.stats(),
        }),
        None,
    )
}

/// Execute the replay subcommand.
///
/// Exits with an analysis failure when the session ends without a
/// successful iteration; the history is still written.
fn run_replay(
    config: &EdaflowConfig,
    task: String,
    logs: Vec<PathBuf>,
    design: Option<(PathBuf, String)>,
    out: Option<&Path>,
) -> Result<(), CliError> {
    let reducer = Arc::new(LogReducer::new(config.reducer.clone())?);
    let mut session = FeedbackSession::new(
        task,
        config.session.clone(),
        Arc::new(ReplayPlanner::new(logs.clone())),
        Arc::new(ReplayRunner::new(logs)),
        Arc::new(HeuristicClassifier),
        reducer,
    );
    if let Some((graph, focus)) = design {
        session = session.with_design(Arc::new(DesignGraph::load(&graph)?), focus);
    }

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|source| CliError::Io {
            path: PathBuf::from("<runtime>"),
            source,
        })?;

    let report = runtime.block_on(async {
        let cancel = CancellationToken::new();
        let on_interrupt = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::info!("interrupted");
                on_interrupt.cancel();
            }
        });
        session.run(&cancel).await
    })?;

    emit(&report, out)?;
    if report.succeeded() {
        Ok(())
    } else {
        Err(CliError::Analysis(format!(
            "session ended {} after {} iteration(s)",
            report.state,
            report.iterations()
        )))
    }
}

/// Writes `value` as pretty JSON to `out`, or to stdout.
fn emit<T: Serialize + ?Sized>(value: &T, out: Option<&Path>) -> Result<(), CliError> {
    let text = serde_json::to_string_pretty(value)?;
    match out {
        Some(path) => std::fs::write(path, text + "\n").map_err(|source| CliError::Io {
            path: path.to_path_buf(),
            source,
        }),
        None => {
            let mut stdout = std::io::stdout().lock();
            writeln!(stdout, "{}", text).map_err(|source| CliError::Io {
                path: PathBuf::from("<stdout>"),
                source,
            })
        }
    }
}
