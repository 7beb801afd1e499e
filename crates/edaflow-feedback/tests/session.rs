//! Sessions driven end to end with scripted collaborators.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use edaflow_core::{DesignGraph, GraphEdge, GraphNode, NodeId, NodeKind, Subgraph};
use edaflow_feedback::{
    Classification, CollaboratorError, Decision, FeedbackHistory, FeedbackSession, HeuristicClassifier,
    Outcome, Planner, RootCauseClassifier, SessionConfig, SessionError, SessionPool, SessionState,
    ToolLog, ToolOutput, ToolRunner, WorkDescriptor,
};
use edaflow_logs::{LogReducer, LogSummary, ReducerConfig};
use tokio_util::sync::CancellationToken;

struct CountingPlanner;

#[async_trait]
impl Planner for CountingPlanner {
    async fn plan(
        &self,
        task: &str,
        _context: Option<&Subgraph>,
        history: &FeedbackHistory,
    ) -> Result<WorkDescriptor, CollaboratorError> {
        Ok(WorkDescriptor::new(format!("{task} #{}", history.len())))
    }
}

struct BrokenPlanner;

#[async_trait]
impl Planner for BrokenPlanner {
    async fn plan(
        &self,
        _task: &str,
        _context: Option<&Subgraph>,
        _history: &FeedbackHistory,
    ) -> Result<WorkDescriptor, CollaboratorError> {
        Err(CollaboratorError::Planner("no model available".into()))
    }
}

/// Hands out recorded logs in order; the last one repeats.
struct ScriptedRunner {
    logs: Mutex<VecDeque<&'static str>>,
    calls: AtomicUsize,
}

impl ScriptedRunner {
    fn new(logs: &[&'static str]) -> Arc<Self> {
        Arc::new(ScriptedRunner {
            logs: Mutex::new(logs.iter().copied().collect()),
            calls: AtomicUsize::new(0),
        })
    }
}

#[async_trait]
impl ToolRunner for ScriptedRunner {
    async fn run(&self, _work: &WorkDescriptor) -> Result<ToolOutput, CollaboratorError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let mut logs = self.logs.lock().unwrap();
        let log = if logs.len() > 1 {
            logs.pop_front().unwrap()
        } else {
            logs.front().copied().unwrap_or("")
        };
        Ok(ToolOutput {
            log: ToolLog::Text(log.to_string()),
            success: true,
        })
    }
}

struct StuckRunner;

#[async_trait]
impl ToolRunner for StuckRunner {
    async fn run(&self, _work: &WorkDescriptor) -> Result<ToolOutput, CollaboratorError> {
        tokio::time::sleep(Duration::from_secs(24 * 3600)).await;
        Err(CollaboratorError::ToolRunner("unreachable".into()))
    }
}

struct BrokenClassifier;

#[async_trait]
impl RootCauseClassifier for BrokenClassifier {
    async fn classify(&self, _summary: &LogSummary, _ok: bool) -> Result<Classification, CollaboratorError> {
        Err(CollaboratorError::Classifier("bad response".into()))
    }
}

fn reducer() -> Arc<LogReducer> {
    Arc::new(LogReducer::new(ReducerConfig::default()).unwrap())
}

fn config(max_iterations: usize) -> SessionConfig {
    SessionConfig {
        max_iterations,
        tool_timeout_secs: 5,
        ..SessionConfig::default()
    }
}

fn session(
    max_iterations: usize,
    planner: Arc<dyn Planner>,
    runner: Arc<dyn ToolRunner>,
) -> FeedbackSession {
    FeedbackSession::new(
        "fix synthesis",
        config(max_iterations),
        planner,
        runner,
        Arc::new(HeuristicClassifier),
        reducer(),
    )
}

#[tokio::test]
async fn never_succeeding_session_records_exactly_n() {
    let runner = ScriptedRunner::new(&["Error: [Synth 8-439] module 'foo' not found"]);
    let s = session(3, Arc::new(CountingPlanner), runner.clone());
    let report = s.run(&CancellationToken::new()).await.unwrap();

    assert_eq!(report.state, SessionState::StoppedExhausted);
    assert_eq!(report.decision, Some(Decision::StopExhausted));
    assert_eq!(report.records.len(), 3);
    assert_eq!(runner.calls.load(Ordering::SeqCst), 3);
    assert!(report.records.iter().all(|r| r.outcome == Outcome::Failure));
    assert_eq!(
        report.records[2].work_descriptor.as_ref().map(|w| w.summary.as_str()),
        Some("fix synthesis #2")
    );
}

#[tokio::test]
async fn success_on_iteration_k_stops_with_k_records() {
    let runner = ScriptedRunner::new(&[
        "Error: syntax error near 'end'",
        "  slack (VIOLATED) -0.05",
        "synthesis finished",
    ]);
    let s = session(5, Arc::new(CountingPlanner), runner);
    let report = s.run(&CancellationToken::new()).await.unwrap();

    assert_eq!(report.state, SessionState::StoppedSuccess);
    let outcomes: Vec<Outcome> = report.records.iter().map(|r| r.outcome).collect();
    assert_eq!(outcomes, vec![Outcome::Failure, Outcome::Partial, Outcome::Success]);
    assert_eq!(report.records[1].summary.violations.len(), 1);
}

#[tokio::test]
async fn planner_failure_still_respects_the_cap() {
    let runner = ScriptedRunner::new(&["unused"]);
    let s = session(2, Arc::new(BrokenPlanner), runner.clone());
    let report = s.run(&CancellationToken::new()).await.unwrap();

    assert_eq!(report.state, SessionState::StoppedExhausted);
    assert_eq!(report.records.len(), 2);
    assert_eq!(runner.calls.load(Ordering::SeqCst), 0);
    for record in &report.records {
        assert_eq!(record.outcome, Outcome::Failure);
        assert!(record.work_descriptor.is_none());
        assert_eq!(record.failure.as_deref(), Some("planner failed: no model available"));
    }
}

#[tokio::test]
async fn classifier_failure_keeps_the_summary() {
    let s = FeedbackSession::new(
        "lint",
        config(1),
        Arc::new(CountingPlanner),
        ScriptedRunner::new(&["Warning: [Lint 1-1] unused"]),
        Arc::new(BrokenClassifier),
        reducer(),
    );
    let report = s.run(&CancellationToken::new()).await.unwrap();
    let record = &report.records[0];
    assert_eq!(record.outcome, Outcome::Failure);
    assert_eq!(record.summary.warning_count(), 1);
    assert!(record.failure.as_deref().unwrap().contains("bad response"));
}

#[tokio::test(start_paused = true)]
async fn hung_tool_times_out_each_iteration() {
    let s = session(2, Arc::new(CountingPlanner), Arc::new(StuckRunner));
    let report = s.run(&CancellationToken::new()).await.unwrap();
    assert_eq!(report.state, SessionState::StoppedExhausted);
    assert_eq!(report.records.len(), 2);
    assert!(report.records[0].failure.as_deref().unwrap().contains("exceeded"));
}

#[tokio::test]
async fn cancellation_discards_the_session() {
    let s = session(3, Arc::new(CountingPlanner), Arc::new(StuckRunner));
    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(20)).await;
        trigger.cancel();
    });
    let err = s.run(&cancel).await.unwrap_err();
    assert!(matches!(err, SessionError::Cancelled));
}

/// Checks that the planner sees the design neighbourhood it was given.
struct ContextPlanner;

#[async_trait]
impl Planner for ContextPlanner {
    async fn plan(
        &self,
        _task: &str,
        context: Option<&Subgraph>,
        _history: &FeedbackHistory,
    ) -> Result<WorkDescriptor, CollaboratorError> {
        let ctx = context.ok_or_else(|| CollaboratorError::Planner("missing context".into()))?;
        if !ctx.contains("module:top") {
            return Err(CollaboratorError::Planner("top not in context".into()));
        }
        Ok(WorkDescriptor::new("retime leaf"))
    }
}

#[tokio::test]
async fn planner_receives_design_context() {
    let (graph, _) = DesignGraph::from_parts(
        [
            GraphNode::new(NodeId::module("top"), NodeKind::Module, "top"),
            GraphNode::new(NodeId::module("leaf"), NodeKind::Module, "leaf"),
        ],
        [GraphEdge::dependency(NodeId::module("top"), NodeId::module("leaf"))],
    );
    let s = FeedbackSession::new(
        "timing",
        config(1),
        Arc::new(ContextPlanner),
        ScriptedRunner::new(&["done"]),
        Arc::new(HeuristicClassifier),
        reducer(),
    )
    .with_design(Arc::new(graph), "leaf");
    let report = s.run(&CancellationToken::new()).await.unwrap();
    assert!(report.succeeded());
}

/// Tracks how many runs overlap.
struct GaugeRunner {
    active: AtomicUsize,
    peak: AtomicUsize,
}

#[async_trait]
impl ToolRunner for GaugeRunner {
    async fn run(&self, _work: &WorkDescriptor) -> Result<ToolOutput, CollaboratorError> {
        let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(10)).await;
        self.active.fetch_sub(1, Ordering::SeqCst);
        Ok(ToolOutput {
            log: ToolLog::Text("ok".into()),
            success: true,
        })
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn pool_bounds_concurrent_sessions() {
    let gauge = Arc::new(GaugeRunner {
        active: AtomicUsize::new(0),
        peak: AtomicUsize::new(0),
    });
    let pool = SessionPool::new(2).unwrap();
    let sessions = (0..6).map(|_| session(1, Arc::new(CountingPlanner), gauge.clone()));
    let results = pool.run_all(sessions).await;

    assert_eq!(results.len(), 6);
    for (_, result) in &results {
        assert!(result.as_ref().unwrap().succeeded());
    }
    assert!(gauge.peak.load(Ordering::SeqCst) <= 2);
    assert!(pool.running().is_empty());
    assert_eq!(pool.available_permits(), 2);
}

#[tokio::test]
async fn pool_cancels_a_running_session() {
    let pool = SessionPool::new(1).unwrap();
    let (id, handle) = pool.spawn(session(3, Arc::new(CountingPlanner), Arc::new(StuckRunner)));
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert!(pool.cancel(&id));
    let result = handle.await.unwrap();
    assert!(matches!(result, Err(SessionError::Cancelled)));
    assert!(!pool.cancel(&id));
}

#[tokio::test]
async fn pool_is_reusable_after_cancel_all() {
    let pool = SessionPool::new(2).unwrap();
    let (_, stuck) = pool.spawn(session(3, Arc::new(CountingPlanner), Arc::new(StuckRunner)));
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(pool.cancel_all(), 1);
    assert!(matches!(stuck.await.unwrap(), Err(SessionError::Cancelled)));

    let (_, fresh) = pool.spawn(session(1, Arc::new(CountingPlanner), ScriptedRunner::new(&["done"])));
    let report = fresh.await.unwrap().unwrap();
    assert!(report.succeeded());
}
