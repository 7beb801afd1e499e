//! Async driver for one feedback session.
//!
//! # Iteration
//!
//! Each iteration runs plan → tool → reduce → classify → record, strictly in
//! sequence; iteration N+1 starts only after N is recorded.
//!
//! - The tool run is bounded by `tool_timeout`.
//! - The log is reduced on a blocking thread so a multi-gigabyte file does
//!   not stall the runtime.
//! - A failing collaborator ends the iteration early with a FAILURE record
//!   that carries the error text; the iteration budget still applies.
//!
//! Cancelling the token aborts the in-flight step and returns
//! [`SessionError::Cancelled`]; the partial history is dropped.

use std::sync::Arc;

use edaflow_core::{DesignGraph, Subgraph};
use edaflow_logs::{LogError, LogReducer, LogSummary};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::collaborator::{Planner, RootCauseClassifier, ToolLog, ToolRunner};
use crate::config::SessionConfig;
use crate::controller::FeedbackController;
use crate::error::{CollaboratorError, SessionError};
use crate::record::{Decision, Outcome, SessionReport, WorkDescriptor};

/// Everything one iteration contributes to its record.
struct Step {
    work: Option<WorkDescriptor>,
    outcome: Outcome,
    summary: LogSummary,
    recommendations: Vec<String>,
    failure: Option<String>,
}

impl Step {
    fn failed(work: Option<WorkDescriptor>, summary: LogSummary, err: CollaboratorError) -> Self {
        Step {
            work,
            outcome: Outcome::Failure,
            summary,
            recommendations: Vec::new(),
            failure: Some(err.to_string()),
        }
    }
}

/// One retry session: a task, its collaborators, and optional design
/// context.
pub struct FeedbackSession {
    id: Uuid,
    task: String,
    config: SessionConfig,
    planner: Arc<dyn Planner>,
    runner: Arc<dyn ToolRunner>,
    classifier: Arc<dyn RootCauseClassifier>,
    reducer: Arc<LogReducer>,
    graph: Option<Arc<DesignGraph>>,
    focus: Option<String>,
}

impl FeedbackSession {
    pub fn new(
        task: impl Into<String>,
        config: SessionConfig,
        planner: Arc<dyn Planner>,
        runner: Arc<dyn ToolRunner>,
        classifier: Arc<dyn RootCauseClassifier>,
        reducer: Arc<LogReducer>,
    ) -> Self {
        FeedbackSession {
            id: Uuid::new_v4(),
            task: task.into(),
            config,
            planner,
            runner,
            classifier,
            reducer,
            graph: None,
            focus: None,
        }
    }

    /// Hands the planner the neighbourhood of `focus` in `graph` each
    /// iteration.
    pub fn with_design(mut self, graph: Arc<DesignGraph>, focus: impl Into<String>) -> Self {
        self.graph = Some(graph);
        self.focus = Some(focus.into());
        self
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn task(&self) -> &str {
        &self.task
    }

    /// Runs iterations until success or the budget is spent.
    pub async fn run(&self, cancel: &CancellationToken) -> Result<SessionReport, SessionError> {
        self.config.validate()?;
        let mut controller = FeedbackController::new(self.config.max_iterations)?;
        let context = self.context();
        tracing::info!(session = %self.id, task = %self.task, max_iterations = controller.max_iterations(), "session started");

        loop {
            let step = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    tracing::info!(session = %self.id, iteration = controller.iteration(), "session cancelled");
                    return Err(SessionError::Cancelled);
                }
                step = self.iterate(&controller, context.as_ref(), cancel) => step?,
            };
            let decision = controller.record(
                step.work,
                step.outcome,
                step.summary,
                step.recommendations,
                step.failure,
            )?;
            if decision != Decision::Continue {
                break;
            }
        }

        let report = controller.finish();
        tracing::info!(
            session = %self.id,
            state = %report.state,
            iterations = report.iterations(),
            "session finished"
        );
        Ok(report)
    }

    fn context(&self) -> Option<Subgraph> {
        let (graph, focus) = (self.graph.as_ref()?, self.focus.as_deref()?);
        match graph.get_context(focus, self.config.context_depth) {
            Ok(ctx) => Some(ctx),
            Err(err) => {
                tracing::warn!(session = %self.id, focus, "no design context: {}", err);
                None
            }
        }
    }

    async fn iterate(
        &self,
        controller: &FeedbackController,
        context: Option<&Subgraph>,
        cancel: &CancellationToken,
    ) -> Result<Step, SessionError> {
        let iteration = controller.iteration();

        let work = match self.planner.plan(&self.task, context, controller.history()).await {
            Ok(work) => work,
            Err(err) => {
                tracing::warn!(session = %self.id, iteration, "{}", err);
                return Ok(Step::failed(None, LogSummary::default(), err));
            }
        };
        tracing::debug!(session = %self.id, iteration, work = %work.summary, "planned");

        let timeout = self.config.tool_timeout();
        let output = match tokio::time::timeout(timeout, self.runner.run(&work)).await {
            Ok(Ok(output)) => output,
            Ok(Err(err)) => {
                tracing::warn!(session = %self.id, iteration, "{}", err);
                return Ok(Step::failed(Some(work), LogSummary::default(), err));
            }
            Err(_) => {
                let err = CollaboratorError::Timeout(timeout);
                tracing::warn!(session = %self.id, iteration, "{}", err);
                return Ok(Step::failed(Some(work), LogSummary::default(), err));
            }
        };

        let summary = match self.reduce(output.log, cancel).await? {
            Ok(summary) => summary,
            Err(err) => {
                tracing::warn!(session = %self.id, iteration, "{}", err);
                return Ok(Step::failed(Some(work), LogSummary::default(), err));
            }
        };

        match self.classifier.classify(&summary, output.success).await {
            Ok(verdict) => Ok(Step {
                work: Some(work),
                outcome: verdict.outcome,
                summary,
                recommendations: verdict.recommendations,
                failure: None,
            }),
            Err(err) => {
                tracing::warn!(session = %self.id, iteration, "{}", err);
                Ok(Step::failed(Some(work), summary, err))
            }
        }
    }

    /// Reduces a tool log off the async runtime. The outer error is fatal to
    /// the session; the inner one fails only this iteration.
    async fn reduce(
        &self,
        log: ToolLog,
        cancel: &CancellationToken,
    ) -> Result<Result<LogSummary, CollaboratorError>, SessionError> {
        let reducer = Arc::clone(&self.reducer);
        let token = cancel.child_token();
        let reduced = tokio::task::spawn_blocking(move || match log {
            ToolLog::Text(text) => reducer.reduce_str(&text, &token),
            ToolLog::File(path) => reducer.reduce_file(&path, &token),
        })
        .await?;

        match reduced {
            Ok(summary) => Ok(Ok(summary)),
            Err(LogError::Cancelled) => Err(SessionError::Cancelled),
            Err(err) => Ok(Err(CollaboratorError::Log(err.to_string()))),
        }
    }
}
