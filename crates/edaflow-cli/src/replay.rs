//! Offline feedback sessions over recorded tool logs.
//!
//! The replay planner describes which recording comes next; the replay
//! runner hands the recordings to the reducer one per iteration, in the
//! order given. Running out of recordings is a tool failure for that
//! iteration.

use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use edaflow_core::Subgraph;
use edaflow_feedback::{
    CollaboratorError, FeedbackHistory, Planner, ToolLog, ToolOutput, ToolRunner, WorkDescriptor,
};
use serde_json::json;

pub struct ReplayPlanner {
    logs: Vec<PathBuf>,
}

impl ReplayPlanner {
    pub fn new(logs: Vec<PathBuf>) -> Self {
        ReplayPlanner { logs }
    }
}

#[async_trait]
impl Planner for ReplayPlanner {
    async fn plan(
        &self,
        task: &str,
        context: Option<&Subgraph>,
        history: &FeedbackHistory,
    ) -> Result<WorkDescriptor, CollaboratorError> {
        let index = history.len();
        let log = self.logs.get(index).ok_or_else(|| {
            CollaboratorError::Planner(format!("no recorded log for iteration {index}"))
        })?;
        let payload = json!({
            "task": task,
            "log": log,
            "context_nodes": context.map_or(0, |c| c.nodes.len()),
        });
        Ok(WorkDescriptor::new(format!("replay {}", log.display())).with_payload(payload))
    }
}

pub struct ReplayRunner {
    logs: Vec<PathBuf>,
    next: AtomicUsize,
}

impl ReplayRunner {
    pub fn new(logs: Vec<PathBuf>) -> Self {
        ReplayRunner {
            logs,
            next: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl ToolRunner for ReplayRunner {
    async fn run(&self, _work: &WorkDescriptor) -> Result<ToolOutput, CollaboratorError> {
        let index = self.next.fetch_add(1, Ordering::SeqCst);
        let path = self.logs.get(index).ok_or_else(|| {
            CollaboratorError::ToolRunner(format!("recording {index} does not exist"))
        })?;
        Ok(ToolOutput {
            log: ToolLog::File(path.clone()),
            success: true,
        })
    }
}
