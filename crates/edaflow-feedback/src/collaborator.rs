//! Contracts for the external collaborators a session drives.
//!
//! The controller depends only on these three traits. Implementations (a
//! language-model planner, a subprocess tool runner, a replay harness) live
//! outside this crate.

use std::path::PathBuf;

use async_trait::async_trait;
use edaflow_core::Subgraph;
use edaflow_logs::LogSummary;
use serde::{Deserialize, Serialize};

use crate::error::CollaboratorError;
use crate::record::{FeedbackHistory, Outcome, WorkDescriptor};

/// Where a tool run left its log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolLog {
    Text(String),
    /// A log file, streamed by the reducer instead of loaded whole.
    File(PathBuf),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolOutput {
    pub log: ToolLog,
    /// The tool's own success signal, e.g. its exit status.
    pub success: bool,
}

/// Root-cause verdict for one iteration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Classification {
    pub outcome: Outcome,
    pub recommendations: Vec<String>,
}

/// Produces the next unit of work from the task, design context and
/// history so far.
#[async_trait]
pub trait Planner: Send + Sync {
    async fn plan(
        &self,
        task: &str,
        context: Option<&Subgraph>,
        history: &FeedbackHistory,
    ) -> Result<WorkDescriptor, CollaboratorError>;
}

/// Executes a unit of work and returns its log.
#[async_trait]
pub trait ToolRunner: Send + Sync {
    async fn run(&self, work: &WorkDescriptor) -> Result<ToolOutput, CollaboratorError>;
}

/// Maps a reduced log to an outcome and recommendations.
#[async_trait]
pub trait RootCauseClassifier: Send + Sync {
    async fn classify(
        &self,
        summary: &LogSummary,
        tool_success: bool,
    ) -> Result<Classification, CollaboratorError>;
}
