//! Feedback records, the capped history, and the session report format.

use std::fmt;

use edaflow_logs::LogSummary;
use serde::{Deserialize, Serialize};

/// Classified result of one iteration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Outcome {
    Success,
    Failure,
    Partial,
}

/// What the controller decided after recording an iteration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Decision {
    Continue,
    StopSuccess,
    StopExhausted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SessionState {
    Running,
    StoppedSuccess,
    StoppedExhausted,
}

impl SessionState {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, SessionState::Running)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SessionState::Running => "RUNNING",
            SessionState::StoppedSuccess => "STOPPED_SUCCESS",
            SessionState::StoppedExhausted => "STOPPED_EXHAUSTED",
        }
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The unit of work retried by a session. Opaque to the controller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkDescriptor {
    pub summary: String,
    #[serde(default)]
    pub payload: serde_json::Value,
}

impl WorkDescriptor {
    pub fn new(summary: impl Into<String>) -> Self {
        WorkDescriptor {
            summary: summary.into(),
            payload: serde_json::Value::Null,
        }
    }

    pub fn with_payload(mut self, payload: serde_json::Value) -> Self {
        self.payload = payload;
        self
    }
}

/// One iteration of a session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeedbackRecord {
    pub iteration_index: usize,
    /// Absent when the planner could not produce one.
    pub work_descriptor: Option<WorkDescriptor>,
    pub outcome: Outcome,
    pub summary: LogSummary,
    pub decision: Decision,
    #[serde(default)]
    pub recommendations: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure: Option<String>,
}

/// Ordered, append-only record list capped at `max_iterations` and sealed
/// once the session stops.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeedbackHistory {
    max_iterations: usize,
    records: Vec<FeedbackRecord>,
    sealed: bool,
}

impl FeedbackHistory {
    pub(crate) fn new(max_iterations: usize) -> Self {
        FeedbackHistory {
            max_iterations,
            records: Vec::with_capacity(max_iterations),
            sealed: false,
        }
    }

    pub fn max_iterations(&self) -> usize {
        self.max_iterations
    }

    pub fn records(&self) -> &[FeedbackRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn is_sealed(&self) -> bool {
        self.sealed
    }

    pub fn last(&self) -> Option<&FeedbackRecord> {
        self.records.last()
    }

    /// Appends a record. The controller never calls this on a sealed or full
    /// history.
    pub(crate) fn push(&mut self, record: FeedbackRecord) {
        debug_assert!(!self.sealed && self.records.len() < self.max_iterations);
        self.records.push(record);
    }

    pub(crate) fn seal(&mut self) {
        self.sealed = true;
    }

    pub(crate) fn into_records(self) -> Vec<FeedbackRecord> {
        self.records
    }
}

/// Final session report, the persisted feedback history format.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionReport {
    pub state: SessionState,
    /// `None` if the report was taken before the session stopped.
    pub decision: Option<Decision>,
    pub max_iterations: usize,
    pub records: Vec<FeedbackRecord>,
}

impl SessionReport {
    pub fn succeeded(&self) -> bool {
        self.state == SessionState::StoppedSuccess
    }

    pub fn iterations(&self) -> usize {
        self.records.len()
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}
