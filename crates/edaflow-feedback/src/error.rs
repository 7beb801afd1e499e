use std::time::Duration;

use thiserror::Error;

use crate::record::SessionState;

/// Errors from driving a feedback session.
///
/// Exhausting the iteration budget is not an error: it is the
/// `StoppedExhausted` state of a finished session.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("session already terminated in state {state}")]
    AlreadyTerminated { state: SessionState },

    /// The caller cancelled; the history was discarded.
    #[error("session cancelled")]
    Cancelled,

    #[error("invalid session configuration: {0}")]
    InvalidConfig(String),

    #[error("log reducer error: {0}")]
    Log(#[from] edaflow_logs::LogError),

    #[error("session task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

/// A failure of an external collaborator. Recorded as a FAILURE outcome for
/// the iteration, never propagated.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CollaboratorError {
    #[error("planner failed: {0}")]
    Planner(String),

    #[error("tool runner failed: {0}")]
    ToolRunner(String),

    #[error("tool run exceeded {0:?}")]
    Timeout(Duration),

    #[error("tool log unreadable: {0}")]
    Log(String),

    #[error("classifier failed: {0}")]
    Classifier(String),
}
