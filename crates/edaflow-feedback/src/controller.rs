//! Feedback controller state machine.
//!
//! ```text
//!            record(SUCCESS)
//!   RUNNING ─────────────────────────────► STOPPED_SUCCESS
//!     │  ▲
//!     │  │ record(FAILURE|PARTIAL), index + 1 < max
//!     └──┘
//!     │
//!     │ record(FAILURE|PARTIAL), index + 1 == max
//!     └──────────────────────────────────► STOPPED_EXHAUSTED
//! ```
//!
//! The controller owns one session's history and decides only whether to
//! continue. Choosing what to change between iterations belongs to the
//! planner.

use edaflow_logs::LogSummary;

use crate::error::SessionError;
use crate::record::{
    Decision, FeedbackHistory, FeedbackRecord, Outcome, SessionReport, SessionState, WorkDescriptor,
};

#[derive(Debug, Clone)]
pub struct FeedbackController {
    state: SessionState,
    decision: Option<Decision>,
    history: FeedbackHistory,
}

impl FeedbackController {
    /// A controller in `Running` at iteration 0.
    pub fn new(max_iterations: usize) -> Result<Self, SessionError> {
        if max_iterations == 0 {
            return Err(SessionError::InvalidConfig(
                "max_iterations must be at least 1".into(),
            ));
        }
        Ok(FeedbackController {
            state: SessionState::Running,
            decision: None,
            history: FeedbackHistory::new(max_iterations),
        })
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn is_terminal(&self) -> bool {
        self.state.is_terminal()
    }

    /// Index of the iteration to be recorded next.
    pub fn iteration(&self) -> usize {
        self.history.len()
    }

    pub fn max_iterations(&self) -> usize {
        self.history.max_iterations()
    }

    pub fn history(&self) -> &FeedbackHistory {
        &self.history
    }

    /// Records the current iteration and advances the state machine.
    pub fn record(
        &mut self,
        work: Option<WorkDescriptor>,
        outcome: Outcome,
        summary: LogSummary,
        recommendations: Vec<String>,
        failure: Option<String>,
    ) -> Result<Decision, SessionError> {
        if self.state.is_terminal() {
            return Err(SessionError::AlreadyTerminated { state: self.state });
        }

        let iteration_index = self.history.len();
        let (decision, state) = match outcome {
            Outcome::Success => (Decision::StopSuccess, SessionState::StoppedSuccess),
            _ if iteration_index + 1 < self.history.max_iterations() => {
                (Decision::Continue, SessionState::Running)
            }
            _ => (Decision::StopExhausted, SessionState::StoppedExhausted),
        };

        tracing::debug!(
            iteration = iteration_index,
            outcome = ?outcome,
            decision = ?decision,
            "recorded iteration"
        );

        self.history.push(FeedbackRecord {
            iteration_index,
            work_descriptor: work,
            outcome,
            summary,
            decision,
            recommendations,
            failure,
        });
        self.state = state;
        if state.is_terminal() {
            self.decision = Some(decision);
            self.history.seal();
        }
        Ok(decision)
    }

    /// Consumes the controller into its report.
    pub fn finish(self) -> SessionReport {
        SessionReport {
            state: self.state,
            decision: self.decision,
            max_iterations: self.history.max_iterations(),
            records: self.history.into_records(),
        }
    }
}
