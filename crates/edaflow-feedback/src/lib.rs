//! Bounded analyze-and-retry loop for design and verification runs.
//!
//! [`FeedbackController`] is the synchronous state machine: it records one
//! iteration at a time and stops on success or when `max_iterations` is
//! spent. [`FeedbackSession`] drives it asynchronously through the
//! [`Planner`], [`ToolRunner`] and [`RootCauseClassifier`] collaborators, and
//! [`SessionPool`] runs independent sessions under a concurrency limit.

pub mod error;
pub mod config;
pub mod record;
pub mod controller;
pub mod collaborator;
pub mod classifier;
pub mod session;
pub mod pool;

// Re-export commonly used types
pub use error::{CollaboratorError, SessionError};
pub use config::SessionConfig;
pub use record::{
    Decision, FeedbackHistory, FeedbackRecord, Outcome, SessionReport, SessionState, WorkDescriptor,
};
pub use controller::FeedbackController;
pub use collaborator::{Classification, Planner, RootCauseClassifier, ToolLog, ToolOutput, ToolRunner};
pub use classifier::HeuristicClassifier;
pub use session::FeedbackSession;
pub use pool::{SessionHandle, SessionPool};
