//! Streaming log reducer for EDA tool output.
//!
//! Multi-gigabyte synthesis, lint, simulation and STA logs are reduced in one
//! bounded-memory pass to a [`LogSummary`]: capped ERROR/WARNING entries with
//! context, negative-slack timing violations, per-severity match and drop
//! counts, and per-rule code counts.

pub mod error;
pub mod config;
pub mod entry;
pub mod reader;
pub mod rules;
pub mod reducer;
pub mod analysis;

// Re-export commonly used types
pub use error::LogError;
pub use config::ReducerConfig;
pub use entry::{ContextLines, Location, LogEntry, LogSummary, PathType, SeverityCounts, Severity, TimingViolation};
pub use reducer::LogReducer;
pub use analysis::{categorize, recommendations, ErrorCategories};
