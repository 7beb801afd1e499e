use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::SessionError;

/// Limits for feedback sessions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Iteration budget per session.
    pub max_iterations: usize,
    /// Wall-clock bound on one tool run.
    pub tool_timeout_secs: u64,
    /// Depth of the design-graph context handed to the planner.
    pub context_depth: usize,
    /// Sessions allowed to run at once in a [`crate::SessionPool`].
    pub max_concurrent_sessions: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        SessionConfig {
            max_iterations: 3,
            tool_timeout_secs: 3600,
            context_depth: 2,
            max_concurrent_sessions: 4,
        }
    }
}

impl SessionConfig {
    pub fn tool_timeout(&self) -> Duration {
        Duration::from_secs(self.tool_timeout_secs)
    }

    pub fn validate(&self) -> Result<(), SessionError> {
        let positive = [
            ("max_iterations", self.max_iterations as u64),
            ("tool_timeout_secs", self.tool_timeout_secs),
            ("max_concurrent_sessions", self.max_concurrent_sessions as u64),
        ];
        for (name, value) in positive {
            if value == 0 {
                return Err(SessionError::InvalidConfig(format!("{name} must be at least 1")));
            }
        }
        Ok(())
    }
}
