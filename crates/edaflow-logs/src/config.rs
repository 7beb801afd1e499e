use serde::{Deserialize, Serialize};

use crate::error::LogError;

/// Limits for one reduction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReducerConfig {
    /// Cap on retained entries and violations together.
    pub max_entries: usize,
    pub context_before: usize,
    pub context_after: usize,
    /// Longer lines are cut while reading.
    pub max_line_bytes: usize,
    /// Keep `Info:` lines as INFO entries.
    pub capture_info: bool,
    /// Distinct diagnostic codes tracked in `rule_counts`.
    pub max_rule_codes: usize,
    /// Lines between cancellation checks.
    pub cancel_check_interval: usize,
}

impl Default for ReducerConfig {
    fn default() -> Self {
        ReducerConfig {
            max_entries: 1000,
            context_before: 2,
            context_after: 2,
            max_line_bytes: 4096,
            capture_info: false,
            max_rule_codes: 256,
            cancel_check_interval: 4096,
        }
    }
}

impl ReducerConfig {
    pub fn validate(&self) -> Result<(), LogError> {
        let positive = [
            ("max_entries", self.max_entries),
            ("max_line_bytes", self.max_line_bytes),
            ("cancel_check_interval", self.cancel_check_interval),
        ];
        for (name, value) in positive {
            if value == 0 {
                return Err(LogError::InvalidConfig(format!("{name} must be at least 1")));
            }
        }
        Ok(())
    }
}
