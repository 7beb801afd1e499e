//! Records produced by the log reducer and the persisted summary shape.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

/// Severity of a retained log entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Severity {
    Error,
    Warning,
    Info,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Error => "ERROR",
            Severity::Warning => "WARNING",
            Severity::Info => "INFO",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A source location named inside a log message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Location {
    pub file: String,
    pub line: u64,
}

/// Raw neighbouring lines; inline for the default 2+2 window.
pub type ContextLines = SmallVec<[String; 4]>;

/// One ERROR/WARNING/INFO match.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEntry {
    pub severity: Severity,
    pub code: Option<String>,
    pub message: String,
    /// 1-based line in the log.
    pub source_line_number: u64,
    pub context_lines: ContextLines,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<Location>,
}

/// Setup or hold, from `max`/`min` path markers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PathType {
    Setup,
    Hold,
    Unknown,
}

/// A timing path with negative slack.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimingViolation {
    pub start_point: String,
    pub end_point: String,
    pub slack: f64,
    pub path_group: Option<String>,
    pub clock: Option<String>,
    pub source_line_number: u64,
    pub path_type: PathType,
}

/// Per-category match counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeverityCounts {
    pub error: usize,
    pub warning: usize,
    pub info: usize,
    pub timing: usize,
}

impl SeverityCounts {
    pub fn total(&self) -> usize {
        self.error + self.warning + self.info + self.timing
    }

    pub(crate) fn bump(&mut self, severity: Option<Severity>) {
        match severity {
            Some(Severity::Error) => self.error += 1,
            Some(Severity::Warning) => self.warning += 1,
            Some(Severity::Info) => self.info += 1,
            None => self.timing += 1,
        }
    }
}

/// Bounded result of reducing one log stream.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LogSummary {
    pub entries: Vec<LogEntry>,
    pub violations: Vec<TimingViolation>,
    /// Matches refused after `max_entries` was reached.
    pub dropped_counts: SeverityCounts,
    /// Every match, retained or not.
    pub matched_counts: SeverityCounts,
    /// Occurrences per diagnostic code.
    pub rule_counts: BTreeMap<String, usize>,
    /// Coded matches whose code did not fit in `rule_counts`.
    pub other_rules: usize,
    pub total_lines: u64,
}

impl LogSummary {
    pub fn retained(&self) -> usize {
        self.entries.len() + self.violations.len()
    }

    pub fn error_count(&self) -> usize {
        self.matched_counts.error
    }

    pub fn warning_count(&self) -> usize {
        self.matched_counts.warning
    }

    pub fn entries_of(&self, severity: Severity) -> impl Iterator<Item = &LogEntry> + '_ {
        self.entries.iter().filter(move |e| e.severity == severity)
    }

    /// Most negative slack among retained violations.
    pub fn worst_slack(&self) -> Option<f64> {
        self.violations.iter().map(|v| v.slack).reduce(f64::min)
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}
