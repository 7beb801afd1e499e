//! Streaming reduction of a log into a bounded [`LogSummary`].
//!
//! # Memory
//!
//! One pass over the input, one line at a time. Besides the output itself
//! (at most `max_entries` records, each with at most
//! `context_before + context_after` lines) the reducer keeps only the last
//! `context_before` lines, the entries still waiting for trailing context,
//! and the timing report header. Every line is cut to `max_line_bytes` while
//! reading, so memory does not grow with the size of the log.

use std::collections::VecDeque;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use tokio_util::sync::CancellationToken;

use crate::config::ReducerConfig;
use crate::entry::{LogEntry, LogSummary, Severity, TimingViolation};
use crate::error::LogError;
use crate::reader::BoundedLines;
use crate::rules::{Classified, PathHeader, Rules};

/// Reduces log streams. Holds only configuration and compiled patterns, so
/// one reducer can serve many threads.
#[derive(Debug)]
pub struct LogReducer {
    config: ReducerConfig,
    rules: Rules,
}

impl LogReducer {
    pub fn new(config: ReducerConfig) -> Result<Self, LogError> {
        config.validate()?;
        let rules = Rules::new(config.capture_info)?;
        Ok(LogReducer { config, rules })
    }

    pub fn config(&self) -> &ReducerConfig {
        &self.config
    }

    pub fn reduce_str(&self, text: &str, cancel: &CancellationToken) -> Result<LogSummary, LogError> {
        self.reduce(text.as_bytes(), cancel)
    }

    pub fn reduce_file(&self, path: &Path, cancel: &CancellationToken) -> Result<LogSummary, LogError> {
        let file = File::open(path).map_err(|source| LogError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let summary = self
            .reduce(BufReader::with_capacity(64 * 1024, file), cancel)
            .map_err(|err| match err {
                LogError::Read(source) => LogError::Io {
                    path: path.to_path_buf(),
                    source,
                },
                other => other,
            })?;
        tracing::info!(
            path = %path.display(),
            lines = summary.total_lines,
            entries = summary.entries.len(),
            violations = summary.violations.len(),
            "reduced log"
        );
        Ok(summary)
    }

    /// Reduces one stream.
    ///
    /// Returns [`LogError::Cancelled`] if `cancel` fires; whatever was
    /// accumulated is dropped.
    pub fn reduce<R: BufRead>(&self, reader: R, cancel: &CancellationToken) -> Result<LogSummary, LogError> {
        if cancel.is_cancelled() {
            return Err(LogError::Cancelled);
        }
        let cfg = &self.config;
        let interval = cfg.cancel_check_interval as u64;

        let mut lines = BoundedLines::new(reader, cfg.max_line_bytes);
        let mut summary = LogSummary::default();
        let mut header = PathHeader::default();
        let mut before: VecDeque<String> = VecDeque::with_capacity(cfg.context_before);
        // (entry index, trailing lines still wanted)
        let mut pending: Vec<(usize, usize)> = Vec::new();
        let mut truncated = 0u64;

        while let Some(line) = lines.next_line()? {
            if line.number % interval == 0 && cancel.is_cancelled() {
                tracing::debug!(line = line.number, "log reduction cancelled");
                return Err(LogError::Cancelled);
            }
            if line.truncated {
                truncated += 1;
            }
            summary.total_lines = line.number;

            pending.retain_mut(|(idx, left)| {
                if let Some(entry) = summary.entries.get_mut(*idx) {
                    entry.context_lines.push(line.text.clone());
                }
                *left -= 1;
                *left > 0
            });

            match self.rules.classify(&line.text, &mut header) {
                Some(Classified::Timing(t)) => {
                    if self.admit(&mut summary, None) {
                        summary.violations.push(TimingViolation {
                            start_point: t.start_point.unwrap_or_else(|| "unknown".to_string()),
                            end_point: t.end_point.unwrap_or_else(|| "unknown".to_string()),
                            slack: t.slack,
                            path_group: t.path_group,
                            clock: t.clock,
                            source_line_number: line.number,
                            path_type: t.path_type,
                        });
                    }
                }
                Some(Classified::Entry(e)) => {
                    if let Some(code) = &e.code {
                        self.count_rule(&mut summary, code);
                    }
                    if self.admit(&mut summary, Some(e.severity)) {
                        summary.entries.push(LogEntry {
                            severity: e.severity,
                            code: e.code,
                            message: e.message,
                            source_line_number: line.number,
                            context_lines: before.iter().cloned().collect(),
                            location: e.location,
                        });
                        if cfg.context_after > 0 {
                            pending.push((summary.entries.len() - 1, cfg.context_after));
                        }
                    }
                }
                None => {}
            }

            if cfg.context_before > 0 {
                if before.len() == cfg.context_before {
                    before.pop_front();
                }
                before.push_back(line.text);
            }
        }

        if truncated > 0 {
            tracing::debug!(truncated, max_line_bytes = cfg.max_line_bytes, "long lines truncated");
        }
        let dropped = summary.dropped_counts.total();
        if dropped > 0 {
            tracing::warn!(
                dropped,
                max_entries = cfg.max_entries,
                "entry cap reached; further matches counted only"
            );
        }
        Ok(summary)
    }

    /// Counts a match and reports whether it fits under the cap.
    /// `None` stands for a timing violation.
    fn admit(&self, summary: &mut LogSummary, severity: Option<Severity>) -> bool {
        summary.matched_counts.bump(severity);
        if summary.retained() < self.config.max_entries {
            true
        } else {
            summary.dropped_counts.bump(severity);
            false
        }
    }

    fn count_rule(&self, summary: &mut LogSummary, code: &str) {
        if let Some(count) = summary.rule_counts.get_mut(code) {
            *count += 1;
        } else if summary.rule_counts.len() < self.config.max_rule_codes {
            summary.rule_counts.insert(code.to_string(), 1);
        } else {
            summary.other_rules += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entry::PathType;

    fn reducer(config: ReducerConfig) -> LogReducer {
        LogReducer::new(config).unwrap()
    }

    fn reduce(config: ReducerConfig, text: &str) -> LogSummary {
        reducer(config)
            .reduce_str(text, &CancellationToken::new())
            .unwrap()
    }

    #[test]
    fn context_window_is_clipped_at_file_edges() {
        let log = "Error: first\nb\nc\nd\nWarning: last\n";
        let s = reduce(ReducerConfig::default(), log);
        assert_eq!(s.total_lines, 5);
        assert_eq!(s.entries.len(), 2);

        let first = &s.entries[0];
        assert_eq!(first.source_line_number, 1);
        assert_eq!(first.context_lines.as_slice(), ["b", "c"]);

        let last = &s.entries[1];
        assert_eq!(last.severity, Severity::Warning);
        assert_eq!(last.context_lines.as_slice(), ["c", "d"]);
    }

    #[test]
    fn adjacent_matches_share_context() {
        let log = "x\nError: a\nError: b\ny\n";
        let s = reduce(ReducerConfig::default(), log);
        assert_eq!(s.entries[0].context_lines.as_slice(), ["x", "Error: b", "y"]);
        assert_eq!(s.entries[1].context_lines.as_slice(), ["x", "Error: a", "y"]);
    }

    #[test]
    fn cap_counts_entries_and_violations_together() {
        let log = "Error: 1\nslack: -0.5\nWarning: 2\nError: 3\nslack: -0.1\n";
        let s = reduce(
            ReducerConfig {
                max_entries: 2,
                ..ReducerConfig::default()
            },
            log,
        );
        assert_eq!(s.retained(), 2);
        assert_eq!(s.entries.len(), 1);
        assert_eq!(s.violations.len(), 1);
        assert_eq!(s.dropped_counts.warning, 1);
        assert_eq!(s.dropped_counts.error, 1);
        assert_eq!(s.dropped_counts.timing, 1);
        assert_eq!(s.matched_counts.total(), 5);
    }

    #[test]
    fn timing_line_is_not_also_an_entry() {
        let s = reduce(
            ReducerConfig::default(),
            "info\nError: slack = -1.5 on path\nend\n",
        );
        assert_eq!(s.violations.len(), 1);
        assert!(s.entries.is_empty());
        let v = &s.violations[0];
        assert_eq!(v.slack, -1.5);
        assert_eq!(v.start_point, "unknown");
        assert_eq!(v.path_type, PathType::Unknown);
        assert_eq!(v.source_line_number, 2);
    }

    #[test]
    fn rule_counts_overflow_into_other() {
        let log = "Error: [A 1-1] x\nError: [A 1-1] y\nError: [B 2-2] z\nWarning: [C 3-3] w\n";
        let s = reduce(
            ReducerConfig {
                max_rule_codes: 2,
                ..ReducerConfig::default()
            },
            log,
        );
        assert_eq!(s.rule_counts.get("A 1-1"), Some(&2));
        assert_eq!(s.rule_counts.get("B 2-2"), Some(&1));
        assert_eq!(s.other_rules, 1);
    }

    #[test]
    fn cancellation_discards_the_summary() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let r = reducer(ReducerConfig {
            cancel_check_interval: 1,
            ..ReducerConfig::default()
        });
        assert!(matches!(r.reduce_str("Error: x\n", &cancel), Err(LogError::Cancelled)));
    }

    #[test]
    fn out_of_range_slack_is_clamped() {
        let s = reduce(
            ReducerConfig::default(),
            "  slack (VIOLATED)   -1e999\n  slack (MET)   1e999\n",
        );
        assert_eq!(s.violations.len(), 1);
        assert_eq!(s.violations[0].slack, f64::MIN);
        assert!(s.worst_slack().is_some_and(f64::is_finite));

        let json = s.to_json().unwrap();
        let back: LogSummary = serde_json::from_str(&json).unwrap();
        assert_eq!(back, s);
    }

    #[test]
    fn zero_cap_is_rejected() {
        let err = LogReducer::new(ReducerConfig {
            max_entries: 0,
            ..ReducerConfig::default()
        })
        .unwrap_err();
        assert!(matches!(err, LogError::InvalidConfig(_)));
    }
}
