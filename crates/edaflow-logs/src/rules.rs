//! Line classification rules.
//!
//! Rules apply in a fixed priority, first match wins:
//!
//! 1. a `slack` value that is negative (a timing violation);
//! 2. an error keyword (`Error:`, `ERROR: [Synth 8-439]`, `%Error-CODE:`,
//!    `** Error:`, `Fatal:`);
//! 3. a warning keyword (`Warning:`, `CRITICAL WARNING:`);
//! 4. `Info:`, only when enabled.
//!
//! Multi-line timing reports name the path in header lines (`Startpoint:`,
//! `Endpoint:`, `Path Group:`, `Path Type:`) before the slack line.
//! [`Rules`] remembers the latest header values and clears them once a slack
//! line closes the path.

use regex::Regex;

use crate::entry::{Location, PathType, Severity};
use crate::error::LogError;

/// Result of classifying one line.
#[derive(Debug, Clone, PartialEq)]
pub enum Classified {
    Timing(TimingMatch),
    Entry(EntryMatch),
}

#[derive(Debug, Clone, PartialEq)]
pub struct TimingMatch {
    pub slack: f64,
    pub start_point: Option<String>,
    pub end_point: Option<String>,
    pub path_group: Option<String>,
    pub clock: Option<String>,
    pub path_type: PathType,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryMatch {
    pub severity: Severity,
    pub code: Option<String>,
    pub message: String,
    pub location: Option<Location>,
}

/// Report-header state carried across lines.
#[derive(Debug, Default)]
pub struct PathHeader {
    start_point: Option<String>,
    end_point: Option<String>,
    path_group: Option<String>,
    clock: Option<String>,
    path_type: Option<PathType>,
}

/// Compiled classification patterns.
#[derive(Debug)]
pub struct Rules {
    capture_info: bool,
    slack: Regex,
    inline_field: Regex,
    startpoint: Regex,
    endpoint: Regex,
    path_group: Regex,
    path_type: Regex,
    clocked_by: Regex,
    min_max: Regex,
    error: Regex,
    warning: Regex,
    info: Regex,
    code: Regex,
    file_line: Regex,
    file_colon: Regex,
}

const NUMBER: &str = r"[-+]?(?:\d+\.?\d*|\.\d+)(?:[eE][-+]?\d+)?";

fn keyword(words: &str) -> Result<Regex, regex::Error> {
    // Keyword, optional `(12007)` id, then `:` or `-CODE`.
    Regex::new(&format!(r"(?i:\b(?:{words}))(?:\s*\(\d+\))?(?:\s*:|-[A-Z0-9_])"))
}

impl Rules {
    pub fn new(capture_info: bool) -> Result<Self, LogError> {
        Ok(Rules {
            capture_info,
            slack: Regex::new(&format!(
                r"(?i)\bslack\b\s*(?:\([^)]*\))?\s*[:=]?\s*({NUMBER})"
            ))?,
            inline_field: Regex::new(
                r"(?i)\b(startpoint|start_point|endpoint|end_point|path_group|group|clock)\s*[:=]\s*([^\s,;]+)",
            )?,
            startpoint: Regex::new(r"(?i)^\s*startpoint\s*:\s*(\S+)")?,
            endpoint: Regex::new(r"(?i)^\s*endpoint\s*:\s*(\S+)")?,
            path_group: Regex::new(r"(?i)^\s*path\s+group\s*:\s*(\S+)")?,
            path_type: Regex::new(r"(?i)^\s*path\s+type\s*:\s*(max|min)\b")?,
            clocked_by: Regex::new(r"(?i)clocked\s+by\s+([^\s)]+)")?,
            min_max: Regex::new(r"(?i)\b(max|min|setup|hold)\b")?,
            error: keyword(r"error|fatal")?,
            warning: keyword(r"critical\s+warning|warning")?,
            info: keyword(r"information|info")?,
            code: Regex::new(
                r"\[([A-Za-z][A-Za-z ]*\d+-\d+)\]|%(?i:error|warning|info)-([A-Z][A-Z0-9_]*)|\b([A-Z][A-Z0-9]*-\d+)\b",
            )?,
            file_line: Regex::new(r"(?i)\bfile\s*:\s*(\S+)\s+line\s*:\s*(\d+)")?,
            file_colon: Regex::new(r"([\w./\\-]+\.(?:sv|svh|v|vh|vhd|vhdl|sdc|xdc|tcl|lib)):(\d+)")?,
        })
    }

    /// Classifies `line`, updating `header` for report-style timing output.
    pub fn classify(&self, line: &str, header: &mut PathHeader) -> Option<Classified> {
        if let Some(slack) = self.slack_of(line) {
            let found = self.timing(line, slack, header);
            *header = PathHeader::default();
            if let Some(found) = found {
                return Some(Classified::Timing(found));
            }
        } else {
            self.track_header(line, header);
        }

        let severity = if self.error.is_match(line) {
            Severity::Error
        } else if self.warning.is_match(line) {
            Severity::Warning
        } else if self.capture_info && self.info.is_match(line) {
            Severity::Info
        } else {
            return None;
        };
        Some(Classified::Entry(self.entry(line, severity)))
    }

    fn slack_of(&self, line: &str) -> Option<f64> {
        self.slack
            .captures(line)
            .and_then(|c| c.get(1))
            .and_then(|m| m.as_str().parse::<f64>().ok())
            .filter(|v| !v.is_nan())
            .map(|v| v.clamp(f64::MIN, f64::MAX))
    }

    fn timing(&self, line: &str, slack: f64, header: &mut PathHeader) -> Option<TimingMatch> {
        if slack >= 0.0 {
            return None;
        }
        let mut found = TimingMatch {
            slack,
            start_point: header.start_point.take(),
            end_point: header.end_point.take(),
            path_group: header.path_group.take(),
            clock: header.clock.take(),
            path_type: header.path_type.take().unwrap_or(PathType::Unknown),
        };
        for cap in self.inline_field.captures_iter(line) {
            let value = cap[2].to_string();
            match cap[1].to_ascii_lowercase().as_str() {
                "startpoint" | "start_point" => found.start_point = Some(value),
                "endpoint" | "end_point" => found.end_point = Some(value),
                "group" | "path_group" => found.path_group = Some(value),
                _ => found.clock = Some(value),
            }
        }
        if found.path_type == PathType::Unknown {
            found.path_type = self.path_type_of(line);
        }
        Some(found)
    }

    fn path_type_of(&self, text: &str) -> PathType {
        match self.min_max.captures(text).map(|c| c[1].to_ascii_lowercase()) {
            Some(word) if word == "max" || word == "setup" => PathType::Setup,
            Some(_) => PathType::Hold,
            None => PathType::Unknown,
        }
    }

    fn track_header(&self, line: &str, header: &mut PathHeader) {
        let clock = || self.clocked_by.captures(line).map(|c| c[1].to_string());
        if let Some(c) = self.startpoint.captures(line) {
            header.start_point = Some(c[1].to_string());
            header.clock = clock().or(header.clock.take());
        } else if let Some(c) = self.endpoint.captures(line) {
            header.end_point = Some(c[1].to_string());
            if header.clock.is_none() {
                header.clock = clock();
            }
        } else if let Some(c) = self.path_group.captures(line) {
            header.path_group = Some(c[1].to_string());
        } else if let Some(c) = self.path_type.captures(line) {
            header.path_type = Some(self.path_type_of(&c[1]));
        }
    }

    fn entry(&self, line: &str, severity: Severity) -> EntryMatch {
        let pattern = match severity {
            Severity::Error => &self.error,
            Severity::Warning => &self.warning,
            Severity::Info => &self.info,
        };
        let rest = pattern
            .find(line)
            .map(|m| line[m.end()..].trim_start_matches(|c: char| c.is_ascii_alphanumeric() || c == '_'))
            .unwrap_or(line)
            .trim_start_matches([':', ' ', '\t'])
            .trim();
        let message = if rest.is_empty() { line.trim() } else { rest };

        EntryMatch {
            severity,
            code: self.code_of(line),
            message: message.to_string(),
            location: self.location_of(line),
        }
    }

    fn code_of(&self, line: &str) -> Option<String> {
        let caps = self.code.captures(line)?;
        (1..=3)
            .find_map(|i| caps.get(i))
            .map(|m| m.as_str().to_string())
    }

    fn location_of(&self, line: &str) -> Option<Location> {
        let caps = self
            .file_line
            .captures(line)
            .or_else(|| self.file_colon.captures(line))?;
        Some(Location {
            file: caps[1].to_string(),
            line: caps[2].parse().ok()?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn classify(line: &str) -> Option<Classified> {
        Rules::new(true)
            .unwrap()
            .classify(line, &mut PathHeader::default())
    }

    fn entry(line: &str) -> EntryMatch {
        match classify(line) {
            Some(Classified::Entry(e)) => e,
            other => panic!("expected entry for {line:?}, got {other:?}"),
        }
    }

    #[test]
    fn error_keyword_variants() {
        let e = entry("ERROR: [Synth 8-439] module 'foo' not found [top.v:12]");
        assert_eq!(e.severity, Severity::Error);
        assert_eq!(e.code.as_deref(), Some("Synth 8-439"));
        assert_eq!(e.message, "[Synth 8-439] module 'foo' not found [top.v:12]");
        assert_eq!(
            e.location,
            Some(Location {
                file: "top.v".into(),
                line: 12
            })
        );

        let v = entry("%Error-PINMISSING: rtl/a.sv:7:3: Cell has missing pin: 'clk'");
        assert_eq!(v.code.as_deref(), Some("PINMISSING"));
        assert_eq!(v.message, "rtl/a.sv:7:3: Cell has missing pin: 'clk'");

        assert_eq!(entry("** Error: (vlog-13069) syntax error").severity, Severity::Error);
        assert_eq!(entry("Fatal: out of memory").severity, Severity::Error);
        assert_eq!(entry("Error (12007): Top-level design entity is undefined").severity, Severity::Error);
    }

    #[test]
    fn warning_and_info() {
        let w = entry("CRITICAL WARNING: [Constraints 18-1055] clock not found");
        assert_eq!(w.severity, Severity::Warning);
        assert_eq!(w.code.as_deref(), Some("Constraints 18-1055"));

        let lint = entry("Warning: LINT-1 File: rtl/b.v Line: 33 unused signal");
        assert_eq!(lint.code.as_deref(), Some("LINT-1"));
        assert_eq!(lint.location.map(|l| l.line), Some(33));

        assert_eq!(entry("INFO: [Common 17-206] Exiting Vivado").severity, Severity::Info);
        let quiet = Rules::new(false).unwrap();
        assert_eq!(quiet.classify("Info: done", &mut PathHeader::default()), None);
    }

    #[test]
    fn prose_mentions_are_not_matches() {
        assert_eq!(classify("0 errors, 0 warnings"), None);
        assert_eq!(classify("the design is error-free"), None);
        assert_eq!(classify("Error count 0"), None);
    }

    #[test]
    fn one_line_timing_violation() {
        let found = classify("Timing: startpoint=u_a/q endpoint=u_b/d slack=-0.25 group=core clock=clk_a max");
        let Some(Classified::Timing(t)) = found else {
            panic!("expected timing, got {found:?}");
        };
        assert_eq!(t.slack, -0.25);
        assert_eq!(t.start_point.as_deref(), Some("u_a/q"));
        assert_eq!(t.end_point.as_deref(), Some("u_b/d"));
        assert_eq!(t.path_group.as_deref(), Some("core"));
        assert_eq!(t.clock.as_deref(), Some("clk_a"));
        assert_eq!(t.path_type, PathType::Setup);
    }

    #[test]
    fn report_headers_feed_the_slack_line() {
        let rules = Rules::new(false).unwrap();
        let mut header = PathHeader::default();
        let report = [
            "  Startpoint: core/r1 (rising edge-triggered flip-flop clocked by sys_clk)",
            "  Endpoint: core/r2 (rising edge-triggered flip-flop clocked by sys_clk)",
            "  Path Group: sys_clk",
            "  Path Type: min",
            "  data arrival time                 1.20",
        ];
        for line in report {
            assert_eq!(rules.classify(line, &mut header), None);
        }
        let Some(Classified::Timing(t)) = rules.classify("  slack (VIOLATED)   -0.031", &mut header) else {
            panic!("expected timing");
        };
        assert_eq!(t.slack, -0.031);
        assert_eq!(t.start_point.as_deref(), Some("core/r1"));
        assert_eq!(t.end_point.as_deref(), Some("core/r2"));
        assert_eq!(t.path_group.as_deref(), Some("sys_clk"));
        assert_eq!(t.clock.as_deref(), Some("sys_clk"));
        assert_eq!(t.path_type, PathType::Hold);

        // Headers are cleared after the path closes.
        let Some(Classified::Timing(next)) = rules.classify("slack: -1.0", &mut header) else {
            panic!("expected timing");
        };
        assert_eq!(next.start_point, None);
    }

    #[test]
    fn met_slack_falls_through() {
        assert_eq!(classify("  slack (MET)   0.412"), None);
        assert!(matches!(
            classify("Warning: slack: 0.0 on unconstrained path"),
            Some(Classified::Entry(_))
        ));
    }
}
