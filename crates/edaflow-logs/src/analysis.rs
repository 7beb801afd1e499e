//! Error categorization and fix recommendations over a reduced log.

use serde::{Deserialize, Serialize};

use crate::entry::{LogSummary, Severity};

/// Retained ERROR entries bucketed by message keywords.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorCategories {
    pub syntax: usize,
    pub timing: usize,
    pub constraint: usize,
    pub netlist: usize,
    pub library: usize,
    pub other: usize,
    /// All ERROR matches, including ones dropped by the cap.
    pub total_errors: usize,
}

impl ErrorCategories {
    pub fn is_empty(&self) -> bool {
        self.syntax + self.timing + self.constraint + self.netlist + self.library + self.other == 0
    }
}

// syntax, timing, constraint, netlist, library
const KEYWORDS: [&[&str]; 5] = [
    &["syntax", "parse", "expected"],
    &["timing", "slack", "delay"],
    &["constraint", "sdc"],
    &["netlist", "port", "instance"],
    &["library", "cell", "lib"],
];

/// Buckets ERROR entries; the first matching keyword group wins. Every
/// timing violation matched (retained or not) also counts as timing.
pub fn categorize(summary: &LogSummary) -> ErrorCategories {
    let mut categories = ErrorCategories {
        timing: summary.matched_counts.timing,
        total_errors: summary.error_count(),
        ..ErrorCategories::default()
    };
    for entry in summary.entries_of(Severity::Error) {
        let message = entry.message.to_lowercase();
        let bucket = KEYWORDS
            .iter()
            .position(|words| words.iter().any(|w| message.contains(w)));
        match bucket {
            Some(0) => categories.syntax += 1,
            Some(1) => categories.timing += 1,
            Some(2) => categories.constraint += 1,
            Some(3) => categories.netlist += 1,
            Some(4) => categories.library += 1,
            _ => categories.other += 1,
        }
    }
    categories
}

/// Human-readable next steps for the categories present.
pub fn recommendations(categories: &ErrorCategories) -> Vec<String> {
    let mut out = Vec::new();
    if categories.syntax > 0 {
        out.push("Syntax errors detected. Check RTL code for parsing issues.".to_string());
    }
    if categories.timing > 0 {
        out.push(
            "Timing violations found. Consider: 1) Adjusting clock constraints, \
             2) Adding pipeline stages, 3) Optimizing critical paths"
                .to_string(),
        );
    }
    if categories.constraint > 0 {
        out.push("Constraint errors detected. Review SDC file for correctness.".to_string());
    }
    if categories.netlist > 0 {
        out.push("Netlist issues found. Check module instantiations and port connections.".to_string());
    }
    if categories.library > 0 {
        out.push("Library errors detected. Verify library paths and cell availability.".to_string());
    }
    if categories.total_errors > 10 {
        out.push("Multiple errors detected. Fix critical errors first and re-run.".to_string());
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ReducerConfig;
    use crate::reducer::LogReducer;
    use tokio_util::sync::CancellationToken;

    fn summary(log: &str) -> LogSummary {
        LogReducer::new(ReducerConfig::default())
            .unwrap()
            .reduce_str(log, &CancellationToken::new())
            .unwrap()
    }

    #[test]
    fn buckets_follow_keyword_priority() {
        let s = summary(
            "Error: syntax error near 'endmodule'\n\
             Error: port 'clk' not found on instance u0\n\
             Error: cannot open library cell file\n\
             Error: SDC constraint references unknown clock\n\
             Error: something else\n\
             Warning: parse ambiguity\n",
        );
        let c = categorize(&s);
        assert_eq!(c.syntax, 1);
        assert_eq!(c.netlist, 1);
        assert_eq!(c.library, 1);
        assert_eq!(c.constraint, 1);
        assert_eq!(c.other, 1);
        assert_eq!(c.timing, 0);
        assert_eq!(c.total_errors, 5);

        let recs = recommendations(&c);
        assert_eq!(recs.len(), 4);
        assert!(recs[0].starts_with("Syntax errors detected"));
    }

    #[test]
    fn violations_count_as_timing() {
        let c = categorize(&summary("slack (VIOLATED) -0.2\n"));
        assert_eq!(c.timing, 1);
        assert!(recommendations(&c)[0].starts_with("Timing violations found"));
    }

    #[test]
    fn many_errors_add_general_advice() {
        let log: String = (0..11).map(|i| format!("Error: failure {i}\n")).collect();
        let recs = recommendations(&categorize(&summary(&log)));
        assert_eq!(recs, vec!["Multiple errors detected. Fix critical errors first and re-run."]);
    }

    #[test]
    fn clean_log_has_no_categories() {
        let c = categorize(&summary("all good\n"));
        assert!(c.is_empty());
        assert!(recommendations(&c).is_empty());
    }
}
