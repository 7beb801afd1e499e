//! End-to-end reduction over files and generated logs.

use std::io::Write;

use edaflow_logs::{LogReducer, LogSummary, PathType, ReducerConfig};
use proptest::prelude::*;
use tokio_util::sync::CancellationToken;

fn reduce(config: ReducerConfig, text: &str) -> LogSummary {
    LogReducer::new(config)
        .unwrap()
        .reduce_str(text, &CancellationToken::new())
        .unwrap()
}

#[test]
fn single_timing_line_yields_one_violation_and_no_entries() {
    let s = reduce(
        ReducerConfig::default(),
        "Path 1: startpoint=cpu/pc_reg[3]/Q endpoint=cpu/alu/y_reg/D slack=-0.137 group=core_clk clock=core_clk\n",
    );
    assert!(s.entries.is_empty());
    assert_eq!(s.violations.len(), 1);
    let v = &s.violations[0];
    assert_eq!(v.slack, -0.137);
    assert_eq!(v.start_point, "cpu/pc_reg[3]/Q");
    assert_eq!(v.end_point, "cpu/alu/y_reg/D");
    assert_eq!(v.clock.as_deref(), Some("core_clk"));
}

#[test]
fn summary_shape() {
    let log = "\
  Startpoint: a/q (rising edge-triggered flip-flop clocked by clk)
  Endpoint: b/d (rising edge-triggered flip-flop clocked by clk)
  Path Group: clk
  Path Type: max
  slack (VIOLATED)   -0.25
ERROR: [Synth 8-439] module 'foo' not found
";
    let summary = reduce(
        ReducerConfig {
            context_before: 1,
            context_after: 1,
            ..ReducerConfig::default()
        },
        log,
    );
    assert_eq!(summary.violations[0].path_type, PathType::Setup);
    insta::assert_json_snapshot!(summary, @r###"
    {
      "entries": [
        {
          "severity": "ERROR",
          "code": "Synth 8-439",
          "message": "[Synth 8-439] module 'foo' not found",
          "source_line_number": 6,
          "context_lines": [
            "  slack (VIOLATED)   -0.25"
          ]
        }
      ],
      "violations": [
        {
          "start_point": "a/q",
          "end_point": "b/d",
          "slack": -0.25,
          "path_group": "clk",
          "clock": "clk",
          "source_line_number": 5,
          "path_type": "setup"
        }
      ],
      "dropped_counts": {
        "error": 0,
        "warning": 0,
        "info": 0,
        "timing": 0
      },
      "matched_counts": {
        "error": 1,
        "warning": 0,
        "info": 0,
        "timing": 1
      },
      "rule_counts": {
        "Synth 8-439": 1
      },
      "other_rules": 0,
      "total_lines": 6
    }
    "###);
}

#[test]
fn reduces_a_file_with_oversized_lines() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "{}", "#".repeat(100_000)).unwrap();
    writeln!(file, "Warning: [Place 30-574] poor placement").unwrap();
    file.flush().unwrap();

    let reducer = LogReducer::new(ReducerConfig {
        max_line_bytes: 80,
        ..ReducerConfig::default()
    })
    .unwrap();
    let s = reducer
        .reduce_file(file.path(), &CancellationToken::new())
        .unwrap();
    assert_eq!(s.total_lines, 2);
    assert_eq!(s.entries.len(), 1);
    assert_eq!(s.entries[0].context_lines[0].len(), 80);
    assert_eq!(s.warning_count(), 1);
}

#[test]
fn missing_file_is_an_io_error() {
    let reducer = LogReducer::new(ReducerConfig::default()).unwrap();
    let err = reducer
        .reduce_file(std::path::Path::new("/nonexistent/run.log"), &CancellationToken::new())
        .unwrap_err();
    assert!(matches!(err, edaflow_logs::LogError::Io { .. }));
}

#[test]
fn one_reducer_serves_concurrent_streams() {
    let reducer = LogReducer::new(ReducerConfig::default()).unwrap();
    let cancel = CancellationToken::new();
    let (a, b) = std::thread::scope(|scope| {
        let a = scope.spawn(|| reducer.reduce_str("Error: a\n", &cancel).unwrap());
        let b = scope.spawn(|| reducer.reduce_str("Warning: b\nWarning: c\n", &cancel).unwrap());
        (a.join().unwrap(), b.join().unwrap())
    });
    assert_eq!(a.error_count(), 1);
    assert_eq!(b.warning_count(), 2);
}

/// One generated log line: 0 noise, 1 error, 2 warning, 3 timing.
fn render(kind: u8, i: usize) -> String {
    match kind {
        1 => format!("Error: [Synth 8-{i}] failure {i}"),
        2 => format!("WARNING: check {i}"),
        3 => format!("  slack (VIOLATED)   -0.{}1", i % 10),
        _ => format!("progress {i}%"),
    }
}

proptest! {
    #[test]
    fn cap_keeps_exactly_k_and_counts_the_rest(
        kinds in prop::collection::vec(0u8..4, 0..200),
        cap in 1usize..40,
    ) {
        let log: String = kinds
            .iter()
            .enumerate()
            .map(|(i, &k)| render(k, i) + "\n")
            .collect();
        let matches = kinds.iter().filter(|&&k| k != 0).count();

        let s = reduce(ReducerConfig { max_entries: cap, ..ReducerConfig::default() }, &log);

        prop_assert_eq!(s.retained(), matches.min(cap));
        prop_assert_eq!(s.dropped_counts.total(), matches - matches.min(cap));
        prop_assert_eq!(s.matched_counts.total(), matches);
        prop_assert_eq!(s.total_lines, kinds.len() as u64);

        let lines: Vec<u64> = s.entries.iter().map(|e| e.source_line_number).collect();
        prop_assert!(lines.windows(2).all(|w| w[0] < w[1]));
        for e in &s.entries {
            prop_assert!(e.context_lines.len() <= 4);
        }
    }
}
