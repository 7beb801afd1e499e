//! Parser errors and diagnostics.
//!
//! Content problems never fail a parse: they become [`ParseDiagnostic`]
//! values attached to the file's result. [`ParseError`] is reserved for
//! conditions where a result cannot be produced at all.

use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Hard failures of a parse or index call.
#[derive(Debug, Error)]
pub enum ParseError {
    /// The caller cancelled; partial results were discarded.
    #[error("parse cancelled")]
    Cancelled,

    #[error("i/o error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid parser configuration: {0}")]
    InvalidConfig(String),

    #[error("failed to build worker pool: {0}")]
    Pool(#[from] rayon::ThreadPoolBuildError),
}

/// Category of a recoverable parse anomaly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiagnosticKind {
    UnterminatedComment,
    UnterminatedString,
    UnterminatedModule,
    UnbalancedDelimiter,
    MalformedInstance,
    /// A body statement the scanner could not make sense of, or nesting too
    /// deep to follow.
    MalformedStatement,
    DuplicateDeclaration,
    /// A module name already defined by another file.
    DuplicateModule,
    InvalidEncoding,
    FileTooLarge,
}

impl DiagnosticKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            DiagnosticKind::UnterminatedComment => "unterminated_comment",
            DiagnosticKind::UnterminatedString => "unterminated_string",
            DiagnosticKind::UnterminatedModule => "unterminated_module",
            DiagnosticKind::UnbalancedDelimiter => "unbalanced_delimiter",
            DiagnosticKind::MalformedInstance => "malformed_instance",
            DiagnosticKind::MalformedStatement => "malformed_statement",
            DiagnosticKind::DuplicateDeclaration => "duplicate_declaration",
            DiagnosticKind::DuplicateModule => "duplicate_module",
            DiagnosticKind::InvalidEncoding => "invalid_encoding",
            DiagnosticKind::FileTooLarge => "file_too_large",
        }
    }
}

/// A skipped or degraded construct.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParseDiagnostic {
    pub kind: DiagnosticKind,
    pub path: String,
    /// 1-based line where the construct starts (0 when not applicable).
    pub line: u32,
    pub message: String,
}

impl ParseDiagnostic {
    pub fn new(kind: DiagnosticKind, path: &str, line: u32, message: impl Into<String>) -> Self {
        ParseDiagnostic {
            kind,
            path: path.to_string(),
            line,
            message: message.into(),
        }
    }
}

impl fmt::Display for ParseDiagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{}: {}: {}",
            self.path,
            self.line,
            self.kind.as_str(),
            self.message
        )
    }
}
