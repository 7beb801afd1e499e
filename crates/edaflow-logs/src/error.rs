use std::path::PathBuf;

use thiserror::Error;

/// Errors from log reduction.
///
/// Overflow is not an error: matches past the cap are counted in
/// `dropped_counts`.
#[derive(Debug, Error)]
pub enum LogError {
    /// The caller cancelled; the partial summary was discarded.
    #[error("log reduction cancelled")]
    Cancelled,

    #[error("i/o error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("read error: {0}")]
    Read(#[from] std::io::Error),

    #[error("invalid reducer configuration: {0}")]
    InvalidConfig(String),

    #[error("invalid pattern: {0}")]
    Pattern(#[from] regex::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
