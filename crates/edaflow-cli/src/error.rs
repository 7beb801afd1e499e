//! CLI errors and their exit codes.
//!
//! Exit codes: 0 = success, 1 = usage or configuration error,
//! 2 = analysis failure, 3 = I/O error.

use std::path::PathBuf;

use edaflow_core::CoreError;
use edaflow_feedback::SessionError;
use edaflow_logs::LogError;
use edaflow_parser::ParseError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CliError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("i/o error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error(transparent)]
    Graph(#[from] CoreError),

    #[error(transparent)]
    Log(#[from] LogError),

    #[error(transparent)]
    Session(#[from] SessionError),

    #[error("failed to encode output: {0}")]
    Output(#[from] serde_json::Error),

    /// The command ran but its result is a failure, e.g. a replayed session
    /// that never succeeded.
    #[error("{0}")]
    Analysis(String),
}

impl CliError {
    pub fn exit_code(&self) -> i32 {
        match self {
            CliError::Config(_) => 1,
            CliError::Io { .. } => 3,
            CliError::Parse(err) => match err {
                ParseError::InvalidConfig(_) | ParseError::Pool(_) => 1,
                ParseError::Io { .. } => 3,
                ParseError::Cancelled => 2,
            },
            CliError::Graph(err) => match err {
                CoreError::Io { .. } => 3,
                _ => 2,
            },
            CliError::Log(err) => match err {
                LogError::InvalidConfig(_) | LogError::Pattern(_) => 1,
                LogError::Io { .. } | LogError::Read(_) => 3,
                LogError::Cancelled | LogError::Serialization(_) => 2,
            },
            CliError::Session(err) => match err {
                SessionError::InvalidConfig(_) => 1,
                SessionError::Log(LogError::Io { .. }) => 3,
                _ => 2,
            },
            CliError::Output(_) | CliError::Analysis(_) => 2,
        }
    }
}
