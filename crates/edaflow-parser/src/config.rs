use serde::{Deserialize, Serialize};

use crate::error::ParseError;

/// Parser and indexer limits.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ParserConfig {
    /// Size of the parse worker pool.
    pub max_workers: usize,
    /// Files larger than this are skipped with a diagnostic.
    pub max_file_bytes: u64,
    /// Extensions (without the dot) picked up by source discovery.
    pub extensions: Vec<String>,
}

impl Default for ParserConfig {
    fn default() -> Self {
        ParserConfig {
            max_workers: std::thread::available_parallelism().map_or(4, |n| n.get()),
            max_file_bytes: 64 * 1024 * 1024,
            extensions: ["v", "sv", "vh", "svh"].map(String::from).to_vec(),
        }
    }
}

impl ParserConfig {
    pub fn validate(&self) -> Result<(), ParseError> {
        if self.max_workers == 0 {
            return Err(ParseError::InvalidConfig("max_workers must be at least 1".into()));
        }
        if self.max_file_bytes == 0 {
            return Err(ParseError::InvalidConfig("max_file_bytes must be at least 1".into()));
        }
        if self.extensions.is_empty() {
            return Err(ParseError::InvalidConfig("extensions must not be empty".into()));
        }
        Ok(())
    }

    pub fn accepts_extension(&self, ext: &str) -> bool {
        let ext = ext.trim_start_matches('.');
        self.extensions
            .iter()
            .any(|e| e.trim_start_matches('.').eq_ignore_ascii_case(ext))
    }
}
