//! Source discovery.

use std::path::{Path, PathBuf};

use walkdir::WalkDir;

use crate::config::ParserConfig;
use crate::error::ParseError;

/// Collects HDL sources under `roots`, sorted and deduplicated.
///
/// A root that is a file is taken as-is regardless of its extension. A
/// missing root is an error; unreadable entries below a root are skipped
/// with a warning.
pub fn discover_sources(roots: &[PathBuf], config: &ParserConfig) -> Result<Vec<PathBuf>, ParseError> {
    let mut found = Vec::new();
    for root in roots {
        let meta = std::fs::metadata(root).map_err(|source| ParseError::Io {
            path: root.clone(),
            source,
        })?;
        if meta.is_file() {
            found.push(root.clone());
            continue;
        }
        for entry in WalkDir::new(root).follow_links(true) {
            let entry = match entry {
                Ok(entry) => entry,
                Err(err) => {
                    tracing::warn!("skipping unreadable entry: {}", err);
                    continue;
                }
            };
            if entry.file_type().is_file() && has_source_extension(entry.path(), config) {
                found.push(entry.into_path());
            }
        }
    }
    found.sort();
    found.dedup();
    tracing::debug!(files = found.len(), "discovered sources");
    Ok(found)
}

fn has_source_extension(path: &Path, config: &ParserConfig) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| config.accepts_extension(e))
}
