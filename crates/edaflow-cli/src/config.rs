//! Layered configuration for the `edaflow` binary.
//!
//! Defaults, then an optional TOML file, then `EDAFLOW_*` environment
//! variables. An explicit `--config` path must exist; `./edaflow.toml` is
//! used only when present.
//!
//! ```toml
//! [parser]
//! max_workers = 8
//!
//! [reducer]
//! max_entries = 500
//!
//! [session]
//! max_iterations = 5
//! ```

use std::path::Path;

use edaflow_feedback::SessionConfig;
use edaflow_logs::ReducerConfig;
use edaflow_parser::ParserConfig;
use serde::{Deserialize, Serialize};

use crate::error::CliError;

pub const DEFAULT_CONFIG_FILE: &str = "edaflow.toml";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EdaflowConfig {
    pub parser: ParserConfig,
    pub reducer: ReducerConfig,
    pub session: SessionConfig,
}

impl EdaflowConfig {
    /// Loads, applies the process environment and validates.
    pub fn load(explicit: Option<&Path>) -> Result<Self, CliError> {
        let mut config = match explicit {
            Some(path) => Self::from_file(path)?,
            None => {
                let fallback = Path::new(DEFAULT_CONFIG_FILE);
                if fallback.is_file() {
                    Self::from_file(fallback)?
                } else {
                    Self::default()
                }
            }
        };
        config.apply_env(|name| std::env::var(name).ok())?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, CliError> {
        let text = std::fs::read_to_string(path).map_err(|source| CliError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&text).map_err(|err| match err {
            CliError::Config(msg) => CliError::Config(format!("{}: {}", path.display(), msg)),
            other => other,
        })
    }

    pub fn from_toml(text: &str) -> Result<Self, CliError> {
        toml::from_str(text).map_err(|err| CliError::Config(err.to_string()))
    }

    /// Overrides limits from `EDAFLOW_*` variables read through `lookup`.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<(), CliError> {
        let targets: [(&str, &mut usize); 4] = [
            ("EDAFLOW_MAX_WORKERS", &mut self.parser.max_workers),
            ("EDAFLOW_MAX_ENTRIES", &mut self.reducer.max_entries),
            ("EDAFLOW_MAX_ITERATIONS", &mut self.session.max_iterations),
            (
                "EDAFLOW_MAX_CONCURRENT_SESSIONS",
                &mut self.session.max_concurrent_sessions,
            ),
        ];
        for (name, slot) in targets {
            if let Some(raw) = lookup(name) {
                *slot = raw.trim().parse().map_err(|_| {
                    CliError::Config(format!("{name} must be a non-negative integer, got '{raw}'"))
                })?;
                tracing::debug!(name, value = *slot, "config override from environment");
            }
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), CliError> {
        self.parser
            .validate()
            .map_err(|e| CliError::Config(e.to_string()))?;
        self.reducer
            .validate()
            .map_err(|e| CliError::Config(e.to_string()))?;
        self.session
            .validate()
            .map_err(|e| CliError::Config(e.to_string()))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn partial_toml_keeps_defaults() {
        let config = EdaflowConfig::from_toml("[session]\nmax_iterations = 7\n").unwrap();
        assert_eq!(config.session.max_iterations, 7);
        assert_eq!(config.session.max_concurrent_sessions, 4);
        assert_eq!(config.reducer, ReducerConfig::default());
    }

    #[test]
    fn unknown_sections_are_rejected() {
        let err = EdaflowConfig::from_toml("[planner]\nmodel = \"x\"\n").unwrap_err();
        assert_eq!(err.exit_code(), 1);
    }

    #[test]
    fn environment_overrides_file() {
        let mut config = EdaflowConfig::from_toml("[reducer]\nmax_entries = 10\n").unwrap();
        config
            .apply_env(env(&[("EDAFLOW_MAX_ENTRIES", "25"), ("EDAFLOW_MAX_WORKERS", " 2 ")]))
            .unwrap();
        assert_eq!(config.reducer.max_entries, 25);
        assert_eq!(config.parser.max_workers, 2);
    }

    #[test]
    fn zero_limits_fail_validation() {
        let mut config = EdaflowConfig::default();
        config
            .apply_env(env(&[("EDAFLOW_MAX_ITERATIONS", "0")]))
            .unwrap();
        assert!(matches!(config.validate(), Err(CliError::Config(_))));

        let err = EdaflowConfig::default()
            .apply_env(env(&[("EDAFLOW_MAX_ENTRIES", "lots")]))
            .unwrap_err();
        assert!(err.to_string().contains("EDAFLOW_MAX_ENTRIES"));
    }

    #[test]
    fn explicit_file_must_exist() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("none.toml");
        assert_eq!(EdaflowConfig::from_file(&missing).unwrap_err().exit_code(), 3);

        let path = dir.path().join("edaflow.toml");
        std::fs::write(&path, "[parser]\nextensions = [\"v\"]\n").unwrap();
        let config = EdaflowConfig::from_file(&path).unwrap();
        assert_eq!(config.parser.extensions, vec!["v".to_string()]);
    }
}
