//! Project configuration file support for vibeloop.
//!
//! Loads configuration from `vibeloop.toml` in the working directory.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use vibeloop_core::{DEFAULT_CRITERIA_PATH, DEFAULT_RESULTS_PATH};
use vibeloop_logging::CostTable;

/// The config file name
pub const CONFIG_FILE_NAME: &str = "vibeloop.toml";

/// Project-level configuration loaded from `vibeloop.toml`
#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct ProjectConfig {
    /// Retries after the first failing gate
    pub max_iterations: Option<usize>,
    /// Global default agent (applies to both planner and generator)
    pub agent: Option<String>,
    /// Global default model (applies to both planner and generator)
    pub model: Option<String>,
    /// Kill an agent or backtest command after this many seconds
    pub timeout_secs: Option<u64>,
    /// Shell command run after each handoff to produce the results file
    pub backtest_command: Option<String>,
    #[serde(default)]
    pub planner: RoleConfig,
    #[serde(default)]
    pub generator: RoleConfig,
    #[serde(default)]
    pub paths: PathsConfig,
    /// Model price table; replaces the built-in defaults when present
    pub costs: Option<CostTable>,
}

/// Configuration for a specific role (planner or generator)
#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct RoleConfig {
    pub agent: Option<String>,
    pub model: Option<String>,
}

/// File locations, relative to the working directory unless absolute
#[derive(Debug, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PathsConfig {
    pub project_spec: PathBuf,
    pub results: PathBuf,
    pub task: PathBuf,
    pub metrics: PathBuf,
    pub journal_dir: PathBuf,
    pub templates_dir: PathBuf,
    /// Optional JSON event log (in addition to the console)
    pub event_log: Option<PathBuf>,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            project_spec: PathBuf::from(DEFAULT_CRITERIA_PATH),
            results: PathBuf::from(DEFAULT_RESULTS_PATH),
            task: PathBuf::from("artifacts/handoff/task.json"),
            metrics: PathBuf::from("artifacts/logs/observability_log.csv"),
            journal_dir: PathBuf::from("artifacts/runs"),
            templates_dir: PathBuf::from("templates"),
            event_log: None,
        }
    }
}

impl ProjectConfig {
    /// Load configuration from the working directory.
    ///
    /// Returns:
    /// - `Ok(Some(config))` if file exists and parses successfully
    /// - `Ok(None)` if file does not exist
    /// - `Err(...)` if file exists but fails to parse (hard error)
    pub fn load(working_dir: &Path) -> Result<Option<Self>> {
        let config_path = working_dir.join(CONFIG_FILE_NAME);

        if !config_path.exists() {
            return Ok(None);
        }

        let content = std::fs::read_to_string(&config_path)
            .with_context(|| format!("Failed to read {}", config_path.display()))?;

        let config: ProjectConfig = toml::from_str(&content)
            .with_context(|| format!("Failed to parse {}", config_path.display()))?;

        Ok(Some(config))
    }

    /// Priority: [planner].agent > global agent > None
    pub fn planner_agent(&self) -> Option<&str> {
        self.planner.agent.as_deref().or(self.agent.as_deref())
    }

    pub fn planner_model(&self) -> Option<&str> {
        self.planner.model.as_deref().or(self.model.as_deref())
    }

    /// Priority: [generator].agent > global agent > None
    pub fn generator_agent(&self) -> Option<&str> {
        self.generator.agent.as_deref().or(self.agent.as_deref())
    }

    pub fn generator_model(&self) -> Option<&str> {
        self.generator.model.as_deref().or(self.model.as_deref())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn test_missing_file_is_none() {
        let dir = tempfile::tempdir().unwrap();
        assert!(ProjectConfig::load(dir.path()).unwrap().is_none());
    }

    #[test]
    fn test_full_config() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join(CONFIG_FILE_NAME),
            r#"
max_iterations = 2
agent = "claude"
model = "sonnet"
backtest_command = "python scripts/backtest.py"

[generator]
agent = "cursor"

[planner]
model = "opus"

[paths]
project_spec = "ProjectSpec.yaml"

[costs.sonnet]
input = 3.0
output = 15.0
"#,
        )
        .unwrap();

        let config = ProjectConfig::load(dir.path()).unwrap().unwrap();
        assert_eq!(config.max_iterations, Some(2));
        assert_eq!(config.planner_agent(), Some("claude"));
        assert_eq!(config.planner_model(), Some("opus"));
        assert_eq!(config.generator_agent(), Some("cursor"));
        assert_eq!(config.generator_model(), Some("sonnet"));
        assert_eq!(config.paths.project_spec, PathBuf::from("ProjectSpec.yaml"));
        assert_eq!(config.paths.results, PathBuf::from(DEFAULT_RESULTS_PATH));
        assert!(config.costs.unwrap().rate("sonnet").is_some());
    }

    #[test]
    fn test_unknown_field_is_error() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join(CONFIG_FILE_NAME), "recursion_limit = 3\n").unwrap();
        assert!(ProjectConfig::load(dir.path()).is_err());
    }
}
