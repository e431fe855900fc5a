use std::path::PathBuf;
use std::time::Duration;

use vibeloop_logging::CostTable;

/// Default number of retries after the first failing gate
pub const DEFAULT_MAX_ITERATIONS: usize = 3;

pub const DEFAULT_CRITERIA_PATH: &str = "specs/ProjectSpec.yaml";
pub const DEFAULT_RESULTS_PATH: &str = "artifacts/backtest/latest.json";

/// Settings for one control-loop run.
///
/// Relative paths are resolved against `working_dir` by [`LoopConfig::resolve`].
#[derive(Debug, Clone)]
pub struct LoopConfig {
    pub working_dir: PathBuf,
    pub max_iterations: usize,
    /// Criteria source (project spec or bare criteria mapping)
    pub criteria_path: PathBuf,
    /// Result source read by the gate when the executor reports no artifact
    pub results_path: PathBuf,
    pub planner_model: Option<String>,
    pub generator_model: Option<String>,
    pub agent_timeout: Option<Duration>,
    pub costs: CostTable,
}

impl LoopConfig {
    pub fn new(working_dir: impl Into<PathBuf>) -> Self {
        Self {
            working_dir: working_dir.into(),
            max_iterations: DEFAULT_MAX_ITERATIONS,
            criteria_path: PathBuf::from(DEFAULT_CRITERIA_PATH),
            results_path: PathBuf::from(DEFAULT_RESULTS_PATH),
            planner_model: None,
            generator_model: None,
            agent_timeout: None,
            costs: CostTable::default(),
        }
    }

    pub fn with_max_iterations(mut self, max: usize) -> Self {
        self.max_iterations = max;
        self
    }

    pub fn with_criteria_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.criteria_path = path.into();
        self
    }

    pub fn with_results_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.results_path = path.into();
        self
    }

    pub fn with_models(mut self, planner: Option<String>, generator: Option<String>) -> Self {
        self.planner_model = planner;
        self.generator_model = generator;
        self
    }

    pub fn with_agent_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.agent_timeout = timeout;
        self
    }

    pub fn with_costs(mut self, costs: CostTable) -> Self {
        self.costs = costs;
        self
    }

    /// Resolve a possibly relative path against the working directory
    pub fn resolve(&self, path: &std::path::Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.working_dir.join(path)
        }
    }

    pub fn criteria_file(&self) -> PathBuf {
        self.resolve(&self.criteria_path)
    }

    pub fn results_file(&self) -> PathBuf {
        self.resolve(&self.results_path)
    }
}
