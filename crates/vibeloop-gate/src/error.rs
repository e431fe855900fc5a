use std::path::PathBuf;
use thiserror::Error;

/// Configuration errors in the criteria source. These are fatal for a run.
#[derive(Error, Debug)]
pub enum CriteriaError {
    #[error("Failed to read criteria source {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse criteria source: {0}")]
    Parse(String),

    #[error("Criteria section '{0}' not found")]
    MissingSection(String),

    #[error("No acceptance criteria declared")]
    Empty,

    #[error("Criterion name must be a string, got {0}")]
    InvalidName(String),

    #[error("Criterion '{name}' must be a string like \">=0.6\", got {found}")]
    NotAString { name: String, found: String },

    #[error("Criterion '{name}' has no comparison operator in '{expr}'")]
    MissingOperator { name: String, expr: String },

    #[error("Criterion '{name}' uses unsupported operator '{operator}' (expected >= or <=)")]
    UnsupportedOperator { name: String, operator: String },

    #[error("Criterion '{name}' has invalid threshold '{value}'")]
    InvalidThreshold { name: String, value: String },
}

/// Errors reading the backtest result artifact. The gate turns every variant
/// into a failed verdict rather than propagating it.
#[derive(Error, Debug)]
pub enum ArtifactError {
    #[error("Result artifact not found at {0}")]
    Missing(PathBuf),

    #[error("Failed to read result artifact {path}: {source}")]
    Unreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Result artifact {path} is malformed: {message}")]
    Malformed { path: PathBuf, message: String },
}
