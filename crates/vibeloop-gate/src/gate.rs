use std::path::PathBuf;

use tracing::{info, warn};

use crate::{
    evaluate, load_criteria, load_measurements, ArtifactError, CriteriaError, Criterion,
    MeasurementSet, Verdict,
};

/// Result of one file-backed gate evaluation
#[derive(Debug, Clone)]
pub struct GateRun {
    pub criteria: Vec<Criterion>,
    /// `None` when the result artifact could not be read
    pub measurements: Option<MeasurementSet>,
    pub verdict: Verdict,
}

/// Evaluates the criteria source against the result source.
///
/// Both files are re-read on every call so that a retry never sees stale
/// criteria or results from a previous attempt.
#[derive(Debug, Clone)]
pub struct Gate {
    criteria_path: PathBuf,
    results_path: PathBuf,
}

impl Gate {
    pub fn new(criteria_path: impl Into<PathBuf>, results_path: impl Into<PathBuf>) -> Self {
        Self {
            criteria_path: criteria_path.into(),
            results_path: results_path.into(),
        }
    }

    /// Load both sources and evaluate.
    ///
    /// Criteria problems are configuration errors and are returned as `Err`.
    /// Any problem with the result artifact yields a failed verdict.
    pub fn evaluate_files(&self) -> Result<GateRun, CriteriaError> {
        let criteria = load_criteria(&self.criteria_path)?;

        let (measurements, verdict) = match load_measurements(&self.results_path) {
            Ok(measurements) => {
                let verdict = evaluate(&criteria, &measurements);
                (Some(measurements), verdict)
            }
            Err(ArtifactError::Missing(path)) => {
                warn!(path = %path.display(), "Result artifact missing, failing gate");
                (None, Verdict::artifact_missing(&path))
            }
            Err(e) => {
                warn!(error = %e, "Result artifact unreadable, failing gate");
                (None, Verdict::artifact_unreadable(&e))
            }
        };

        info!(
            passed = verdict.passed(),
            violations = verdict.violations().len(),
            "Gate evaluated"
        );

        Ok(GateRun {
            criteria,
            measurements,
            verdict,
        })
    }
}
