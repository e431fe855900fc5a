use serde::Serialize;
use std::fmt;
use std::path::Path;

use crate::{ArtifactError, Criterion, Operator};

/// Criterion name used for violations that are not tied to a single criterion.
const ARTIFACT_VIOLATION: &str = "backtest_artifact";
const UPSTREAM_VIOLATION: &str = "upstream_error";

/// What the gate saw for a criterion
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum Observed {
    Value(f64),
    /// The measurement was not present in the result artifact
    Missing,
    /// Nothing could be measured (artifact absent or unreadable, or an
    /// earlier stage failed)
    Unverifiable,
}

impl fmt::Display for Observed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Observed::Value(v) => write!(f, "{}", v),
            Observed::Missing => f.write_str("missing"),
            Observed::Unverifiable => f.write_str("could not verify"),
        }
    }
}

/// A single failed check
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Violation {
    pub criterion_name: String,
    pub observed: Observed,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub operator: Option<Operator>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub threshold: Option<f64>,
    pub message: String,
}

impl Violation {
    pub(crate) fn for_criterion(criterion: &Criterion, observed: Observed) -> Self {
        let message = match observed {
            Observed::Value(value) => format!(
                "{}: observed {} {} required {} {}",
                criterion.name,
                value,
                criterion.operator.negated_symbol(),
                criterion.operator,
                criterion.threshold
            ),
            Observed::Missing => format!(
                "{}: measurement missing from results, required {} {}",
                criterion.name, criterion.operator, criterion.threshold
            ),
            Observed::Unverifiable => format!(
                "{}: could not verify, required {} {}",
                criterion.name, criterion.operator, criterion.threshold
            ),
        };

        Self {
            criterion_name: criterion.name.clone(),
            observed,
            operator: Some(criterion.operator),
            threshold: Some(criterion.threshold),
            message,
        }
    }
}

/// Outcome of one gate evaluation. `passed` holds exactly when there are no
/// violations; the constructors are the only way to build one.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Verdict {
    passed: bool,
    violations: Vec<Violation>,
}

impl Verdict {
    pub fn from_violations(violations: Vec<Violation>) -> Self {
        Self {
            passed: violations.is_empty(),
            violations,
        }
    }

    /// The result artifact does not exist: fail closed.
    pub fn artifact_missing(path: &Path) -> Self {
        Self::single(
            ARTIFACT_VIOLATION,
            format!(
                "could not verify: result artifact missing at {}",
                path.display()
            ),
        )
    }

    /// The result artifact exists but could not be read as measurements.
    pub fn artifact_unreadable(error: &ArtifactError) -> Self {
        Self::single(ARTIFACT_VIOLATION, format!("could not verify: {}", error))
    }

    /// An earlier stage failed; its message is carried verbatim.
    pub fn upstream_error(message: &str) -> Self {
        Self::single(UPSTREAM_VIOLATION, message.to_string())
    }

    fn single(name: &str, message: String) -> Self {
        Self::from_violations(vec![Violation {
            criterion_name: name.to_string(),
            observed: Observed::Unverifiable,
            operator: None,
            threshold: None,
            message,
        }])
    }

    pub fn passed(&self) -> bool {
        self.passed
    }

    pub fn violations(&self) -> &[Violation] {
        &self.violations
    }

    /// Actionable text for the next generation attempt, or `None` on pass.
    pub fn correction_feedback(&self) -> Option<String> {
        if self.passed {
            return None;
        }

        if let [only] = self.violations.as_slice() {
            if only.criterion_name == UPSTREAM_VIOLATION {
                return Some(format!(
                    "The previous attempt failed before it could be evaluated:\n{}",
                    only.message
                ));
            }
        }

        let mut feedback = String::from(
            "The backtest did not meet the acceptance criteria. Fix the following and resubmit:\n",
        );
        for violation in &self.violations {
            feedback.push_str("- ");
            feedback.push_str(&violation.message);
            feedback.push('\n');
        }
        Some(feedback.trim_end().to_string())
    }

    /// Short description for logging
    pub fn short_description(&self) -> String {
        if self.passed {
            "PASS".to_string()
        } else {
            let n = self.violations.len();
            format!(
                "FAIL ({} {})",
                n,
                if n == 1 { "violation" } else { "violations" }
            )
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_empty_violations_pass() {
        let verdict = Verdict::from_violations(Vec::new());
        assert!(verdict.passed());
        assert!(verdict.correction_feedback().is_none());
        assert_eq!(verdict.short_description(), "PASS");
    }

    #[test]
    fn test_artifact_missing_is_single_violation() {
        let verdict = Verdict::artifact_missing(&PathBuf::from("artifacts/backtest/latest.json"));
        assert!(!verdict.passed());
        assert_eq!(verdict.violations().len(), 1);
        let v = &verdict.violations()[0];
        assert_eq!(v.observed, Observed::Unverifiable);
        assert!(v.message.contains("could not verify"));
        assert!(v.message.contains("artifacts/backtest/latest.json"));
    }

    #[test]
    fn test_upstream_feedback_is_verbatim() {
        let verdict = Verdict::upstream_error("change set invalid at /changes/0/action");
        let feedback = verdict.correction_feedback().unwrap();
        assert!(feedback.contains("change set invalid at /changes/0/action"));
        assert_eq!(verdict.short_description(), "FAIL (1 violation)");
    }

    #[test]
    fn test_criterion_feedback_lists_each_violation() {
        let winrate = Criterion::new("winrate", Operator::GreaterEq, 0.6);
        let mae = Criterion::new("mae", Operator::LessEq, 0.05);
        let verdict = Verdict::from_violations(vec![
            Violation::for_criterion(&winrate, Observed::Value(0.5)),
            Violation::for_criterion(&mae, Observed::Missing),
        ]);

        let feedback = verdict.correction_feedback().unwrap();
        assert!(feedback.contains("- winrate: observed 0.5 < required >= 0.6"));
        assert!(feedback.contains("- mae: measurement missing from results, required <= 0.05"));
    }
}
