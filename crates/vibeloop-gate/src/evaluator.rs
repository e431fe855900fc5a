use tracing::debug;

use crate::{Criterion, MeasurementSet, Observed, Verdict, Violation};

/// Outcome of comparing one criterion against the measurements
#[derive(Debug, Clone, PartialEq)]
pub struct CriterionCheck<'a> {
    pub criterion: &'a Criterion,
    pub observed: Observed,
    pub passed: bool,
}

impl CriterionCheck<'_> {
    pub fn violation(&self) -> Option<Violation> {
        if self.passed {
            None
        } else {
            Some(Violation::for_criterion(self.criterion, self.observed))
        }
    }
}

/// Compare a single criterion. A missing measurement fails.
pub fn check<'a>(criterion: &'a Criterion, measurements: &MeasurementSet) -> CriterionCheck<'a> {
    match measurements.get(&criterion.name) {
        Some(value) => CriterionCheck {
            criterion,
            observed: Observed::Value(value),
            passed: criterion.is_satisfied_by(value),
        },
        None => CriterionCheck {
            criterion,
            observed: Observed::Missing,
            passed: false,
        },
    }
}

/// Evaluate every criterion and collect all violations in criteria order.
pub fn evaluate(criteria: &[Criterion], measurements: &MeasurementSet) -> Verdict {
    let violations: Vec<Violation> = criteria
        .iter()
        .map(|c| check(c, measurements))
        .filter_map(|check| check.violation())
        .collect();

    debug!(
        criteria = criteria.len(),
        measurements = measurements.len(),
        violations = violations.len(),
        "Evaluated acceptance criteria"
    );

    Verdict::from_violations(violations)
}
