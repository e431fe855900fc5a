use crate::{check, GateRun};

/// One line of the human-readable gate report
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportLine {
    pub passed: bool,
    pub text: String,
}

/// Line-by-line report of a gate run, without styling
#[derive(Debug, Clone)]
pub struct GateReport {
    pub lines: Vec<ReportLine>,
    pub passed: bool,
}

impl GateReport {
    pub fn from_run(run: &GateRun) -> Self {
        let lines = match &run.measurements {
            Some(measurements) => run
                .criteria
                .iter()
                .map(|criterion| {
                    let result = check(criterion, measurements);
                    let text = match result.violation() {
                        None => format!(
                            "{}: {} {} {}",
                            criterion.name, result.observed, criterion.operator, criterion.threshold
                        ),
                        Some(violation) => violation.message,
                    };
                    ReportLine {
                        passed: result.passed,
                        text,
                    }
                })
                .collect(),
            None => run
                .verdict
                .violations()
                .iter()
                .map(|v| ReportLine {
                    passed: false,
                    text: v.message.clone(),
                })
                .collect(),
        };

        Self {
            lines,
            passed: run.verdict.passed(),
        }
    }

    pub fn result_line(&self) -> &'static str {
        if self.passed {
            "Gate PASSED"
        } else {
            "Gate FAILED"
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Criterion, MeasurementSet, Verdict};
    use std::path::Path;

    #[test]
    fn test_report_has_a_line_per_criterion() {
        let criteria = vec![
            Criterion::parse("winrate", ">=0.6").unwrap(),
            Criterion::parse("mae", "<=0.05").unwrap(),
        ];
        let measurements = MeasurementSet::new().with("winrate", 0.72).with("mae", 0.08);
        let verdict = crate::evaluate(&criteria, &measurements);
        let run = GateRun {
            criteria,
            measurements: Some(measurements),
            verdict,
        };

        let report = GateReport::from_run(&run);
        assert!(!report.passed);
        assert_eq!(report.lines.len(), 2);
        assert_eq!(
            report.lines[0],
            ReportLine {
                passed: true,
                text: "winrate: 0.72 >= 0.6".to_string()
            }
        );
        assert!(!report.lines[1].passed);
        assert_eq!(report.lines[1].text, "mae: observed 0.08 > required <= 0.05");
        assert_eq!(report.result_line(), "Gate FAILED");
    }

    #[test]
    fn test_report_without_measurements_uses_verdict() {
        let run = GateRun {
            criteria: vec![Criterion::parse("winrate", ">=0.6").unwrap()],
            measurements: None,
            verdict: Verdict::artifact_missing(Path::new("latest.json")),
        };

        let report = GateReport::from_run(&run);
        assert_eq!(report.lines.len(), 1);
        assert!(report.lines[0].text.contains("could not verify"));
    }
}
