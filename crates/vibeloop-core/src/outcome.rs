use serde::Serialize;
use std::time::Duration;

use vibeloop_gate::Verdict;

use crate::{AttemptRecord, RunState, StageError};

/// The final outcome of a control-loop run
#[derive(Debug, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RunOutcome {
    /// The gate passed
    Passed {
        run_id: String,
        thread_id: String,
        attempts: usize,
        verdict: Verdict,
        history: Vec<AttemptRecord>,
        total_duration_secs: f64,
    },
    /// Retries were exhausted with the gate still failing
    GateFailed {
        run_id: String,
        thread_id: String,
        attempts: usize,
        verdict: Verdict,
        history: Vec<AttemptRecord>,
        total_duration_secs: f64,
    },
    /// A fault ended the run before a verdict could settle it
    Aborted {
        run_id: String,
        thread_id: String,
        attempts: usize,
        error: StageError,
        verdict: Option<Verdict>,
        history: Vec<AttemptRecord>,
        total_duration_secs: f64,
    },
}

impl RunOutcome {
    pub(crate) fn from_state(state: RunState, duration: Duration) -> Self {
        let run_id = state.run_id.to_string();
        let thread_id = state.thread_id;
        let attempts = state.history.len();
        let history = state.history;
        let total_duration_secs = duration.as_secs_f64();

        match (state.terminal_error, state.verdict) {
            (None, Some(verdict)) if verdict.passed() => Self::Passed {
                run_id,
                thread_id,
                attempts,
                verdict,
                history,
                total_duration_secs,
            },
            (None, Some(verdict)) => Self::GateFailed {
                run_id,
                thread_id,
                attempts,
                verdict,
                history,
                total_duration_secs,
            },
            (error, verdict) => Self::Aborted {
                run_id,
                thread_id,
                attempts,
                error: error.unwrap_or_else(|| {
                    StageError::Configuration("run ended without a verdict".into())
                }),
                verdict,
                history,
                total_duration_secs,
            },
        }
    }

    /// Process exit code: 0 passed, 1 gate failed, 2 aborted
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Passed { .. } => 0,
            Self::GateFailed { .. } => 1,
            Self::Aborted { .. } => 2,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Passed { .. })
    }

    /// Short name of the terminal state
    pub fn status(&self) -> &'static str {
        match self {
            Self::Passed { .. } => "passed",
            Self::GateFailed { .. } => "gate_failed",
            Self::Aborted { .. } => "aborted",
        }
    }

    /// The last verdict, if any gate was evaluated
    pub fn verdict(&self) -> Option<&Verdict> {
        match self {
            Self::Passed { verdict, .. } | Self::GateFailed { verdict, .. } => Some(verdict),
            Self::Aborted { verdict, .. } => verdict.as_ref(),
        }
    }

    pub fn error(&self) -> Option<&StageError> {
        match self {
            Self::Aborted { error, .. } => Some(error),
            _ => None,
        }
    }

    /// Number of gate evaluations
    pub fn attempts(&self) -> usize {
        match self {
            Self::Passed { attempts, .. }
            | Self::GateFailed { attempts, .. }
            | Self::Aborted { attempts, .. } => *attempts,
        }
    }

    pub fn history(&self) -> &[AttemptRecord] {
        match self {
            Self::Passed { history, .. }
            | Self::GateFailed { history, .. }
            | Self::Aborted { history, .. } => history,
        }
    }

    pub fn thread_id(&self) -> &str {
        match self {
            Self::Passed { thread_id, .. }
            | Self::GateFailed { thread_id, .. }
            | Self::Aborted { thread_id, .. } => thread_id,
        }
    }

    pub fn total_duration_secs(&self) -> f64 {
        match self {
            Self::Passed {
                total_duration_secs,
                ..
            }
            | Self::GateFailed {
                total_duration_secs,
                ..
            }
            | Self::Aborted {
                total_duration_secs,
                ..
            } => *total_duration_secs,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vibeloop_gate::{evaluate, Criterion, MeasurementSet, Operator};

    fn failing_verdict() -> Verdict {
        evaluate(
            &[Criterion::new("winrate", Operator::GreaterEq, 0.6)],
            &MeasurementSet::new().with("winrate", 0.5),
        )
    }

    #[test]
    fn test_exit_codes() {
        let mut state = RunState::new("t", "th");
        state.verdict = Some(Verdict::from_violations(vec![]));
        let passed = RunOutcome::from_state(state, Duration::ZERO);
        assert_eq!(passed.exit_code(), 0);
        assert!(passed.is_success());

        let mut state = RunState::new("t", "th");
        state.verdict = Some(failing_verdict());
        let failed = RunOutcome::from_state(state, Duration::ZERO);
        assert_eq!(failed.exit_code(), 1);
        assert_eq!(failed.status(), "gate_failed");

        let mut state = RunState::new("t", "th");
        state.terminal_error = Some(StageError::Plan("agent exited 1".into()));
        let aborted = RunOutcome::from_state(state, Duration::ZERO);
        assert_eq!(aborted.exit_code(), 2);
        assert!(aborted.verdict().is_none());
    }

    #[test]
    fn test_aborted_keeps_last_verdict() {
        let mut state = RunState::new("t", "th");
        state.verdict = Some(failing_verdict());
        state.terminal_error = Some(StageError::Configuration("bad criteria".into()));
        let outcome = RunOutcome::from_state(state, Duration::ZERO);
        assert_eq!(outcome.exit_code(), 2);
        assert!(!outcome.verdict().unwrap().passed());
    }

    #[test]
    fn test_serializes_status_tag() {
        let mut state = RunState::new("t", "eth");
        state.verdict = Some(failing_verdict());
        let json = serde_json::to_value(RunOutcome::from_state(state, Duration::ZERO)).unwrap();
        assert_eq!(json["status"], "gate_failed");
        assert_eq!(json["thread_id"], "eth");
        assert_eq!(json["verdict"]["passed"], false);
    }
}
