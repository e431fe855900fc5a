use chrono::{DateTime, Utc};
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::path::PathBuf;
use thiserror::Error;
use uuid::Uuid;

use vibeloop_gate::{MeasurementSet, Verdict};

use crate::ChangeSet;

const MAX_THREAD_ID_LEN: usize = 48;

/// A fault raised by one stage of the loop.
///
/// `Plan` and `Configuration` end the run. The others are recorded as the
/// upstream error of the attempt and reported back to the generator.
#[derive(Error, Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", content = "message", rename_all = "snake_case")]
pub enum StageError {
    #[error("planning failed: {0}")]
    Plan(String),

    #[error("generation failed: {0}")]
    Generate(String),

    #[error("generated change set is invalid: {0}")]
    Validation(String),

    #[error("handoff failed: {0}")]
    Handoff(String),

    #[error("configuration error: {0}")]
    Configuration(String),
}

impl StageError {
    pub fn stage(&self) -> &'static str {
        match self {
            StageError::Plan(_) => "plan",
            StageError::Generate(_) | StageError::Validation(_) => "generate",
            StageError::Handoff(_) => "handoff",
            StageError::Configuration(_) => "gate",
        }
    }
}

/// One gate evaluation
#[derive(Debug, Clone, Serialize)]
pub struct AttemptRecord {
    pub iteration: usize,
    pub files_changed: usize,
    pub upstream_error: Option<StageError>,
    pub verdict: Verdict,
    pub timestamp: DateTime<Utc>,
}

/// Everything the loop knows about a run. Stages take it by value and hand
/// it back.
#[derive(Debug, Clone)]
pub struct RunState {
    pub run_id: Uuid,
    pub thread_id: String,
    pub task: String,
    pub plan: Option<String>,
    pub change_set: Option<ChangeSet>,
    /// Where the executor said the results would be written
    pub artifact_path: Option<PathBuf>,
    pub measurement_set: Option<MeasurementSet>,
    pub verdict: Option<Verdict>,
    pub correction_feedback: Option<String>,
    pub terminal_error: Option<StageError>,
    pub upstream_error: Option<StageError>,
    pub history: Vec<AttemptRecord>,
    iteration_count: usize,
}

impl RunState {
    pub fn new(task: impl Into<String>, thread_id: impl Into<String>) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            thread_id: thread_id.into(),
            task: task.into(),
            plan: None,
            change_set: None,
            artifact_path: None,
            measurement_set: None,
            verdict: None,
            correction_feedback: None,
            terminal_error: None,
            upstream_error: None,
            history: Vec::new(),
            iteration_count: 0,
        }
    }

    /// Number of retries so far (0 during the first attempt)
    pub fn iteration_count(&self) -> usize {
        self.iteration_count
    }

    pub(crate) fn advance_iteration(&mut self) {
        self.iteration_count += 1;
    }
}

/// Derive a thread id from a task description: lowercase ASCII words joined
/// by `-`, at most 48 characters. A task with no ASCII words (for example one
/// written in Chinese) gets `run-` plus a short hash of the task, so distinct
/// tasks keep distinct ids.
pub fn default_thread_id(task: &str) -> String {
    let mut slug = String::new();
    for word in task
        .split(|c: char| !c.is_ascii_alphanumeric())
        .filter(|w| !w.is_empty())
    {
        let word = word.to_ascii_lowercase();
        if slug.is_empty() {
            slug.push_str(&word[..word.len().min(MAX_THREAD_ID_LEN)]);
            continue;
        }
        if slug.len() + 1 + word.len() > MAX_THREAD_ID_LEN {
            break;
        }
        slug.push('-');
        slug.push_str(&word);
    }

    if slug.is_empty() {
        let hash = hex::encode(Sha256::digest(task.trim().as_bytes()));
        format!("run-{}", &hash[..8])
    } else {
        slug
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_state_starts_at_zero() {
        let state = RunState::new("task", "thread");
        assert_eq!(state.iteration_count(), 0);
        assert!(state.verdict.is_none());
        assert!(state.history.is_empty());
    }

    #[test]
    fn test_default_thread_id() {
        assert_eq!(
            default_thread_id("Add a breakout filter to ETH/USD!"),
            "add-a-breakout-filter-to-eth-usd"
        );
        assert!(default_thread_id(&"word ".repeat(40)).len() <= 48);
    }

    #[test]
    fn test_thread_id_for_non_ascii_task_is_hashed() {
        let a = default_thread_id("提高突破策略的胜率");
        let b = default_thread_id("降低最大回撤");
        assert!(a.starts_with("run-"));
        assert_eq!(a.len(), "run-".len() + 8);
        assert_ne!(a, b);
        assert_eq!(a, default_thread_id("提高突破策略的胜率"));
    }

    #[test]
    fn test_thread_id_truncates_long_first_word() {
        let id = default_thread_id(&"x".repeat(60));
        assert_eq!(id, "x".repeat(48));
    }

    #[test]
    fn test_stage_error_stage_names() {
        assert_eq!(StageError::Plan("x".into()).stage(), "plan");
        assert_eq!(StageError::Handoff("x".into()).stage(), "handoff");
        assert_eq!(StageError::Validation("x".into()).stage(), "generate");
    }
}
