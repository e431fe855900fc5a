use async_trait::async_trait;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info};
use uuid::Uuid;

use vibeloop_agent::{AgentConfig, AgentError, ProcessSpawner};

use crate::ChangeSet;

#[derive(Error, Debug)]
pub enum ExecutorError {
    #[error("Failed to write {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to serialize handoff payload: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("Backtest command `{command}` exited with code {exit_code}: {stderr}")]
    CommandFailed {
        command: String,
        exit_code: i32,
        stderr: String,
    },

    #[error("Backtest command could not run: {0}")]
    Spawn(#[from] AgentError),
}

/// Identifies the attempt being handed off
#[derive(Debug, Clone, Copy)]
pub struct HandoffContext<'a> {
    pub run_id: &'a Uuid,
    pub thread_id: &'a str,
    pub iteration: usize,
    pub working_dir: &'a Path,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandoffReceipt {
    /// Where the gate should read measurements for this attempt
    pub results_path: PathBuf,
    /// Where the change set was written, if it was written to disk
    pub payload_path: Option<PathBuf>,
}

/// Hands a validated change set to whatever applies it and runs the backtest
#[async_trait]
pub trait Executor: Send + Sync {
    fn name(&self) -> &str;

    async fn handoff(
        &self,
        change_set: &ChangeSet,
        context: &HandoffContext<'_>,
    ) -> Result<HandoffReceipt, ExecutorError>;
}

#[derive(Serialize)]
struct HandoffPayload<'a> {
    run_id: String,
    thread_id: &'a str,
    iteration: usize,
    #[serde(flatten)]
    change_set: &'a ChangeSet,
}

/// Writes the change set as a JSON task file and optionally runs a backtest
/// command that is expected to write the results file.
///
/// Any results file left over from a previous attempt is removed first, so a
/// backtest that never writes one reads as a missing artifact.
#[derive(Debug, Clone)]
pub struct FileHandoff {
    task_path: PathBuf,
    results_path: PathBuf,
    backtest_command: Option<String>,
    timeout: Option<Duration>,
}

impl FileHandoff {
    pub fn new(task_path: impl Into<PathBuf>, results_path: impl Into<PathBuf>) -> Self {
        Self {
            task_path: task_path.into(),
            results_path: results_path.into(),
            backtest_command: None,
            timeout: None,
        }
    }

    pub fn with_backtest_command(mut self, command: Option<String>) -> Self {
        self.backtest_command = command;
        self
    }

    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    fn resolve(path: &Path, working_dir: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            working_dir.join(path)
        }
    }

    fn write_payload(
        &self,
        path: &Path,
        change_set: &ChangeSet,
        context: &HandoffContext<'_>,
    ) -> Result<(), ExecutorError> {
        let payload = HandoffPayload {
            run_id: context.run_id.to_string(),
            thread_id: context.thread_id,
            iteration: context.iteration,
            change_set,
        };
        let json = serde_json::to_string_pretty(&payload)?;

        let io_err = |source| ExecutorError::Io {
            path: path.to_path_buf(),
            source,
        };
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(io_err)?;
        }
        std::fs::write(path, json).map_err(io_err)
    }

    async fn run_backtest(
        &self,
        command: &str,
        task_path: &Path,
        results_path: &Path,
        context: &HandoffContext<'_>,
    ) -> Result<(), ExecutorError> {
        info!(command, "Running backtest command");

        let mut config = AgentConfig::new(context.working_dir.to_path_buf())
            .with_env("VIBELOOP_TASK_PATH".into(), task_path.display().to_string())
            .with_env("VIBELOOP_RESULTS_PATH".into(), results_path.display().to_string())
            .with_env("VIBELOOP_THREAD_ID".into(), context.thread_id.to_string());
        config.timeout = self.timeout;

        let output = ProcessSpawner::spawn(Path::new("sh"), &["-c", command], &config).await?;
        if !output.success() {
            return Err(ExecutorError::CommandFailed {
                command: command.to_string(),
                exit_code: output.exit_code,
                stderr: output.stderr.trim().to_string(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl Executor for FileHandoff {
    fn name(&self) -> &str {
        "file-handoff"
    }

    async fn handoff(
        &self,
        change_set: &ChangeSet,
        context: &HandoffContext<'_>,
    ) -> Result<HandoffReceipt, ExecutorError> {
        let task_path = Self::resolve(&self.task_path, context.working_dir);
        let results_path = Self::resolve(&self.results_path, context.working_dir);

        match std::fs::remove_file(&results_path) {
            Ok(()) => debug!(path = %results_path.display(), "Removed stale results"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(source) => {
                return Err(ExecutorError::Io {
                    path: results_path,
                    source,
                })
            }
        }

        self.write_payload(&task_path, change_set, context)?;
        info!(path = %task_path.display(), files = change_set.files_changed(), "Change set handed off");

        if let Some(command) = &self.backtest_command {
            self.run_backtest(command, &task_path, &results_path, context)
                .await?;
        }

        Ok(HandoffReceipt {
            results_path,
            payload_path: Some(task_path),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::changeset::{Change, ChangeAction, PullRequest};

    fn change_set() -> ChangeSet {
        ChangeSet {
            repo: "quant/strategies".into(),
            branch: "feat/filter".into(),
            plan: "add filter".into(),
            changes: vec![Change {
                file: "strategy.py".into(),
                action: ChangeAction::Modify,
                content: "pass".into(),
            }],
            commands: vec!["make backtest".into()],
            pr: PullRequest {
                title: "Add filter".into(),
                body: String::new(),
            },
        }
    }

    #[tokio::test]
    async fn test_writes_payload_and_clears_stale_results() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("results.json"), "{}").unwrap();

        let executor = FileHandoff::new("handoff/task.json", "results.json");
        let run_id = Uuid::new_v4();
        let context = HandoffContext {
            run_id: &run_id,
            thread_id: "eth",
            iteration: 1,
            working_dir: dir.path(),
        };

        let receipt = executor.handoff(&change_set(), &context).await.unwrap();

        assert_eq!(receipt.results_path, dir.path().join("results.json"));
        assert!(!receipt.results_path.exists());

        let payload: serde_json::Value = serde_json::from_str(
            &std::fs::read_to_string(dir.path().join("handoff/task.json")).unwrap(),
        )
        .unwrap();
        assert_eq!(payload["thread_id"], "eth");
        assert_eq!(payload["iteration"], 1);
        assert_eq!(payload["branch"], "feat/filter");
        assert_eq!(payload["changes"][0]["action"], "modify");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_backtest_command_writes_results() {
        let dir = tempfile::tempdir().unwrap();
        let executor = FileHandoff::new("task.json", "results.json").with_backtest_command(Some(
            r#"echo '{"winrate": 0.7}' > "$VIBELOOP_RESULTS_PATH""#.to_string(),
        ));
        let run_id = Uuid::new_v4();
        let context = HandoffContext {
            run_id: &run_id,
            thread_id: "eth",
            iteration: 0,
            working_dir: dir.path(),
        };

        let receipt = executor.handoff(&change_set(), &context).await.unwrap();
        let content = std::fs::read_to_string(receipt.results_path).unwrap();
        assert!(content.contains("0.7"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_failing_backtest_command_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let executor = FileHandoff::new("task.json", "results.json")
            .with_backtest_command(Some("echo broken >&2; exit 4".to_string()));
        let run_id = Uuid::new_v4();
        let context = HandoffContext {
            run_id: &run_id,
            thread_id: "eth",
            iteration: 0,
            working_dir: dir.path(),
        };

        match executor.handoff(&change_set(), &context).await.unwrap_err() {
            ExecutorError::CommandFailed {
                exit_code, stderr, ..
            } => {
                assert_eq!(exit_code, 4);
                assert_eq!(stderr, "broken");
            }
            other => panic!("unexpected error: {}", other),
        }
    }
}
