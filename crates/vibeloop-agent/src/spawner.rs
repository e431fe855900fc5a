use std::path::Path;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Instant;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{ChildStderr, ChildStdout, Command};
use tracing::{debug, trace, warn};

use crate::{AgentConfig, AgentError, AgentOutput};

/// Which stream a line of output came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputType {
    Stdout,
    Stderr,
}

/// Receives each output line as it is produced
pub type OutputCallback = Arc<dyn Fn(&str, OutputType) + Send + Sync>;

/// Utility for spawning agent and helper processes
pub struct ProcessSpawner;

impl ProcessSpawner {
    /// Spawn a process and capture its output
    pub async fn spawn(
        binary: &Path,
        args: &[&str],
        config: &AgentConfig,
    ) -> Result<AgentOutput, AgentError> {
        Self::spawn_with_callback(binary, args, config, None).await
    }

    /// Spawn a process, streaming each line to `on_output` while capturing it.
    ///
    /// If `config.timeout` elapses the process is killed and
    /// [`AgentError::Timeout`] is returned.
    pub async fn spawn_with_callback(
        binary: &Path,
        args: &[&str],
        config: &AgentConfig,
        on_output: Option<OutputCallback>,
    ) -> Result<AgentOutput, AgentError> {
        let start = Instant::now();

        debug!(
            binary = %binary.display(),
            args = args.len(),
            working_dir = %config.working_dir.display(),
            "Spawning process"
        );

        let mut cmd = Command::new(binary);
        cmd.args(args)
            .current_dir(&config.working_dir)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .stdin(Stdio::null())
            .kill_on_drop(true);

        for (key, value) in &config.env_vars {
            cmd.env(key, value);
        }

        let mut child = cmd.spawn()?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| AgentError::ExecutionFailed("stdout not captured".into()))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| AgentError::ExecutionFailed("stderr not captured".into()))?;

        // The deadline covers process exit too, since a child can close its
        // streams and keep running.
        let run = async {
            let captured = Self::capture(stdout, stderr, on_output).await?;
            let status = child.wait().await?;
            Ok::<_, AgentError>((captured, status))
        };
        let outcome = match config.timeout {
            Some(limit) => tokio::time::timeout(limit, run).await.ok(),
            None => Some(run.await),
        };
        let ((stdout, stderr), status) = match outcome {
            Some(result) => result?,
            None => {
                let limit = config.timeout.unwrap_or_default();
                warn!(timeout_secs = limit.as_secs_f64(), "Process timed out, killing");
                let _ = child.kill().await;
                return Err(AgentError::Timeout(limit));
            }
        };

        let duration = start.elapsed();
        let exit_code = status.code().unwrap_or(-1);

        debug!(
            exit_code,
            duration_ms = duration.as_millis(),
            "Process completed"
        );

        Ok(AgentOutput::new(stdout, stderr, exit_code, duration))
    }

    /// Read both streams until each is closed
    async fn capture(
        stdout: ChildStdout,
        stderr: ChildStderr,
        on_output: Option<OutputCallback>,
    ) -> Result<(String, String), AgentError> {
        let mut stdout_reader = BufReader::new(stdout).lines();
        let mut stderr_reader = BufReader::new(stderr).lines();

        let mut out = String::new();
        let mut err = String::new();
        let mut out_done = false;
        let mut err_done = false;

        while !(out_done && err_done) {
            tokio::select! {
                line = stdout_reader.next_line(), if !out_done => {
                    match line.map_err(|e| read_error("stdout", e))? {
                        Some(line) => append(&mut out, &line, OutputType::Stdout, &on_output),
                        None => out_done = true,
                    }
                }
                line = stderr_reader.next_line(), if !err_done => {
                    match line.map_err(|e| read_error("stderr", e))? {
                        Some(line) => append(&mut err, &line, OutputType::Stderr, &on_output),
                        None => err_done = true,
                    }
                }
            }
        }

        Ok((out, err))
    }
}

fn append(buf: &mut String, line: &str, stream: OutputType, on_output: &Option<OutputCallback>) {
    trace!(?stream, line = %line, "output");
    if let Some(cb) = on_output {
        cb(line, stream);
    }
    if !buf.is_empty() {
        buf.push('\n');
    }
    buf.push_str(line);
}

fn read_error(stream: &str, e: std::io::Error) -> AgentError {
    AgentError::ExecutionFailed(format!("Failed to read {}: {}", stream, e))
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use std::time::Duration;

    fn config() -> AgentConfig {
        AgentConfig::new(std::env::temp_dir())
    }

    #[tokio::test]
    async fn test_captures_both_streams() {
        let output = ProcessSpawner::spawn(
            Path::new("sh"),
            &["-c", "echo one; echo two; echo oops 1>&2; exit 3"],
            &config(),
        )
        .await
        .unwrap();

        assert_eq!(output.stdout, "one\ntwo");
        assert_eq!(output.stderr, "oops");
        assert_eq!(output.exit_code, 3);
        assert!(!output.success());
    }

    #[tokio::test]
    async fn test_streams_lines_to_callback() {
        let seen: Arc<Mutex<Vec<(String, OutputType)>>> = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let cb: OutputCallback = Arc::new(move |line, stream| {
            sink.lock().unwrap().push((line.to_string(), stream));
        });

        ProcessSpawner::spawn_with_callback(Path::new("sh"), &["-c", "echo hi"], &config(), Some(cb))
            .await
            .unwrap();

        assert_eq!(
            seen.lock().unwrap().as_slice(),
            &[("hi".to_string(), OutputType::Stdout)]
        );
    }

    #[tokio::test]
    async fn test_timeout_kills_process() {
        let config = config().with_timeout(Duration::from_millis(100));
        let err = ProcessSpawner::spawn(Path::new("sh"), &["-c", "sleep 5"], &config)
            .await
            .unwrap_err();
        assert!(matches!(err, AgentError::Timeout(_)));
    }

    #[tokio::test]
    async fn test_timeout_covers_process_with_closed_streams() {
        let config = config().with_timeout(Duration::from_millis(200));
        let start = Instant::now();
        let err = ProcessSpawner::spawn(
            Path::new("sh"),
            &["-c", "exec >/dev/null 2>&1; sleep 3"],
            &config,
        )
        .await
        .unwrap_err();
        assert!(matches!(err, AgentError::Timeout(_)));
        assert!(start.elapsed() < Duration::from_secs(2));
    }
}
