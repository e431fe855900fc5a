use colored::Colorize;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// Which agent produced a line of output
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentRole {
    Planner,
    Generator,
}

/// Type of output stream
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StreamType {
    Stdout,
    Stderr,
}

/// Structured log events for the plan/generate/handoff/gate loop.
///
/// `iteration` is the retry count at the time of the event (0 for the first
/// attempt).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum LogEvent {
    RunStarted {
        run_id: String,
        thread_id: String,
        task: String,
        max_iterations: usize,
    },
    PlanStarted,
    PlanCompleted {
        plan_lines: usize,
        duration_secs: f64,
    },
    GenerateStarted {
        iteration: usize,
        with_feedback: bool,
    },
    GenerateCompleted {
        iteration: usize,
        files: usize,
        duration_secs: f64,
    },
    ValidationFailed {
        iteration: usize,
        error: String,
    },
    HandoffCompleted {
        iteration: usize,
        artifact: PathBuf,
    },
    HandoffSkipped {
        iteration: usize,
        reason: String,
    },
    GateEvaluated {
        iteration: usize,
        passed: bool,
        violations: Vec<String>,
    },
    RetryScheduled {
        next_iteration: usize,
        max_iterations: usize,
    },
    /// Streaming output line from an agent
    AgentStreamLine {
        iteration: usize,
        role: AgentRole,
        stream: StreamType,
        line: String,
    },
    RunCompleted {
        passed: bool,
        iterations: usize,
        duration_secs: f64,
    },
    MaxIterationsReached {
        iterations: usize,
    },
    ErrorEncountered {
        stage: String,
        error: String,
    },
}

impl LogEvent {
    fn with_timestamp(&self) -> serde_json::Value {
        let mut value = serde_json::to_value(self).unwrap_or_default();
        if let Some(obj) = value.as_object_mut() {
            obj.insert(
                "timestamp".to_string(),
                serde_json::Value::String(chrono::Utc::now().to_rfc3339()),
            );
        }
        value
    }
}

/// Console output format
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    /// Human-readable format with colors and visual structure
    #[default]
    Pretty,
    /// JSON lines format for machine consumption
    Json,
    /// Compact single-line format
    Compact,
}

impl std::str::FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pretty" => Ok(LogFormat::Pretty),
            "json" => Ok(LogFormat::Json),
            "compact" => Ok(LogFormat::Compact),
            _ => Err(format!("Unknown log format: {}", s)),
        }
    }
}

/// Logger for loop events - console output plus optional JSON file
pub struct Logger {
    format: LogFormat,
    file_writer: Option<Mutex<File>>,
    quiet: bool,
}

impl Logger {
    pub fn new(format: LogFormat) -> Self {
        Self {
            format,
            file_writer: None,
            quiet: false,
        }
    }

    /// A logger that prints nothing to the console (used by tests and
    /// `--json-output` callers that only want the file log)
    pub fn quiet() -> Self {
        Self {
            format: LogFormat::Compact,
            file_writer: None,
            quiet: true,
        }
    }

    /// Create a logger with file output in addition to console
    pub fn with_file(format: LogFormat, log_path: &Path) -> std::io::Result<Self> {
        if let Some(parent) = log_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(log_path)?;

        Ok(Self {
            format,
            file_writer: Some(Mutex::new(file)),
            quiet: false,
        })
    }

    pub fn log(&self, event: &LogEvent) {
        // File output is always JSON
        if let Some(ref writer) = self.file_writer {
            if let Ok(mut file) = writer.lock() {
                let _ = writeln!(file, "{}", event.with_timestamp());
            }
        }

        if self.quiet {
            return;
        }

        match self.format {
            LogFormat::Json => self.log_json(event),
            LogFormat::Pretty => self.log_pretty(event),
            LogFormat::Compact => self.log_compact(event),
        }
    }

    fn log_json(&self, event: &LogEvent) {
        if let Ok(json) = serde_json::to_string(event) {
            let _ = writeln!(std::io::stderr(), "{}", json);
        }
    }

    fn log_pretty(&self, event: &LogEvent) {
        let mut stderr = std::io::stderr();
        let rule = "─".repeat(69);
        match event {
            LogEvent::RunStarted {
                thread_id,
                task,
                max_iterations,
                ..
            } => {
                let _ = writeln!(stderr);
                let _ = writeln!(stderr, "{}", format!("╭{}╮", rule).bright_blue());
                let _ = writeln!(
                    stderr,
                    "{}  {}{}",
                    "│".bright_blue(),
                    "vibeloop".bold().bright_white(),
                    " ".repeat(59) + &"│".bright_blue().to_string()
                );
                let _ = writeln!(
                    stderr,
                    "{}  {} {}",
                    "│".bright_blue(),
                    "Task:".dimmed(),
                    Self::truncate_with_padding(task, 61, 68).dimmed()
                );
                let _ = writeln!(
                    stderr,
                    "{}  {} {}",
                    "│".bright_blue(),
                    "Thread:".dimmed(),
                    Self::truncate_with_padding(
                        &format!("{} (max {} retries)", thread_id, max_iterations),
                        59,
                        66
                    )
                    .dimmed()
                );
                let _ = writeln!(stderr, "{}", format!("╰{}╯", rule).bright_blue());
                let _ = writeln!(stderr);
            }
            LogEvent::PlanStarted => {
                let _ = writeln!(
                    stderr,
                    "  {} {}",
                    "▶".bright_cyan(),
                    "PLAN".bright_cyan().bold()
                );
            }
            LogEvent::PlanCompleted {
                plan_lines,
                duration_secs,
            } => {
                let _ = writeln!(
                    stderr,
                    "    {} {} lines ({:.1}s)",
                    "✓".bright_green(),
                    plan_lines,
                    duration_secs
                );
                let _ = writeln!(stderr);
            }
            LogEvent::GenerateStarted {
                iteration,
                with_feedback,
            } => {
                let iter_text = format!("─ Attempt {} ", iteration + 1);
                let padding = "─".repeat(67usize.saturating_sub(iter_text.chars().count()));
                let _ = writeln!(
                    stderr,
                    "{}{}{}",
                    "┌".bright_blue(),
                    iter_text.bright_blue().bold(),
                    padding.bright_blue()
                );
                let _ = writeln!(stderr);
                let label = if *with_feedback {
                    "GENERATE (with gate feedback)"
                } else {
                    "GENERATE"
                };
                let _ = writeln!(
                    stderr,
                    "  {} {}",
                    "▶".bright_cyan(),
                    label.bright_cyan().bold()
                );
            }
            LogEvent::GenerateCompleted {
                files,
                duration_secs,
                ..
            } => {
                let _ = writeln!(
                    stderr,
                    "    {} {} {} ({:.1}s)",
                    "✓".bright_green(),
                    files,
                    if *files == 1 { "change" } else { "changes" },
                    duration_secs
                );
            }
            LogEvent::ValidationFailed { error, .. } => {
                let _ = writeln!(
                    stderr,
                    "    {} Invalid change set: {}",
                    "✗".bright_red(),
                    error.bright_red()
                );
            }
            LogEvent::HandoffCompleted { artifact, .. } => {
                let _ = writeln!(
                    stderr,
                    "  {} {} {}",
                    "▶".bright_magenta(),
                    "HANDOFF".bright_magenta().bold(),
                    format!("→ {}", artifact.display()).dimmed()
                );
            }
            LogEvent::HandoffSkipped { reason, .. } => {
                let _ = writeln!(
                    stderr,
                    "  {} {} {}",
                    "▶".bright_magenta(),
                    "HANDOFF".bright_magenta().bold(),
                    format!("skipped: {}", reason).dimmed()
                );
            }
            LogEvent::GateEvaluated {
                passed, violations, ..
            } => {
                if *passed {
                    let _ = writeln!(stderr, "    {}", "✓ Gate passed".bright_green());
                } else {
                    let _ = writeln!(stderr, "    {}", "✗ Gate failed".bright_red());
                    for v in violations {
                        let _ = writeln!(stderr, "      {} {}", "-".dimmed(), v.yellow());
                    }
                }
                let _ = writeln!(stderr);
                let _ = writeln!(stderr, "{}", format!("└{}┘", rule).bright_blue());
                let _ = writeln!(stderr);
            }
            LogEvent::RetryScheduled {
                next_iteration,
                max_iterations,
            } => {
                let _ = writeln!(
                    stderr,
                    "{} Retrying with gate feedback ({}/{})",
                    "↻".bright_yellow(),
                    next_iteration,
                    max_iterations
                );
                let _ = writeln!(stderr);
            }
            LogEvent::AgentStreamLine { line, stream, .. } => {
                let prefix = "    │".dimmed();
                let styled_line = match stream {
                    StreamType::Stdout => line.normal(),
                    StreamType::Stderr => line.dimmed(),
                };
                let _ = writeln!(stderr, "{} {}", prefix, styled_line);
            }
            LogEvent::RunCompleted { .. } => {
                // Printed by the caller together with the final outcome
            }
            LogEvent::MaxIterationsReached { iterations } => {
                let _ = writeln!(
                    stderr,
                    "{} Maximum retries reached ({})",
                    "⚠".bright_yellow(),
                    iterations
                );
            }
            LogEvent::ErrorEncountered { stage, error } => {
                let _ = writeln!(stderr);
                let _ = writeln!(
                    stderr,
                    "{} Error in {}: {}",
                    "✗".bright_red(),
                    stage,
                    error.bright_red()
                );
            }
        }
    }

    fn log_compact(&self, event: &LogEvent) {
        let mut stderr = std::io::stderr();
        let timestamp = chrono::Utc::now().format("%H:%M:%S");
        let msg = match event {
            LogEvent::RunStarted { thread_id, .. } => {
                format!("[{}] run:start {}", timestamp, thread_id)
            }
            LogEvent::PlanStarted => format!("[{}] plan:start", timestamp),
            LogEvent::PlanCompleted { duration_secs, .. } => {
                format!("[{}] plan:done {:.1}s", timestamp, duration_secs)
            }
            LogEvent::GenerateStarted { iteration, .. } => {
                format!("[{}] generate:start:{}", timestamp, iteration + 1)
            }
            LogEvent::GenerateCompleted {
                iteration,
                files,
                duration_secs,
            } => format!(
                "[{}] generate:done:{} files={} {:.1}s",
                timestamp,
                iteration + 1,
                files,
                duration_secs
            ),
            LogEvent::ValidationFailed { iteration, error } => {
                format!("[{}] generate:invalid:{} {}", timestamp, iteration + 1, error)
            }
            LogEvent::HandoffCompleted {
                iteration,
                artifact,
            } => format!(
                "[{}] handoff:done:{} {}",
                timestamp,
                iteration + 1,
                artifact.display()
            ),
            LogEvent::HandoffSkipped { iteration, reason } => {
                format!("[{}] handoff:skip:{} {}", timestamp, iteration + 1, reason)
            }
            LogEvent::GateEvaluated {
                iteration,
                passed,
                violations,
            } => format!(
                "[{}] gate:{}:{} violations={}",
                timestamp,
                iteration + 1,
                if *passed { "pass" } else { "fail" },
                violations.len()
            ),
            LogEvent::RetryScheduled {
                next_iteration,
                max_iterations,
            } => format!("[{}] retry:{}/{}", timestamp, next_iteration, max_iterations),
            LogEvent::AgentStreamLine { role, line, .. } => {
                let role_str = match role {
                    AgentRole::Planner => "P",
                    AgentRole::Generator => "G",
                };
                format!("[{}] {}:{}", timestamp, role_str, line)
            }
            LogEvent::RunCompleted {
                passed,
                iterations,
                duration_secs,
            } => format!(
                "[{}] run:{}:{} {:.1}s",
                timestamp,
                if *passed { "pass" } else { "fail" },
                iterations,
                duration_secs
            ),
            LogEvent::MaxIterationsReached { iterations } => {
                format!("[{}] run:limit:{}", timestamp, iterations)
            }
            LogEvent::ErrorEncountered { stage, error } => {
                format!("[{}] error:{}:{}", timestamp, stage, error)
            }
        };
        let _ = writeln!(stderr, "{}", msg);
    }

    /// Truncate a string and pad to exact width
    fn truncate_with_padding(s: &str, max_len: usize, total_width: usize) -> String {
        let truncated = if s.chars().count() > max_len {
            let head: String = s.chars().take(max_len.saturating_sub(3)).collect();
            format!("{}...", head)
        } else {
            s.to_string()
        };

        let padding_needed = total_width.saturating_sub(truncated.chars().count() + 1);
        format!("{}{}│", truncated, " ".repeat(padding_needed))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_log_is_timestamped_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("logs/events.jsonl");
        let logger = Logger::with_file(LogFormat::Compact, &path).unwrap();

        logger.log(&LogEvent::GateEvaluated {
            iteration: 1,
            passed: false,
            violations: vec!["winrate: observed 0.5 < required >= 0.6".into()],
        });

        let content = std::fs::read_to_string(&path).unwrap();
        let value: serde_json::Value = serde_json::from_str(content.trim()).unwrap();
        assert_eq!(value["event"], "gate_evaluated");
        assert_eq!(value["passed"], false);
        assert!(value["timestamp"].is_string());
    }

    #[test]
    fn test_truncate_with_padding_is_char_safe() {
        let padded = Logger::truncate_with_padding("ä".repeat(80).as_str(), 10, 20);
        assert!(padded.starts_with("äääääää..."));
        assert_eq!(padded.chars().count(), 20);
    }

    #[test]
    fn test_log_format_from_str() {
        assert_eq!("JSON".parse::<LogFormat>().unwrap(), LogFormat::Json);
        assert!("yaml".parse::<LogFormat>().is_err());
    }
}
