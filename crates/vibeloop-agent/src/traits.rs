use async_trait::async_trait;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

use crate::{AgentOutput, OutputCallback};

/// Errors that can occur while running an agent
#[derive(Error, Debug)]
pub enum AgentError {
    #[error("Failed to spawn agent process: {0}")]
    SpawnFailed(#[from] std::io::Error),

    #[error("Agent execution timed out after {0:?}")]
    Timeout(Duration),

    #[error("Agent configuration error: {0}")]
    ConfigError(String),

    #[error("Agent execution failed: {0}")]
    ExecutionFailed(String),
}

/// Configuration for a single agent invocation
#[derive(Debug, Clone)]
pub struct AgentConfig {
    /// Working directory for the agent process
    pub working_dir: PathBuf,
    /// Kill the process after this long (None = no limit)
    pub timeout: Option<Duration>,
    /// Additional environment variables
    pub env_vars: HashMap<String, String>,
    /// Model to request, if the agent supports selecting one
    pub model: Option<String>,
}

impl AgentConfig {
    pub fn new(working_dir: PathBuf) -> Self {
        Self {
            working_dir,
            timeout: None,
            env_vars: HashMap::new(),
            model: None,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn with_model(mut self, model: Option<String>) -> Self {
        self.model = model;
        self
    }

    pub fn with_env(mut self, key: String, value: String) -> Self {
        self.env_vars.insert(key, value);
        self
    }
}

/// Supported agent CLIs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AgentType {
    ClaudeCode,
    OpenCode,
    Cursor,
}

impl AgentType {
    /// Binary name looked up on PATH
    pub fn default_binary(&self) -> &'static str {
        match self {
            AgentType::ClaudeCode => "claude",
            AgentType::OpenCode => "opencode",
            AgentType::Cursor => "cursor",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            AgentType::ClaudeCode => "Claude Code",
            AgentType::OpenCode => "OpenCode",
            AgentType::Cursor => "Cursor",
        }
    }
}

impl std::fmt::Display for AgentType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AgentType::ClaudeCode => write!(f, "claude-code"),
            AgentType::OpenCode => write!(f, "opencode"),
            AgentType::Cursor => write!(f, "cursor"),
        }
    }
}

impl std::str::FromStr for AgentType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "claude" | "claude-code" | "claudecode" => Ok(AgentType::ClaudeCode),
            "opencode" | "open-code" => Ok(AgentType::OpenCode),
            "cursor" => Ok(AgentType::Cursor),
            _ => Err(format!("Unknown agent type: {}", s)),
        }
    }
}

/// A text-completion collaborator: takes a prompt, returns text
#[async_trait]
pub trait Agent: Send + Sync {
    /// Human-readable name (e.g. "Claude Code")
    fn name(&self) -> &str;

    fn agent_type(&self) -> AgentType;

    /// Run the agent on a prompt
    async fn execute(&self, prompt: &str, config: &AgentConfig) -> Result<AgentOutput, AgentError> {
        self.execute_with_callback(prompt, config, None).await
    }

    /// Run the agent on a prompt, streaming output lines to `on_output`
    async fn execute_with_callback(
        &self,
        prompt: &str,
        config: &AgentConfig,
        on_output: Option<OutputCallback>,
    ) -> Result<AgentOutput, AgentError>;

    /// Check whether the agent CLI can be invoked
    async fn is_available(&self) -> bool;

    fn binary_path(&self) -> &Path;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_agent_type_round_trips_through_str() {
        for t in [AgentType::ClaudeCode, AgentType::OpenCode, AgentType::Cursor] {
            assert_eq!(t.to_string().parse::<AgentType>().unwrap(), t);
        }
        assert_eq!("Claude".parse::<AgentType>().unwrap(), AgentType::ClaudeCode);
        assert!("gpt".parse::<AgentType>().is_err());
    }
}
