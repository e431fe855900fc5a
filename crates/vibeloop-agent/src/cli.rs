use async_trait::async_trait;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tokio::process::Command;
use tracing::debug;

use crate::{
    Agent, AgentConfig, AgentError, AgentOutput, AgentType, OutputCallback, ProcessSpawner,
    TokenUsage,
};

/// Default model for the Cursor CLI when none is configured
const CURSOR_DEFAULT_MODEL: &str = "sonnet-4";

/// Summary object printed by `claude --print --output-format json`
#[derive(Debug, Deserialize)]
struct ClaudeSummary {
    result: String,
    #[serde(default)]
    usage: Option<ClaudeUsage>,
}

#[derive(Debug, Default, Deserialize)]
struct ClaudeUsage {
    #[serde(default)]
    input_tokens: u64,
    #[serde(default)]
    cache_creation_input_tokens: u64,
    #[serde(default)]
    cache_read_input_tokens: u64,
    #[serde(default)]
    output_tokens: u64,
}

impl From<ClaudeUsage> for TokenUsage {
    fn from(usage: ClaudeUsage) -> Self {
        TokenUsage::new(
            usage.input_tokens + usage.cache_creation_input_tokens + usage.cache_read_input_tokens,
            usage.output_tokens,
        )
    }
}

/// Replace a Claude Code JSON summary with its result text and reported usage.
/// Output that is not a summary is returned unchanged.
fn unwrap_claude_summary(mut output: AgentOutput) -> AgentOutput {
    match serde_json::from_str::<ClaudeSummary>(output.stdout.trim()) {
        Ok(summary) => {
            output.stdout = summary.result;
            match summary.usage {
                Some(usage) => output.with_usage(usage.into()),
                None => output,
            }
        }
        Err(e) => {
            debug!(error = %e, "Claude output is not a JSON summary, keeping raw text");
            output
        }
    }
}

/// An agent backed by a coding-agent CLI run in non-interactive mode
pub struct CliAgent {
    agent_type: AgentType,
    binary_path: PathBuf,
}

impl CliAgent {
    pub fn new(agent_type: AgentType) -> Self {
        Self {
            agent_type,
            binary_path: PathBuf::from(agent_type.default_binary()),
        }
    }

    /// Arguments for a one-shot, print-only invocation
    fn build_args<'a>(&self, prompt: &'a str, model: Option<&'a str>) -> Vec<&'a str> {
        let mut args = Vec::new();
        match self.agent_type {
            AgentType::ClaudeCode => {
                args.extend(["--print", "--output-format", "json"]);
                if let Some(model) = model {
                    args.extend(["--model", model]);
                }
                // `--` keeps prompts starting with '-' from being read as flags
                args.extend(["--", prompt]);
            }
            AgentType::OpenCode => {
                args.push("run");
                if let Some(model) = model {
                    args.extend(["--model", model]);
                }
                args.extend(["--prompt", prompt]);
            }
            AgentType::Cursor => {
                args.extend(["agent", "-p", prompt]);
                args.extend(["--model", model.unwrap_or(CURSOR_DEFAULT_MODEL)]);
                args.extend(["--output-format", "text"]);
            }
        }
        args
    }

    fn availability_args(&self) -> &'static [&'static str] {
        match self.agent_type {
            AgentType::Cursor => &["agent", "--help"],
            AgentType::ClaudeCode | AgentType::OpenCode => &["--version"],
        }
    }
}

#[async_trait]
impl Agent for CliAgent {
    fn name(&self) -> &str {
        self.agent_type.display_name()
    }

    fn agent_type(&self) -> AgentType {
        self.agent_type
    }

    fn binary_path(&self) -> &Path {
        &self.binary_path
    }

    async fn is_available(&self) -> bool {
        Command::new(&self.binary_path)
            .args(self.availability_args())
            .output()
            .await
            .map(|o| o.status.success())
            .unwrap_or(false)
    }

    async fn execute_with_callback(
        &self,
        prompt: &str,
        config: &AgentConfig,
        on_output: Option<OutputCallback>,
    ) -> Result<AgentOutput, AgentError> {
        debug!(
            agent = self.name(),
            prompt_len = prompt.len(),
            "Executing agent"
        );

        let args = self.build_args(prompt, config.model.as_deref());
        let output =
            ProcessSpawner::spawn_with_callback(&self.binary_path, &args, config, on_output)
                .await?;

        Ok(match self.agent_type {
            AgentType::ClaudeCode => unwrap_claude_summary(output),
            AgentType::OpenCode | AgentType::Cursor => output,
        })
    }
}
