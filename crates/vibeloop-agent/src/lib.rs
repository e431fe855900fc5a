//! # vibeloop-agent
//!
//! Text-completion agents used by the planner and generator stages.
//!
//! Agents are external CLIs (Claude Code, OpenCode, Cursor) driven as
//! subprocesses. Output is streamed line by line through an optional
//! [`OutputCallback`] and captured into an [`AgentOutput`].

mod cli;
mod output;
mod spawner;
mod traits;

pub use cli::CliAgent;
pub use output::{AgentOutput, TokenUsage};
pub use spawner::{OutputCallback, OutputType, ProcessSpawner};
pub use traits::{Agent, AgentConfig, AgentError, AgentType};

/// Create an agent by type
pub fn create_agent(agent_type: AgentType) -> Box<dyn Agent> {
    Box::new(CliAgent::new(agent_type))
}
