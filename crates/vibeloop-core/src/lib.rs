//! # vibeloop-core
//!
//! The plan → generate → handoff → gate control loop.
//!
//! A [`ControlLoop`] asks a planner [`Agent`](vibeloop_agent::Agent) for a
//! plan, asks a generator agent for a [`ChangeSet`], hands it to an
//! [`Executor`] and evaluates the resulting backtest with the acceptance
//! gate. A failing gate feeds its correction feedback into the next
//! generation attempt, up to `max_iterations` retries.

mod changeset;
mod config;
mod executor;
mod loop_runner;
mod outcome;
pub mod prompts;
mod state;

pub use changeset::{Change, ChangeAction, ChangeSet, ChangeSetError, PullRequest};
pub use config::{
    LoopConfig, DEFAULT_CRITERIA_PATH, DEFAULT_MAX_ITERATIONS, DEFAULT_RESULTS_PATH,
};
pub use executor::{Executor, ExecutorError, FileHandoff, HandoffContext, HandoffReceipt};
pub use loop_runner::{ControlLoop, Stage};
pub use outcome::RunOutcome;
pub use state::{default_thread_id, AttemptRecord, RunState, StageError};
