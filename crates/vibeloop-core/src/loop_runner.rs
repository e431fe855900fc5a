use chrono::Utc;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use vibeloop_agent::{Agent, AgentConfig, AgentOutput, OutputCallback, OutputType, TokenUsage};
use vibeloop_gate::{Gate, Verdict};
use vibeloop_logging::{
    AgentRole, JournalLine, LogEvent, Logger, MetricRecord, MetricStatus, MetricsSink, RunJournal,
    StreamType,
};

use crate::executor::{Executor, HandoffContext};
use crate::prompts::{build_generation_prompt, build_plan_prompt};
use crate::{AttemptRecord, ChangeSet, LoopConfig, RunOutcome, RunState, StageError};

/// Where the loop goes next
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Plan,
    Generate,
    Handoff,
    Gate,
    Done,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Plan => "plan",
            Stage::Generate => "generate",
            Stage::Handoff => "handoff",
            Stage::Gate => "gate",
            Stage::Done => "done",
        }
    }
}

/// Drives one run through plan, generate, handoff and gate, retrying
/// generation with the gate's correction feedback until the gate passes or
/// `max_iterations` retries are used up.
pub struct ControlLoop<'a> {
    planner: &'a dyn Agent,
    generator: &'a dyn Agent,
    executor: &'a dyn Executor,
    config: LoopConfig,
    logger: Arc<Logger>,
    metrics: Option<MetricsSink>,
    journal: Option<RunJournal>,
}

impl<'a> ControlLoop<'a> {
    pub fn new(
        planner: &'a dyn Agent,
        generator: &'a dyn Agent,
        executor: &'a dyn Executor,
        config: LoopConfig,
        logger: Arc<Logger>,
    ) -> Self {
        Self {
            planner,
            generator,
            executor,
            config,
            logger,
            metrics: None,
            journal: None,
        }
    }

    pub fn with_metrics(mut self, metrics: MetricsSink) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn with_journal(mut self, journal: RunJournal) -> Self {
        self.journal = Some(journal);
        self
    }

    pub fn config(&self) -> &LoopConfig {
        &self.config
    }

    /// Create an output callback for streaming agent output
    fn create_output_callback(&self, iteration: usize, role: AgentRole) -> OutputCallback {
        let logger = self.logger.clone();
        Arc::new(move |line: &str, output_type: OutputType| {
            let stream = match output_type {
                OutputType::Stdout => StreamType::Stdout,
                OutputType::Stderr => StreamType::Stderr,
            };
            logger.log(&LogEvent::AgentStreamLine {
                iteration,
                role,
                stream,
                line: line.to_string(),
            });
        })
    }

    fn agent_config(&self, model: Option<&String>) -> AgentConfig {
        let mut config =
            AgentConfig::new(self.config.working_dir.clone()).with_model(model.cloned());
        if let Some(timeout) = self.config.agent_timeout {
            config = config.with_timeout(timeout);
        }
        config
    }

    fn record_metric(&self, record: MetricRecord) {
        if let Some(ref sink) = self.metrics {
            if let Err(e) = sink.record(&record) {
                warn!(error = %e, path = %sink.path().display(), "Failed to write metrics row");
            }
        }
    }

    fn record_agent_metric(
        &self,
        node: &str,
        status: MetricStatus,
        elapsed: Duration,
        model: Option<&String>,
        prompt: &str,
        output: Option<&AgentOutput>,
    ) {
        let completion = output.map(|o| o.stdout.as_str()).unwrap_or_default();
        let (usage, estimated) = match output.and_then(|o| o.usage) {
            Some(usage) => (usage, false),
            None => (TokenUsage::estimate(prompt, completion), true),
        };
        let cost_usd = self.config.costs.cost(
            model.map(String::as_str),
            usage.input_tokens,
            usage.output_tokens,
        );

        self.record_metric(MetricRecord {
            node_name: node.to_string(),
            status,
            latency_ms: elapsed.as_secs_f64() * 1000.0,
            input_tokens: usage.input_tokens,
            output_tokens: usage.output_tokens,
            cost_usd,
            estimated,
        });
    }

    fn journal(&self, line: JournalLine) {
        if let Some(ref journal) = self.journal {
            journal.write(&line);
        }
    }

    /// Run the loop to completion
    pub async fn run(&self, state: RunState) -> RunOutcome {
        let started = Instant::now();

        self.logger.log(&LogEvent::RunStarted {
            run_id: state.run_id.to_string(),
            thread_id: state.thread_id.clone(),
            task: state.task.clone(),
            max_iterations: self.config.max_iterations,
        });
        self.journal(JournalLine::RunStart {
            timestamp: Utc::now(),
            run_id: state.run_id.to_string(),
            thread_id: state.thread_id.clone(),
            task: state.task.clone(),
            planner_agent: self.planner.name().to_string(),
            generator_agent: self.generator.name().to_string(),
            max_iterations: self.config.max_iterations,
        });

        let mut state = state;
        let mut stage = Stage::Plan;
        while stage != Stage::Done {
            debug!(stage = stage.as_str(), iteration = state.iteration_count(), "Entering stage");
            (state, stage) = match stage {
                Stage::Plan => self.plan(state).await,
                Stage::Generate => self.generate(state).await,
                Stage::Handoff => self.handoff(state).await,
                Stage::Gate => self.gate(state),
                Stage::Done => (state, Stage::Done),
            };
        }

        let duration = started.elapsed();
        let outcome = RunOutcome::from_state(state, duration);

        self.logger.log(&LogEvent::RunCompleted {
            passed: outcome.is_success(),
            iterations: outcome.attempts(),
            duration_secs: duration.as_secs_f64(),
        });
        self.journal(JournalLine::RunEnd {
            timestamp: Utc::now(),
            outcome: outcome.status().to_string(),
            iterations: outcome.attempts(),
            error: outcome.error().map(|e| e.to_string()),
            duration_secs: duration.as_secs_f64(),
        });

        info!(
            status = outcome.status(),
            attempts = outcome.attempts(),
            "Run finished"
        );
        outcome
    }

    async fn plan(&self, mut state: RunState) -> (RunState, Stage) {
        self.logger.log(&LogEvent::PlanStarted);

        let prompt = build_plan_prompt(&state.task);
        let model = self.config.planner_model.as_ref();
        let config = self.agent_config(model);
        let callback = self.create_output_callback(0, AgentRole::Planner);

        let started = Instant::now();
        let result = self
            .planner
            .execute_with_callback(&prompt, &config, Some(callback))
            .await;
        let elapsed = started.elapsed();

        let plan = match &result {
            Ok(output) if !output.success() => Err(format!(
                "{} exited with code {}: {}",
                self.planner.name(),
                output.exit_code,
                output.stderr.trim()
            )),
            Ok(output) if output.stdout.trim().is_empty() => {
                Err(format!("{} returned an empty plan", self.planner.name()))
            }
            Ok(output) => Ok(output.stdout.trim().to_string()),
            Err(e) => Err(e.to_string()),
        };

        let status = if plan.is_ok() {
            MetricStatus::Success
        } else {
            MetricStatus::Failure
        };
        self.record_agent_metric("plan", status, elapsed, model, &prompt, result.as_ref().ok());

        match plan {
            Ok(plan) => {
                self.logger.log(&LogEvent::PlanCompleted {
                    plan_lines: plan.lines().count(),
                    duration_secs: elapsed.as_secs_f64(),
                });
                self.journal(JournalLine::Plan {
                    timestamp: Utc::now(),
                    plan: Some(plan.clone()),
                    error: None,
                });
                state.plan = Some(plan);
                (state, Stage::Generate)
            }
            Err(message) => {
                let error = StageError::Plan(message);
                self.fail_terminally(&mut state, error);
                (state, Stage::Done)
            }
        }
    }

    async fn generate(&self, mut state: RunState) -> (RunState, Stage) {
        let iteration = state.iteration_count();
        state.change_set = None;
        state.artifact_path = None;

        self.logger.log(&LogEvent::GenerateStarted {
            iteration,
            with_feedback: state.correction_feedback.is_some(),
        });

        let prompt = build_generation_prompt(
            &state.task,
            state.plan.as_deref().unwrap_or_default(),
            state.correction_feedback.as_deref(),
        );
        let model = self.config.generator_model.as_ref();
        let config = self.agent_config(model);
        let callback = self.create_output_callback(iteration, AgentRole::Generator);

        let started = Instant::now();
        let result = self
            .generator
            .execute_with_callback(&prompt, &config, Some(callback))
            .await;
        let elapsed = started.elapsed();

        let parsed = match &result {
            Ok(output) if !output.success() => Err(StageError::Generate(format!(
                "{} exited with code {}: {}",
                self.generator.name(),
                output.exit_code,
                output.stderr.trim()
            ))),
            Ok(output) => ChangeSet::from_agent_output(&output.stdout)
                .map_err(|e| StageError::Validation(e.to_string())),
            Err(e) => Err(StageError::Generate(e.to_string())),
        };

        let status = if parsed.is_ok() {
            MetricStatus::Success
        } else {
            MetricStatus::Failure
        };
        self.record_agent_metric(
            "generate",
            status,
            elapsed,
            model,
            &prompt,
            result.as_ref().ok(),
        );

        match parsed {
            Ok(change_set) => {
                self.logger.log(&LogEvent::GenerateCompleted {
                    iteration,
                    files: change_set.files_changed(),
                    duration_secs: elapsed.as_secs_f64(),
                });
                state.change_set = Some(change_set);
            }
            Err(error) => {
                warn!(iteration, error = %error, "Generation produced no usable change set");
                self.logger.log(&LogEvent::ValidationFailed {
                    iteration,
                    error: error.to_string(),
                });
                state.upstream_error = Some(error);
            }
        }

        (state, Stage::Handoff)
    }

    async fn handoff(&self, mut state: RunState) -> (RunState, Stage) {
        let iteration = state.iteration_count();

        if let Some(error) = &state.upstream_error {
            self.skip_handoff(iteration, error.to_string());
            return (state, Stage::Gate);
        }
        let Some(change_set) = state.change_set.as_ref() else {
            self.skip_handoff(iteration, "no change set".to_string());
            return (state, Stage::Gate);
        };

        let context = HandoffContext {
            run_id: &state.run_id,
            thread_id: &state.thread_id,
            iteration,
            working_dir: &self.config.working_dir,
        };

        let started = Instant::now();
        let result = self.executor.handoff(change_set, &context).await;
        let elapsed = started.elapsed().as_secs_f64() * 1000.0;

        match result {
            Ok(receipt) => {
                self.record_metric(MetricRecord::without_tokens(
                    "handoff",
                    MetricStatus::Success,
                    elapsed,
                ));
                self.logger.log(&LogEvent::HandoffCompleted {
                    iteration,
                    artifact: receipt.results_path.clone(),
                });
                state.artifact_path = Some(receipt.results_path);
            }
            Err(e) => {
                self.record_metric(MetricRecord::without_tokens(
                    "handoff",
                    MetricStatus::Failure,
                    elapsed,
                ));
                let error = StageError::Handoff(format!("{}: {}", self.executor.name(), e));
                self.logger.log(&LogEvent::ErrorEncountered {
                    stage: error.stage().to_string(),
                    error: error.to_string(),
                });
                state.upstream_error = Some(error);
            }
        }

        (state, Stage::Gate)
    }

    fn skip_handoff(&self, iteration: usize, reason: String) {
        self.record_metric(MetricRecord::without_tokens(
            "handoff",
            MetricStatus::Skipped,
            0.0,
        ));
        self.logger
            .log(&LogEvent::HandoffSkipped { iteration, reason });
    }

    fn gate(&self, mut state: RunState) -> (RunState, Stage) {
        let iteration = state.iteration_count();
        let started = Instant::now();
        let upstream_error = state.upstream_error.take();

        let verdict = match &upstream_error {
            Some(error) => {
                state.measurement_set = None;
                Verdict::upstream_error(&error.to_string())
            }
            None => {
                let results_path = state
                    .artifact_path
                    .clone()
                    .unwrap_or_else(|| self.config.results_file());
                let gate = Gate::new(self.config.criteria_file(), results_path);
                match gate.evaluate_files() {
                    Ok(run) => {
                        state.measurement_set = run.measurements;
                        run.verdict
                    }
                    Err(e) => {
                        self.record_metric(MetricRecord::without_tokens(
                            "gate",
                            MetricStatus::Failure,
                            started.elapsed().as_secs_f64() * 1000.0,
                        ));
                        self.fail_terminally(&mut state, StageError::Configuration(e.to_string()));
                        return (state, Stage::Done);
                    }
                }
            }
        };

        let status = if verdict.passed() {
            MetricStatus::Success
        } else {
            MetricStatus::Failure
        };
        self.record_metric(MetricRecord::without_tokens(
            "gate",
            status,
            started.elapsed().as_secs_f64() * 1000.0,
        ));

        let messages: Vec<String> = verdict
            .violations()
            .iter()
            .map(|v| v.message.clone())
            .collect();
        self.logger.log(&LogEvent::GateEvaluated {
            iteration,
            passed: verdict.passed(),
            violations: messages.clone(),
        });

        let feedback = verdict.correction_feedback();
        let files_changed = state
            .change_set
            .as_ref()
            .map(ChangeSet::files_changed)
            .unwrap_or(0);
        self.journal(JournalLine::Attempt {
            timestamp: Utc::now(),
            iteration,
            files_changed,
            upstream_error: upstream_error.as_ref().map(|e| e.to_string()),
            passed: verdict.passed(),
            violations: messages,
            feedback: feedback.clone(),
        });
        state.history.push(AttemptRecord {
            iteration,
            files_changed,
            upstream_error,
            verdict: verdict.clone(),
            timestamp: Utc::now(),
        });

        let passed = verdict.passed();
        state.verdict = Some(verdict);

        if passed {
            state.correction_feedback = None;
            return (state, Stage::Done);
        }

        if state.iteration_count() < self.config.max_iterations {
            state.advance_iteration();
            state.correction_feedback = feedback;
            self.logger.log(&LogEvent::RetryScheduled {
                next_iteration: state.iteration_count(),
                max_iterations: self.config.max_iterations,
            });
            (state, Stage::Generate)
        } else {
            self.logger.log(&LogEvent::MaxIterationsReached {
                iterations: state.history.len(),
            });
            (state, Stage::Done)
        }
    }

    fn fail_terminally(&self, state: &mut RunState, error: StageError) {
        warn!(stage = error.stage(), error = %error, "Run aborted");
        self.logger.log(&LogEvent::ErrorEncountered {
            stage: error.stage().to_string(),
            error: error.to_string(),
        });
        if matches!(error, StageError::Plan(_)) {
            self.journal(JournalLine::Plan {
                timestamp: Utc::now(),
                plan: None,
                error: Some(error.to_string()),
            });
        }
        state.terminal_error = Some(error);
    }
}
