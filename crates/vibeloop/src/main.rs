mod config;
mod init;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use colored::Colorize;
use tracing::warn;

use vibeloop_agent::{create_agent, AgentType};
use vibeloop_core::{
    default_thread_id, ControlLoop, FileHandoff, LoopConfig, RunOutcome, RunState,
    DEFAULT_MAX_ITERATIONS,
};
use vibeloop_gate::{Gate, GateReport, Verdict};
use vibeloop_logging::{init_tracing, LogFormat, Logger, MetricsSink, RunJournal};

use crate::config::ProjectConfig;

/// Exit code for runs that could not reach a verdict
const EXIT_ABORTED: i32 = 2;

#[derive(Parser, Debug)]
#[command(
    name = "vibeloop",
    about = "Plan, generate and gate trading-strategy changes with coding agents",
    version,
    author
)]
struct Cli {
    /// Working directory (default: current directory)
    #[arg(short = 'd', long, global = true)]
    working_dir: Option<PathBuf>,

    /// Diagnostic log level (RUST_LOG takes precedence)
    #[arg(long, global = true, default_value = "warn")]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the plan/generate/handoff/gate loop for a task
    Run(RunArgs),

    /// Evaluate the current backtest results against the acceptance criteria
    Gate {
        /// Criteria source (default: [paths].project_spec)
        #[arg(long)]
        criteria: Option<PathBuf>,

        /// Result source (default: [paths].results)
        #[arg(long)]
        results: Option<PathBuf>,
    },

    /// Initialize the project spec from a template
    Init {
        /// Template name, a directory under the templates directory
        template: String,

        /// Overwrite an existing project spec without asking
        #[arg(long)]
        force: bool,
    },
}

#[derive(Args, Debug)]
struct RunArgs {
    /// Task description for the agents
    #[arg(short, long)]
    task: String,

    /// Thread id for this run (default: a slug of the task)
    #[arg(long)]
    thread: Option<String>,

    /// Maximum retries after a failing gate
    #[arg(short = 'n', long)]
    max_iterations: Option<usize>,

    /// Agent to use for both planner and generator
    #[arg(short, long, value_enum)]
    agent: Option<AgentChoice>,

    /// Agent to use specifically for the planner role
    #[arg(long, value_enum)]
    planner_agent: Option<AgentChoice>,

    /// Agent to use specifically for the generator role
    #[arg(long, value_enum)]
    generator_agent: Option<AgentChoice>,

    /// Model to use (if agent supports it)
    #[arg(short, long)]
    model: Option<String>,

    /// Log output format
    #[arg(long, value_enum, default_value = "pretty")]
    log_format: LogFormatChoice,

    /// Output final result as JSON
    #[arg(long)]
    json_output: bool,

    /// Dry run: show what would happen without executing
    #[arg(long)]
    dry_run: bool,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum AgentChoice {
    Claude,
    Opencode,
    Cursor,
}

impl From<AgentChoice> for AgentType {
    fn from(choice: AgentChoice) -> Self {
        match choice {
            AgentChoice::Claude => AgentType::ClaudeCode,
            AgentChoice::Opencode => AgentType::OpenCode,
            AgentChoice::Cursor => AgentType::Cursor,
        }
    }
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum LogFormatChoice {
    Pretty,
    Json,
    Compact,
}

impl From<LogFormatChoice> for LogFormat {
    fn from(choice: LogFormatChoice) -> Self {
        match choice {
            LogFormatChoice::Pretty => LogFormat::Pretty,
            LogFormatChoice::Json => LogFormat::Json,
            LogFormatChoice::Compact => LogFormat::Compact,
        }
    }
}

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let code = match run_cli(cli).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("{} {:#}", "Error:".bright_red().bold(), e);
            EXIT_ABORTED
        }
    };
    std::process::exit(code);
}

async fn run_cli(cli: Cli) -> Result<i32> {
    let working_dir = match cli.working_dir {
        Some(dir) => dir,
        None => std::env::current_dir().context("Failed to get current directory")?,
    };
    let project = ProjectConfig::load(&working_dir)?.unwrap_or_default();

    let (format, log_dir) = tracing_output(&cli.command, &working_dir, &project)?;
    let _guard = init_tracing(&cli.log_level, format, log_dir.as_deref());

    match cli.command {
        Command::Run(args) => handle_run(args, &working_dir, project).await,
        Command::Gate { criteria, results } => {
            let criteria = criteria.unwrap_or_else(|| project.paths.project_spec.clone());
            let results = results.unwrap_or_else(|| project.paths.results.clone());
            Ok(handle_gate(
                &resolve(&working_dir, &criteria),
                &resolve(&working_dir, &results),
            ))
        }
        Command::Init { template, force } => {
            let templates_dir = resolve(&working_dir, &project.paths.templates_dir);
            let target = resolve(&working_dir, &project.paths.project_spec);
            init::handle_init(&templates_dir, &template, &target, force)?;
            Ok(0)
        }
    }
}

/// Console format and file log directory for a command. Diagnostic log files
/// sit next to the metrics CSV, and only `run` writes them.
fn tracing_output(
    command: &Command,
    working_dir: &Path,
    project: &ProjectConfig,
) -> Result<(LogFormat, Option<PathBuf>)> {
    let Command::Run(args) = command else {
        return Ok((LogFormat::Pretty, None));
    };
    let format = args.log_format.into();
    let Some(dir) = resolve(working_dir, &project.paths.metrics)
        .parent()
        .map(Path::to_path_buf)
    else {
        return Ok((format, None));
    };
    std::fs::create_dir_all(&dir)
        .with_context(|| format!("Failed to create log directory {}", dir.display()))?;
    Ok((format, Some(dir)))
}

fn resolve(working_dir: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        working_dir.join(path)
    }
}

/// CLI role flag > CLI `--agent` > config role > config global > Claude Code
fn pick_agent(
    role_flag: Option<AgentChoice>,
    global_flag: Option<AgentChoice>,
    configured: Option<&str>,
) -> Result<AgentType> {
    if let Some(choice) = role_flag.or(global_flag) {
        return Ok(choice.into());
    }
    match configured {
        Some(name) => name
            .parse::<AgentType>()
            .map_err(|e| anyhow::anyhow!("{} in {}", e, config::CONFIG_FILE_NAME)),
        None => Ok(AgentType::ClaudeCode),
    }
}

async fn handle_run(args: RunArgs, working_dir: &Path, project: ProjectConfig) -> Result<i32> {
    let planner_type = pick_agent(args.planner_agent, args.agent, project.planner_agent())?;
    let generator_type = pick_agent(args.generator_agent, args.agent, project.generator_agent())?;
    let planner_model = args
        .model
        .clone()
        .or_else(|| project.planner_model().map(String::from));
    let generator_model = args
        .model
        .clone()
        .or_else(|| project.generator_model().map(String::from));
    let max_iterations = args
        .max_iterations
        .or(project.max_iterations)
        .unwrap_or(DEFAULT_MAX_ITERATIONS);
    let thread_id = args
        .thread
        .clone()
        .unwrap_or_else(|| default_thread_id(&args.task));
    let timeout = project.timeout_secs.map(Duration::from_secs);
    let paths = &project.paths;

    if args.dry_run {
        println!("=== Dry Run ===");
        println!("Task: {}", args.task);
        println!("Thread: {}", thread_id);
        println!("Working dir: {}", working_dir.display());
        println!(
            "Planner: {} ({})",
            planner_type,
            planner_model.as_deref().unwrap_or("default model")
        );
        println!(
            "Generator: {} ({})",
            generator_type,
            generator_model.as_deref().unwrap_or("default model")
        );
        println!("Max retries: {}", max_iterations);
        println!(
            "Criteria: {}",
            resolve(working_dir, &paths.project_spec).display()
        );
        println!("Results: {}", resolve(working_dir, &paths.results).display());
        println!("Handoff: {}", resolve(working_dir, &paths.task).display());
        if let Some(command) = &project.backtest_command {
            println!("Backtest command: {}", command);
        }
        return Ok(0);
    }

    let planner = create_agent(planner_type);
    let generator = create_agent(generator_type);

    if !planner.is_available().await {
        anyhow::bail!(
            "Planner agent '{}' is not available. Make sure it's installed and in PATH.",
            planner.name()
        );
    }
    if !generator.is_available().await {
        anyhow::bail!(
            "Generator agent '{}' is not available. Make sure it's installed and in PATH.",
            generator.name()
        );
    }

    let log_format: LogFormat = args.log_format.into();
    let logger = match &paths.event_log {
        Some(path) => Logger::with_file(log_format, &resolve(working_dir, path))
            .context("Failed to open event log")?,
        None => Logger::new(log_format),
    };

    let executor = FileHandoff::new(paths.task.clone(), paths.results.clone())
        .with_backtest_command(project.backtest_command.clone())
        .with_timeout(timeout);

    let loop_config = LoopConfig::new(working_dir)
        .with_max_iterations(max_iterations)
        .with_criteria_path(paths.project_spec.clone())
        .with_results_path(paths.results.clone())
        .with_models(planner_model, generator_model)
        .with_agent_timeout(timeout)
        .with_costs(project.costs.clone().unwrap_or_default());

    let mut control = ControlLoop::new(
        planner.as_ref(),
        generator.as_ref(),
        &executor,
        loop_config,
        Arc::new(logger),
    );

    let metrics_path = resolve(working_dir, &paths.metrics);
    match MetricsSink::open(&metrics_path) {
        Ok(sink) => control = control.with_metrics(sink),
        Err(e) => warn!(error = %e, path = %metrics_path.display(), "Metrics disabled"),
    }
    let journal_dir = resolve(working_dir, &paths.journal_dir);
    match RunJournal::create(&journal_dir, &thread_id, &args.task) {
        Ok(journal) => control = control.with_journal(journal),
        Err(e) => warn!(error = %e, path = %journal_dir.display(), "Run journal disabled"),
    }

    let outcome = control.run(RunState::new(args.task, thread_id)).await;

    if args.json_output {
        let json = serde_json::to_string_pretty(&outcome)?;
        println!("{}", json);
    } else {
        print_outcome(&outcome);
    }

    Ok(outcome.exit_code())
}

fn handle_gate(criteria: &Path, results: &Path) -> i32 {
    eprintln!("{}", "--- Gate Evaluation ---".bold());
    eprintln!("{} {}", "Criteria:".dimmed(), criteria.display());
    eprintln!("{} {}", "Results:".dimmed(), results.display());
    eprintln!();

    let run = match Gate::new(criteria, results).evaluate_files() {
        Ok(run) => run,
        Err(e) => {
            eprintln!("{} {}", "✗ Configuration error:".bright_red().bold(), e);
            return EXIT_ABORTED;
        }
    };

    let report = GateReport::from_run(&run);
    for line in &report.lines {
        if line.passed {
            eprintln!("  {} {}", "✓".bright_green(), line.text);
        } else {
            eprintln!("  {} {}", "✗".bright_red(), line.text.yellow());
        }
    }
    eprintln!();

    if report.passed {
        eprintln!("[RESULT] {}", report.result_line().bright_green().bold());
        0
    } else {
        eprintln!("[RESULT] {}", report.result_line().bright_red().bold());
        1
    }
}

fn print_violations(verdict: &Verdict) {
    for violation in verdict.violations() {
        eprintln!("  - {}", violation.message.yellow());
    }
}

fn print_outcome(outcome: &RunOutcome) {
    match outcome {
        RunOutcome::Passed {
            thread_id,
            attempts,
            total_duration_secs,
            ..
        } => {
            eprintln!();
            eprintln!("{}", "=== PASSED ===".bright_green().bold());
            eprintln!("Thread: {}", thread_id);
            eprintln!("Attempts: {}", attempts);
            eprintln!("Duration: {:.1}s", total_duration_secs);
        }
        RunOutcome::GateFailed {
            thread_id,
            attempts,
            verdict,
            total_duration_secs,
            ..
        } => {
            eprintln!();
            eprintln!("{}", "=== GATE FAILED ===".bright_red().bold());
            eprintln!("Thread: {}", thread_id);
            eprintln!("Attempts: {} (retries exhausted)", attempts);
            eprintln!("Duration: {:.1}s", total_duration_secs);
            eprintln!("Last verdict: {}", verdict.short_description());
            print_violations(verdict);
        }
        RunOutcome::Aborted {
            thread_id,
            attempts,
            error,
            verdict,
            total_duration_secs,
            ..
        } => {
            eprintln!();
            eprintln!("{}", "=== ABORTED ===".bright_red().bold());
            eprintln!("Thread: {}", thread_id);
            eprintln!("Error after {} attempt(s): {}", attempts, error);
            eprintln!("Duration: {:.1}s", total_duration_secs);
            if let Some(verdict) = verdict {
                eprintln!("Last verdict: {}", verdict.short_description());
                print_violations(verdict);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parses_run_flags() {
        let cli = Cli::parse_from([
            "vibeloop",
            "run",
            "--task",
            "Raise winrate",
            "-n",
            "2",
            "--generator-agent",
            "cursor",
            "--json-output",
        ]);
        match cli.command {
            Command::Run(args) => {
                assert_eq!(args.task, "Raise winrate");
                assert_eq!(args.max_iterations, Some(2));
                assert!(matches!(args.generator_agent, Some(AgentChoice::Cursor)));
                assert!(args.json_output);
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_only_run_creates_log_dir() {
        let dir = tempfile::tempdir().unwrap();
        let project = ProjectConfig::default();

        for args in [
            vec!["vibeloop", "gate"],
            vec!["vibeloop", "init", "eth_breakout"],
        ] {
            let cli = Cli::parse_from(args);
            let (_, log_dir) = tracing_output(&cli.command, dir.path(), &project).unwrap();
            assert!(log_dir.is_none());
        }
        assert!(!dir.path().join("artifacts").exists());

        let cli = Cli::parse_from(["vibeloop", "run", "--task", "t"]);
        let (_, log_dir) = tracing_output(&cli.command, dir.path(), &project).unwrap();
        let log_dir = log_dir.unwrap();
        assert_eq!(log_dir, dir.path().join("artifacts/logs"));
        assert!(log_dir.is_dir());
    }

    #[test]
    fn test_pick_agent_precedence() {
        assert_eq!(
            pick_agent(Some(AgentChoice::Cursor), Some(AgentChoice::Opencode), Some("claude"))
                .unwrap(),
            AgentType::Cursor
        );
        assert_eq!(
            pick_agent(None, Some(AgentChoice::Opencode), Some("claude")).unwrap(),
            AgentType::OpenCode
        );
        assert_eq!(pick_agent(None, None, Some("cursor")).unwrap(), AgentType::Cursor);
        assert_eq!(pick_agent(None, None, None).unwrap(), AgentType::ClaudeCode);
        assert!(pick_agent(None, None, Some("gpt")).is_err());
    }

    #[test]
    fn test_gate_exit_codes() {
        let dir = tempfile::tempdir().unwrap();
        let criteria = dir.path().join("spec.yaml");
        let results = dir.path().join("latest.json");
        std::fs::write(&criteria, "acceptance:\n  backtest:\n    winrate: \">=0.6\"\n").unwrap();

        assert_eq!(handle_gate(&criteria, &results), 1);

        std::fs::write(&results, r#"{"winrate": 0.7}"#).unwrap();
        assert_eq!(handle_gate(&criteria, &results), 0);

        std::fs::write(&criteria, "acceptance:\n  backtest:\n    winrate: \"~0.6\"\n").unwrap();
        assert_eq!(handle_gate(&criteria, &results), 2);
    }
}
