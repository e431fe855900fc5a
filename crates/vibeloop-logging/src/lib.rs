//! # vibeloop-logging
//!
//! Logging for the vibeloop plan/generate/gate loop.
//!
//! ## Key Types
//!
//! - [`Logger`] - Renders [`LogEvent`]s to the console and an optional file
//! - [`RunJournal`] - One JSONL file per run with every gate attempt
//! - [`MetricsSink`] - CSV rows of per-stage latency, tokens and cost
//! - [`CostTable`] - Per-model token prices, injected from configuration
//!
//! ## Log Formats
//!
//! - `Pretty` - Human-readable colored output
//! - `JSON` - Structured JSON lines
//! - `Compact` - Minimal text output

mod events;
mod journal;
mod metrics;

pub use events::{AgentRole, LogEvent, LogFormat, Logger, StreamType};
pub use journal::{JournalLine, RunJournal};
pub use metrics::{CostTable, MetricRecord, MetricStatus, MetricsSink, ModelRate};

use std::path::Path;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// File name of the tracing log written under the configured log directory
pub const TRACE_LOG_FILE: &str = "vibeloop.log";

/// Initialize tracing for the application.
///
/// Console output goes to stderr. When `log_dir` is given, JSON trace lines
/// are also appended to [`TRACE_LOG_FILE`] in that directory; keep the
/// returned guard alive until exit so buffered lines are flushed.
pub fn init_tracing(level: &str, format: LogFormat, log_dir: Option<&Path>) -> Option<WorkerGuard> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let (file_layer, guard) = match log_dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::never(dir, TRACE_LOG_FILE);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = fmt::layer().json().with_ansi(false).with_writer(writer);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    let registry = tracing_subscriber::registry().with(filter).with(file_layer);

    match format {
        LogFormat::Json => {
            registry
                .with(
                    fmt::layer()
                        .json()
                        .with_target(false)
                        .with_writer(std::io::stderr),
                )
                .init();
        }
        LogFormat::Pretty | LogFormat::Compact => {
            registry
                .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
                .init();
        }
    }

    guard
}
