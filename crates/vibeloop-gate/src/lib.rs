//! # vibeloop-gate
//!
//! Acceptance gate for backtest results.
//!
//! Criteria are declared as `name: "<op><number>"` pairs (for example
//! `sample_out_winrate: ">=0.6"`) and parsed once into [`Criterion`] values.
//! A [`MeasurementSet`] captured from the backtest artifact is compared
//! against them by [`evaluate`], producing a [`Verdict`].
//!
//! ## Key Types
//!
//! - [`Criterion`] / [`Operator`] - Parsed acceptance thresholds
//! - [`MeasurementSet`] - Named numeric measurements from one run
//! - [`Verdict`] / [`Violation`] - Pass/fail result with correction details
//! - [`Gate`] - File-backed evaluation that re-reads both sources per call

mod criterion;
mod error;
mod evaluator;
mod gate;
mod measurement;
mod report;
mod sources;
mod verdict;

pub use criterion::{Criterion, Operator};
pub use error::{ArtifactError, CriteriaError};
pub use evaluator::{check, evaluate, CriterionCheck};
pub use gate::{Gate, GateRun};
pub use measurement::MeasurementSet;
pub use report::{GateReport, ReportLine};
pub use sources::{load_criteria, load_measurements, parse_criteria, parse_measurements};
pub use verdict::{Observed, Verdict, Violation};
