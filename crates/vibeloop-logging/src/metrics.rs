//! Per-stage metrics written as CSV rows.

use std::collections::BTreeMap;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::Utc;
use serde::{Deserialize, Serialize};

const CSV_HEADER: &str =
    "timestamp,node_name,status,latency_ms,input_tokens,output_tokens,total_tokens,cost_usd,estimated";

/// Price of one model in USD per million tokens
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ModelRate {
    pub input: f64,
    pub output: f64,
}

/// Model name to token price. Unknown models cost nothing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CostTable {
    rates: BTreeMap<String, ModelRate>,
}

impl Default for CostTable {
    /// Placeholder list prices
    fn default() -> Self {
        let rates = [
            ("gpt-5", 10.0, 30.0),
            ("claude-4-sonnet", 3.0, 15.0),
            ("claude-3-haiku", 0.25, 1.25),
        ]
        .into_iter()
        .map(|(name, input, output)| (name.to_string(), ModelRate { input, output }))
        .collect();
        Self { rates }
    }
}

impl CostTable {
    pub fn rate(&self, model: &str) -> Option<ModelRate> {
        self.rates.get(model).copied()
    }

    pub fn cost(&self, model: Option<&str>, input_tokens: u64, output_tokens: u64) -> f64 {
        let Some(rate) = model.and_then(|m| self.rate(m)) else {
            return 0.0;
        };
        (input_tokens as f64 / 1_000_000.0) * rate.input
            + (output_tokens as f64 / 1_000_000.0) * rate.output
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetricStatus {
    Success,
    Failure,
    Skipped,
}

impl MetricStatus {
    fn as_str(&self) -> &'static str {
        match self {
            MetricStatus::Success => "success",
            MetricStatus::Failure => "failure",
            MetricStatus::Skipped => "skipped",
        }
    }
}

/// One stage execution
#[derive(Debug, Clone)]
pub struct MetricRecord {
    pub node_name: String,
    pub status: MetricStatus,
    pub latency_ms: f64,
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub cost_usd: f64,
    /// Token counts were estimated rather than reported by the agent
    pub estimated: bool,
}

impl MetricRecord {
    /// A stage that made no model call
    pub fn without_tokens(node_name: &str, status: MetricStatus, latency_ms: f64) -> Self {
        Self {
            node_name: node_name.to_string(),
            status,
            latency_ms,
            input_tokens: 0,
            output_tokens: 0,
            cost_usd: 0.0,
            estimated: false,
        }
    }
}

/// Appends metric rows to a CSV file, writing the header when the file is new
pub struct MetricsSink {
    file: Mutex<File>,
    path: PathBuf,
}

impl MetricsSink {
    pub fn open(path: &Path) -> io::Result<Self> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let mut file = OpenOptions::new().create(true).append(true).open(path)?;
        if file.metadata()?.len() == 0 {
            writeln!(file, "{}", CSV_HEADER)?;
        }

        Ok(Self {
            file: Mutex::new(file),
            path: path.to_path_buf(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn record(&self, record: &MetricRecord) -> io::Result<()> {
        let row = format!(
            "{},{},{},{:.2},{},{},{},{:.6},{}",
            Utc::now().to_rfc3339(),
            csv_field(&record.node_name),
            record.status.as_str(),
            record.latency_ms,
            record.input_tokens,
            record.output_tokens,
            record.input_tokens + record.output_tokens,
            record.cost_usd,
            record.estimated
        );

        let mut file = self
            .file
            .lock()
            .map_err(|_| io::Error::other("metrics file lock poisoned"))?;
        writeln!(file, "{}", row)
    }
}

fn csv_field(value: &str) -> String {
    if value.contains([',', '"', '\n']) {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cost_uses_per_million_rates() {
        let table = CostTable::default();
        let cost = table.cost(Some("claude-4-sonnet"), 1_000_000, 100_000);
        assert!((cost - 4.5).abs() < 1e-9);
        assert_eq!(table.cost(Some("unknown"), 1_000, 1_000), 0.0);
        assert_eq!(table.cost(None, 1_000, 1_000), 0.0);
    }

    #[test]
    fn test_cost_table_from_toml() {
        let table: CostTable = toml::from_str(
            r#"
[sonnet]
input = 3.0
output = 15.0
"#,
        )
        .unwrap();
        assert_eq!(
            table.rate("sonnet"),
            Some(ModelRate {
                input: 3.0,
                output: 15.0
            })
        );
        assert!(table.rate("gpt-5").is_none());
    }

    #[test]
    fn test_sink_writes_header_once() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("logs/observability_log.csv");

        {
            let sink = MetricsSink::open(&path).unwrap();
            sink.record(&MetricRecord::without_tokens("gate", MetricStatus::Failure, 1.234))
                .unwrap();
        }
        let sink = MetricsSink::open(&path).unwrap();
        sink.record(&MetricRecord {
            node_name: "plan, v2".into(),
            status: MetricStatus::Success,
            latency_ms: 10.0,
            input_tokens: 100,
            output_tokens: 50,
            cost_usd: 0.001,
            estimated: true,
        })
        .unwrap();

        let content = fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0], CSV_HEADER);
        assert!(lines[1].ends_with(",gate,failure,1.23,0,0,0,0.000000,false"));
        assert!(lines[2].contains(",\"plan, v2\",success,10.00,100,50,150,0.001000,true"));
    }
}
