use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::Serialize;
use sha2::{Digest, Sha256};

/// Each line type in a run journal file.
#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum JournalLine {
    RunStart {
        timestamp: DateTime<Utc>,
        run_id: String,
        thread_id: String,
        task: String,
        planner_agent: String,
        generator_agent: String,
        max_iterations: usize,
    },
    Plan {
        timestamp: DateTime<Utc>,
        plan: Option<String>,
        error: Option<String>,
    },
    Attempt {
        timestamp: DateTime<Utc>,
        iteration: usize,
        files_changed: usize,
        upstream_error: Option<String>,
        passed: bool,
        violations: Vec<String>,
        feedback: Option<String>,
    },
    RunEnd {
        timestamp: DateTime<Utc>,
        outcome: String,
        iterations: usize,
        error: Option<String>,
        duration_secs: f64,
    },
}

/// Appends the record of one run as JSONL.
///
/// Files are named `<utc-timestamp>_<thread-id>_<task-hash>.jsonl` so runs of
/// the same thread sort together and never overwrite each other.
pub struct RunJournal {
    file: Mutex<BufWriter<File>>,
    path: PathBuf,
}

impl RunJournal {
    pub fn create(dir: &Path, thread_id: &str, task: &str) -> io::Result<Self> {
        fs::create_dir_all(dir)?;

        let timestamp = Utc::now().format("%Y-%m-%dT%H-%M-%SZ");
        let hash = hex::encode(Sha256::digest(task.as_bytes()));
        let path = dir.join(format!("{}_{}_{}.jsonl", timestamp, thread_id, &hash[..6]));

        let file = File::create(&path)?;
        Ok(Self {
            file: Mutex::new(BufWriter::new(file)),
            path,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn write(&self, line: &JournalLine) {
        if let Ok(json) = serde_json::to_string(line) {
            if let Ok(mut writer) = self.file.lock() {
                let _ = writeln!(writer, "{}", json);
                let _ = writer.flush();
            }
        }
    }
}
