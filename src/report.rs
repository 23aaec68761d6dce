// Final run summary and optional JSON results file

use anyhow::{Context, Result};
use serde::Serialize;
use std::path::Path;
use std::time::Duration;

use crate::scheduler::FailurePolicy;

#[derive(Debug, Clone, Serialize)]
pub struct RunResult {
    pub total_tasks: u64,
    pub threads: usize,
    pub scheduled: u64,
    pub completed: u64,
    pub failed: u64,
    pub read_misses: u64,
    #[serde(rename = "elapsed_secs", serialize_with = "as_secs_f64")]
    pub elapsed: Duration,
    pub failure_policy: FailurePolicy,
    pub milestones: Vec<u64>,
}

impl RunResult {
    /// Completed iterations per second of wall time
    pub fn throughput(&self) -> f64 {
        let secs = self.elapsed.as_secs_f64();
        if secs > 0.0 {
            self.completed as f64 / secs
        } else {
            0.0
        }
    }

    pub fn summary_line(&self) -> String {
        format!(
            "{} tasks executed in {:?} using {} threads",
            self.total_tasks, self.elapsed, self.threads
        )
    }

    pub fn detail_line(&self) -> String {
        format!(
            "Scheduled: {} | Completed: {} | Failed: {} | Read misses: {} | Throughput: {:.1} iterations/s",
            self.scheduled,
            self.completed,
            self.failed,
            self.read_misses,
            self.throughput()
        )
    }

    pub fn write_json(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)
            .with_context(|| format!("Failed to write results to {}", path.display()))
    }
}

fn as_secs_f64<S: serde::Serializer>(d: &Duration, s: S) -> std::result::Result<S::Ok, S::Error> {
    s.serialize_f64(d.as_secs_f64())
}
