// Benchmark run: monitor + timed worker pool + summary

use anyhow::{ensure, Result};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::executor::TaskExecutor;
use crate::progress::{monitor, ProgressCounter};
use crate::report::RunResult;
use crate::scheduler::{partition, FailurePolicy, Scheduler};
use crate::store::StoreClient;
use crate::workload::ID_COLUMNS;

#[derive(Debug, Clone)]
pub struct BenchConfig {
    pub total_tasks: u64,
    pub workers: usize,
    pub seed: u64,
    pub poll_interval: Duration,
    pub failure_policy: FailurePolicy,
}

impl BenchConfig {
    pub fn validate(&self) -> Result<()> {
        ensure!(self.workers > 0, "at least one worker is required");
        ensure!(
            self.total_tasks.saturating_add(ID_COLUMNS as u64) <= i32::MAX as u64,
            "{} tasks would overflow the int id columns",
            self.total_tasks
        );
        ensure!(!self.poll_interval.is_zero(), "poll interval must be non-zero");
        Ok(())
    }
}

/// Run the whole benchmark against an already prepared store.
///
/// The monitor starts before the workers and is cancelled once they have all
/// joined. `cancel` stops workers at their next iteration boundary.
pub async fn run(store: Arc<dyn StoreClient>, config: &BenchConfig, cancel: CancellationToken) -> Result<RunResult> {
    config.validate()?;

    let progress = Arc::new(ProgressCounter::new());
    let executor = Arc::new(TaskExecutor::new(store, progress.clone()));
    let scheduler = Scheduler::new(
        executor,
        config.workers,
        config.seed,
        config.failure_policy,
        cancel,
    );

    info!("Running test...");

    let monitor_cancel = CancellationToken::new();
    let monitor_handle = tokio::spawn(monitor(
        progress.clone(),
        config.total_tasks,
        config.poll_interval,
        monitor_cancel.clone(),
    ));

    let start = Instant::now();
    let reports = scheduler.run(config.total_tasks).await?;
    let elapsed = start.elapsed();

    for report in reports.iter().filter(|r| r.stopped_at.is_some()) {
        warn!(
            "Worker {} stopped early at index {:?} of {:?}",
            report.worker, report.stopped_at, report.range
        );
    }

    monitor_cancel.cancel();
    let milestones = monitor_handle.await?;

    let scheduled = partition(config.total_tasks, config.workers)
        .iter()
        .map(|r| r.end - r.start)
        .sum();

    Ok(RunResult {
        total_tasks: config.total_tasks,
        threads: config.workers,
        scheduled,
        completed: progress.completed(),
        failed: progress.failed(),
        read_misses: progress.read_misses(),
        elapsed,
        failure_policy: config.failure_policy,
        milestones,
    })
}
