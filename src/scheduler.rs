// Worker pool: even partitioning of the index space and the worker loop

use anyhow::Result;
use clap::ValueEnum;
use futures::{stream::FuturesUnordered, StreamExt};
use serde::Serialize;
use std::ops::Range;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

use crate::executor::TaskExecutor;
use crate::workload::WorkloadGenerator;

/// What a worker does when an iteration returns an error
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum FailurePolicy {
    /// Log the error, count it, and move on to the next index
    Continue,
    /// Stop the worker's remaining range on the first error
    FailFast,
}

/// Per-worker summary returned from the join
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerReport {
    pub worker: usize,
    pub range: Range<u64>,
    pub completed: u64,
    pub failed: u64,
    pub read_misses: u64,
    /// Index at which the worker stopped early, if it did
    pub stopped_at: Option<u64>,
}

/// Split `[0, total)` into `workers` contiguous ranges of `total / workers`.
/// Any remainder is left unscheduled.
pub fn partition(total: u64, workers: usize) -> Vec<Range<u64>> {
    if workers == 0 {
        return Vec::new();
    }
    let per_worker = total / workers as u64;
    (0..workers as u64)
        .map(|i| {
            let start = i * per_worker;
            start..start + per_worker
        })
        .collect()
}

/// Trailing indices that `partition` never hands to a worker
pub fn unscheduled(total: u64, workers: usize) -> u64 {
    if workers == 0 {
        return total;
    }
    total % workers as u64
}

pub struct Scheduler {
    executor: Arc<TaskExecutor>,
    workers: usize,
    seed: u64,
    failure_policy: FailurePolicy,
    cancel: CancellationToken,
}

impl Scheduler {
    pub fn new(
        executor: Arc<TaskExecutor>,
        workers: usize,
        seed: u64,
        failure_policy: FailurePolicy,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            executor,
            workers,
            seed,
            failure_policy,
            cancel,
        }
    }

    /// Run every worker to completion and wait for all of them
    pub async fn run(&self, total_tasks: u64) -> Result<Vec<WorkerReport>> {
        let dropped = unscheduled(total_tasks, self.workers);
        if dropped > 0 {
            warn!(
                "{} tasks do not divide evenly across {} workers; the last {} indices will not run",
                total_tasks, self.workers, dropped
            );
        }

        let mut handles = FuturesUnordered::new();
        for (worker, range) in partition(total_tasks, self.workers).into_iter().enumerate() {
            let executor = self.executor.clone();
            let generator = WorkloadGenerator::for_worker(self.seed, worker);
            let policy = self.failure_policy;
            let cancel = self.cancel.clone();

            handles.push(tokio::spawn(async move {
                run_worker(worker, range, executor, generator, policy, cancel).await
            }));
        }

        let mut reports = Vec::with_capacity(self.workers);
        while let Some(result) = handles.next().await {
            match result {
                Ok(report) => reports.push(report),
                Err(e) => error!("Worker error: {:?}", e),
            }
        }
        reports.sort_by_key(|r| r.worker);
        Ok(reports)
    }
}

async fn run_worker(
    worker: usize,
    range: Range<u64>,
    executor: Arc<TaskExecutor>,
    mut generator: WorkloadGenerator,
    policy: FailurePolicy,
    cancel: CancellationToken,
) -> WorkerReport {
    let mut report = WorkerReport {
        worker,
        range: range.clone(),
        completed: 0,
        failed: 0,
        read_misses: 0,
        stopped_at: None,
    };

    for index in range {
        if cancel.is_cancelled() {
            debug!("Worker {}: cancelled before index {}", worker, index);
            report.stopped_at = Some(index);
            break;
        }

        match executor.execute(&mut generator, index).await {
            Ok(outcome) => {
                report.completed += 1;
                report.read_misses += outcome.read_misses.len() as u64;
            }
            Err(e) => {
                report.failed += 1;
                executor.progress().record_failed();
                error!("Worker {}: iteration {} failed: {:#}", worker, index, e);
                if policy == FailurePolicy::FailFast {
                    report.stopped_at = Some(index);
                    break;
                }
            }
        }
    }

    debug!(
        "Worker {}: finished {:?} ({} completed, {} failed, {} read misses)",
        worker, report.range, report.completed, report.failed, report.read_misses
    );
    report
}
