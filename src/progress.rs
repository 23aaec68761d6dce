// Shared progress counters and the milestone monitor

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Process-wide iteration counters, incremented by every worker
#[derive(Debug, Default)]
pub struct ProgressCounter {
    completed: AtomicU64,
    failed: AtomicU64,
    read_misses: AtomicU64,
}

impl ProgressCounter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_completed(&self) {
        self.completed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_failed(&self) {
        self.failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_read_miss(&self) {
        self.read_misses.fetch_add(1, Ordering::Relaxed);
    }

    pub fn completed(&self) -> u64 {
        self.completed.load(Ordering::Relaxed)
    }

    pub fn failed(&self) -> u64 {
        self.failed.load(Ordering::Relaxed)
    }

    pub fn read_misses(&self) -> u64 {
        self.read_misses.load(Ordering::Relaxed)
    }
}

/// Tracks the last reported integer percentage.
///
/// A percentage is reported only when it is strictly greater than the last
/// one, so reports never repeat and never go backwards. If the counter moves
/// by more than one percent between polls, the intermediate values are skipped.
#[derive(Debug, Clone)]
pub struct MilestoneTracker {
    total: u64,
    last_reported: u64,
}

impl MilestoneTracker {
    pub fn new(total: u64) -> Self {
        Self {
            total,
            last_reported: 0,
        }
    }

    pub fn observe(&mut self, completed: u64) -> Option<u64> {
        if self.total == 0 {
            return None;
        }
        let pct = completed.saturating_mul(100) / self.total;
        if pct > self.last_reported {
            self.last_reported = pct;
            Some(pct)
        } else {
            None
        }
    }
}

/// Poll the counter every `interval` until `cancel` fires, logging each new
/// milestone. One last poll runs after cancellation so the final percentage
/// is not lost. Returns the reported percentages in order.
pub async fn monitor(
    progress: Arc<ProgressCounter>,
    total: u64,
    interval: Duration,
    cancel: CancellationToken,
) -> Vec<u64> {
    let mut tracker = MilestoneTracker::new(total);
    let mut reported = Vec::new();

    loop {
        if let Some(pct) = tracker.observe(progress.completed()) {
            info!("{}% completed", pct);
            reported.push(pct);
        }

        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = sleep(interval) => {}
        }
    }

    if let Some(pct) = tracker.observe(progress.completed()) {
        info!("{}% completed", pct);
        reported.push(pct);
    }

    reported
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::Rng;

    #[test]
    fn concurrent_increments_are_not_lost() {
        let mut rng = rand::thread_rng();
        for _ in 0..20 {
            let workers = rng.gen_range(2..16);
            let per_worker = rng.gen_range(1_000..5_000);
            let counter = Arc::new(ProgressCounter::new());

            let handles: Vec<_> = (0..workers)
                .map(|_| {
                    let counter = counter.clone();
                    std::thread::spawn(move || {
                        for _ in 0..per_worker {
                            counter.record_completed();
                        }
                    })
                })
                .collect();
            for h in handles {
                h.join().unwrap();
            }

            assert_eq!(counter.completed(), workers * per_worker);
        }
    }

    #[test]
    fn tracker_reports_each_percentage_once() {
        let mut tracker = MilestoneTracker::new(200);
        assert_eq!(tracker.observe(1), None);
        assert_eq!(tracker.observe(2), Some(1));
        assert_eq!(tracker.observe(3), None);
        assert_eq!(tracker.observe(4), Some(2));
        assert_eq!(tracker.observe(4), None);
    }

    #[test]
    fn tracker_skips_to_latest_on_jumps() {
        let mut tracker = MilestoneTracker::new(100);
        assert_eq!(tracker.observe(5), Some(5));
        assert_eq!(tracker.observe(40), Some(40));
        assert_eq!(tracker.observe(100), Some(100));
        assert_eq!(tracker.observe(100), None);
    }

    #[test]
    fn tracker_with_zero_total_is_silent() {
        let mut tracker = MilestoneTracker::new(0);
        assert_eq!(tracker.observe(0), None);
        assert_eq!(tracker.observe(10), None);
    }

    #[test]
    fn tracker_output_is_strictly_increasing_under_random_polls() {
        let mut rng = rand::thread_rng();
        let total = 10_000;
        let mut tracker = MilestoneTracker::new(total);
        let mut completed = 0u64;
        let mut seen = Vec::new();

        while completed < total {
            completed = (completed + rng.gen_range(0..250)).min(total);
            if let Some(pct) = tracker.observe(completed) {
                seen.push(pct);
            }
        }

        assert!(seen.windows(2).all(|w| w[0] < w[1]));
        assert_eq!(seen.last(), Some(&100));
    }

    #[tokio::test]
    async fn monitor_reports_final_percentage_on_cancel() {
        let progress = Arc::new(ProgressCounter::new());
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(monitor(
            progress.clone(),
            10,
            Duration::from_millis(5),
            cancel.clone(),
        ));

        for _ in 0..10 {
            progress.record_completed();
            sleep(Duration::from_millis(2)).await;
        }
        cancel.cancel();

        let reported = handle.await.unwrap();
        assert!(reported.windows(2).all(|w| w[0] < w[1]));
        assert_eq!(reported.last(), Some(&100));
    }
}
