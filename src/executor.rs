// One write-then-read iteration

use anyhow::Result;
use std::sync::Arc;
use tracing::warn;

use crate::progress::ProgressCounter;
use crate::store::StoreClient;
use crate::workload::{read_queries, WorkloadGenerator};

/// Result of a completed iteration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IterationOutcome {
    /// Tables whose read came back empty
    pub read_misses: Vec<usize>,
}

pub struct TaskExecutor {
    store: Arc<dyn StoreClient>,
    progress: Arc<ProgressCounter>,
}

impl TaskExecutor {
    pub fn new(store: Arc<dyn StoreClient>, progress: Arc<ProgressCounter>) -> Self {
        Self { store, progress }
    }

    pub fn progress(&self) -> &Arc<ProgressCounter> {
        &self.progress
    }

    /// Write one row per table in a single batch, then read every table back.
    ///
    /// Empty reads are warned about and counted but do not fail the
    /// iteration. Store errors are returned as-is and leave the completed
    /// counter untouched.
    pub async fn execute(&self, generator: &mut WorkloadGenerator, index: u64) -> Result<IterationOutcome> {
        let batch = generator.generate(index).into_batch();
        self.store.write_batch(&batch).await?;

        let mut read_misses = Vec::new();
        for query in read_queries() {
            if !self.store.read(&query).await? {
                warn!("Select failed for index {} (table test{})", index, query.table);
                self.progress.record_read_miss();
                read_misses.push(query.table);
            }
        }

        self.progress.record_completed();
        Ok(IterationOutcome { read_misses })
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use crate::workload::{BatchWriteRequest, ReadQuery};
    use anyhow::anyhow;
    use async_trait::async_trait;
    use std::collections::HashSet;

    /// Store double with scripted misses and failures
    #[derive(Default)]
    pub(crate) struct ScriptedStore {
        pub inner: MemoryStore,
        /// (index, table) pairs whose read returns no row
        pub misses: HashSet<(u64, usize)>,
        /// Indices whose batch write fails
        pub failing_writes: HashSet<u64>,
        pub last_index: parking_lot::Mutex<u64>,
    }

    #[async_trait]
    impl StoreClient for ScriptedStore {
        async fn write_batch(&self, batch: &BatchWriteRequest) -> Result<()> {
            if self.failing_writes.contains(&batch.index) {
                return Err(anyhow!("write timeout for index {}", batch.index));
            }
            *self.last_index.lock() = batch.index;
            self.inner.write_batch(batch).await
        }

        async fn read(&self, query: &ReadQuery) -> Result<bool> {
            let index = *self.last_index.lock();
            Ok(!self.misses.contains(&(index, query.table)))
        }
    }

    #[tokio::test]
    async fn read_miss_is_reported_once_and_counted() {
        let store = ScriptedStore {
            misses: [(7, 2)].into_iter().collect(),
            ..Default::default()
        };
        let progress = Arc::new(ProgressCounter::new());
        let executor = TaskExecutor::new(Arc::new(store), progress.clone());
        let mut gen = WorkloadGenerator::new(123);

        let outcome = executor.execute(&mut gen, 7).await.unwrap();

        assert_eq!(outcome, IterationOutcome { read_misses: vec![2] });
        assert_eq!(progress.read_misses(), 1);
        assert_eq!(progress.completed(), 1);
    }

    #[tokio::test]
    async fn write_failure_does_not_count_as_completed() {
        let store = ScriptedStore {
            failing_writes: [3].into_iter().collect(),
            ..Default::default()
        };
        let progress = Arc::new(ProgressCounter::new());
        let executor = TaskExecutor::new(Arc::new(store), progress.clone());
        let mut gen = WorkloadGenerator::new(123);

        let err = executor.execute(&mut gen, 3).await.unwrap_err();
        assert!(err.to_string().contains("index 3"));
        assert_eq!(progress.completed(), 0);

        executor.execute(&mut gen, 4).await.unwrap();
        assert_eq!(progress.completed(), 1);
    }

    #[tokio::test]
    async fn memory_store_misses_until_index_zero_is_written() {
        let progress = Arc::new(ProgressCounter::new());
        let executor = TaskExecutor::new(Arc::new(MemoryStore::new()), progress.clone());
        let mut gen = WorkloadGenerator::new(123);

        let first = executor.execute(&mut gen, 50).await.unwrap();
        assert_eq!(first.read_misses, vec![0, 1, 2, 3, 4]);

        let second = executor.execute(&mut gen, 0).await.unwrap();
        assert!(second.read_misses.is_empty());

        assert_eq!(progress.completed(), 2);
        assert_eq!(progress.read_misses(), 5);
    }
}
