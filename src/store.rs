// Storage client seam
//
// The benchmark core only needs two operations from the data store: submit
// one logged batch and run one point read. Everything driver-specific lives
// behind this trait.

use anyhow::Result;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;

use crate::workload::{BatchWriteRequest, ReadQuery, TableRow, NO_TABLES};

#[async_trait]
pub trait StoreClient: Send + Sync + 'static {
    /// Submit all per-table writes as a single atomic batch
    async fn write_batch(&self, batch: &BatchWriteRequest) -> Result<()>;

    /// Read one row by primary key. Returns false when no row came back.
    async fn read(&self, query: &ReadQuery) -> Result<bool>;
}

/// In-process store keyed the same way as the CQL tables: table `t` uses
/// identifier column `id{t}` as its primary key.
pub struct MemoryStore {
    tables: Vec<Mutex<HashMap<i32, TableRow>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            tables: (0..NO_TABLES).map(|_| Mutex::new(HashMap::new())).collect(),
        }
    }

    #[cfg(test)]
    pub fn row_count(&self, table: usize) -> usize {
        self.tables.get(table).map_or(0, |t| t.lock().len())
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl StoreClient for MemoryStore {
    async fn write_batch(&self, batch: &BatchWriteRequest) -> Result<()> {
        for write in &batch.writes {
            let table = self
                .tables
                .get(write.table)
                .ok_or_else(|| anyhow::anyhow!("unknown table test{}", write.table))?;
            let key = write.row.ids[write.table];
            table.lock().insert(key, write.row.clone());
        }
        Ok(())
    }

    async fn read(&self, query: &ReadQuery) -> Result<bool> {
        let table = self
            .tables
            .get(query.table)
            .ok_or_else(|| anyhow::anyhow!("unknown table test{}", query.table))?;
        Ok(table.lock().contains_key(&query.key))
    }
}
