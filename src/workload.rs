// Workload unit generation
//
// Every iteration writes one row into each of the NO_TABLES tables and then
// reads one row back from each of them. The row for index `idx` carries the
// identifier vector (idx, idx+1, ..., idx+9); the read for table `t` always
// uses the constant key `t`, independent of `idx`.

use base64::Engine;
use chrono::{DateTime, Utc};
use rand::rngs::StdRng;
use rand::{RngCore, SeedableRng};

/// Number of tables written and read per iteration
pub const NO_TABLES: usize = 5;

/// Integer identifier columns per row (id0..id9)
pub const ID_COLUMNS: usize = 10;

/// Size of the random payload before base64 encoding
pub const PAYLOAD_BYTES: usize = 1000;

/// One row destined for a single table
#[derive(Debug, Clone, PartialEq)]
pub struct TableRow {
    pub ids: [i32; ID_COLUMNS],
    pub payload: String,
    pub written_at: DateTime<Utc>,
}

/// Everything one iteration writes, derived from its index
#[derive(Debug, Clone)]
pub struct WorkloadUnit {
    pub index: u64,
    pub rows: Vec<TableRow>,
}

/// A single bound write inside a batch
#[derive(Debug, Clone)]
pub struct TableWrite {
    pub table: usize,
    pub row: TableRow,
}

/// Per-table writes submitted as one logged batch, in table order
#[derive(Debug, Clone)]
pub struct BatchWriteRequest {
    pub index: u64,
    pub writes: Vec<TableWrite>,
}

/// Point read against one table's primary key column
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadQuery {
    pub table: usize,
    pub key: i32,
}

impl WorkloadUnit {
    pub fn into_batch(self) -> BatchWriteRequest {
        BatchWriteRequest {
            index: self.index,
            writes: self
                .rows
                .into_iter()
                .enumerate()
                .map(|(table, row)| TableWrite { table, row })
                .collect(),
        }
    }
}

/// The reads issued after every write. Table `t` is always queried with key `t`.
pub fn read_queries() -> Vec<ReadQuery> {
    (0..NO_TABLES)
        .map(|table| ReadQuery {
            table,
            key: table as i32,
        })
        .collect()
}

/// Identifier vector for an index. Callers keep `index + ID_COLUMNS` within
/// the CQL `int` range (checked when the run is configured).
pub fn identifiers(index: u64) -> [i32; ID_COLUMNS] {
    let mut ids = [0i32; ID_COLUMNS];
    for (offset, id) in ids.iter_mut().enumerate() {
        *id = (index + offset as u64) as i32;
    }
    ids
}

/// Per-worker payload generator.
///
/// Each worker owns its generator, so no random state is shared between
/// workers. Output is reproducible for a given seed and sequence of calls,
/// but payloads change if the worker count (and therefore the seed
/// assignment) changes.
pub struct WorkloadGenerator {
    rng: StdRng,
}

impl WorkloadGenerator {
    pub fn new(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }

    pub fn for_worker(base_seed: u64, worker: usize) -> Self {
        Self::new(base_seed.wrapping_add(worker as u64))
    }

    pub fn generate(&mut self, index: u64) -> WorkloadUnit {
        let ids = identifiers(index);
        let mut bytes = [0u8; PAYLOAD_BYTES];

        let rows = (0..NO_TABLES)
            .map(|_| {
                self.rng.fill_bytes(&mut bytes);
                TableRow {
                    ids,
                    payload: base64::engine::general_purpose::STANDARD.encode(bytes),
                    written_at: Utc::now(),
                }
            })
            .collect();

        WorkloadUnit { index, rows }
    }
}
