// CQL Write-Read Benchmark
//
// Measures end-to-end write-then-read latency and aggregate throughput
// against a Cassandra / ScyllaDB cluster. A fixed pool of workers splits a
// fixed number of iterations evenly between them; every iteration writes one
// row into each of five tables as a single LOGGED batch and then reads one
// row back from each table, all at LOCAL_QUORUM.
//
// Key features:
// - Keyspace and tables recreated on every run
// - Statements prepared once, before any worker starts
// - Per-worker random payload streams (no shared RNG)
// - Integer-percentage progress milestones every 100ms
// - Optional JSON results file
//
// Usage:
//   cargo run --release -- 10.0.0.1 cassandra cassandra \
//     --tasks 100000 \
//     --workers 20

mod bench;
mod cassandra;
mod executor;
mod progress;
mod report;
mod scheduler;
mod store;
mod workload;

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::fmt::time::ChronoLocal;

use crate::bench::BenchConfig;
use crate::cassandra::{CassandraStore, ConnectOptions};
use crate::scheduler::FailurePolicy;
use crate::store::{MemoryStore, StoreClient};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Backend {
    /// Cassandra / ScyllaDB over CQL
    Cassandra,
    /// In-process store, for dry runs without a cluster
    Memory,
}

/// CQL write-then-read benchmark
#[derive(Parser, Debug, Clone)]
#[clap(name = "cql-write-read-bench")]
struct Args {
    /// Contact point of the cluster (host or host:port)
    host: Option<String>,

    /// Username for password authentication
    #[clap(default_value = "dummy")]
    username: String,

    /// Password for password authentication
    #[clap(default_value = "dummy")]
    password: String,

    /// Total number of iterations, split evenly across workers
    #[clap(long, env = "CQL_BENCH_TASKS", default_value = "100000")]
    tasks: u64,

    /// Number of concurrent workers
    #[clap(long, env = "CQL_BENCH_WORKERS", default_value = "20")]
    workers: usize,

    /// Base seed for the per-worker payload generators
    #[clap(long, default_value = "123")]
    seed: u64,

    /// Progress polling interval in milliseconds
    #[clap(long, default_value = "100")]
    poll_interval_ms: u64,

    /// What a worker does when an iteration fails
    #[clap(long, value_enum, default_value = "continue")]
    failure_policy: FailurePolicy,

    /// Storage backend
    #[clap(long, value_enum, default_value = "cassandra")]
    backend: Backend,

    /// Keyspace to (re)create for the run
    #[clap(long, env = "CQL_BENCH_KEYSPACE", default_value = "test1")]
    keyspace: String,

    /// Replication factor of the benchmark keyspace
    #[clap(long, default_value = "1")]
    replication_factor: u32,

    /// Output file for results (JSON)
    #[clap(long)]
    output: Option<String>,

    /// Exit right away instead of waiting for ENTER
    #[clap(long)]
    no_wait: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_timer(ChronoLocal::new("%Y-%m-%d %H:%M:%S%.7f".to_string()))
        .with_target(false)
        .init();

    let args = Args::parse();

    let config = BenchConfig {
        total_tasks: args.tasks,
        workers: args.workers,
        seed: args.seed,
        poll_interval: Duration::from_millis(args.poll_interval_ms),
        failure_policy: args.failure_policy,
    };
    config.validate()?;

    info!("Configuration:");
    info!("  Backend:       {:?}", args.backend);
    info!("  Tasks:         {}", config.total_tasks);
    info!("  Workers:       {}", config.workers);
    info!("  On failure:    {:?}", config.failure_policy);

    // Setup failures end the run before any worker is spawned
    let store: Arc<dyn StoreClient> = match args.backend {
        Backend::Cassandra => {
            let host = args
                .host
                .clone()
                .context("A contact point is required for the cassandra backend")?;
            let opts = ConnectOptions {
                contact_point: host,
                username: args.username.clone(),
                password: args.password.clone(),
                keyspace: args.keyspace.clone(),
                replication_factor: args.replication_factor,
            };
            Arc::new(CassandraStore::open(&opts).await?)
        }
        Backend::Memory => Arc::new(MemoryStore::new()),
    };

    let cancel = CancellationToken::new();
    let ctrl_c = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, stopping workers after their current iteration");
            ctrl_c.cancel();
        }
    });

    let result = bench::run(store, &config, cancel).await?;

    info!("Done");
    info!("{}", result.summary_line());
    info!("{}", result.detail_line());

    if let Some(output_path) = &args.output {
        result.write_json(output_path)?;
        info!("Results written to {}", output_path);
    }

    if !args.no_wait {
        info!("Press ENTER to exit");
        let mut line = String::new();
        BufReader::new(tokio::io::stdin()).read_line(&mut line).await?;
    }

    Ok(())
}
