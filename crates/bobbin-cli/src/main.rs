//! bobbin デモ
//!
//! 同じユーザー・プロジェクトの再計算ジョブを何度も enqueue し、
//! 重複排除でどれだけ落ちて、どれだけ積み直されたかを表示します。

mod workers;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use bobbin_core::app::{DedupConfig, EnqueueOutcome, Harness, HarnessBuilder, WorkerGroup};
use bobbin_core::dedup::DedupContext;
use bobbin_core::impls::{
    InMemoryIdempotencyStore, InMemoryLeaseStore, InstrumentedStore, RedisIdempotencyStore,
    RedisLeaseStore, StaticFeatureFlags, TracingEventSink,
};
use bobbin_core::observability::{init_tracing, QueueCounts};
use bobbin_core::ports::{IdempotencyStore, LeaseStore, SystemClock, UlidGenerator};
use clap::Parser;
use serde::Serialize;

use crate::workers::{AuthorizedProjectsWorker, ProjectRecalculateWorker, RunCounter, RunCounts};

#[derive(Debug, Parser)]
#[command(name = "bobbin", about = "Background job deduplication demo")]
struct Args {
    /// JSON config file; defaults apply to anything it leaves out.
    #[arg(long, env = "BOBBIN_CONFIG")]
    config: Option<PathBuf>,

    /// Use Redis for idempotency keys and leases instead of memory.
    #[arg(long, env = "BOBBIN_REDIS_URL")]
    redis_url: Option<String>,

    #[arg(long, default_value_t = 4)]
    workers: usize,

    /// Feature flag to enable (repeatable), e.g. `use_dedup_lock`.
    #[arg(long = "flag")]
    flags: Vec<String>,

    #[arg(long, default_value_t = 3)]
    users: i64,

    /// How many times each job is enqueued.
    #[arg(long, default_value_t = 5)]
    bursts: usize,

    /// Simulated work per job, in milliseconds.
    #[arg(long, default_value_t = 200)]
    work_ms: u64,

    /// Give up waiting for the queue to drain after this many seconds.
    #[arg(long, default_value_t = 30)]
    drain_timeout_secs: u64,
}

#[derive(Debug, Default, Serialize)]
struct EnqueueSummary {
    enqueued: usize,
    dropped: usize,
}

#[derive(Debug, Serialize)]
struct Summary {
    enqueues: EnqueueSummary,
    runs: RunCounts,
    queue: QueueCounts,
    store_calls: usize,
    store_failures: usize,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing();
    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => DedupConfig::from_json_file(path)?,
        None => DedupConfig::default(),
    };
    if args.redis_url.is_some() {
        config.redis_url = args.redis_url.clone();
    }

    let clock = Arc::new(SystemClock);
    let (backend, leases): (Arc<dyn IdempotencyStore>, Arc<dyn LeaseStore>) =
        match &config.redis_url {
            Some(url) => {
                tracing::info!(url = %url, "using redis");
                (
                    Arc::new(RedisIdempotencyStore::connect(url).await?),
                    Arc::new(RedisLeaseStore::connect(url).await?),
                )
            }
            None => (
                Arc::new(InMemoryIdempotencyStore::new(clock.clone())),
                Arc::new(InMemoryLeaseStore::new(clock.clone())),
            ),
        };
    let store = Arc::new(InstrumentedStore::new(backend));

    let dedup = DedupContext {
        store: store.clone(),
        leases,
        clock: clock.clone(),
        flags: Arc::new(StaticFeatureFlags::with_enabled(args.flags.iter().cloned())),
        events: Arc::new(TracingEventSink),
        ids: Arc::new(UlidGenerator::new(clock)),
        settings: config.dedup_settings(),
    };

    let counter = Arc::new(RunCounter::default());
    let work = Duration::from_millis(args.work_ms);
    let harness = Arc::new(
        HarnessBuilder::new()
            .register(AuthorizedProjectsWorker {
                counter: counter.clone(),
                work,
            })?
            .register(ProjectRecalculateWorker {
                counter: counter.clone(),
                work,
            })?
            .expect_workers(&["AuthorizedProjectsWorker", "ProjectRecalculateWorker"])
            .strategy_overrides(config.strategy_overrides()?)
            .retry_policy(config.retry_policy())
            .build_with(dedup)?,
    );

    let queue = Arc::clone(harness.queue());
    let group = WorkerGroup::spawn(args.workers, Arc::clone(&queue), Arc::clone(&harness));

    let enqueues = enqueue_bursts(&harness, args.users, args.bursts, work).await?;

    let drain_timeout = Duration::from_secs(args.drain_timeout_secs);
    tokio::select! {
        drained = tokio::time::timeout(drain_timeout, wait_for_drain(&harness)) => {
            if drained.is_err() {
                tracing::warn!(timeout_secs = args.drain_timeout_secs, "queue did not drain");
            }
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("interrupted");
        }
    }
    group.shutdown_and_join().await;

    let stats = store.stats();
    let summary = Summary {
        enqueues,
        runs: counter.snapshot(),
        queue: queue.counts_by_state().await?,
        store_calls: stats.calls,
        store_failures: stats.failures,
    };
    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}

/// Enqueue every job `bursts` times, spaced so later bursts overlap running jobs.
async fn enqueue_bursts(
    harness: &Harness,
    users: i64,
    bursts: usize,
    work: Duration,
) -> Result<EnqueueSummary, Box<dyn std::error::Error>> {
    let mut summary = EnqueueSummary::default();
    for burst in 0..bursts {
        for id in 0..users {
            let outcomes = [
                harness.perform_async::<AuthorizedProjectsWorker>(&(id,)).await?,
                harness.perform_async::<ProjectRecalculateWorker>(&(id,)).await?,
            ];
            for outcome in outcomes {
                match outcome {
                    EnqueueOutcome::Enqueued(_) => summary.enqueued += 1,
                    EnqueueOutcome::Dropped { .. } => summary.dropped += 1,
                }
            }
        }
        tracing::debug!(burst, "burst enqueued");
        tokio::time::sleep(work / 2).await;
    }
    Ok(summary)
}

async fn wait_for_drain(harness: &Harness) {
    loop {
        match harness.queue().counts_by_state().await {
            Ok(counts) if counts.in_flight() == 0 => return,
            Ok(_) => {}
            Err(err) => tracing::warn!(error = %err, "failed to read queue counts"),
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
}
