//! デモ用ワーカー
//!
//! どちらも「同じ引数なら何度走っても結果は同じ」再計算ジョブで、
//! until_executed + reschedule_once の典型例です。

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use bobbin_core::dedup::{StrategyKind, WorkerDeduplication};
use bobbin_core::domain::{IfDeduplicated, JobError};
use bobbin_core::typed::{JobContext, Worker};
use serde::Serialize;

/// Skips the per-project lease in `ProjectRecalculateWorker`.
pub const DROP_LEASE_USAGE_PROJECT_RECALCULATE: &str = "drop_lease_usage_project_recalculate";

fn refresh_dedup() -> WorkerDeduplication {
    WorkerDeduplication::new(StrategyKind::UntilExecuted)
        .idempotent()
        .including_scheduled()
        .if_deduplicated(IfDeduplicated::RescheduleOnce)
}

#[derive(Debug, Default)]
pub struct RunCounter {
    refreshes: AtomicUsize,
    recalculations: AtomicUsize,
    waited_for_replicas: AtomicUsize,
}

#[derive(Debug, Serialize)]
pub struct RunCounts {
    pub refreshes: usize,
    pub recalculations: usize,
    pub waited_for_replicas: usize,
}

impl RunCounter {
    pub fn snapshot(&self) -> RunCounts {
        RunCounts {
            refreshes: self.refreshes.load(Ordering::Relaxed),
            recalculations: self.recalculations.load(Ordering::Relaxed),
            waited_for_replicas: self.waited_for_replicas.load(Ordering::Relaxed),
        }
    }

    fn note_replicas(&self, ctx: &JobContext) {
        if let Some(locations) = &ctx.dedup_wal_locations {
            tracing::debug!(jid = %ctx.jid, shards = locations.len(), "waiting for replicas");
            self.waited_for_replicas.fetch_add(1, Ordering::Relaxed);
        }
    }
}

/// Refreshes the project authorizations of one user.
pub struct AuthorizedProjectsWorker {
    pub counter: Arc<RunCounter>,
    pub work: Duration,
}

#[async_trait]
impl Worker for AuthorizedProjectsWorker {
    const CLASS: &'static str = "AuthorizedProjectsWorker";
    type Args = (i64,);

    fn deduplication() -> WorkerDeduplication {
        refresh_dedup()
    }

    async fn perform(&self, (user_id,): (i64,), ctx: JobContext) -> Result<(), JobError> {
        if user_id < 0 {
            // unknown user; nothing to refresh
            return Ok(());
        }
        self.counter.note_replicas(&ctx);
        tokio::time::sleep(self.work).await;
        self.counter.refreshes.fetch_add(1, Ordering::Relaxed);
        tracing::info!(user_id, jid = %ctx.jid, "authorizations refreshed");
        Ok(())
    }
}

/// Recalculates who may access one project.
pub struct ProjectRecalculateWorker {
    pub counter: Arc<RunCounter>,
    pub work: Duration,
}

impl ProjectRecalculateWorker {
    fn lock_key(project_id: i64) -> String {
        format!("project_recalculate/projects/{project_id}")
    }

    async fn recalculate(&self, project_id: i64) {
        tokio::time::sleep(self.work).await;
        self.counter.recalculations.fetch_add(1, Ordering::Relaxed);
        tracing::info!(project_id, "project authorizations recalculated");
    }
}

#[async_trait]
impl Worker for ProjectRecalculateWorker {
    const CLASS: &'static str = "ProjectRecalculateWorker";
    type Args = (i64,);

    fn deduplication() -> WorkerDeduplication {
        refresh_dedup()
    }

    async fn perform(&self, (project_id,): (i64,), ctx: JobContext) -> Result<(), JobError> {
        self.counter.note_replicas(&ctx);
        if ctx.feature_enabled(DROP_LEASE_USAGE_PROJECT_RECALCULATE) {
            self.recalculate(project_id).await;
            return Ok(());
        }
        ctx.in_lock(&Self::lock_key(project_id), Duration::from_secs(10), || {
            self.recalculate(project_id)
        })
        .await?;
        Ok(())
    }
}
