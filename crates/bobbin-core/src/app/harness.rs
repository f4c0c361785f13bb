//! Harness - すべてのジョブが通る入口と出口
//!
//! - client 側 `schedule`: ワーカーの戦略に判定させ、通ったものだけキューに積む
//! - server 側 `perform`: 戦略の前後処理で本体を包み、Reschedule なら遅延付きで積み直す

use std::sync::Arc;
use std::time::Duration;

use chrono::Duration as ChronoDuration;

use crate::dedup::{DedupContext, DuplicateJob};
use crate::domain::{Completion, DedupError, Jid, JobError, JobPayload, Verdict, WorkerClass};
use crate::queue::Queue;
use crate::typed::{encode_args, JobContext, RegisteredWorker, Worker, WorkerRegistry};

/// Result of an enqueue request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnqueueOutcome {
    Enqueued(Jid),
    Dropped { duplicate_of: Jid },
}

impl EnqueueOutcome {
    pub fn is_dropped(&self) -> bool {
        matches!(self, EnqueueOutcome::Dropped { .. })
    }
}

pub struct Harness {
    registry: Arc<WorkerRegistry>,
    queue: Arc<dyn Queue>,
    dedup: DedupContext,
}

impl Harness {
    pub(crate) fn new(registry: WorkerRegistry, queue: Arc<dyn Queue>, dedup: DedupContext) -> Self {
        Self {
            registry: Arc::new(registry),
            queue,
            dedup,
        }
    }

    pub fn dedup(&self) -> &DedupContext {
        &self.dedup
    }

    pub fn queue(&self) -> &Arc<dyn Queue> {
        &self.queue
    }

    pub fn registry(&self) -> &WorkerRegistry {
        &self.registry
    }

    fn resolve(&self, class: &WorkerClass) -> Result<&RegisteredWorker, DedupError> {
        self.registry
            .get(class.as_str())
            .ok_or_else(|| DedupError::WorkerNotFound(class.to_string()))
    }

    /// Client side: ask the worker's strategy, then push or drop.
    pub async fn schedule(&self, mut payload: JobPayload) -> Result<EnqueueOutcome, DedupError> {
        let registered = self.resolve(&payload.class)?;
        let dedup = &registered.deduplication;
        let mut dj = DuplicateJob::new(&payload, dedup, &self.dedup.settings);

        match dedup.strategy.schedule(&mut dj, &mut payload, &self.dedup).await {
            Verdict::Proceed => {
                let jid = payload.jid;
                self.queue.push(payload).await?;
                tracing::debug!(%jid, class = %dj.class(), "job enqueued");
                Ok(EnqueueOutcome::Enqueued(jid))
            }
            Verdict::Drop { existing_jid } => Ok(EnqueueOutcome::Dropped {
                duplicate_of: existing_jid,
            }),
        }
    }

    /// Enqueue `W` with `args` under a fresh jid.
    pub async fn perform_async<W: Worker>(
        &self,
        args: &W::Args,
    ) -> Result<EnqueueOutcome, DedupError> {
        self.schedule(self.payload_for::<W>(args)?).await
    }

    /// Enqueue `W` to run `delay` from now.
    pub async fn perform_in<W: Worker>(
        &self,
        delay: Duration,
        args: &W::Args,
    ) -> Result<EnqueueOutcome, DedupError> {
        let at = self.run_at(delay);
        self.schedule(self.payload_for::<W>(args)?.scheduled_at(at))
            .await
    }

    fn payload_for<W: Worker>(&self, args: &W::Args) -> Result<JobPayload, DedupError> {
        Ok(JobPayload::new(
            WorkerClass::new(W::CLASS),
            encode_args(args)?,
            self.dedup.ids.generate_jid(),
        ))
    }

    fn run_at(&self, delay: Duration) -> chrono::DateTime<chrono::Utc> {
        let delay = ChronoDuration::from_std(delay).unwrap_or(ChronoDuration::MAX);
        self.dedup.clock.now() + delay
    }

    /// Server side: run the registered body inside the strategy's bookkeeping.
    ///
    /// On `Reschedule` the same logical job is enqueued again (through
    /// `schedule`, so it is deduplicated like any other enqueue). A failed
    /// re-enqueue is logged; the completion still stands.
    pub async fn perform(
        &self,
        mut payload: JobPayload,
        final_attempt: bool,
    ) -> Result<Completion, JobError> {
        let registered = self.resolve(&payload.class)?;
        let dedup = &registered.deduplication;
        let worker = Arc::clone(&registered.worker);
        let ctx = &self.dedup;
        let mut dj = DuplicateJob::new(&payload, dedup, &ctx.settings);

        let completion = dedup
            .strategy
            .perform(&mut dj, &mut payload, ctx, final_attempt, |job| async move {
                let job_ctx = JobContext::new(&job, final_attempt, ctx);
                worker.perform_dyn(job.args, job_ctx).await
            })
            .await?;

        if let Completion::Reschedule { delay, reason } = &completion {
            let next = payload
                .respawn(ctx.ids.generate_jid())
                .scheduled_at(self.run_at(*delay));
            // 本体はもう成功しているので、再投入の失敗でジョブを失敗扱いにしない
            match self.schedule(next).await {
                Ok(outcome) => tracing::info!(
                    jid = %payload.jid,
                    class = %payload.class,
                    ?reason,
                    ?outcome,
                    delay_ms = delay.as_millis() as u64,
                    "job rescheduled"
                ),
                Err(err) => tracing::warn!(
                    jid = %payload.jid,
                    class = %payload.class,
                    ?reason,
                    error = %err,
                    "failed to re-enqueue rescheduled job"
                ),
            }
        }
        Ok(completion)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::HarnessBuilder;
    use crate::dedup::{StrategyKind, WorkerDeduplication};
    use crate::domain::{ErrorKind, RescheduleReason, WalLocations};
    use crate::ports::DedupEventKind;
    use crate::testing::{payload, Fixture};
    use crate::typed::handler::test_workers::{BrokenWorker, RefreshWorker};
    use crate::observability::QueueCounts;
    use crate::queue::{InMemoryQueue, JobLease, RetryPolicy};
    use async_trait::async_trait;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn harness(fx: &Fixture) -> Harness {
        HarnessBuilder::new()
            .register(RefreshWorker::default())
            .unwrap()
            .register(BrokenWorker)
            .unwrap()
            .build_with(fx.ctx.clone())
            .unwrap()
    }

    #[tokio::test]
    async fn first_enqueue_goes_to_the_queue_and_the_second_is_dropped() {
        let fx = Fixture::new();
        let harness = harness(&fx);

        let first = harness.perform_async::<RefreshWorker>(&(7,)).await.unwrap();
        let second = harness.perform_async::<RefreshWorker>(&(7,)).await.unwrap();
        let other = harness.perform_async::<RefreshWorker>(&(8,)).await.unwrap();

        let EnqueueOutcome::Enqueued(first_jid) = first else {
            panic!("expected enqueue, got {first:?}");
        };
        assert_eq!(second, EnqueueOutcome::Dropped { duplicate_of: first_jid });
        assert!(!other.is_dropped());
        assert_eq!(harness.queue().counts_by_state().await.unwrap().queued, 2);
        assert_eq!(fx.events.count(DedupEventKind::Deduplicated), 1);
    }

    #[tokio::test]
    async fn unknown_classes_are_rejected() {
        let fx = Fixture::new();
        let harness = harness(&fx);

        let err = harness.schedule(payload("Nope", 1)).await.unwrap_err();
        assert!(matches!(err, DedupError::WorkerNotFound(c) if c == "Nope"));

        let err = harness.perform(payload("Nope", 1), false).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Permanent);
    }

    #[tokio::test]
    async fn perform_in_sets_the_schedule_time() {
        let fx = Fixture::new();
        let harness = harness(&fx);

        harness
            .perform_in::<BrokenWorker>(Duration::from_secs(30), &"x".to_string())
            .await
            .unwrap();

        let counts = harness.queue().counts_by_state().await.unwrap();
        assert_eq!(counts.scheduled, 1);
    }

    #[tokio::test]
    async fn reschedule_once_end_to_end() {
        let fx = Fixture::new();
        let harness = harness(&fx);

        // Original claims the key and is leased by a worker.
        harness.perform_async::<RefreshWorker>(&(7,)).await.unwrap();
        let lease = harness.queue().lease().await.unwrap();
        let original = lease.payload().clone();

        // A duplicate arrives while it runs, with a newer replica position.
        let locations: WalLocations = [("main", "0/D525E3A8")].into_iter().collect();
        let duplicate = original
            .respawn(fx.ctx.ids.generate_jid())
            .with_wal_locations(locations);
        let outcome = harness.schedule(duplicate).await.unwrap();
        assert_eq!(outcome, EnqueueOutcome::Dropped { duplicate_of: original.jid });

        let completion = harness.perform(original.clone(), false).await.unwrap();
        lease.ack().await.unwrap();

        assert!(matches!(
            completion,
            Completion::Reschedule {
                reason: RescheduleReason::DeduplicatedWhileRunning,
                ..
            }
        ));
        let counts = harness.queue().counts_by_state().await.unwrap();
        assert_eq!(counts.succeeded, 1);
        assert_eq!(counts.scheduled, 1);
        assert_eq!(fx.events.count(DedupEventKind::Rescheduled), 1);
    }

    /// Accepts the first `allowance` pushes, then rejects every one after.
    struct FlakyQueue {
        inner: InMemoryQueue,
        allowance: AtomicUsize,
    }

    #[async_trait]
    impl Queue for FlakyQueue {
        async fn push(&self, payload: JobPayload) -> Result<(), DedupError> {
            let left = self
                .allowance
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1));
            if left.is_err() {
                return Err(DedupError::Queue("queue unavailable".into()));
            }
            self.inner.push(payload).await
        }

        async fn lease(&self) -> Option<Box<dyn JobLease>> {
            self.inner.lease().await
        }

        async fn counts_by_state(&self) -> Result<QueueCounts, DedupError> {
            self.inner.counts_by_state().await
        }
    }

    #[tokio::test]
    async fn failed_re_enqueue_does_not_fail_the_completed_job() {
        let fx = Fixture::new();
        let queue = Arc::new(FlakyQueue {
            inner: InMemoryQueue::new(RetryPolicy::default(), fx.ctx.clock.clone()),
            allowance: AtomicUsize::new(1),
        });
        let harness = HarnessBuilder::new()
            .register(RefreshWorker::default())
            .unwrap()
            .queue(queue.clone())
            .build_with(fx.ctx.clone())
            .unwrap();

        harness.perform_async::<RefreshWorker>(&(7,)).await.unwrap();
        let lease = harness.queue().lease().await.unwrap();
        let original = lease.payload().clone();
        let duplicate = original.respawn(fx.ctx.ids.generate_jid());
        assert!(harness.schedule(duplicate).await.unwrap().is_dropped());

        // 再投入は拒否されるが、本体の成功はそのまま返る
        let completion = harness.perform(original, false).await.unwrap();
        assert!(matches!(
            completion,
            Completion::Reschedule {
                reason: RescheduleReason::DeduplicatedWhileRunning,
                ..
            }
        ));
        lease.ack().await.unwrap();

        let counts = queue.counts_by_state().await.unwrap();
        assert_eq!(counts.succeeded, 1);
        assert_eq!(counts.scheduled, 0);
    }

    #[tokio::test]
    async fn failing_bodies_surface_their_error() {
        let fx = Fixture::new();
        let harness = harness(&fx);

        let mut broken = payload(BrokenWorker::CLASS, 1);
        broken.args = vec![serde_json::json!("x")];
        let err = harness.perform(broken, false).await.unwrap_err();
        assert_eq!(err, JobError::permanent("broken"));
    }

    struct WalReader {
        seen: Arc<Mutex<Option<WalLocations>>>,
    }

    #[async_trait]
    impl Worker for WalReader {
        const CLASS: &'static str = "WalReader";
        type Args = i64;

        fn deduplication() -> WorkerDeduplication {
            WorkerDeduplication::new(StrategyKind::UntilExecuting).idempotent()
        }

        async fn perform(&self, _id: i64, ctx: JobContext) -> Result<(), JobError> {
            *self.seen.lock().unwrap() = ctx.dedup_wal_locations.clone();
            Ok(())
        }
    }

    #[tokio::test]
    async fn the_body_sees_wal_locations_of_dropped_duplicates() {
        let fx = Fixture::new();
        let seen = Arc::new(Mutex::new(None));
        let harness = HarnessBuilder::new()
            .register(WalReader { seen: seen.clone() })
            .unwrap()
            .build_with(fx.ctx.clone())
            .unwrap();

        harness.perform_async::<WalReader>(&1).await.unwrap();
        let lease = harness.queue().lease().await.unwrap();
        let locations: WalLocations = [("main", "0/1000"), ("ci", "0/2000")].into_iter().collect();
        let duplicate = lease
            .payload()
            .respawn(fx.ctx.ids.generate_jid())
            .with_wal_locations(locations.clone());
        assert!(harness.schedule(duplicate).await.unwrap().is_dropped());

        harness.perform(lease.payload().clone(), false).await.unwrap();

        assert_eq!(*seen.lock().unwrap(), Some(locations));
    }
}
