//! WorkerGroup - lease → perform → ack / fail のループ
//!
//! リトライするか dead にするかは queue が決めます。ワーカーは結果を報告するだけです。

use std::sync::Arc;

use tokio::sync::watch;
use tokio::task::JoinHandle;

use super::Harness;
use crate::domain::Completion;
use crate::queue::Queue;

/// Worker group handle.
/// - `request_shutdown()` で新しい lease を取らなくなる
/// - `shutdown_and_join()` で実行中のジョブが終わるまで待てる
pub struct WorkerGroup {
    shutdown_tx: watch::Sender<bool>,
    joins: Vec<JoinHandle<()>>,
}

impl WorkerGroup {
    /// Spawn `n` workers.
    pub fn spawn(n: usize, queue: Arc<dyn Queue>, harness: Arc<Harness>) -> Self {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let mut joins = Vec::with_capacity(n);
        for worker_id in 0..n {
            let q = Arc::clone(&queue);
            let h = Arc::clone(&harness);
            let mut rx = shutdown_rx.clone();

            let join = tokio::spawn(async move {
                worker_loop(worker_id, q, h, &mut rx).await;
            });
            joins.push(join);
        }

        Self { shutdown_tx, joins }
    }

    /// In-flight jobs are not cancelled; workers just stop leasing.
    pub fn request_shutdown(&self) {
        // receivers may already be dropped
        let _ = self.shutdown_tx.send(true);
    }

    pub async fn shutdown_and_join(self) {
        self.request_shutdown();
        for j in self.joins {
            if let Err(err) = j.await {
                tracing::error!(error = %err, "worker task panicked");
            }
        }
    }
}

async fn worker_loop(
    worker_id: usize,
    queue: Arc<dyn Queue>,
    harness: Arc<Harness>,
    shutdown_rx: &mut watch::Receiver<bool>,
) {
    tracing::debug!(worker_id, "worker started");
    loop {
        if *shutdown_rx.borrow() {
            break;
        }

        // lease は待つ可能性があるので shutdown と競合させる
        let lease = tokio::select! {
            _ = shutdown_rx.changed() => continue,
            lease = queue.lease() => lease,
        };

        let Some(lease) = lease else {
            tokio::task::yield_now().await;
            continue;
        };

        let payload = lease.payload().clone();
        let final_attempt = lease.is_final_attempt();
        let jid = payload.jid;
        let class = payload.class.clone();

        match harness.perform(payload, final_attempt).await {
            Ok(completion) => {
                if let Completion::Reschedule { reason, .. } = completion {
                    tracing::debug!(worker_id, %jid, %class, ?reason, "completed with reschedule");
                }
                if let Err(err) = lease.ack().await {
                    tracing::warn!(worker_id, %jid, error = %err, "ack failed");
                }
            }
            Err(err) => {
                tracing::info!(worker_id, %jid, %class, error = %err, "job failed");
                if let Err(report_err) = lease.fail(err).await {
                    tracing::warn!(worker_id, %jid, error = %report_err, "fail report failed");
                }
            }
        }
    }
    tracing::debug!(worker_id, "worker stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::HarnessBuilder;
    use crate::queue::RetryPolicy;
    use crate::testing::Fixture;
    use crate::typed::handler::test_workers::{BrokenWorker, RefreshWorker};
    use std::time::Duration;

    async fn wait_until_idle(queue: &Arc<dyn Queue>) {
        for _ in 0..200 {
            let counts = queue.counts_by_state().await.unwrap();
            if counts.queued == 0 && counts.running == 0 {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("queue never drained");
    }

    #[tokio::test(start_paused = true)]
    async fn workers_drain_the_queue() {
        let fx = Fixture::new();
        let harness = Arc::new(
            HarnessBuilder::new()
                .register(RefreshWorker::default())
                .unwrap()
                .register(BrokenWorker)
                .unwrap()
                .retry_policy(RetryPolicy {
                    max_attempts: 1,
                    ..RetryPolicy::default()
                })
                .build_with(fx.ctx.clone())
                .unwrap(),
        );

        for user_id in 0..5 {
            harness
                .perform_async::<RefreshWorker>(&(user_id,))
                .await
                .unwrap();
        }
        harness
            .perform_async::<BrokenWorker>(&"x".to_string())
            .await
            .unwrap();

        let queue = Arc::clone(harness.queue());
        let group = WorkerGroup::spawn(3, Arc::clone(&queue), Arc::clone(&harness));
        wait_until_idle(&queue).await;
        group.shutdown_and_join().await;

        let counts = queue.counts_by_state().await.unwrap();
        assert_eq!(counts.succeeded, 5);
        assert_eq!(counts.dead, 1);
    }

    #[tokio::test]
    async fn idle_workers_stop_on_shutdown() {
        let fx = Fixture::new();
        let harness = Arc::new(HarnessBuilder::new().build_with(fx.ctx.clone()).unwrap());
        let group = WorkerGroup::spawn(2, Arc::clone(harness.queue()), harness);

        tokio::time::timeout(Duration::from_secs(1), group.shutdown_and_join())
            .await
            .unwrap();
    }
}
