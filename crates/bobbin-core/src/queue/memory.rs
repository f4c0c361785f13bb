//! In-memory queue implementation.

use std::collections::{BinaryHeap, HashMap, VecDeque};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{Mutex, Notify};
use tokio::time::Instant;

use super::{JobLease, JobRecord, JobState, Queue, RetryPolicy};
use crate::domain::{DedupError, Jid, JobError, JobPayload};
use crate::observability::QueueCounts;
use crate::ports::Clock;

/// Timer heap entry. Reverse ordering so BinaryHeap acts as a min-heap (earliest first).
#[derive(Debug, Clone, PartialEq, Eq)]
struct ScheduledJob {
    next_run_at: Instant,
    jid: Jid,
}

impl PartialOrd for ScheduledJob {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for ScheduledJob {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        other.next_run_at.cmp(&self.next_run_at)
    }
}

struct InMemoryQueueState {
    records: HashMap<Jid, JobRecord>,
    ready: VecDeque<Jid>,
    scheduled: BinaryHeap<ScheduledJob>,
    retry_policy: RetryPolicy,
}

impl InMemoryQueueState {
    fn new(retry_policy: RetryPolicy) -> Self {
        Self {
            records: HashMap::new(),
            ready: VecDeque::new(),
            scheduled: BinaryHeap::new(),
            retry_policy,
        }
    }

    /// Move jobs whose time has come from the timer heap to the ready queue.
    fn promote_scheduled(&mut self) {
        let now = Instant::now();
        while let Some(entry) = self.scheduled.peek() {
            if entry.next_run_at > now {
                break;
            }
            let jid = entry.jid;
            self.scheduled.pop();
            if let Some(record) = self.records.get_mut(&jid)
                && record.state.is_delayed()
            {
                record.requeue();
                self.ready.push_back(jid);
            }
        }
    }

    fn counts_by_state(&self) -> QueueCounts {
        let mut counts = QueueCounts::default();
        for record in self.records.values() {
            match record.state {
                JobState::Scheduled => counts.scheduled += 1,
                JobState::Queued => counts.queued += 1,
                JobState::Running => counts.running += 1,
                JobState::Succeeded => counts.succeeded += 1,
                JobState::RetryScheduled => counts.retry_scheduled += 1,
                JobState::Dead => counts.dead += 1,
            }
        }
        counts
    }
}

pub struct InMemoryQueue {
    state: Arc<Mutex<InMemoryQueueState>>,
    notify: Arc<Notify>,
    clock: Arc<dyn Clock>,
}

impl InMemoryQueue {
    pub fn new(retry_policy: RetryPolicy, clock: Arc<dyn Clock>) -> Self {
        Self {
            state: Arc::new(Mutex::new(InMemoryQueueState::new(retry_policy))),
            notify: Arc::new(Notify::new()),
            clock,
        }
    }

    /// Snapshot of one job (for status views and tests).
    pub async fn record(&self, jid: Jid) -> Option<JobRecord> {
        self.state.lock().await.records.get(&jid).cloned()
    }

    /// All payloads ever pushed, in no particular order.
    pub async fn payloads(&self) -> Vec<JobPayload> {
        let state = self.state.lock().await;
        state.records.values().map(|r| r.payload.clone()).collect()
    }
}

#[async_trait]
impl Queue for InMemoryQueue {
    async fn push(&self, payload: JobPayload) -> Result<(), DedupError> {
        let delay = payload
            .at
            .and_then(|at| (at - self.clock.now()).to_std().ok())
            .filter(|delay| !delay.is_zero());

        let mut state = self.state.lock().await;
        let jid = payload.jid;
        if state.records.contains_key(&jid) {
            return Err(DedupError::Queue(format!("{jid} is already queued")));
        }
        let max_attempts = state.retry_policy.max_attempts;

        match delay {
            Some(delay) => {
                let next_run_at = Instant::now() + delay;
                state
                    .records
                    .insert(jid, JobRecord::scheduled(payload, max_attempts, next_run_at));
                state.scheduled.push(ScheduledJob { next_run_at, jid });
            }
            None => {
                state.records.insert(jid, JobRecord::new(payload, max_attempts));
                state.ready.push_back(jid);
            }
        }

        // Notify outside the lock
        drop(state);
        self.notify.notify_one();
        Ok(())
    }

    async fn lease(&self) -> Option<Box<dyn JobLease>> {
        loop {
            let next_wake = {
                let mut state = self.state.lock().await;
                state.promote_scheduled();

                if let Some(jid) = state.ready.pop_front()
                    && let Some(record) = state.records.get_mut(&jid)
                {
                    record.start_attempt();
                    let lease = InMemoryLease {
                        payload: record.payload.clone(),
                        attempts: record.attempts,
                        final_attempt: record.is_final_attempt(),
                        queue: Arc::clone(&self.state),
                        notify: Arc::clone(&self.notify),
                    };
                    return Some(Box::new(lease));
                }

                state.scheduled.peek().map(|entry| entry.next_run_at)
            };

            // Wait for a push OR the next scheduled job
            if let Some(wake_time) = next_wake {
                tokio::select! {
                    _ = self.notify.notified() => {},
                    _ = tokio::time::sleep_until(wake_time) => {},
                }
            } else {
                self.notify.notified().await;
            }
        }
    }

    async fn counts_by_state(&self) -> Result<QueueCounts, DedupError> {
        Ok(self.state.lock().await.counts_by_state())
    }
}

struct InMemoryLease {
    payload: JobPayload,
    attempts: u32,
    final_attempt: bool,
    queue: Arc<Mutex<InMemoryQueueState>>,
    notify: Arc<Notify>,
}

#[async_trait]
impl JobLease for InMemoryLease {
    fn payload(&self) -> &JobPayload {
        &self.payload
    }

    fn attempts(&self) -> u32 {
        self.attempts
    }

    fn is_final_attempt(&self) -> bool {
        self.final_attempt
    }

    async fn ack(self: Box<Self>) -> Result<(), DedupError> {
        let mut state = self.queue.lock().await;
        if let Some(record) = state.records.get_mut(&self.payload.jid) {
            record.mark_succeeded();
        }
        Ok(())
    }

    async fn fail(self: Box<Self>, error: JobError) -> Result<(), DedupError> {
        let should_notify = {
            let mut state = self.queue.lock().await;
            let retry_policy = state.retry_policy.clone();
            let jid = self.payload.jid;
            let Some(record) = state.records.get_mut(&jid) else {
                return Ok(());
            };

            if record.is_final_attempt() || !error.is_retryable() {
                tracing::warn!(
                    %jid,
                    class = %self.payload.class,
                    attempts = record.attempts,
                    error = %error,
                    "job is dead"
                );
                record.mark_dead(error.to_string());
                false
            } else {
                let delay = retry_policy.next_delay(record.attempts);
                let next_run_at = Instant::now() + delay;
                tracing::info!(
                    %jid,
                    class = %self.payload.class,
                    attempts = record.attempts,
                    delay_secs = delay.as_secs(),
                    error = %error,
                    "retry scheduled"
                );
                record.schedule_retry(next_run_at, error.to_string());
                state.scheduled.push(ScheduledJob { next_run_at, jid });
                true
            }
        }; // Lock released here

        if should_notify {
            self.notify.notify_one();
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ports::FixedClock;
    use crate::testing::{now, payload};
    use chrono::Duration as ChronoDuration;
    use std::time::Duration;

    fn queue() -> (InMemoryQueue, Arc<FixedClock>) {
        let clock = Arc::new(FixedClock::new(now()));
        let policy = RetryPolicy {
            max_attempts: 2,
            ..RetryPolicy::default()
        };
        (InMemoryQueue::new(policy, clock.clone()), clock)
    }

    #[tokio::test]
    async fn push_and_counts() {
        let (queue, _) = queue();
        queue.push(payload("Hello", 1)).await.unwrap();

        let counts = queue.counts_by_state().await.unwrap();
        assert_eq!(counts.queued, 1);
        assert_eq!(counts.running, 0);
    }

    #[tokio::test]
    async fn same_jid_cannot_be_pushed_twice() {
        let (queue, _) = queue();
        let p = payload("Hello", 1);
        queue.push(p.clone()).await.unwrap();

        assert!(matches!(queue.push(p).await, Err(DedupError::Queue(_))));
    }

    #[tokio::test]
    async fn lease_then_ack() {
        let (queue, _) = queue();
        let p = payload("Hello", 1);
        queue.push(p.clone()).await.unwrap();

        let lease = tokio::time::timeout(Duration::from_millis(100), queue.lease())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(lease.payload().jid, p.jid);
        assert_eq!(lease.attempts(), 1);
        assert!(!lease.is_final_attempt());
        assert_eq!(queue.counts_by_state().await.unwrap().running, 1);

        lease.ack().await.unwrap();
        let counts = queue.counts_by_state().await.unwrap();
        assert_eq!(counts.succeeded, 1);
        assert_eq!(counts.running, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn delayed_jobs_wait_for_their_time() {
        let (queue, clock) = queue();
        let p = payload("Hello", 1).scheduled_at(clock.now() + ChronoDuration::seconds(30));
        queue.push(p.clone()).await.unwrap();
        assert_eq!(queue.counts_by_state().await.unwrap().scheduled, 1);

        let early = tokio::time::timeout(Duration::from_secs(29), queue.lease()).await;
        assert!(early.is_err());

        let lease = tokio::time::timeout(Duration::from_secs(2), queue.lease())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(lease.payload().jid, p.jid);
    }

    #[tokio::test]
    async fn past_schedule_times_run_now() {
        let (queue, clock) = queue();
        queue
            .push(payload("Hello", 1).scheduled_at(clock.now() - ChronoDuration::seconds(5)))
            .await
            .unwrap();
        assert_eq!(queue.counts_by_state().await.unwrap().queued, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn failures_retry_with_backoff_then_die() {
        let (queue, _) = queue();
        let p = payload("Hello", 1);
        queue.push(p.clone()).await.unwrap();

        let lease = queue.lease().await.unwrap();
        lease.fail(JobError::transient("boom")).await.unwrap();
        let record = queue.record(p.jid).await.unwrap();
        assert_eq!(record.state, JobState::RetryScheduled);
        assert_eq!(record.last_error.as_deref(), Some("JobError (kind: Transient): boom"));

        let lease = queue.lease().await.unwrap();
        assert_eq!(lease.attempts(), 2);
        assert!(lease.is_final_attempt());
        lease.fail(JobError::transient("boom")).await.unwrap();

        assert_eq!(queue.record(p.jid).await.unwrap().state, JobState::Dead);
    }

    #[tokio::test]
    async fn permanent_errors_are_not_retried() {
        let (queue, _) = queue();
        let p = payload("Hello", 1);
        queue.push(p.clone()).await.unwrap();

        let lease = queue.lease().await.unwrap();
        lease.fail(JobError::permanent("gone")).await.unwrap();

        let record = queue.record(p.jid).await.unwrap();
        assert_eq!(record.state, JobState::Dead);
        assert_eq!(record.attempts, 1);
    }
}
