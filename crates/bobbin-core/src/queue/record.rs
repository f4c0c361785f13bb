//! Job record: queue metadata + payload.

use tokio::time::Instant;

use super::JobState;
use crate::domain::JobPayload;

/// Single source of truth for one queued job; the ready/scheduled
/// structures hold jids only.
#[derive(Debug, Clone)]
pub struct JobRecord {
    pub payload: JobPayload,
    pub state: JobState,

    /// Number of times this job has been executed (including current attempt if Running).
    pub attempts: u32,

    pub max_attempts: u32,

    pub last_error: Option<String>,

    /// When to run next (Scheduled / RetryScheduled).
    pub next_run_at: Option<Instant>,

    pub created_at: Instant,
    pub updated_at: Instant,
}

impl JobRecord {
    pub fn new(payload: JobPayload, max_attempts: u32) -> Self {
        let now = Instant::now();
        Self {
            payload,
            state: JobState::Queued,
            attempts: 0,
            max_attempts,
            last_error: None,
            next_run_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn scheduled(payload: JobPayload, max_attempts: u32, run_at: Instant) -> Self {
        let mut record = Self::new(payload, max_attempts);
        record.state = JobState::Scheduled;
        record.next_run_at = Some(run_at);
        record
    }

    pub fn is_final_attempt(&self) -> bool {
        self.attempts >= self.max_attempts
    }

    /// Mark as running (increment attempts).
    pub fn start_attempt(&mut self) {
        self.state = JobState::Running;
        self.attempts += 1;
        self.updated_at = Instant::now();
    }

    pub fn mark_succeeded(&mut self) {
        self.state = JobState::Succeeded;
        self.updated_at = Instant::now();
    }

    pub fn mark_dead(&mut self, error: String) {
        self.state = JobState::Dead;
        self.last_error = Some(error);
        self.updated_at = Instant::now();
    }

    /// Schedule retry with backoff.
    pub fn schedule_retry(&mut self, next_run_at: Instant, error: String) {
        self.state = JobState::RetryScheduled;
        self.next_run_at = Some(next_run_at);
        self.last_error = Some(error);
        self.updated_at = Instant::now();
    }

    /// Move from Scheduled / RetryScheduled to Queued.
    pub fn requeue(&mut self) {
        self.state = JobState::Queued;
        self.next_run_at = None;
        self.updated_at = Instant::now();
    }
}
