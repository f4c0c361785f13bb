//! Job state machine for the queue.

use serde::{Deserialize, Serialize};

/// State transitions:
/// - Scheduled -> Queued (when `at` arrives)
/// - Queued -> Running -> Succeeded
/// - Queued -> Running -> RetryScheduled -> Queued (loop until max_attempts)
/// - Queued -> Running -> Dead (max_attempts exceeded or permanent error)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum JobState {
    /// Delayed job waiting for its `at`.
    Scheduled,

    /// Ready to run immediately.
    Queued,

    /// Currently being executed by a worker.
    Running,

    Succeeded,

    /// Waiting for retry (delayed due to backoff).
    RetryScheduled,

    /// Failed permanently.
    Dead,
}

impl JobState {
    pub fn is_terminal(self) -> bool {
        matches!(self, JobState::Succeeded | JobState::Dead)
    }

    /// Waiting on the timer heap.
    pub fn is_delayed(self) -> bool {
        matches!(self, JobState::Scheduled | JobState::RetryScheduled)
    }
}
