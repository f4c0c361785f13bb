//! Queue module: job state, retry policy, and the in-memory queue.
//!
//! The harness pushes payloads here once a strategy lets them through; workers
//! lease them back out.

mod memory;
mod record;
mod retry;
mod state;

pub use memory::InMemoryQueue;
pub use record::JobRecord;
pub use retry::RetryPolicy;
pub use state::JobState;

use async_trait::async_trait;

use crate::domain::{DedupError, JobError, JobPayload};
use crate::observability::QueueCounts;

/// A leased job. The worker owns it and must either `ack` or `fail`.
///
/// Design intent:
/// - Queue manages state transitions (Queued -> Running -> ...).
/// - The worker runs the job and reports the result.
#[async_trait]
pub trait JobLease: Send {
    fn payload(&self) -> &JobPayload;

    /// Attempts so far, including this one.
    fn attempts(&self) -> u32;

    /// A failure now will not be retried.
    fn is_final_attempt(&self) -> bool;

    /// Mark success.
    async fn ack(self: Box<Self>) -> Result<(), DedupError>;

    /// Mark failure (queue decides retry/dead policy).
    async fn fail(self: Box<Self>, error: JobError) -> Result<(), DedupError>;
}

/// Queue port (interface).
#[async_trait]
pub trait Queue: Send + Sync {
    /// Push a job; a payload with a future `at` waits until then.
    async fn push(&self, payload: JobPayload) -> Result<(), DedupError>;

    /// Lease one ready job (waits until available, or returns None if shutdown).
    async fn lease(&self) -> Option<Box<dyn JobLease>>;

    async fn counts_by_state(&self) -> Result<QueueCounts, DedupError>;
}
