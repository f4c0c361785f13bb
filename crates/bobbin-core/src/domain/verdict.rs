//! Verdicts returned by the strategies to the execution harness.

use std::time::Duration;

use super::Jid;

/// Schedule-time decision.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    /// Hand the job to the queue.
    Proceed,

    /// Suppress the enqueue; `existing_jid` already holds the key.
    Drop { existing_jid: Jid },
}

impl Verdict {
    pub fn is_drop(&self) -> bool {
        matches!(self, Verdict::Drop { .. })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RescheduleReason {
    /// A duplicate was dropped while this job ran (`reschedule_once`).
    DeduplicatedWhileRunning,
    /// The completion lock could not be obtained.
    LockTimeout,
}

/// Perform-time result of a body that did not fail.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Completion {
    Done,

    /// Re-enqueue the same logical job after `delay`.
    Reschedule {
        delay: Duration,
        reason: RescheduleReason,
    },
}
