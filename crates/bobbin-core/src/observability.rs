//! Observability - ログ初期化とキューの集計ビュー

use serde::{Deserialize, Serialize};
use tracing_subscriber::EnvFilter;

/// Initialize JSON structured logging.
///
/// Filter comes from `RUST_LOG`, defaulting to `info`. Calling twice is a no-op.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .json()
        .with_timer(tracing_subscriber::fmt::time::SystemTime)
        .with_target(false)
        .try_init();
}

/// Number of jobs per state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueCounts {
    pub scheduled: usize,
    pub queued: usize,
    pub running: usize,
    pub succeeded: usize,
    pub retry_scheduled: usize,
    pub dead: usize,
}

impl QueueCounts {
    /// Jobs that have not reached a terminal state yet.
    pub fn in_flight(&self) -> usize {
        self.scheduled + self.queued + self.running + self.retry_scheduled
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn in_flight_excludes_terminal_states() {
        let counts = QueueCounts {
            scheduled: 1,
            queued: 2,
            running: 3,
            succeeded: 10,
            retry_scheduled: 4,
            dead: 5,
        };
        assert_eq!(counts.in_flight(), 10);
    }

    #[test]
    fn init_tracing_twice_is_harmless() {
        init_tracing();
        init_tracing();
    }
}
