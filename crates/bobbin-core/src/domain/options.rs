//! Deduplication options declared by a worker class.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// What happens to the job that was already running when a duplicate is dropped.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IfDeduplicated {
    /// The duplicate is simply dropped.
    #[default]
    Drop,
    /// The duplicate is dropped, and the running job enqueues itself once more
    /// after it finishes so the dropped work is not lost.
    RescheduleOnce,
}

impl fmt::Display for IfDeduplicated {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IfDeduplicated::Drop => f.write_str("drop"),
            IfDeduplicated::RescheduleOnce => f.write_str("reschedule_once"),
        }
    }
}

/// Options recognised by the strategies.
///
/// Serialized form is what ends up in the `deduplicated` log line.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeduplicationOptions {
    /// Deduplicate delayed jobs too (the key TTL is extended by the delay).
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub including_scheduled: bool,

    #[serde(default)]
    pub if_deduplicated: IfDeduplicated,

    /// Override of the default key TTL, in seconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ttl_secs: Option<u64>,
}

impl DeduplicationOptions {
    pub fn ttl(&self) -> Option<Duration> {
        self.ttl_secs.map(Duration::from_secs)
    }
}
