use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

use super::{Jid, WalLocations};

pub const DEFAULT_QUEUE: &str = "default";

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WorkerClass(String);

impl WorkerClass {
    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for WorkerClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

fn default_queue() -> String {
    DEFAULT_QUEUE.to_string()
}

fn is_false(b: &bool) -> bool {
    !*b
}

/// The job hash that travels from the enqueuing side to a worker.
///
/// Field names are the wire contract: `duplicate-of` and `dedup_wal_locations`
/// are read by downstream tooling. Unknown fields are carried through untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobPayload {
    pub class: WorkerClass,

    #[serde(default)]
    pub args: Vec<Value>,

    pub jid: Jid,

    #[serde(default = "default_queue")]
    pub queue: String,

    /// Scheduled execution time; present only for delayed jobs.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub at: Option<DateTime<Utc>>,

    #[serde(default, skip_serializing_if = "is_false")]
    pub deferred: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub idempotency_key: Option<String>,

    /// Snapshot taken at enqueue time.
    #[serde(default, skip_serializing_if = "WalLocations::is_empty")]
    pub wal_locations: WalLocations,

    #[serde(
        rename = "duplicate-of",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub duplicate_of: Option<Jid>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dedup_wal_locations: Option<WalLocations>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl JobPayload {
    pub fn new(class: WorkerClass, args: Vec<Value>, jid: Jid) -> Self {
        Self {
            class,
            args,
            jid,
            queue: default_queue(),
            at: None,
            deferred: false,
            idempotency_key: None,
            wal_locations: WalLocations::new(),
            duplicate_of: None,
            dedup_wal_locations: None,
            extra: Map::new(),
        }
    }

    pub fn with_queue(mut self, queue: impl Into<String>) -> Self {
        self.queue = queue.into();
        self
    }

    pub fn scheduled_at(mut self, at: DateTime<Utc>) -> Self {
        self.at = Some(at);
        self
    }

    pub fn with_wal_locations(mut self, wal_locations: WalLocations) -> Self {
        self.wal_locations = wal_locations;
        self
    }

    /// Same class/args/queue under a fresh jid, with all dedup bookkeeping cleared.
    pub fn respawn(&self, jid: Jid) -> Self {
        let mut next = Self::new(self.class.clone(), self.args.clone(), jid).with_queue(&self.queue);
        next.idempotency_key = self.idempotency_key.clone();
        next.wal_locations = self.wal_locations.clone();
        next
    }
}
