//! JobContext - 実行中のワーカー本体に渡す情報
//!
//! 重複排除が残したマーク（`duplicate-of`, `dedup_wal_locations`）と、
//! 本体が自前で排他したいとき用の lease store を持ちます。

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use crate::dedup::{DedupContext, LockSettings, in_lock};
use crate::domain::{DedupError, Jid, JobPayload, WalLocations, WorkerClass};
use crate::ports::{FeatureFlags, IdGenerator, LeaseStore};

#[derive(Clone)]
pub struct JobContext {
    pub jid: Jid,
    pub class: WorkerClass,
    pub duplicate_of: Option<Jid>,
    /// Replica positions the body should wait for before reading.
    pub dedup_wal_locations: Option<WalLocations>,
    pub final_attempt: bool,
    leases: Arc<dyn LeaseStore>,
    ids: Arc<dyn IdGenerator>,
    flags: Arc<dyn FeatureFlags>,
    lock: LockSettings,
}

impl JobContext {
    pub(crate) fn new(payload: &JobPayload, final_attempt: bool, dedup: &DedupContext) -> Self {
        Self {
            jid: payload.jid,
            class: payload.class.clone(),
            duplicate_of: payload.duplicate_of,
            dedup_wal_locations: payload.dedup_wal_locations.clone(),
            final_attempt,
            leases: Arc::clone(&dedup.leases),
            ids: Arc::clone(&dedup.ids),
            flags: Arc::clone(&dedup.flags),
            lock: dedup.settings.lock,
        }
    }

    pub fn feature_enabled(&self, name: &str) -> bool {
        self.flags.enabled(name)
    }

    /// Run `f` under an exclusive lease on `key` held for at most `ttl`.
    ///
    /// Waits with the configured sleep/timeout; `LockTimeout` when someone else keeps it.
    pub async fn in_lock<T, F, Fut>(&self, key: &str, ttl: Duration, f: F) -> Result<T, DedupError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
    {
        let settings = LockSettings { ttl, ..self.lock };
        let token = self.ids.generate_lease_token();
        in_lock(self.leases.as_ref(), token, key, settings, f).await
    }
}
