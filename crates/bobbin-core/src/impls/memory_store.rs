//! InMemoryIdempotencyStore / InMemoryLeaseStore - 開発・テスト用の store
//!
//! # 実装詳細
//! - tokio の Mutex 1 本で HashMap を守るので、各操作はそのままアトミック
//! - 期限切れは Clock で判定し、読むときに掃除する（バックグラウンドの GC は持たない）

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use tokio::sync::Mutex;

use crate::domain::{DedupError, IdempotencyCookie, IdempotencyKey, LeaseToken, WalLocations};
use crate::ports::{Clock, IdempotencyStore, LeaseStore};

#[derive(Debug, Clone)]
struct Expiring<T> {
    value: T,
    expires_at: DateTime<Utc>,
}

fn expiry(now: DateTime<Utc>, ttl: Duration) -> DateTime<Utc> {
    now + ChronoDuration::from_std(ttl).unwrap_or(ChronoDuration::MAX)
}

/// Live entry under `key`, dropping it first if it has expired.
fn live<'a, T>(
    entries: &'a mut HashMap<String, Expiring<T>>,
    key: &str,
    now: DateTime<Utc>,
) -> Option<&'a mut Expiring<T>> {
    if entries.get(key).is_some_and(|e| e.expires_at <= now) {
        entries.remove(key);
    }
    entries.get_mut(key)
}

pub struct InMemoryIdempotencyStore<C> {
    entries: Mutex<HashMap<String, Expiring<IdempotencyCookie>>>,
    clock: C,
}

impl<C: Clock> InMemoryIdempotencyStore<C> {
    pub fn new(clock: C) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            clock,
        }
    }

    /// Remaining TTL of `key` (for tests and diagnostics).
    pub async fn ttl(&self, key: &IdempotencyKey) -> Option<Duration> {
        let now = self.clock.now();
        let mut entries = self.entries.lock().await;
        live(&mut entries, key.as_str(), now).and_then(|e| (e.expires_at - now).to_std().ok())
    }
}

#[async_trait]
impl<C: Clock> IdempotencyStore for InMemoryIdempotencyStore<C> {
    async fn check(
        &self,
        key: &IdempotencyKey,
        cookie: &IdempotencyCookie,
        ttl: Duration,
    ) -> Result<IdempotencyCookie, DedupError> {
        let now = self.clock.now();
        let mut entries = self.entries.lock().await;
        if let Some(existing) = live(&mut entries, key.as_str(), now) {
            return Ok(existing.value.clone());
        }
        entries.insert(
            key.as_str().to_string(),
            Expiring {
                value: cookie.clone(),
                expires_at: expiry(now, ttl),
            },
        );
        Ok(cookie.clone())
    }

    async fn get(&self, key: &IdempotencyKey) -> Result<Option<IdempotencyCookie>, DedupError> {
        let now = self.clock.now();
        let mut entries = self.entries.lock().await;
        Ok(live(&mut entries, key.as_str(), now).map(|e| e.value.clone()))
    }

    async fn update_wal_locations(
        &self,
        key: &IdempotencyKey,
        locations: &WalLocations,
    ) -> Result<(), DedupError> {
        let now = self.clock.now();
        let mut entries = self.entries.lock().await;
        if let Some(entry) = live(&mut entries, key.as_str(), now) {
            entry.value.wal_locations.merge_latest(locations);
        }
        Ok(())
    }

    async fn set_deduplicated(&self, key: &IdempotencyKey) -> Result<(), DedupError> {
        let now = self.clock.now();
        let mut entries = self.entries.lock().await;
        if let Some(entry) = live(&mut entries, key.as_str(), now) {
            entry.value.deduplicated = true;
        }
        Ok(())
    }

    async fn delete(&self, key: &IdempotencyKey) -> Result<(), DedupError> {
        self.entries.lock().await.remove(key.as_str());
        Ok(())
    }
}

pub struct InMemoryLeaseStore<C> {
    leases: Mutex<HashMap<String, Expiring<LeaseToken>>>,
    clock: C,
}

impl<C: Clock> InMemoryLeaseStore<C> {
    pub fn new(clock: C) -> Self {
        Self {
            leases: Mutex::new(HashMap::new()),
            clock,
        }
    }
}

#[async_trait]
impl<C: Clock> LeaseStore for InMemoryLeaseStore<C> {
    async fn try_obtain(
        &self,
        key: &str,
        token: LeaseToken,
        ttl: Duration,
    ) -> Result<bool, DedupError> {
        let now = self.clock.now();
        let mut leases = self.leases.lock().await;
        if live(&mut leases, key, now).is_some() {
            return Ok(false);
        }
        leases.insert(
            key.to_string(),
            Expiring {
                value: token,
                expires_at: expiry(now, ttl),
            },
        );
        Ok(true)
    }

    async fn release(&self, key: &str, token: LeaseToken) -> Result<bool, DedupError> {
        let now = self.clock.now();
        let mut leases = self.leases.lock().await;
        let owned = live(&mut leases, key, now).is_some_and(|e| e.value == token);
        if owned {
            leases.remove(key);
        }
        Ok(owned)
    }
}
