//! テスト用の共通部品

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use serde_json::json;
use ulid::Ulid;

use crate::dedup::{DedupContext, DedupSettings};
use crate::domain::{
    DedupError, IdempotencyCookie, IdempotencyKey, Jid, JobPayload, LeaseToken, WalLocations,
    WorkerClass,
};
use crate::impls::{
    InMemoryIdempotencyStore, InMemoryLeaseStore, InstrumentedStore, MemoryEventSink,
    StaticFeatureFlags,
};
use crate::ports::{FixedClock, IdempotencyStore, LeaseStore, UlidGenerator};

pub(crate) fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()
}

pub(crate) fn payload(class: &str, arg: i64) -> JobPayload {
    JobPayload::new(WorkerClass::new(class), vec![json!(arg)], Jid::from_ulid(Ulid::new()))
}

/// Store whose backend is always down.
pub(crate) struct FailingStore;

fn unavailable() -> DedupError {
    DedupError::StoreUnavailable("connection refused".into())
}

#[async_trait]
impl IdempotencyStore for FailingStore {
    async fn check(
        &self,
        _key: &IdempotencyKey,
        _cookie: &IdempotencyCookie,
        _ttl: Duration,
    ) -> Result<IdempotencyCookie, DedupError> {
        Err(unavailable())
    }

    async fn get(&self, _key: &IdempotencyKey) -> Result<Option<IdempotencyCookie>, DedupError> {
        Err(unavailable())
    }

    async fn update_wal_locations(
        &self,
        _key: &IdempotencyKey,
        _locations: &WalLocations,
    ) -> Result<(), DedupError> {
        Err(unavailable())
    }

    async fn set_deduplicated(&self, _key: &IdempotencyKey) -> Result<(), DedupError> {
        Err(unavailable())
    }

    async fn delete(&self, _key: &IdempotencyKey) -> Result<(), DedupError> {
        Err(unavailable())
    }
}

/// In-memory collaborators wired into a `DedupContext`, with handles kept for assertions.
pub(crate) struct Fixture {
    pub ctx: DedupContext,
    pub store: Arc<InstrumentedStore<Arc<dyn IdempotencyStore>>>,
    pub leases: Arc<InMemoryLeaseStore<Arc<FixedClock>>>,
    pub clock: Arc<FixedClock>,
    pub flags: Arc<StaticFeatureFlags>,
    pub events: Arc<MemoryEventSink>,
}

impl Fixture {
    pub fn new() -> Self {
        let clock = Arc::new(FixedClock::new(now()));
        Self::build(Arc::new(InMemoryIdempotencyStore::new(clock.clone())), clock)
    }

    pub fn with_failing_store() -> Self {
        Self::build(Arc::new(FailingStore), Arc::new(FixedClock::new(now())))
    }

    fn build(backend: Arc<dyn IdempotencyStore>, clock: Arc<FixedClock>) -> Self {
        let store = Arc::new(InstrumentedStore::new(backend));
        let leases = Arc::new(InMemoryLeaseStore::new(clock.clone()));
        let flags = Arc::new(StaticFeatureFlags::new());
        let events = Arc::new(MemoryEventSink::new());
        let ctx = DedupContext {
            store: store.clone(),
            leases: leases.clone(),
            clock: clock.clone(),
            flags: flags.clone(),
            events: events.clone(),
            ids: Arc::new(UlidGenerator::new(clock.clone())),
            settings: DedupSettings::default(),
        };
        Self {
            ctx,
            store,
            leases,
            clock,
            flags,
            events,
        }
    }

    /// Take `key` for somebody else; the fixed clock keeps it from expiring.
    pub async fn hold_lease(&self, key: &str) {
        let taken = self
            .leases
            .try_obtain(key, LeaseToken::from_ulid(Ulid::new()), Duration::from_secs(60))
            .await
            .unwrap();
        assert!(taken);
    }
}
