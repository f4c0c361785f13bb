//! InstrumentedStore - store 呼び出しの記録
//!
//! 任意の IdempotencyStore を包み、呼び出しごとに操作名・キー・TTL・所要時間を残します。
//! 値（cookie や WAL 位置）はログに流さず `<redacted>` に置き換えます。
//!
//! 詳細は直近 `MAX_RETAINED_CALLS` 件だけ保持し、集計 (`CallStats`) は全件を数え続けます。
//! テストでは「check に渡った TTL」を確かめるのにも使います。

use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::Instant;

use crate::domain::{DedupError, IdempotencyCookie, IdempotencyKey, WalLocations};
use crate::ports::IdempotencyStore;

pub const REDACTED_MARKER: &str = "<redacted>";

/// Upper bound on retained `CallDetail`s; older ones are evicted first.
pub const MAX_RETAINED_CALLS: usize = 1024;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallDetail {
    pub op: &'static str,
    pub key: String,
    pub ttl: Option<Duration>,
    pub duration: Duration,
    pub ok: bool,
}

impl CallDetail {
    /// One-line rendering with the written value scrubbed.
    pub fn command(&self) -> String {
        match (self.op, self.ttl) {
            ("check", Some(ttl)) => {
                format!("check {} {REDACTED_MARKER} ttl={}s", self.key, ttl.as_secs())
            }
            ("update_wal_locations", _) => format!("{} {} {REDACTED_MARKER}", self.op, self.key),
            (op, _) => format!("{op} {}", self.key),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CallStats {
    pub calls: usize,
    pub failures: usize,
    pub duration: Duration,
}

#[derive(Default)]
struct Recorded {
    recent: VecDeque<CallDetail>,
    stats: CallStats,
}

impl Recorded {
    fn push(&mut self, detail: CallDetail) {
        self.stats.calls += 1;
        if !detail.ok {
            self.stats.failures += 1;
        }
        self.stats.duration += detail.duration;

        if self.recent.len() == MAX_RETAINED_CALLS {
            self.recent.pop_front();
        }
        self.recent.push_back(detail);
    }
}

pub struct InstrumentedStore<S> {
    inner: S,
    recorded: Mutex<Recorded>,
}

impl<S: IdempotencyStore> InstrumentedStore<S> {
    pub fn new(inner: S) -> Self {
        Self {
            inner,
            recorded: Mutex::new(Recorded::default()),
        }
    }

    pub fn inner(&self) -> &S {
        &self.inner
    }

    /// The most recent calls, oldest first.
    pub fn calls(&self) -> Vec<CallDetail> {
        self.recorded
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .recent
            .iter()
            .cloned()
            .collect()
    }

    /// Totals since construction, including evicted calls.
    pub fn stats(&self) -> CallStats {
        self.recorded.lock().unwrap_or_else(|e| e.into_inner()).stats
    }

    fn record<T>(
        &self,
        op: &'static str,
        key: &IdempotencyKey,
        ttl: Option<Duration>,
        started: Instant,
        result: &Result<T, DedupError>,
    ) {
        let detail = CallDetail {
            op,
            key: key.as_str().to_string(),
            ttl,
            duration: started.elapsed(),
            ok: result.is_ok(),
        };
        tracing::debug!(
            command = %detail.command(),
            duration_ms = detail.duration.as_secs_f64() * 1000.0,
            ok = detail.ok,
            "idempotency store call"
        );
        self.recorded
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(detail);
    }
}

#[async_trait]
impl<S: IdempotencyStore> IdempotencyStore for InstrumentedStore<S> {
    async fn check(
        &self,
        key: &IdempotencyKey,
        cookie: &IdempotencyCookie,
        ttl: Duration,
    ) -> Result<IdempotencyCookie, DedupError> {
        let started = Instant::now();
        let result = self.inner.check(key, cookie, ttl).await;
        self.record("check", key, Some(ttl), started, &result);
        result
    }

    async fn get(&self, key: &IdempotencyKey) -> Result<Option<IdempotencyCookie>, DedupError> {
        let started = Instant::now();
        let result = self.inner.get(key).await;
        self.record("get", key, None, started, &result);
        result
    }

    async fn update_wal_locations(
        &self,
        key: &IdempotencyKey,
        locations: &WalLocations,
    ) -> Result<(), DedupError> {
        let started = Instant::now();
        let result = self.inner.update_wal_locations(key, locations).await;
        self.record("update_wal_locations", key, None, started, &result);
        result
    }

    async fn set_deduplicated(&self, key: &IdempotencyKey) -> Result<(), DedupError> {
        let started = Instant::now();
        let result = self.inner.set_deduplicated(key).await;
        self.record("set_deduplicated", key, None, started, &result);
        result
    }

    async fn delete(&self, key: &IdempotencyKey) -> Result<(), DedupError> {
        let started = Instant::now();
        let result = self.inner.delete(key).await;
        self.record("delete", key, None, started, &result);
        result
    }
}
