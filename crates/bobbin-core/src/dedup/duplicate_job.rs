//! DuplicateJob - 1 回の試行ぶんのジョブ記述子
//!
//! ジョブの識別子・オプション・スケジュール時刻を持ち、冪等キーの store への
//! 問い合わせ（claim、WAL 位置のマージ、deduplicated フラグ）をまとめます。
//!
//! # 実装詳細
//! - 記述子は試行ごとに作り直す。store 上のキーだけが試行をまたいで残る
//! - キーが作れないジョブ（クラス名が空など）は常に「重複ではない」

use std::time::Duration;

use chrono::{DateTime, Utc};

use super::{DedupSettings, StrategyKind, WorkerDeduplication};
use crate::domain::{
    AttemptState, DedupError, DeduplicationOptions, IdempotencyCookie, IdempotencyKey,
    IfDeduplicated, Jid, JobPayload, WalLocations, WorkerClass,
};
use crate::ports::{DedupEvent, DedupEventKind, IdempotencyStore};

#[derive(Debug, Clone)]
pub struct DuplicateJob {
    key: Option<IdempotencyKey>,
    jid: Jid,
    class: WorkerClass,
    strategy: StrategyKind,
    options: DeduplicationOptions,
    worker_idempotent: bool,
    scheduled_at: Option<DateTime<Utc>>,
    deferred: bool,
    /// Snapshot carried by this payload.
    wal_locations: WalLocations,
    default_ttl: Duration,

    existing_jid: Option<Jid>,
    deduplicated: bool,
    state: AttemptState,
}

impl DuplicateJob {
    pub fn new(
        payload: &JobPayload,
        dedup: &WorkerDeduplication,
        settings: &DedupSettings,
    ) -> Self {
        Self {
            key: IdempotencyKey::for_payload(&settings.namespace, payload),
            jid: payload.jid,
            class: payload.class.clone(),
            strategy: dedup.strategy,
            options: dedup.options.clone(),
            worker_idempotent: dedup.idempotent,
            scheduled_at: payload.at,
            deferred: payload.deferred,
            wal_locations: payload.wal_locations.clone(),
            default_ttl: settings.duplicate_key_ttl,
            existing_jid: None,
            deduplicated: false,
            state: AttemptState::Pending,
        }
    }

    pub fn key(&self) -> Option<&IdempotencyKey> {
        self.key.as_ref()
    }

    pub fn jid(&self) -> Jid {
        self.jid
    }

    pub fn class(&self) -> &WorkerClass {
        &self.class
    }

    pub fn strategy(&self) -> StrategyKind {
        self.strategy
    }

    pub fn options(&self) -> &DeduplicationOptions {
        &self.options
    }

    pub fn state(&self) -> AttemptState {
        self.state
    }

    /// Record how this attempt ended.
    pub fn settle(&mut self, state: AttemptState) {
        self.state = state;
    }

    /// jid holding the key, as observed by the last `check`.
    pub fn existing_jid(&self) -> Option<Jid> {
        self.existing_jid
    }

    pub fn duplicate(&self) -> bool {
        self.existing_jid.is_some_and(|existing| existing != self.jid)
    }

    pub fn scheduled(&self) -> bool {
        self.scheduled_at.is_some()
    }

    pub fn scheduled_at(&self) -> Option<DateTime<Utc>> {
        self.scheduled_at
    }

    pub fn deferred(&self) -> bool {
        self.deferred
    }

    pub fn duplicate_key_ttl(&self) -> Duration {
        self.options.ttl().unwrap_or(self.default_ttl)
    }

    /// Key TTL for this job: a delayed job keeps its key until `ttl` after it was due.
    pub fn effective_ttl(&self, now: DateTime<Utc>) -> Duration {
        let ttl = self.duplicate_key_ttl();
        match self.scheduled_at {
            Some(at) => (at - now).to_std().unwrap_or(Duration::ZERO) + ttl,
            None => ttl,
        }
    }

    pub fn idempotent(&self) -> bool {
        self.worker_idempotent && self.strategy != StrategyKind::None
    }

    pub fn reschedulable(&self) -> bool {
        !self.scheduled() && self.options.if_deduplicated == IfDeduplicated::RescheduleOnce
    }

    pub fn is_deduplicated(&self) -> bool {
        self.deduplicated
    }

    /// Claim the key, or learn who holds it.
    pub async fn check(
        &mut self,
        store: &dyn IdempotencyStore,
        ttl: Duration,
    ) -> Result<Jid, DedupError> {
        let Some(key) = &self.key else {
            self.existing_jid = Some(self.jid);
            self.state = AttemptState::Claimed;
            return Ok(self.jid);
        };

        let held = store
            .check(key, &IdempotencyCookie::new(self.jid), ttl)
            .await?;
        self.existing_jid = Some(held.jid);
        self.state = if held.jid == self.jid {
            AttemptState::Claimed
        } else {
            AttemptState::Duplicate
        };
        Ok(held.jid)
    }

    /// Fold this payload's WAL snapshot into the stored cookie.
    pub async fn update_latest_wal_location(
        &self,
        store: &dyn IdempotencyStore,
    ) -> Result<(), DedupError> {
        match &self.key {
            Some(key) if !self.wal_locations.is_empty() => {
                store.update_wal_locations(key, &self.wal_locations).await
            }
            _ => Ok(()),
        }
    }

    pub async fn latest_wal_locations(
        &self,
        store: &dyn IdempotencyStore,
    ) -> Result<WalLocations, DedupError> {
        let Some(key) = &self.key else {
            return Ok(WalLocations::new());
        };
        Ok(store
            .get(key)
            .await?
            .map(|cookie| cookie.wal_locations)
            .unwrap_or_default())
    }

    /// Marks the key as having absorbed a duplicate.
    ///
    /// Only reschedulable jobs persist the mark; nothing reads it otherwise.
    pub async fn set_deduplicated_flag(
        &mut self,
        store: &dyn IdempotencyStore,
    ) -> Result<(), DedupError> {
        self.deduplicated = true;
        match &self.key {
            Some(key) if self.reschedulable() => store.set_deduplicated(key).await,
            _ => Ok(()),
        }
    }

    pub async fn should_reschedule(&self, store: &dyn IdempotencyStore) -> Result<bool, DedupError> {
        if !self.reschedulable() {
            return Ok(false);
        }
        let Some(key) = &self.key else {
            return Ok(false);
        };
        Ok(store.get(key).await?.is_some_and(|cookie| cookie.deduplicated))
    }

    pub async fn delete(&self, store: &dyn IdempotencyStore) -> Result<(), DedupError> {
        match &self.key {
            Some(key) => store.delete(key).await,
            None => Ok(()),
        }
    }

    pub(crate) fn event(&self, kind: DedupEventKind) -> DedupEvent {
        DedupEvent {
            kind,
            jid: self.jid,
            class: self.class.clone(),
            strategy: self.strategy.human_name(),
            options: self.options.clone(),
            duplicate_of: self.duplicate().then_some(self.existing_jid).flatten(),
            detail: None,
        }
    }
}
