//! Dedup - 重複排除の中核
//!
//! enqueue 側（schedule）と実行側（perform）の両方でジョブが通る判定ロジックです。
//!
//! # 構成
//! - `duplicate_job`: 1 回の試行ぶんのジョブ記述子（キー・TTL・WAL 位置の管理）
//! - `lock`: 排他リースとスリープ付きロック、`in_lock` ヘルパー
//! - `strategies`: until_executed / until_executing / none
//!
//! # 設計原則
//! - store・ロック・時計・フラグ・ログはすべて `DedupContext` 経由で渡す（グローバル状態なし）
//! - store の障害は fail open（ジョブは実行される側に倒す）

pub mod duplicate_job;
pub mod lock;
pub mod strategies;

use std::sync::Arc;
use std::time::Duration;

use crate::domain::{DeduplicationOptions, IfDeduplicated};
use crate::ports::{
    Clock, DedupEvent, EventSink, FeatureFlags, IdGenerator, IdempotencyStore, LeaseStore,
};

pub use self::duplicate_job::DuplicateJob;
pub use self::lock::{in_lock, ExclusiveLease, LockSettings, SleepingLock};
pub use self::strategies::StrategyKind;

/// Upper bound for the delay before a job re-enqueues itself.
pub const MAX_RESCHEDULE_DELAY: Duration = Duration::from_secs(60);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DedupSettings {
    /// Prefix of every idempotency key.
    pub namespace: String,
    /// Key TTL when the worker does not declare one.
    pub duplicate_key_ttl: Duration,
    pub lock: LockSettings,
    pub reschedule_delay: Duration,
}

impl Default for DedupSettings {
    fn default() -> Self {
        Self {
            namespace: "bobbin".to_string(),
            duplicate_key_ttl: Duration::from_secs(6 * 60 * 60),
            lock: LockSettings::default(),
            reschedule_delay: Duration::from_secs(1),
        }
    }
}

/// How a worker class wants to be deduplicated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerDeduplication {
    pub strategy: StrategyKind,
    pub options: DeduplicationOptions,
    /// Running the job twice has the same effect as running it once.
    pub idempotent: bool,
}

impl Default for WorkerDeduplication {
    fn default() -> Self {
        Self {
            strategy: StrategyKind::UntilExecuting,
            options: DeduplicationOptions::default(),
            idempotent: false,
        }
    }
}

impl WorkerDeduplication {
    pub fn new(strategy: StrategyKind) -> Self {
        Self {
            strategy,
            ..Self::default()
        }
    }

    pub fn idempotent(mut self) -> Self {
        self.idempotent = true;
        self
    }

    pub fn including_scheduled(mut self) -> Self {
        self.options.including_scheduled = true;
        self
    }

    pub fn if_deduplicated(mut self, action: IfDeduplicated) -> Self {
        self.options.if_deduplicated = action;
        self
    }

    pub fn ttl(mut self, ttl: Duration) -> Self {
        self.options.ttl_secs = Some(ttl.as_secs());
        self
    }
}

/// Collaborators shared by every strategy call.
#[derive(Clone)]
pub struct DedupContext {
    pub store: Arc<dyn IdempotencyStore>,
    pub leases: Arc<dyn LeaseStore>,
    pub clock: Arc<dyn Clock>,
    pub flags: Arc<dyn FeatureFlags>,
    pub events: Arc<dyn EventSink>,
    pub ids: Arc<dyn IdGenerator>,
    pub settings: DedupSettings,
}

impl DedupContext {
    pub fn emit(&self, event: DedupEvent) {
        self.events.emit(event);
    }

    /// Configured reschedule delay, capped at [`MAX_RESCHEDULE_DELAY`].
    pub fn reschedule_delay(&self) -> Duration {
        self.settings.reschedule_delay.min(MAX_RESCHEDULE_DELAY)
    }
}
