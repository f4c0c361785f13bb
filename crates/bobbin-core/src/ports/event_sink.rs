//! EventSink port - 重複排除イベントの記録
//!
//! プロセス全体のロガーに直接書くのではなく、ハーネスと戦略にハンドルとして渡します。
//!
//! # 実装
//! - TracingEventSink: tracing の構造化ログ（本番用）
//! - MemoryEventSink: 記録して後から検査する（テスト用）

use crate::domain::{DeduplicationOptions, Jid, WorkerClass};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DedupEventKind {
    /// An enqueue was dropped as a duplicate.
    Deduplicated,
    /// The dedup lock could not be obtained in time.
    LockError,
    /// A finished job put itself back on the queue.
    Rescheduled,
    /// The idempotency store failed; deduplication was skipped.
    StoreError,
}

impl DedupEventKind {
    /// `job_status` value of the log line.
    pub fn as_str(self) -> &'static str {
        match self {
            DedupEventKind::Deduplicated => "deduplicated",
            DedupEventKind::LockError => "lock_error",
            DedupEventKind::Rescheduled => "rescheduled",
            DedupEventKind::StoreError => "store_error",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DedupEvent {
    pub kind: DedupEventKind,
    pub jid: Jid,
    pub class: WorkerClass,
    /// Human-readable strategy name, e.g. "until executed".
    pub strategy: &'static str,
    pub options: DeduplicationOptions,
    pub duplicate_of: Option<Jid>,
    pub detail: Option<String>,
}

pub trait EventSink: Send + Sync {
    fn emit(&self, event: DedupEvent);
}
