//! EventSink の実装
//!
//! - TracingEventSink: `job_status` 付きの構造化ログ（本番用）
//! - MemoryEventSink: イベントを溜めておき、テストで検査する

use std::sync::Mutex;

use crate::ports::{DedupEvent, DedupEventKind, EventSink};

#[derive(Debug, Clone, Copy, Default)]
pub struct TracingEventSink;

impl EventSink for TracingEventSink {
    fn emit(&self, event: DedupEvent) {
        let options = serde_json::to_string(&event.options).unwrap_or_default();
        let duplicate_of = event.duplicate_of.map(|jid| jid.to_string());
        let detail = event.detail.as_deref().unwrap_or("");

        match event.kind {
            DedupEventKind::Deduplicated | DedupEventKind::Rescheduled => tracing::info!(
                job_status = event.kind.as_str(),
                class = %event.class,
                jid = %event.jid,
                duplicate_of = duplicate_of.as_deref(),
                deduplication.type = event.strategy,
                deduplication.options = %options,
                "{} JID-{}: {}: {}",
                event.class,
                event.jid,
                event.kind.as_str(),
                event.strategy
            ),
            DedupEventKind::LockError | DedupEventKind::StoreError => tracing::warn!(
                job_status = event.kind.as_str(),
                class = %event.class,
                jid = %event.jid,
                deduplication.type = event.strategy,
                detail,
                "{} JID-{}: {}: {}",
                event.class,
                event.jid,
                event.kind.as_str(),
                detail
            ),
        }
    }
}

/// テスト用
#[derive(Debug, Default)]
pub struct MemoryEventSink {
    events: Mutex<Vec<DedupEvent>>,
}

impl MemoryEventSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<DedupEvent> {
        self.events.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn count(&self, kind: DedupEventKind) -> usize {
        self.events
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .filter(|e| e.kind == kind)
            .count()
    }
}

impl EventSink for MemoryEventSink {
    fn emit(&self, event: DedupEvent) {
        self.events
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(event);
    }
}
