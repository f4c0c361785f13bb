//! Impls - ports の実装
//!
//! # 含まれる実装
//! - **InMemoryIdempotencyStore / InMemoryLeaseStore**: 開発・テスト用
//! - **RedisIdempotencyStore / RedisLeaseStore**: 本番用（Lua でアトミックに更新）
//! - **InstrumentedStore**: 任意の store を包んで呼び出しを記録
//! - **TracingEventSink / MemoryEventSink**: 重複排除イベントの出力先
//! - **StaticFeatureFlags**: プロセス内の機能フラグ

pub mod event_sinks;
pub mod flags;
pub mod instrumented;
pub mod memory_store;
pub mod redis_store;

pub use self::event_sinks::{MemoryEventSink, TracingEventSink};
pub use self::flags::StaticFeatureFlags;
pub use self::instrumented::{CallDetail, CallStats, InstrumentedStore};
pub use self::memory_store::{InMemoryIdempotencyStore, InMemoryLeaseStore};
pub use self::redis_store::{RedisIdempotencyStore, RedisLeaseStore};
