//! Ports - 抽象化レイヤー
//!
//! 外部の協調者（Redis のようなキャッシュ、機能フラグサービス、ログ基盤、時計）への
//! インターフェースを定義します。実装は `impls` にあります。
//!
//! # 設計原則
//! - 冪等キーの store が唯一の共有可変状態
//! - 戦略は ports だけに依存し、具体的な backend を知らない

pub mod clock;
pub mod event_sink;
pub mod feature_flags;
pub mod id_generator;
pub mod idempotency_store;
pub mod lease_store;

pub use self::clock::{Clock, FixedClock, SystemClock};
pub use self::event_sink::{DedupEvent, DedupEventKind, EventSink};
pub use self::feature_flags::{FeatureFlags, USE_DEDUP_LOCK};
pub use self::id_generator::{IdGenerator, UlidGenerator};
pub use self::idempotency_store::IdempotencyStore;
pub use self::lease_store::LeaseStore;
