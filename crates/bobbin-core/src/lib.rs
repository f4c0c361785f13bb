//! bobbin-core
//!
//! Deduplication and scheduling layer for background jobs.
//!
//! ジョブが enqueue されるとき（schedule）と実行されるとき（perform）の両方で
//! 冪等キーを見て「積む / 落とす / 後で積み直す」を決めます。
//!
//! # モジュール構成
//! - **domain**: ドメインモデル（ids, payload, WAL 位置, options, verdict, errors）
//! - **ports**: 抽象化レイヤー（IdempotencyStore, LeaseStore, Clock, FeatureFlags, EventSink）
//! - **impls**: 実装（in-memory / Redis の store、計測デコレータ、ログ出力）
//! - **dedup**: 重複排除の中核（DuplicateJob, ロック, 戦略）
//! - **typed**: 型付き Worker API（Worker trait, WorkerRegistry, args codec）
//! - **queue**: in-memory キューとリトライ方針
//! - **app**: Harness, HarnessBuilder, WorkerGroup, 設定
//! - **observability**: ログ初期化とキュー集計

pub mod app;
pub mod dedup;
pub mod domain;
pub mod impls;
pub mod observability;
pub mod ports;
pub mod queue;
pub mod typed;

#[cfg(test)]
pub(crate) mod testing;
