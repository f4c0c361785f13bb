//! App - アプリケーション層
//!
//! dedup・queue・typed を組み合わせて、ジョブが通る道筋を作ります。
//!
//! # 主要コンポーネント
//! - **HarnessBuilder**: ワーカー登録と起動時検証
//! - **Harness**: enqueue（schedule）と実行（perform）の入口
//! - **WorkerGroup**: lease → perform → ack / fail のループ
//! - **DedupConfig**: JSON 設定ファイル

pub mod builder;
pub mod config;
pub mod harness;
pub mod worker_group;

pub use self::builder::{BuildError, HarnessBuilder};
pub use self::config::{ConfigError, DedupConfig};
pub use self::harness::{EnqueueOutcome, Harness};
pub use self::worker_group::WorkerGroup;
