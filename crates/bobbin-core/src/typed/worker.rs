//! Worker trait - 型付きワーカーの定義
//!
//! # 学習ポイント
//! - Associated Constants (`const CLASS`)
//! - Associated Types (`type Args`)
//! - デフォルト実装付きの関連関数（`deduplication()`）

use async_trait::async_trait;
use serde::Serialize;
use serde::de::DeserializeOwned;

use super::JobContext;
use crate::dedup::WorkerDeduplication;
use crate::domain::JobError;

/// Worker はクラス名・引数の型・重複排除の設定を 1 か所にまとめる
///
/// # 使用例
/// ```ignore
/// struct RefreshWorker;
///
/// #[async_trait]
/// impl Worker for RefreshWorker {
///     const CLASS: &'static str = "RefreshWorker";
///     type Args = (i64,);
///
///     fn deduplication() -> WorkerDeduplication {
///         WorkerDeduplication::new(StrategyKind::UntilExecuted).idempotent()
///     }
///
///     async fn perform(&self, (user_id,): (i64,), ctx: JobContext) -> Result<(), JobError> {
///         Ok(())
///     }
/// }
/// ```
#[async_trait]
pub trait Worker: Send + Sync + 'static {
    /// payload の `class` に載る名前
    const CLASS: &'static str;

    /// 位置引数。タプルなら要素ごと、それ以外は 1 要素として `args` に載る
    type Args: Serialize + DeserializeOwned + Send + 'static;

    /// 未指定なら until_executing・非冪等（重複しても落とさない）
    fn deduplication() -> WorkerDeduplication {
        WorkerDeduplication::default()
    }

    async fn perform(&self, args: Self::Args, ctx: JobContext) -> Result<(), JobError>;
}
