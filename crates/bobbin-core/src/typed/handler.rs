//! DynWorker - Worker の型消去
//!
//! # 学習ポイント
//! - Object-safe trait (DynWorker)
//! - Type erasure パターン (TypedWorker<W> → DynWorker)

use async_trait::async_trait;
use serde_json::Value;

use super::{decode_args, JobContext, Worker};
use crate::dedup::WorkerDeduplication;
use crate::domain::JobError;

/// DynWorker は object-safe な Worker の抽象化
///
/// TypedWorker<W> を DynWorker に変換することで、
/// HashMap<String, Arc<dyn DynWorker>> に格納可能にします。
///
/// # Object Safety
/// - メソッドはジェネリックではない（具体的な型のみ）
/// - 関連定数・関連型は `class()` / `perform_dyn()` の中に閉じ込める
#[async_trait]
pub trait DynWorker: Send + Sync {
    fn class(&self) -> &'static str;

    fn deduplication(&self) -> WorkerDeduplication;

    async fn perform_dyn(&self, args: Vec<Value>, ctx: JobContext) -> Result<(), JobError>;
}

pub struct TypedWorker<W: Worker> {
    worker: W,
}

impl<W: Worker> TypedWorker<W> {
    pub fn new(worker: W) -> Self {
        Self { worker }
    }
}

#[async_trait]
impl<W: Worker> DynWorker for TypedWorker<W> {
    fn class(&self) -> &'static str {
        W::CLASS
    }

    fn deduplication(&self) -> WorkerDeduplication {
        W::deduplication()
    }

    async fn perform_dyn(&self, args: Vec<Value>, ctx: JobContext) -> Result<(), JobError> {
        let args: W::Args = decode_args(&args)?;
        self.worker.perform(args, ctx).await
    }
}


#[cfg(test)]
mod tests {
    use super::test_workers::RefreshWorker;
    use super::*;
    use crate::dedup::StrategyKind;
    use crate::domain::ErrorKind;
    use crate::testing::{payload, Fixture};
    use serde_json::json;

    #[tokio::test]
    async fn typed_worker_decodes_args() {
        let fx = Fixture::new();
        let worker = TypedWorker::new(RefreshWorker::default());
        let ctx = JobContext::new(&payload(RefreshWorker::CLASS, 7), false, &fx.ctx);

        worker.perform_dyn(vec![json!(7)], ctx).await.unwrap();

        assert_eq!(*worker.worker.seen.lock().unwrap(), vec![7]);
        assert_eq!(worker.class(), "AuthorizedProjectsWorker");
        assert_eq!(worker.deduplication().strategy, StrategyKind::UntilExecuted);
    }

    #[tokio::test]
    async fn bad_args_never_reach_the_body() {
        let fx = Fixture::new();
        let worker = TypedWorker::new(RefreshWorker::default());
        let ctx = JobContext::new(&payload(RefreshWorker::CLASS, 7), false, &fx.ctx);

        let err = worker.perform_dyn(vec![json!("x")], ctx).await.unwrap_err();

        assert_eq!(err.kind(), ErrorKind::Permanent);
        assert!(worker.worker.seen.lock().unwrap().is_empty());
    }
}
