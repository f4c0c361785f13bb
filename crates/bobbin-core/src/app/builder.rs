//! HarnessBuilder - Harness の構築とワイヤリング
//!
//! # 学習ポイント
//! - Builder パターンの実装
//! - 起動時検証（Fail-fast 設計）
//! - 開発体験の改善（明確なエラーメッセージ）

use std::sync::Arc;

use super::Harness;
use crate::dedup::{DedupContext, StrategyKind};
use crate::queue::{InMemoryQueue, Queue, RetryPolicy};
use crate::typed::{RegistryError, Worker, WorkerRegistry};

/// HarnessBuilder はワーカー登録とキューをまとめて Harness を作る
///
/// # 使用例
/// ```ignore
/// let harness = HarnessBuilder::new()
///     .register(AuthorizedProjectsWorker)?
///     .expect_workers(&["AuthorizedProjectsWorker"])
///     .build_with(dedup_context)?;
/// ```
///
/// # Fail-fast 設計
/// - expect_workers() で期待されるクラス名を登録
/// - build 時に「期待集合 ⊆ 登録済み集合」をチェック
/// - 戦略の上書きも build 時に解決し、未登録クラスへの上書きはエラー
pub struct HarnessBuilder {
    registry: WorkerRegistry,
    expected_workers: Option<Vec<String>>,
    overrides: Vec<(String, StrategyKind)>,
    queue: Option<Arc<dyn Queue>>,
    retry_policy: RetryPolicy,
}

/// BuildError は Harness 構築時のエラー
#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    #[error("Missing workers: {0:?}. These workers were expected but not registered.")]
    MissingWorkers(Vec<String>),

    #[error(transparent)]
    Registry(#[from] RegistryError),
}

impl HarnessBuilder {
    pub fn new() -> Self {
        Self {
            registry: WorkerRegistry::new(),
            expected_workers: None,
            overrides: Vec::new(),
            queue: None,
            retry_policy: RetryPolicy::default(),
        }
    }

    pub fn register<W: Worker>(mut self, worker: W) -> Result<Self, RegistryError> {
        self.registry.register(worker)?;
        Ok(self)
    }

    pub fn expect_workers(mut self, classes: &[&str]) -> Self {
        self.expected_workers = Some(classes.iter().map(|c| c.to_string()).collect());
        self
    }

    /// Per-class strategy replacements, applied at build time.
    pub fn strategy_overrides(mut self, overrides: Vec<(String, StrategyKind)>) -> Self {
        self.overrides = overrides;
        self
    }

    /// Queue to push to; an `InMemoryQueue` on the context's clock otherwise.
    pub fn queue(mut self, queue: Arc<dyn Queue>) -> Self {
        self.queue = Some(queue);
        self
    }

    /// Only used for the default in-memory queue.
    pub fn retry_policy(mut self, retry_policy: RetryPolicy) -> Self {
        self.retry_policy = retry_policy;
        self
    }

    pub fn build_with(mut self, dedup: DedupContext) -> Result<Harness, BuildError> {
        if let Some(expected_workers) = &self.expected_workers {
            let registered = self.registry.registered_classes();
            let missing: Vec<String> = expected_workers
                .iter()
                .filter(|class| !registered.contains(class))
                .cloned()
                .collect();
            if !missing.is_empty() {
                return Err(BuildError::MissingWorkers(missing));
            }
        }

        for (class, strategy) in &self.overrides {
            self.registry.override_strategy(class, *strategy)?;
            tracing::info!(class = %class, strategy = %strategy, "strategy overridden");
        }

        let queue: Arc<dyn Queue> = match self.queue {
            Some(queue) => queue,
            None => Arc::new(InMemoryQueue::new(self.retry_policy, Arc::clone(&dedup.clock))),
        };
        Ok(Harness::new(self.registry, queue, dedup))
    }
}

impl Default for HarnessBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::Fixture;
    use crate::typed::handler::test_workers::{BrokenWorker, RefreshWorker};

    #[test]
    fn build_success() {
        let fx = Fixture::new();
        let harness = HarnessBuilder::new()
            .register(RefreshWorker::default())
            .unwrap()
            .expect_workers(&[RefreshWorker::CLASS])
            .build_with(fx.ctx.clone());
        assert!(harness.is_ok());
    }

    #[test]
    fn build_missing_workers() {
        let fx = Fixture::new();
        let harness = HarnessBuilder::new()
            .register(RefreshWorker::default())
            .unwrap()
            .expect_workers(&[RefreshWorker::CLASS, BrokenWorker::CLASS])
            .build_with(fx.ctx.clone());
        assert!(matches!(
            harness,
            Err(BuildError::MissingWorkers(missing)) if missing == vec![BrokenWorker::CLASS.to_string()]
        ));
    }

    #[test]
    fn overrides_apply_at_build_time() {
        let fx = Fixture::new();
        let harness = HarnessBuilder::new()
            .register(RefreshWorker::default())
            .unwrap()
            .strategy_overrides(vec![(RefreshWorker::CLASS.to_string(), StrategyKind::None)])
            .build_with(fx.ctx.clone())
            .unwrap();

        let registered = harness.registry().get(RefreshWorker::CLASS).unwrap();
        assert_eq!(registered.deduplication.strategy, StrategyKind::None);
    }

    #[test]
    fn overrides_for_unknown_classes_fail() {
        let fx = Fixture::new();
        let harness = HarnessBuilder::new()
            .strategy_overrides(vec![("Ghost".to_string(), StrategyKind::None)])
            .build_with(fx.ctx.clone());
        assert!(matches!(
            harness,
            Err(BuildError::Registry(RegistryError::NotRegistered(c))) if c == "Ghost"
        ));
    }
}
