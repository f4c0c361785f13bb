//! WorkerRegistry - Worker の登録と管理
//!
//! # 学習ポイント
//! - HashMap での型消去された trait object の管理
//! - Generic methods での登録と型安全性
//! - Arc による共有所有権
//!
//! 戦略は登録時に確定させ、実行時に名前を引き直さない。

use std::collections::HashMap;
use std::sync::Arc;

use super::{DynWorker, TypedWorker, Worker};
use crate::dedup::{StrategyKind, WorkerDeduplication};

/// 登録済みワーカーと、上書き後の重複排除設定
#[derive(Clone)]
pub struct RegisteredWorker {
    pub worker: Arc<dyn DynWorker>,
    pub deduplication: WorkerDeduplication,
}

pub struct WorkerRegistry {
    workers: HashMap<String, RegisteredWorker>,
}

#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("Worker class '{0}' is already registered")]
    AlreadyRegistered(String),

    #[error("Worker class '{0}' is not registered")]
    NotRegistered(String),
}

impl WorkerRegistry {
    pub fn new() -> Self {
        Self {
            workers: HashMap::new(),
        }
    }

    pub fn register<W: Worker>(&mut self, worker: W) -> Result<(), RegistryError> {
        let class = W::CLASS.to_string();
        if self.workers.contains_key(&class) {
            return Err(RegistryError::AlreadyRegistered(class));
        }
        let registered = RegisteredWorker {
            worker: Arc::new(TypedWorker::new(worker)),
            deduplication: W::deduplication(),
        };
        self.workers.insert(class, registered);
        Ok(())
    }

    /// Replace the strategy a class declared; options stay as declared.
    pub fn override_strategy(
        &mut self,
        class: &str,
        strategy: StrategyKind,
    ) -> Result<(), RegistryError> {
        let registered = self
            .workers
            .get_mut(class)
            .ok_or_else(|| RegistryError::NotRegistered(class.to_string()))?;
        registered.deduplication.strategy = strategy;
        Ok(())
    }

    pub fn get(&self, class: &str) -> Option<&RegisteredWorker> {
        self.workers.get(class)
    }

    /// Sorted, for stable log output.
    pub fn registered_classes(&self) -> Vec<String> {
        let mut classes: Vec<String> = self.workers.keys().cloned().collect();
        classes.sort();
        classes
    }
}

impl Default for WorkerRegistry {
    fn default() -> Self {
        Self::new()
    }
}
