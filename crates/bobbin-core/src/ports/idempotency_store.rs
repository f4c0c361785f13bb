//! IdempotencyStore port - 冪等キーの保存先（Redis または InMemory）
//!
//! 重複排除で唯一の「ワーカー間で共有される可変状態」です。
//! すべての変更は下の操作を通して行い、各操作はアトミックでなければなりません。

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::domain::{DedupError, IdempotencyCookie, IdempotencyKey, WalLocations};

/// # 設計原則
/// - `check` は 1 往復の set-if-absent（compare-and-set）
/// - cookie の更新系（WAL / deduplicated）は TTL を変えない
/// - 障害は `DedupError::StoreUnavailable` で返す（fail-open の判断は呼び出し側）
#[async_trait]
pub trait IdempotencyStore: Send + Sync {
    /// Claim `key` for `cookie` unless an unexpired entry exists.
    ///
    /// Returns whichever cookie holds the key afterwards: `cookie` itself when
    /// the claim succeeded, the earlier claimant's otherwise.
    async fn check(
        &self,
        key: &IdempotencyKey,
        cookie: &IdempotencyCookie,
        ttl: Duration,
    ) -> Result<IdempotencyCookie, DedupError>;

    async fn get(&self, key: &IdempotencyKey) -> Result<Option<IdempotencyCookie>, DedupError>;

    /// Merge `locations` into the stored cookie, keeping the latest per shard.
    async fn update_wal_locations(
        &self,
        key: &IdempotencyKey,
        locations: &WalLocations,
    ) -> Result<(), DedupError>;

    async fn set_deduplicated(&self, key: &IdempotencyKey) -> Result<(), DedupError>;

    async fn delete(&self, key: &IdempotencyKey) -> Result<(), DedupError>;
}

#[async_trait]
impl<S: IdempotencyStore + ?Sized> IdempotencyStore for Arc<S> {
    async fn check(
        &self,
        key: &IdempotencyKey,
        cookie: &IdempotencyCookie,
        ttl: Duration,
    ) -> Result<IdempotencyCookie, DedupError> {
        (**self).check(key, cookie, ttl).await
    }

    async fn get(&self, key: &IdempotencyKey) -> Result<Option<IdempotencyCookie>, DedupError> {
        (**self).get(key).await
    }

    async fn update_wal_locations(
        &self,
        key: &IdempotencyKey,
        locations: &WalLocations,
    ) -> Result<(), DedupError> {
        (**self).update_wal_locations(key, locations).await
    }

    async fn set_deduplicated(&self, key: &IdempotencyKey) -> Result<(), DedupError> {
        (**self).set_deduplicated(key).await
    }

    async fn delete(&self, key: &IdempotencyKey) -> Result<(), DedupError> {
        (**self).delete(key).await
    }
}
