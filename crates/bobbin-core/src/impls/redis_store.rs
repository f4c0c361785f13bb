//! RedisIdempotencyStore / RedisLeaseStore - 本番用の共有 store
//!
//! 複数の worker プロセスが同じ Redis を見ることで、クラスタ全体で
//! 「キーごとに claim は 1 つ」が成り立ちます。
//!
//! # 実装詳細
//! - check / WAL のマージ / deduplicated の設定は Lua スクリプトでアトミックに行う
//! - cookie は JSON 文字列として保存し、更新時は KEEPTTL で残り TTL を保つ
//! - lease は `SET NX PX`、解放は所有者トークンを比較してから DEL

use std::time::Duration;

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Script};

use crate::domain::{DedupError, IdempotencyCookie, IdempotencyKey, LeaseToken, WalLocations};
use crate::ports::{IdempotencyStore, LeaseStore};

const CHECK_LUA: &str = include_str!("lua/check.lua");
const UPDATE_WAL_LUA: &str = include_str!("lua/update_wal.lua");
const SET_DEDUPLICATED_LUA: &str = include_str!("lua/set_deduplicated.lua");
const RELEASE_LEASE_LUA: &str = include_str!("lua/release_lease.lua");

async fn connect(redis_url: &str) -> Result<ConnectionManager, DedupError> {
    let client = redis::Client::open(redis_url)
        .map_err(|e| DedupError::StoreUnavailable(e.to_string()))?;
    ConnectionManager::new(client)
        .await
        .map_err(|e| DedupError::StoreUnavailable(e.to_string()))
}

/// Redis keys expire in whole seconds: round up so a claim never outlives less than asked.
fn ttl_secs(ttl: Duration) -> u64 {
    (ttl.as_secs() + u64::from(ttl.subsec_nanos() > 0)).max(1)
}

#[derive(Clone)]
pub struct RedisIdempotencyStore {
    redis: ConnectionManager,
    check_script: Script,
    update_wal_script: Script,
    set_deduplicated_script: Script,
}

impl RedisIdempotencyStore {
    /// Connects to Redis at `redis_url` (e.g. "redis://localhost:6379").
    pub async fn connect(redis_url: &str) -> Result<Self, DedupError> {
        Ok(Self::from_connection(connect(redis_url).await?))
    }

    /// Shares an existing connection manager (e.g. with a [`RedisLeaseStore`]).
    pub fn from_connection(redis: ConnectionManager) -> Self {
        Self {
            redis,
            check_script: Script::new(CHECK_LUA),
            update_wal_script: Script::new(UPDATE_WAL_LUA),
            set_deduplicated_script: Script::new(SET_DEDUPLICATED_LUA),
        }
    }
}

#[async_trait]
impl IdempotencyStore for RedisIdempotencyStore {
    async fn check(
        &self,
        key: &IdempotencyKey,
        cookie: &IdempotencyCookie,
        ttl: Duration,
    ) -> Result<IdempotencyCookie, DedupError> {
        let mut conn = self.redis.clone();
        let encoded = serde_json::to_string(cookie)?;

        let mut invocation = self.check_script.key(key.as_str());
        invocation.arg(&encoded).arg(ttl_secs(ttl));
        let held: String = invocation.invoke_async(&mut conn).await?;

        Ok(serde_json::from_str(&held)?)
    }

    async fn get(&self, key: &IdempotencyKey) -> Result<Option<IdempotencyCookie>, DedupError> {
        let mut conn = self.redis.clone();
        let raw: Option<String> = conn.get(key.as_str()).await?;
        raw.map(|raw| serde_json::from_str(&raw))
            .transpose()
            .map_err(DedupError::from)
    }

    async fn update_wal_locations(
        &self,
        key: &IdempotencyKey,
        locations: &WalLocations,
    ) -> Result<(), DedupError> {
        if locations.is_empty() {
            return Ok(());
        }
        let mut conn = self.redis.clone();
        let encoded = serde_json::to_string(locations)?;

        let mut invocation = self.update_wal_script.key(key.as_str());
        invocation.arg(&encoded);
        let _changed: i64 = invocation.invoke_async(&mut conn).await?;
        Ok(())
    }

    async fn set_deduplicated(&self, key: &IdempotencyKey) -> Result<(), DedupError> {
        let mut conn = self.redis.clone();
        let invocation = self.set_deduplicated_script.key(key.as_str());
        let _updated: i64 = invocation.invoke_async(&mut conn).await?;
        Ok(())
    }

    async fn delete(&self, key: &IdempotencyKey) -> Result<(), DedupError> {
        let mut conn = self.redis.clone();
        conn.del::<_, ()>(key.as_str()).await?;
        Ok(())
    }
}

#[derive(Clone)]
pub struct RedisLeaseStore {
    redis: ConnectionManager,
    release_script: Script,
}

impl RedisLeaseStore {
    pub async fn connect(redis_url: &str) -> Result<Self, DedupError> {
        Ok(Self::from_connection(connect(redis_url).await?))
    }

    pub fn from_connection(redis: ConnectionManager) -> Self {
        Self {
            redis,
            release_script: Script::new(RELEASE_LEASE_LUA),
        }
    }
}

#[async_trait]
impl LeaseStore for RedisLeaseStore {
    async fn try_obtain(
        &self,
        key: &str,
        token: LeaseToken,
        ttl: Duration,
    ) -> Result<bool, DedupError> {
        let mut conn = self.redis.clone();
        let ttl_ms = u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX).max(1);
        let reply: Option<String> = redis::cmd("SET")
            .arg(key)
            .arg(token.to_string())
            .arg("NX")
            .arg("PX")
            .arg(ttl_ms)
            .query_async(&mut conn)
            .await?;
        Ok(reply.is_some())
    }

    async fn release(&self, key: &str, token: LeaseToken) -> Result<bool, DedupError> {
        let mut conn = self.redis.clone();
        let mut invocation = self.release_script.key(key);
        invocation.arg(token.to_string());
        let removed: i64 = invocation.invoke_async(&mut conn).await?;
        Ok(removed == 1)
    }
}
