//! LeaseStore port - 排他リース（`SET key token NX PX ttl` 相当）

use std::time::Duration;

use async_trait::async_trait;

use crate::domain::{DedupError, LeaseToken};

#[async_trait]
pub trait LeaseStore: Send + Sync {
    /// Take `key` for `token` if nobody holds it. True when taken.
    async fn try_obtain(
        &self,
        key: &str,
        token: LeaseToken,
        ttl: Duration,
    ) -> Result<bool, DedupError>;

    /// Release `key` only if `token` still owns it. True when released.
    async fn release(&self, key: &str, token: LeaseToken) -> Result<bool, DedupError>;
}
