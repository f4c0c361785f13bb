//! Lock - 排他リースとスリープ付きロック
//!
//! # 構成
//! - `ExclusiveLease`: 所有者トークン付きの 1 回きりの取得 / 解放
//! - `SleepingLock`: 取得できるまで `sleep` 間隔で再試行し、`timeout` で諦める
//! - `in_lock`: 取得 → 処理 → 必ず解放
//!
//! リースには TTL があるので、解放前にプロセスが落ちても永久には残りません。

use std::future::Future;
use std::time::Duration;

use tokio::time::Instant;

use crate::domain::{DedupError, LeaseToken};
use crate::ports::LeaseStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LockSettings {
    /// Lease lifetime; bounds how long a crashed holder blocks others.
    pub ttl: Duration,
    /// Pause between attempts.
    pub sleep: Duration,
    /// Give up after waiting this long.
    pub timeout: Duration,
}

impl Default for LockSettings {
    fn default() -> Self {
        Self {
            ttl: Duration::from_secs(5),
            sleep: Duration::from_millis(100),
            timeout: Duration::from_secs(1),
        }
    }
}

pub struct ExclusiveLease<'a> {
    leases: &'a dyn LeaseStore,
    key: String,
    token: LeaseToken,
    ttl: Duration,
}

impl<'a> ExclusiveLease<'a> {
    pub fn new(
        leases: &'a dyn LeaseStore,
        key: impl Into<String>,
        token: LeaseToken,
        ttl: Duration,
    ) -> Self {
        Self {
            leases,
            key: key.into(),
            token,
            ttl,
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub async fn try_obtain(&self) -> Result<bool, DedupError> {
        self.leases.try_obtain(&self.key, self.token, self.ttl).await
    }

    /// Release the lease if we still own it.
    pub async fn cancel(&self) -> Result<bool, DedupError> {
        self.leases.release(&self.key, self.token).await
    }
}

pub struct SleepingLock<'a> {
    lease: ExclusiveLease<'a>,
    sleep: Duration,
    timeout: Duration,
    attempts: u32,
}

impl<'a> SleepingLock<'a> {
    pub fn new(
        leases: &'a dyn LeaseStore,
        key: impl Into<String>,
        token: LeaseToken,
        settings: LockSettings,
    ) -> Self {
        Self {
            lease: ExclusiveLease::new(leases, key, token, settings.ttl),
            sleep: settings.sleep,
            timeout: settings.timeout,
            attempts: 0,
        }
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub async fn obtain(&mut self) -> Result<(), DedupError> {
        let started = Instant::now();
        let deadline = started + self.timeout;
        loop {
            self.attempts += 1;
            if self.lease.try_obtain().await? {
                return Ok(());
            }
            if Instant::now() + self.sleep > deadline {
                return Err(DedupError::LockTimeout {
                    key: self.lease.key().to_string(),
                    waited: started.elapsed(),
                });
            }
            tokio::time::sleep(self.sleep).await;
        }
    }

    pub async fn cancel(&self) -> Result<bool, DedupError> {
        self.lease.cancel().await
    }
}

/// Run `f` while holding the lease on `key`.
///
/// The lease is released afterwards whatever `f` returned. A failed release only
/// logs; the TTL reclaims the lease.
pub async fn in_lock<T, F, Fut>(
    leases: &dyn LeaseStore,
    token: LeaseToken,
    key: &str,
    settings: LockSettings,
    f: F,
) -> Result<T, DedupError>
where
    F: FnOnce() -> Fut,
    Fut: Future<Output = T>,
{
    let mut lock = SleepingLock::new(leases, key, token, settings);
    lock.obtain().await?;
    tracing::debug!(key, attempts = lock.attempts(), "lock obtained");

    let output = f().await;

    if let Err(err) = lock.cancel().await {
        tracing::warn!(key, error = %err, "failed to release lock");
    }
    Ok(output)
}
