//! DedupConfig - 設定ファイル（JSON）の読み込み
//!
//! 全フィールドにデフォルトがあるので、空の `{}` でも起動できます。
//! CLI フラグはこの値を上書きします。

use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::dedup::{DedupSettings, LockSettings, StrategyKind};
use crate::domain::DedupError;
use crate::queue::RetryPolicy;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DedupConfig {
    pub namespace: String,
    pub duplicate_key_ttl_secs: u64,
    pub lock_ttl_ms: u64,
    pub lock_sleep_ms: u64,
    pub lock_timeout_ms: u64,
    pub reschedule_delay_secs: u64,
    pub max_attempts: u32,
    pub retry_base_delay_secs: u64,
    pub retry_multiplier: f64,
    /// class name → strategy name (`"until_executed"`, ...)
    pub strategy_overrides: HashMap<String, String>,
    /// Unset means in-memory backends.
    pub redis_url: Option<String>,
}

impl Default for DedupConfig {
    fn default() -> Self {
        let retry = RetryPolicy::default();
        Self {
            namespace: "bobbin".to_string(),
            duplicate_key_ttl_secs: 6 * 60 * 60,
            lock_ttl_ms: 5_000,
            lock_sleep_ms: 100,
            lock_timeout_ms: 1_000,
            reschedule_delay_secs: 1,
            max_attempts: retry.max_attempts,
            retry_base_delay_secs: retry.base_delay.as_secs(),
            retry_multiplier: retry.multiplier,
            strategy_overrides: HashMap::new(),
            redis_url: None,
        }
    }
}

impl DedupConfig {
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Ok(serde_json::from_str(&raw)?)
    }

    pub fn dedup_settings(&self) -> DedupSettings {
        DedupSettings {
            namespace: self.namespace.clone(),
            duplicate_key_ttl: Duration::from_secs(self.duplicate_key_ttl_secs),
            lock: LockSettings {
                ttl: Duration::from_millis(self.lock_ttl_ms),
                sleep: Duration::from_millis(self.lock_sleep_ms),
                timeout: Duration::from_millis(self.lock_timeout_ms),
            },
            reschedule_delay: Duration::from_secs(self.reschedule_delay_secs),
        }
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            base_delay: Duration::from_secs(self.retry_base_delay_secs),
            multiplier: self.retry_multiplier,
            max_attempts: self.max_attempts,
        }
    }

    /// Resolve every override name now so a typo stops startup.
    pub fn strategy_overrides(&self) -> Result<Vec<(String, StrategyKind)>, DedupError> {
        let mut overrides = self
            .strategy_overrides
            .iter()
            .map(|(class, name)| Ok((class.clone(), StrategyKind::for_name(name)?)))
            .collect::<Result<Vec<_>, DedupError>>()?;
        overrides.sort_by(|a, b| a.0.cmp(&b.0));
        Ok(overrides)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config: {0}")]
    Parse(#[from] serde_json::Error),
}
