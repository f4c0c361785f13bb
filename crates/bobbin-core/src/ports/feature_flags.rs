//! FeatureFlags port - 機能フラグサービス

/// Strict locking around the duplicate check of `until_executed` jobs.
pub const USE_DEDUP_LOCK: &str = "use_dedup_lock";

pub trait FeatureFlags: Send + Sync {
    fn enabled(&self, name: &str) -> bool;
}
