//! StaticFeatureFlags - プロセス内で切り替える機能フラグ
//!
//! 起動時に CLI / 設定から有効化し、テストでは個別に on/off します。

use std::collections::HashSet;
use std::sync::RwLock;

use crate::ports::FeatureFlags;

#[derive(Debug, Default)]
pub struct StaticFeatureFlags {
    enabled: RwLock<HashSet<String>>,
}

impl StaticFeatureFlags {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_enabled<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            enabled: RwLock::new(names.into_iter().map(Into::into).collect()),
        }
    }

    pub fn enable(&self, name: &str) {
        self.enabled
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(name.to_string());
    }

    pub fn disable(&self, name: &str) {
        self.enabled
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .remove(name);
    }
}

impl FeatureFlags for StaticFeatureFlags {
    fn enabled(&self, name: &str) -> bool {
        self.enabled
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .contains(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ports::USE_DEDUP_LOCK;

    #[test]
    fn flags_toggle() {
        let flags = StaticFeatureFlags::with_enabled([USE_DEDUP_LOCK]);
        assert!(flags.enabled(USE_DEDUP_LOCK));
        assert!(!flags.enabled("other"));

        flags.disable(USE_DEDUP_LOCK);
        assert!(!flags.enabled(USE_DEDUP_LOCK));
        flags.enable("other");
        assert!(flags.enabled("other"));
    }
}
