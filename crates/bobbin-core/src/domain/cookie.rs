use serde::{Deserialize, Serialize};

use super::{Jid, WalLocations};

/// Value stored under an idempotency key.
///
/// The owning jid plus the bookkeeping that later duplicates fold into it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdempotencyCookie {
    pub jid: Jid,

    /// Latest WAL locations reported by dropped duplicates.
    #[serde(default)]
    pub wal_locations: WalLocations,

    /// Set when a duplicate was dropped in favour of `jid`.
    #[serde(default)]
    pub deduplicated: bool,
}

impl IdempotencyCookie {
    pub fn new(jid: Jid) -> Self {
        Self {
            jid,
            wal_locations: WalLocations::new(),
            deduplicated: false,
        }
    }
}
