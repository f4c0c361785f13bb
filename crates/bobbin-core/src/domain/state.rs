//! State - 1 回の enqueue / 実行試行ごとの状態
//!
//! # 状態遷移
//! - Pending -> Claimed | Duplicate（check 時）
//! - Claimed | Duplicate -> Proceed | Dropped | Rescheduled（終端）
//!
//! check を経ずに終端へ進む場合（重複排除の対象外）もあります。

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AttemptState {
    Pending,
    /// The key was claimed by this attempt.
    Claimed,
    /// Another jid already holds the key.
    Duplicate,
    Proceed,
    Dropped,
    Rescheduled,
}

impl AttemptState {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            AttemptState::Proceed | AttemptState::Dropped | AttemptState::Rescheduled
        )
    }
}
