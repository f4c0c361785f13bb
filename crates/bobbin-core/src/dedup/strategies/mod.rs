//! Strategies - いつまで重複とみなすか
//!
//! - `until_executing`: 実行が始まるまで（開始時にキーを消す）
//! - `until_executed`: 実行が終わるまで（終了後にキーを消し、必要なら 1 回だけ再 enqueue）
//! - `none`: 重複排除しない
//!
//! 戦略はワーカー登録時に名前から解決し、`match` で振り分けます。

mod deduplicates_when_scheduling;
mod until_executed;
mod until_executing;

use std::fmt;
use std::future::Future;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::{DedupContext, DuplicateJob};
use crate::domain::{AttemptState, Completion, DedupError, JobError, JobPayload, Verdict};
use crate::ports::{DedupEventKind, USE_DEDUP_LOCK};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StrategyKind {
    UntilExecuted,
    UntilExecuting,
    None,
}

impl StrategyKind {
    /// Resolve a strategy from its symbolic name (`"until_executed"`, ...).
    pub fn for_name(name: &str) -> Result<Self, DedupError> {
        name.parse()
    }

    pub fn as_str(self) -> &'static str {
        match self {
            StrategyKind::UntilExecuted => "until_executed",
            StrategyKind::UntilExecuting => "until_executing",
            StrategyKind::None => "none",
        }
    }

    /// Name used in log lines.
    pub fn human_name(self) -> &'static str {
        match self {
            StrategyKind::UntilExecuted => "until executed",
            StrategyKind::UntilExecuting => "until executing",
            StrategyKind::None => "none",
        }
    }

    /// Client side: decide whether `payload` should be enqueued at all.
    ///
    /// May set `duplicate-of` on the payload.
    pub async fn schedule(
        self,
        dj: &mut DuplicateJob,
        payload: &mut JobPayload,
        ctx: &DedupContext,
    ) -> Verdict {
        match self {
            StrategyKind::None => {
                dj.settle(AttemptState::Proceed);
                Verdict::Proceed
            }
            StrategyKind::UntilExecuted | StrategyKind::UntilExecuting => {
                deduplicates_when_scheduling::schedule(dj, payload, ctx).await
            }
        }
    }

    /// Server side: run `body` with the strategy's bookkeeping around it.
    ///
    /// `final_attempt` tells the strategy that a failure will not be retried.
    pub async fn perform<F, Fut>(
        self,
        dj: &mut DuplicateJob,
        payload: &mut JobPayload,
        ctx: &DedupContext,
        final_attempt: bool,
        body: F,
    ) -> Result<Completion, JobError>
    where
        F: FnOnce(JobPayload) -> Fut,
        Fut: Future<Output = Result<(), JobError>>,
    {
        match self {
            StrategyKind::UntilExecuted => {
                until_executed::perform(dj, payload, ctx, final_attempt, body).await
            }
            StrategyKind::UntilExecuting => {
                until_executing::perform(dj, payload, ctx, body).await
            }
            StrategyKind::None => {
                let result = body(payload.clone()).await;
                dj.settle(AttemptState::Proceed);
                result.map(|()| Completion::Done)
            }
        }
    }
}

impl fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StrategyKind {
    type Err = DedupError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "until_executed" => Ok(StrategyKind::UntilExecuted),
            "until_executing" => Ok(StrategyKind::UntilExecuting),
            "none" => Ok(StrategyKind::None),
            other => Err(DedupError::UnknownStrategy(other.to_string())),
        }
    }
}

/// Lock key when the duplicate check of `dj` must be serialized.
///
/// Only reschedulable `until_executed` jobs race between "should I reschedule"
/// and a concurrent duplicate setting the flag.
fn dedup_lock_key(dj: &DuplicateJob, ctx: &DedupContext) -> Option<String> {
    let applies = dj.strategy() == StrategyKind::UntilExecuted
        && dj.reschedulable()
        && ctx.flags.enabled(USE_DEDUP_LOCK);
    applies.then(|| dj.key().map(|key| key.lock_key())).flatten()
}

fn report(ctx: &DedupContext, dj: &DuplicateJob, kind: DedupEventKind, err: &DedupError) {
    let mut event = dj.event(kind);
    event.detail = Some(err.to_string());
    ctx.emit(event);
}

/// Expose the WAL locations folded in by dropped duplicates as `dedup_wal_locations`.
async fn propagate_wal_locations(dj: &DuplicateJob, payload: &mut JobPayload, ctx: &DedupContext) {
    match dj.latest_wal_locations(ctx.store.as_ref()).await {
        Ok(locations) if !locations.is_empty() => payload.dedup_wal_locations = Some(locations),
        Ok(_) => {}
        Err(err) => report(ctx, dj, DedupEventKind::StoreError, &err),
    }
}
