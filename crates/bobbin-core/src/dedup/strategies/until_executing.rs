//! until_executing - 実行が始まった時点でキーを手放す
//!
//! 本体の実行中に来た同じジョブは重複とみなされず、そのまま enqueue されます。

use std::future::Future;

use super::{propagate_wal_locations, report};
use crate::dedup::{DedupContext, DuplicateJob};
use crate::domain::{AttemptState, Completion, JobError, JobPayload};
use crate::ports::DedupEventKind;

pub(super) async fn perform<F, Fut>(
    dj: &mut DuplicateJob,
    payload: &mut JobPayload,
    ctx: &DedupContext,
    body: F,
) -> Result<Completion, JobError>
where
    F: FnOnce(JobPayload) -> Fut,
    Fut: Future<Output = Result<(), JobError>>,
{
    propagate_wal_locations(dj, payload, ctx).await;

    if let Err(err) = dj.delete(ctx.store.as_ref()).await {
        report(ctx, dj, DedupEventKind::StoreError, &err);
    }

    let result = body(payload.clone()).await;
    dj.settle(AttemptState::Proceed);
    result.map(|()| Completion::Done)
}
