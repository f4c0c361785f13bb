//! until_executed - 実行が終わるまでキーを保持する
//!
//! 本体が成功したら「実行中に重複が落とされたか」を読んでからキーを消し、
//! 落とされていれば（reschedule_once のとき）1 回だけ再 enqueue を求めます。
//! 本体が失敗したときは、もうリトライされない場合だけキーを消します。

use std::future::Future;

use super::{dedup_lock_key, propagate_wal_locations, report};
use crate::dedup::{in_lock, DedupContext, DuplicateJob};
use crate::domain::{
    AttemptState, Completion, DedupError, JobError, JobPayload, RescheduleReason,
};
use crate::ports::DedupEventKind;

/// Read the reschedule mark, then release the key.
async fn finish(dj: &DuplicateJob, ctx: &DedupContext) -> Result<bool, DedupError> {
    let store = ctx.store.as_ref();
    let should_reschedule = dj.should_reschedule(store).await?;
    dj.delete(store).await?;
    Ok(should_reschedule)
}

pub(super) async fn perform<F, Fut>(
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
    propagate_wal_locations(dj, payload, ctx).await;

    if let Err(err) = body(payload.clone()).await {
        if !err.is_retryable() || final_attempt {
            if let Err(store_err) = dj.delete(ctx.store.as_ref()).await {
                report(ctx, dj, DedupEventKind::StoreError, &store_err);
            }
        }
        dj.settle(AttemptState::Proceed);
        return Err(err);
    }

    let finished = match dedup_lock_key(dj, ctx) {
        Some(lock_key) => {
            let token = ctx.ids.generate_lease_token();
            let job = &*dj;
            in_lock(
                ctx.leases.as_ref(),
                token,
                &lock_key,
                ctx.settings.lock,
                move || finish(job, ctx),
            )
            .await
        }
        None => Ok(finish(dj, ctx).await),
    };

    match finished {
        Ok(Ok(false)) => {
            dj.settle(AttemptState::Proceed);
            Ok(Completion::Done)
        }
        Ok(Ok(true)) => {
            ctx.emit(dj.event(DedupEventKind::Rescheduled));
            dj.settle(AttemptState::Rescheduled);
            Ok(Completion::Reschedule {
                delay: ctx.reschedule_delay(),
                reason: RescheduleReason::DeduplicatedWhileRunning,
            })
        }
        Ok(Err(err)) => {
            report(ctx, dj, DedupEventKind::StoreError, &err);
            dj.settle(AttemptState::Proceed);
            Ok(Completion::Done)
        }
        Err(err) => {
            // Without the lock we cannot tell whether a duplicate was dropped;
            // free the key and run once more.
            report(ctx, dj, DedupEventKind::LockError, &err);
            if let Err(store_err) = dj.delete(ctx.store.as_ref()).await {
                report(ctx, dj, DedupEventKind::StoreError, &store_err);
            }
            dj.settle(AttemptState::Rescheduled);
            Ok(Completion::Reschedule {
                delay: ctx.reschedule_delay(),
                reason: RescheduleReason::LockTimeout,
            })
        }
    }
}
