//! enqueue 時の重複判定（until_executed / until_executing 共通）

use super::{dedup_lock_key, report};
use crate::dedup::{in_lock, DedupContext, DuplicateJob};
use crate::domain::{AttemptState, DedupError, JobPayload, Verdict};
use crate::ports::{Clock, DedupEventKind};

/// Delayed jobs are left alone unless they were deferred or opted in.
fn deduplicatable(dj: &DuplicateJob) -> bool {
    !dj.scheduled() || dj.deferred() || dj.options().including_scheduled
}

/// Claim the key; a duplicate of idempotent work also records itself on the cookie.
async fn check(dj: &mut DuplicateJob, ctx: &DedupContext) -> Result<(), DedupError> {
    let store = ctx.store.as_ref();
    let ttl = dj.effective_ttl(ctx.clock.now());
    dj.check(store, ttl).await?;

    if dj.duplicate() && dj.idempotent() {
        dj.update_latest_wal_location(store).await?;
        dj.set_deduplicated_flag(store).await?;
    }
    Ok(())
}

pub(super) async fn schedule(
    dj: &mut DuplicateJob,
    payload: &mut JobPayload,
    ctx: &DedupContext,
) -> Verdict {
    if !deduplicatable(dj) {
        dj.settle(AttemptState::Proceed);
        return Verdict::Proceed;
    }

    let checked = match dedup_lock_key(dj, ctx) {
        Some(lock_key) => {
            let token = ctx.ids.generate_lease_token();
            let claimant = &mut *dj;
            let locked = in_lock(
                ctx.leases.as_ref(),
                token,
                &lock_key,
                ctx.settings.lock,
                move || check(claimant, ctx),
            )
            .await;
            match locked {
                Ok(checked) => checked,
                Err(err) => {
                    report(ctx, dj, DedupEventKind::LockError, &err);
                    dj.settle(AttemptState::Proceed);
                    return Verdict::Proceed;
                }
            }
        }
        None => check(dj, ctx).await,
    };

    if let Err(err) = checked {
        report(ctx, dj, DedupEventKind::StoreError, &err);
        dj.settle(AttemptState::Proceed);
        return Verdict::Proceed;
    }

    let Some(existing_jid) = dj.existing_jid().filter(|_| dj.duplicate()) else {
        dj.settle(AttemptState::Proceed);
        return Verdict::Proceed;
    };

    payload.duplicate_of = Some(existing_jid);
    if !dj.idempotent() {
        dj.settle(AttemptState::Proceed);
        return Verdict::Proceed;
    }

    ctx.emit(dj.event(DedupEventKind::Deduplicated));
    dj.settle(AttemptState::Dropped);
    Verdict::Drop { existing_jid }
}
