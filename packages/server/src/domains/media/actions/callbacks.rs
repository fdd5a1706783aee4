//! Processing pipeline callbacks.
//!
//! Delivery is at-least-once. The batch row lock, the terminal batch state
//! and the audit of applied executions make a replay a no-op.

use tracing::{info, warn};

use crate::common::auth::{Actor, Capability};
use crate::common::error::CoreResult;
use crate::common::RequestContext;
use crate::domains::listings::actions::support::{apply_transition, lock_identity};
use crate::domains::listings::machines::ListingAction;
use crate::domains::listings::models::ListingStatus;
use crate::domains::media::data::{
    CallbackOutcome, CallbackReceipt, CallbackStatus, ProcessingCallback, ProcessingJobMessage,
};
use crate::domains::media::models::{BatchStatus, CallbackAudit, MediaBatch};
use crate::kernel::{ServerDeps, SideEffect, UnitOfWork};

/// Apply one callback. `raw_body` is stored verbatim for audit, including
/// bodies that fail to parse.
pub async fn handle_processing_callback(
    raw_body: &[u8],
    ctx: &RequestContext,
    deps: &ServerDeps,
) -> CoreResult<CallbackReceipt> {
    let actor = ctx.actor;
    actor.can(Capability::RetryMedia).check()?;
    let raw = String::from_utf8_lossy(raw_body).into_owned();

    let callback = match ProcessingCallback::parse(raw_body) {
        Ok(callback) => callback,
        Err(err) => {
            warn!(error = %err, "rejected processing callback");
            record_rejected(raw, ctx, deps).await?;
            metrics::counter!("media_callbacks_total", "outcome" => "rejected").increment(1);
            return Err(err);
        }
    };

    let (receipt, post) = ctx
        .within_deadline(async {
            let mut uow = UnitOfWork::begin(deps).await?;
            let now = deps.clock.now();

            let batch = match uow.lock_batch_by_job(callback.job_id).await? {
                Some(batch) => Some(batch),
                None => match callback.external_batch_id() {
                    Some(id) => uow.lock_batch(id).await?,
                    None => None,
                },
            };

            let Some(mut batch) = batch else {
                let outcome = CallbackOutcome::Ignored;
                uow.insert_callback_audit(&audit(&callback, None, outcome, &raw, now))
                    .await?;
                let post = uow.commit().await?;
                return Ok((receipt_for(&callback, None, outcome), post));
            };

            let outcome = apply(&callback, &mut batch, &mut uow, deps).await?;
            uow.insert_callback_audit(&audit(&callback, Some(&batch), outcome, &raw, now))
                .await?;
            let post = uow.commit().await?;
            Ok((receipt_for(&callback, Some(&batch), outcome), post))
        })
        .await?;

    post.dispatch(deps).await;
    metrics::counter!("media_callbacks_total", "outcome" => receipt.outcome.as_str()).increment(1);
    info!(
        job_id = %receipt.job_id,
        batch_id = ?receipt.batch_id,
        outcome = receipt.outcome.as_str(),
        "processing callback handled"
    );
    Ok(receipt)
}

async fn apply(
    callback: &ProcessingCallback,
    batch: &mut MediaBatch,
    uow: &mut UnitOfWork,
    deps: &ServerDeps,
) -> CoreResult<CallbackOutcome> {
    if batch.status.is_terminal() {
        return Ok(CallbackOutcome::Duplicate);
    }
    if let Some(arn) = callback.execution_arn.as_deref() {
        if uow.callback_applied(callback.job_id, arn).await? {
            return Ok(CallbackOutcome::Duplicate);
        }
    }
    if batch.job_id != Some(callback.job_id) || batch.status != BatchStatus::Processing {
        warn!(
            batch_id = %batch.id,
            job_id = %callback.job_id,
            current_job = ?batch.job_id,
            status = %batch.status,
            "callback for a job the batch is not running"
        );
        return Ok(CallbackOutcome::Ignored);
    }

    let now = deps.clock.now();
    match callback.status {
        CallbackStatus::Success => {
            let matched = callback.apply_outputs(&mut batch.assets);
            if matched < batch.assets.len() {
                warn!(
                    batch_id = %batch.id,
                    matched,
                    assets = batch.assets.len(),
                    "some assets came back without processed output"
                );
            }
            batch.status = BatchStatus::Ready;
            batch.updated_at = now;
            uow.update_batch(batch).await?;
            move_listing(batch, ListingAction::MediaReady, None, uow, deps).await?;
            Ok(CallbackOutcome::Applied)
        }
        CallbackStatus::Failure
            if callback.is_retriable() && batch.retry_count < deps.settings.max_retries =>
        {
            let delay = deps.settings.backoff_for(batch.retry_count);
            batch.retry_count += 1;
            batch.updated_at = now;
            uow.update_batch(batch).await?;

            let message = ProcessingJobMessage::for_batch(batch, callback.job_id, true);
            uow.defer(SideEffect::Enqueue {
                job_id: message.job_id.clone(),
                payload: message.to_bytes()?,
                delay: Some(delay),
            });
            metrics::counter!("media_jobs_enqueued_total", "retry" => "true").increment(1);
            info!(
                batch_id = %batch.id,
                job_id = %callback.job_id,
                retry_count = batch.retry_count,
                delay_ms = delay.as_millis() as u64,
                "retriable processing failure, job requeued"
            );
            Ok(CallbackOutcome::Retrying)
        }
        CallbackStatus::Failure => {
            let reason = callback.failure_text();
            batch.status = BatchStatus::Failed;
            batch.terminal_reason = Some(reason.clone());
            batch.updated_at = now;
            uow.update_batch(batch).await?;
            move_listing(batch, ListingAction::MediaFailed, Some(reason), uow, deps).await?;
            Ok(CallbackOutcome::Applied)
        }
    }
}

/// Fire the pipeline's outcome on the listing, if it is still waiting on
/// this pipeline.
async fn move_listing(
    batch: &MediaBatch,
    action: ListingAction,
    reason: Option<String>,
    uow: &mut UnitOfWork,
    deps: &ServerDeps,
) -> CoreResult<()> {
    let identity = lock_identity(uow, batch.listing_identity_id).await?;
    let Some(active_id) = identity.active_version_id else {
        return Ok(());
    };
    let Some(mut version) = uow.find_version(active_id).await? else {
        return Ok(());
    };
    if !matches!(
        version.status,
        ListingStatus::PendingPhotoProcessing | ListingStatus::PendingPlanLoading
    ) {
        warn!(
            identity_id = %identity.id,
            status = %version.status,
            "listing left the media pipeline before its batch finished"
        );
        return Ok(());
    }

    apply_transition(uow, deps, &Actor::system(), &identity, &mut version, action, reason)
        .await?;
    Ok(())
}

async fn record_rejected(raw: String, ctx: &RequestContext, deps: &ServerDeps) -> CoreResult<()> {
    ctx.within_deadline(async {
        let mut uow = UnitOfWork::begin(deps).await?;
        uow.insert_callback_audit(&CallbackAudit {
            job_id: None,
            batch_id: None,
            execution_arn: None,
            status: "UNPARSEABLE".to_string(),
            outcome: "rejected".to_string(),
            raw_body: raw,
            received_at: deps.clock.now(),
        })
        .await?;
        uow.commit().await?.dispatch(deps).await;
        Ok(())
    })
    .await
}

fn audit(
    callback: &ProcessingCallback,
    batch: Option<&MediaBatch>,
    outcome: CallbackOutcome,
    raw: &str,
    now: chrono::DateTime<chrono::Utc>,
) -> CallbackAudit {
    CallbackAudit {
        job_id: Some(callback.job_id),
        batch_id: batch.map(|b| b.id),
        execution_arn: callback.execution_arn.clone(),
        status: callback.status.as_str().to_string(),
        outcome: outcome.as_str().to_string(),
        raw_body: raw.to_string(),
        received_at: now,
    }
}

fn receipt_for(
    callback: &ProcessingCallback,
    batch: Option<&MediaBatch>,
    outcome: CallbackOutcome,
) -> CallbackReceipt {
    CallbackReceipt {
        job_id: callback.job_id,
        batch_id: batch.map(|b| b.id),
        outcome,
    }
}
