use tracing::info;

use crate::common::auth::{Actor, Capability};
use crate::common::error::{CoreError, CoreResult};
use crate::common::RequestContext;
use crate::domains::listings::actions::support::{active_version, apply_transition, lock_identity};
use crate::domains::listings::machines::ListingAction;
use crate::domains::media::data::{ProcessingJobMessage, RetryMediaBatchInput, RetryMediaBatchOutput};
use crate::domains::media::models::BatchStatus;
use crate::kernel::{ServerDeps, SideEffect, UnitOfWork};

/// Run a finished batch through the pipeline again under a new job.
///
/// Raw objects are reused. A READY batch loses its processed keys. The
/// listing goes back to processing (or plan loading for off-plan types).
pub async fn retry_media_batch(
    input: RetryMediaBatchInput,
    ctx: &RequestContext,
    deps: &ServerDeps,
) -> CoreResult<RetryMediaBatchOutput> {
    let actor = ctx.actor;
    actor.can(Capability::RetryMedia).check()?;

    let (output, post) = ctx
        .within_deadline(async {
            let mut uow = UnitOfWork::begin(deps).await?;
            let mut batch = uow
                .lock_batch(input.batch_id)
                .await?
                .ok_or_else(|| CoreError::not_found("media batch", input.batch_id))?;
            if !batch.status.is_terminal() {
                return Err(CoreError::state_invalid(format!(
                    "media batch {} is {}, only READY or FAILED batches can be retried",
                    batch.id, batch.status
                )));
            }

            let identity = lock_identity(&mut uow, batch.listing_identity_id).await?;
            let mut version = active_version(&mut uow, &identity).await?;
            let action = if version.property_type.is_off_plan() {
                ListingAction::ReprocessPlan
            } else {
                ListingAction::ReprocessMedia
            };
            let reason = input
                .reason
                .clone()
                .filter(|r| !r.trim().is_empty())
                .unwrap_or_else(|| format!("media batch {} retried", batch.id));
            apply_transition(
                &mut uow,
                deps,
                &Actor::system(),
                &identity,
                &mut version,
                action,
                Some(reason),
            )
            .await?;

            if batch.status == BatchStatus::Ready {
                batch.assets.iter_mut().for_each(|a| a.clear_processed());
            }
            let previous_job = batch.job_id;
            let job_id = uow.next_processing_job_id().await?;
            batch.job_id = Some(job_id);
            batch.retry_count = 0;
            batch.terminal_reason = None;
            batch.status = BatchStatus::Processing;
            batch.updated_at = deps.clock.now();
            uow.update_batch(&batch).await?;

            let message = ProcessingJobMessage::for_batch(&batch, job_id, true);
            uow.defer(SideEffect::Enqueue {
                job_id: message.job_id.clone(),
                payload: message.to_bytes()?,
                delay: None,
            });
            metrics::counter!("media_jobs_enqueued_total", "retry" => "true").increment(1);

            info!(
                batch_id = %batch.id,
                job_id = %job_id,
                previous_job = ?previous_job,
                actor = %actor.user_id,
                "media batch retried"
            );

            let post = uow.commit().await?;
            Ok((
                RetryMediaBatchOutput {
                    batch_id: batch.id,
                    job_id,
                    status: batch.status,
                },
                post,
            ))
        })
        .await?;

    post.dispatch(deps).await;
    Ok(output)
}
