//! Client-driven upload cycle: signed PUTs out, storage HEADs back in.

use futures::future::try_join_all;
use tracing::{debug, info, warn};

use crate::common::auth::{Actor, Role};
use crate::common::error::{AssetMismatch, CoreError, CoreResult};
use crate::common::{MediaBatchId, RequestContext, UserId};
use crate::config::EngineSettings;
use crate::domains::listings::actions::support::{active_version, ensure_listing_party, lock_identity};
use crate::domains::listings::models::{ListingStatus, ListingVersion};
use crate::domains::media::data::{
    estimate_processing, raw_object_key, upload_headers, CompleteUploadInput,
    CompleteUploadOutput, ProcessingJobMessage, RequestUploadUrlsInput, UploadFileInput,
    UploadInstruction, UploadUrlsOutput,
};
use crate::domains::media::models::{BatchStatus, MediaAsset, MediaBatch};
use crate::kernel::{HttpMethod, ObjectHead, ServerDeps, SideEffect, SignRequest, UnitOfWork};

/// Open a batch for the listing and sign one PUT per declared file.
///
/// While photos are processing only the session's photographer (or an
/// admin) uploads; while an off-plan listing loads its plan the owner side
/// uploads project material.
pub async fn request_upload_urls(
    mut input: RequestUploadUrlsInput,
    ctx: &RequestContext,
    deps: &ServerDeps,
) -> CoreResult<UploadUrlsOutput> {
    let actor = ctx.actor;
    input.validate(&deps.settings)?;

    let (batch, post) = ctx
        .within_deadline(async {
            let mut uow = UnitOfWork::begin(deps).await?;
            let identity = lock_identity(&mut uow, input.listing_identity_id).await?;
            let version = active_version(&mut uow, &identity).await?;

            let photographer = match version.photo_session_id {
                Some(id) => uow.find_session(id).await?.map(|s| s.photographer_user_id),
                None => None,
            };
            authorize_upload(&actor, &version, photographer, &input.files)?;
            if version.status == ListingStatus::PendingPlanLoading && actor.role != Role::Admin {
                ensure_listing_party(&actor, &identity)?;
            }

            if let Some(open) = uow.open_batch_for(identity.id).await? {
                return Err(CoreError::ConflictOpenBatch(open.id));
            }

            let now = deps.clock.now();
            let batch_id = MediaBatchId::new();
            let assets = input
                .files
                .iter()
                .cloned()
                .map(|file| {
                    let key = raw_object_key(
                        identity.uuid,
                        batch_id,
                        file.asset_type,
                        file.sequence,
                        &file.content_type,
                    );
                    file.into_asset(key)
                })
                .collect();
            let batch = MediaBatch {
                id: batch_id,
                listing_identity_id: identity.id,
                status: BatchStatus::PendingUpload,
                assets,
                job_id: None,
                retry_count: 0,
                created_by: actor.user_id,
                terminal_reason: None,
                created_at: now,
                updated_at: now,
            };
            uow.insert_batch(&batch).await?;

            info!(
                identity_id = %identity.id,
                batch_id = %batch.id,
                assets = batch.assets.len(),
                "media batch opened"
            );

            let post = uow.commit().await?;
            Ok((batch, post))
        })
        .await?;
    post.dispatch(deps).await;

    let expires_at = deps.clock.now() + EngineSettings::ttl(deps.settings.upload_url_ttl);
    let instructions = batch
        .assets
        .iter()
        .map(|asset| -> CoreResult<UploadInstruction> {
            let signed = deps.storage.sign(&SignRequest {
                method: HttpMethod::Put,
                key: asset.raw_object_key.clone(),
                expires_at,
                headers: upload_headers(asset),
            })?;
            Ok(UploadInstruction {
                asset_type: asset.asset_type,
                sequence: asset.sequence,
                title: asset.title.clone(),
                raw_object_key: asset.raw_object_key.clone(),
                method: signed.method,
                url: signed.url,
                expires_at: signed.expires_at,
                headers: signed.headers,
            })
        })
        .collect::<CoreResult<Vec<_>>>()?;

    Ok(UploadUrlsOutput {
        batch_id: batch.id,
        listing_identity_id: batch.listing_identity_id,
        instructions,
    })
}

fn authorize_upload(
    actor: &Actor,
    version: &ListingVersion,
    photographer: Option<UserId>,
    files: &[UploadFileInput],
) -> CoreResult<()> {
    match version.status {
        ListingStatus::PendingPhotoProcessing => {
            if files.iter().any(|f| f.asset_type.is_project()) {
                return Err(CoreError::invalid(
                    "assetType",
                    "project material is only accepted while the plan is loading",
                ));
            }
            match actor.role {
                Role::Admin => Ok(()),
                Role::Photographer if photographer == Some(actor.user_id) => Ok(()),
                _ => Err(CoreError::forbidden(
                    "only the session's photographer can upload media",
                )),
            }
        }
        ListingStatus::PendingPlanLoading => {
            if files.iter().any(|f| !f.asset_type.is_project()) {
                return Err(CoreError::invalid(
                    "assetType",
                    "only PROJECT_DOC and PROJECT_RENDER are accepted while the plan is loading",
                ));
            }
            Ok(())
        }
        other => Err(CoreError::state_invalid(format!(
            "listing is {}, uploads are not open",
            other
        ))),
    }
}

/// Check every declared object against storage, then hand the batch to the
/// processing pipeline.
///
/// Any mismatch leaves the batch in PENDING_UPLOAD so the client can PUT
/// again and retry.
pub async fn complete_upload_batch(
    input: CompleteUploadInput,
    ctx: &RequestContext,
    deps: &ServerDeps,
) -> CoreResult<CompleteUploadOutput> {
    let actor = ctx.actor;

    let batch = ctx
        .within_deadline(async {
            let mut uow = UnitOfWork::begin(deps).await?;
            let batch = uow
                .lock_batch(input.batch_id)
                .await?
                .ok_or_else(|| CoreError::not_found("media batch", input.batch_id))?;
            Ok(batch)
        })
        .await?;

    if batch.created_by != actor.user_id && !actor.is_admin() {
        return Err(CoreError::forbidden(
            "only the uploader can complete this batch",
        ));
    }
    ensure_pending_upload(&batch)?;
    let reconciled = input.reconcile(&batch.assets)?;

    let heads = ctx
        .within_deadline(async {
            Ok(try_join_all(
                batch
                    .assets
                    .iter()
                    .map(|asset| deps.storage.head(&asset.raw_object_key)),
            )
            .await?)
        })
        .await?;
    check_stored_objects(&batch, &heads, deps)?;

    let (batch, post) = ctx
        .within_deadline(async {
            let mut uow = UnitOfWork::begin(deps).await?;
            let mut batch = uow
                .lock_batch(input.batch_id)
                .await?
                .ok_or_else(|| CoreError::not_found("media batch", input.batch_id))?;
            ensure_pending_upload(&batch)?;

            let now = deps.clock.now();
            batch.assets = reconciled;
            batch.status = BatchStatus::Received;
            debug!(batch_id = %batch.id, "media batch received");

            let job_id = uow.next_processing_job_id().await?;
            batch.job_id = Some(job_id);
            batch.retry_count = 0;
            batch.terminal_reason = None;
            batch.status = BatchStatus::Processing;
            batch.updated_at = now;
            uow.update_batch(&batch).await?;

            let message = ProcessingJobMessage::for_batch(&batch, job_id, false);
            uow.defer(SideEffect::Enqueue {
                job_id: message.job_id.clone(),
                payload: message.to_bytes()?,
                delay: None,
            });
            metrics::counter!("media_jobs_enqueued_total", "retry" => "false").increment(1);

            info!(
                identity_id = %batch.listing_identity_id,
                batch_id = %batch.id,
                job_id = %job_id,
                "media batch sent to processing"
            );

            let post = uow.commit().await?;
            Ok((batch, post))
        })
        .await?;
    post.dispatch(deps).await;

    let job_id = batch
        .job_id
        .ok_or_else(|| CoreError::Internal(anyhow::anyhow!("batch {} lost its job id", batch.id)))?;
    Ok(CompleteUploadOutput {
        batch_id: batch.id,
        job_id,
        status: batch.status,
        estimated_processing_secs: estimate_processing(&batch.assets).as_secs(),
    })
}

fn ensure_pending_upload(batch: &MediaBatch) -> CoreResult<()> {
    if batch.status != BatchStatus::PendingUpload {
        return Err(CoreError::state_invalid(format!(
            "media batch {} is {}, not PENDING_UPLOAD",
            batch.id, batch.status
        )));
    }
    Ok(())
}

fn check_stored_objects(
    batch: &MediaBatch,
    heads: &[Option<ObjectHead>],
    deps: &ServerDeps,
) -> CoreResult<()> {
    let mut mismatches = Vec::new();
    let mut missing = Vec::new();

    for (asset, head) in batch.assets.iter().zip(heads) {
        let problem = match head {
            None => {
                missing.push(mismatch(asset, "object not found"));
                Some("object not found".to_string())
            }
            Some(head) if head.size != asset.byte_size => Some(format!(
                "stored size {} differs from declared {}",
                head.size, asset.byte_size
            )),
            Some(head) => match &head.sha256 {
                Some(stored) if stored.eq_ignore_ascii_case(&asset.sha256) => None,
                Some(_) => Some("stored sha256 differs from declared".to_string()),
                None => Some("storage recorded no sha256".to_string()),
            },
        };
        if let Some(reason) = problem {
            mismatches.push(mismatch(asset, &reason));
        }
    }

    if mismatches.is_empty() {
        return Ok(());
    }

    let upload_deadline = batch.created_at + EngineSettings::ttl(deps.settings.upload_url_ttl);
    if !missing.is_empty() && deps.clock.now() >= upload_deadline {
        warn!(batch_id = %batch.id, missing = missing.len(), "upload window expired");
        return Err(CoreError::ValidationUploadExpired { missing });
    }

    warn!(batch_id = %batch.id, mismatched = mismatches.len(), "uploaded objects do not match");
    Err(CoreError::ValidationChecksum { mismatches })
}

fn mismatch(asset: &MediaAsset, reason: &str) -> AssetMismatch {
    AssetMismatch {
        asset_type: asset.asset_type.as_str().to_string(),
        sequence: asset.sequence,
        reason: reason.to_string(),
    }
}
