use std::collections::BTreeMap;

use crate::common::error::{CoreError, CoreResult};
use crate::common::{ListingIdentityId, RequestContext};
use crate::config::EngineSettings;
use crate::domains::listings::actions::support::ensure_listing_party;
use crate::domains::media::data::{DownloadAsset, DownloadUrlsOutput};
use crate::kernel::{HttpMethod, ServerDeps, SignRequest, SignedUrl, UnitOfWork};

/// Signed GETs for the processed media of the listing's latest READY batch.
/// `None` when no batch has finished yet.
pub async fn list_download_urls(
    identity_id: ListingIdentityId,
    ctx: &RequestContext,
    deps: &ServerDeps,
) -> CoreResult<Option<DownloadUrlsOutput>> {
    let actor = ctx.actor;

    let batch = ctx
        .within_deadline(async {
            let mut uow = UnitOfWork::begin(deps).await?;
            let identity = uow
                .find_identity(identity_id)
                .await?
                .ok_or_else(|| CoreError::not_found("listing", identity_id))?;
            ensure_listing_party(&actor, &identity)?;
            Ok(uow.latest_ready_batch(identity.id).await?)
        })
        .await?;

    let Some(batch) = batch else {
        return Ok(None);
    };

    let expires_at = deps.clock.now() + EngineSettings::ttl(deps.settings.download_url_ttl);
    let sign = |key: &str| -> CoreResult<SignedUrl> {
        Ok(deps.storage.sign(&SignRequest {
            method: HttpMethod::Get,
            key: key.to_string(),
            expires_at,
            headers: BTreeMap::new(),
        })?)
    };

    let mut assets = Vec::with_capacity(batch.assets.len());
    for asset in &batch.assets {
        let Some(processed) = asset.processed_object_key.as_deref() else {
            continue;
        };
        assets.push(DownloadAsset {
            asset_type: asset.asset_type,
            sequence: asset.sequence,
            title: asset.title.clone(),
            url: sign(processed)?,
            preview_url: asset.preview_object_key.as_deref().map(&sign).transpose()?,
            thumbnail_url: asset.thumbnail_object_key.as_deref().map(&sign).transpose()?,
        });
    }

    Ok(Some(DownloadUrlsOutput {
        listing_identity_id: batch.listing_identity_id,
        batch_id: batch.id,
        expires_at,
        assets,
    }))
}
