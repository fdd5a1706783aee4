//! Read paths over listings, plus the view counter.

use tracing::debug;

use super::support::{active_version, ensure_listing_party, lock_identity, open_draft};
use crate::common::error::{CoreError, CoreResult};
use crate::common::pagination::Page;
use crate::common::{ListingIdentityId, RequestContext};
use crate::domains::listings::data::{
    ListListingsInput, ListingCard, ListingDetail, ListingSearch, VersionSummary,
};
use crate::domains::listings::models::ListingVersion;
use crate::domains::photo_sessions::data::SessionView;
use crate::kernel::{ServerDeps, UnitOfWork};

/// Every version of a listing, newest first. Discarded drafts only when
/// `include_deleted` is set.
pub async fn list_versions(
    identity_id: ListingIdentityId,
    include_deleted: bool,
    ctx: &RequestContext,
    deps: &ServerDeps,
) -> CoreResult<Vec<VersionSummary>> {
    let actor = ctx.actor;
    ctx.within_deadline(async {
        let mut uow = UnitOfWork::begin(deps).await?;
        let identity = uow
            .find_identity(identity_id)
            .await?
            .ok_or_else(|| CoreError::not_found("listing", identity_id))?;
        ensure_listing_party(&actor, &identity)?;

        Ok(uow
            .versions_of(identity.id)
            .await?
            .iter()
            .filter(|v| include_deleted || !v.deleted)
            .map(|v| VersionSummary::new(v, &identity))
            .collect())
    })
    .await
}

/// The version `active_version_id` points at.
pub async fn load_active(
    identity_id: ListingIdentityId,
    ctx: &RequestContext,
    deps: &ServerDeps,
) -> CoreResult<ListingVersion> {
    let actor = ctx.actor;
    ctx.within_deadline(async {
        let mut uow = UnitOfWork::begin(deps).await?;
        let identity = uow
            .find_identity(identity_id)
            .await?
            .ok_or_else(|| CoreError::not_found("listing", identity_id))?;
        ensure_listing_party(&actor, &identity)?;
        active_version(&mut uow, &identity).await
    })
    .await
}

/// Owner-only detail: active version, open draft id and live photo session.
pub async fn get_listing_detail(
    identity_id: ListingIdentityId,
    ctx: &RequestContext,
    deps: &ServerDeps,
) -> CoreResult<ListingDetail> {
    let actor = ctx.actor;
    ctx.within_deadline(async {
        let mut uow = UnitOfWork::begin(deps).await?;
        let identity = uow
            .find_identity(identity_id)
            .await?
            .ok_or_else(|| CoreError::not_found("listing", identity_id))?;
        if !identity.is_owned_by(actor.user_id) {
            return Err(CoreError::forbidden("only the owner can view listing details"));
        }

        let active = active_version(&mut uow, &identity).await?;
        let draft_version_id = open_draft(&mut uow, &identity).await?.map(|d| d.id);

        let photo_session = match active.photo_session_id {
            Some(id) => uow
                .find_session(id)
                .await?
                .filter(|s| s.status.is_live())
                .map(|s| SessionView::new(&s, Some(active.status))),
            None => None,
        };

        Ok(ListingDetail {
            identity_id: identity.id,
            uuid: identity.uuid,
            code: identity.code.clone(),
            user_id: identity.owner_user_id,
            favorites_count: identity.favorites_count,
            views_count: identity.views_count,
            active_version: active,
            draft_version_id,
            photo_session,
        })
    })
    .await
}

/// Filtered, paginated listing query with role scoping.
pub async fn list_listings(
    input: ListListingsInput,
    ctx: &RequestContext,
    deps: &ServerDeps,
) -> CoreResult<Page<ListingCard>> {
    let search = ListingSearch::scoped(input, &ctx.actor)?;
    debug!(
        user_id = ?search.user_id,
        visibility = ?search.visibility,
        all_versions = search.include_all_versions,
        "listing search"
    );

    ctx.within_deadline(async {
        let mut uow = UnitOfWork::begin(deps).await?;
        let (rows, total) = uow.search_listings(&search).await?;
        Ok(Page::new(
            rows.into_iter().map(ListingCard::from).collect(),
            total,
            &search.page,
        ))
    })
    .await
}

/// Count a view of a public listing. Owners looking at their own listing
/// are not counted. Returns the current count.
pub async fn record_view(
    identity_id: ListingIdentityId,
    ctx: &RequestContext,
    deps: &ServerDeps,
) -> CoreResult<i64> {
    let actor = ctx.actor;
    let (count, post) = ctx
        .within_deadline(async {
            let mut uow = UnitOfWork::begin(deps).await?;
            let mut identity = lock_identity(&mut uow, identity_id).await?;
            let active = active_version(&mut uow, &identity).await?;

            if !identity.is_owned_by(actor.user_id) && active.status.is_public() {
                identity.views_count += 1;
                uow.update_identity(&identity).await?;
            }

            let count = identity.views_count;
            let post = uow.commit().await?;
            Ok((count, post))
        })
        .await?;

    post.dispatch(deps).await;
    Ok(count)
}
