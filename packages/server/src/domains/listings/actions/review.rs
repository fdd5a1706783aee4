//! Review and promotion: availability gate, owner media review, admin review.

use tracing::info;

use super::support::{
    active_version, apply_transition, ensure_listing_party, load_version, lock_identity,
    record_status_change,
};
use crate::common::auth::{Actor, Capability};
use crate::common::error::{CoreError, CoreResult};
use crate::common::{ListingIdentityId, ListingVersionId, RequestContext};
use crate::domains::listings::data::StatusChange;
use crate::domains::listings::machines::{GuardContext, ListingAction};
use crate::kernel::{ServerDeps, UnitOfWork};

/// Move a listing out of PENDING_AVAILABILITY.
///
/// Off-plan listings go to PENDING_PLAN_LOADING; everything else goes to
/// PENDING_PHOTO_SCHEDULING once the owner has availability rules or has
/// turned on automatic scheduling.
pub async fn confirm_availability(
    identity_id: ListingIdentityId,
    ctx: &RequestContext,
    deps: &ServerDeps,
) -> CoreResult<StatusChange> {
    let actor = ctx.actor;

    let (change, post) = ctx
        .within_deadline(async {
            let mut uow = UnitOfWork::begin(deps).await?;
            let identity = lock_identity(&mut uow, identity_id).await?;
            let mut version = active_version(&mut uow, &identity).await?;

            let change = if version.property_type.is_off_plan() {
                apply_transition(
                    &mut uow,
                    deps,
                    &actor,
                    &identity,
                    &mut version,
                    ListingAction::PlanLoadingRequired,
                    None,
                )
                .await?
            } else {
                let availability = uow.owner_availability(identity.owner_user_id).await?;
                let guard_ctx = GuardContext::new(&version, &deps.settings.property_type_rules)
                    .with_availability(availability.as_ref());
                let to = deps.machine.decide(
                    version.status,
                    ListingAction::AvailabilityConfirmed,
                    actor.role,
                    &guard_ctx,
                )?;
                record_status_change(&mut uow, deps, &actor, &identity, &mut version, to, None)
                    .await?
            };

            let post = uow.commit().await?;
            Ok((change, post))
        })
        .await?;

    post.dispatch(deps).await;
    Ok(change)
}

/// Owner accepts the processed media.
pub async fn approve_media(
    identity_id: ListingIdentityId,
    ctx: &RequestContext,
    deps: &ServerDeps,
) -> CoreResult<StatusChange> {
    owner_review(identity_id, ListingAction::ApproveMedia, None, ctx, deps).await
}

/// Owner refuses the processed media.
pub async fn reject_media(
    identity_id: ListingIdentityId,
    reason: Option<String>,
    ctx: &RequestContext,
    deps: &ServerDeps,
) -> CoreResult<StatusChange> {
    owner_review(identity_id, ListingAction::RejectMedia, reason, ctx, deps).await
}

/// Owner asks for a new photo session after rejecting the media.
pub async fn reshoot(
    identity_id: ListingIdentityId,
    ctx: &RequestContext,
    deps: &ServerDeps,
) -> CoreResult<StatusChange> {
    owner_review(identity_id, ListingAction::Reshoot, None, ctx, deps).await
}

async fn owner_review(
    identity_id: ListingIdentityId,
    action: ListingAction,
    reason: Option<String>,
    ctx: &RequestContext,
    deps: &ServerDeps,
) -> CoreResult<StatusChange> {
    let actor = ctx.actor;
    actor.can(Capability::ManageOwnListings).check()?;

    let (change, post) = ctx
        .within_deadline(async {
            let mut uow = UnitOfWork::begin(deps).await?;
            let identity = lock_identity(&mut uow, identity_id).await?;
            ensure_listing_party(&actor, &identity)?;
            let mut version = active_version(&mut uow, &identity).await?;

            if action == ListingAction::Reshoot {
                // The next session starts from a clean slate.
                version.photo_session_id = None;
            }
            let change =
                apply_transition(&mut uow, deps, &actor, &identity, &mut version, action, reason)
                    .await?;

            let post = uow.commit().await?;
            Ok((change, post))
        })
        .await?;

    post.dispatch(deps).await;
    Ok(change)
}

/// Admin approval: PENDING_ADMIN_REVIEW → PUBLISHED.
///
/// When `version_id` names a version other than the active one, it is
/// promoted: the pointer swaps to it and the previous active version is
/// archived, all in one transaction.
pub async fn admin_approve(
    identity_id: ListingIdentityId,
    version_id: Option<ListingVersionId>,
    ctx: &RequestContext,
    deps: &ServerDeps,
) -> CoreResult<StatusChange> {
    let actor = ctx.actor;
    actor.can(Capability::Administer).check()?;

    let (change, post) = ctx
        .within_deadline(async {
            let mut uow = UnitOfWork::begin(deps).await?;
            let mut identity = lock_identity(&mut uow, identity_id).await?;

            let mut target = match version_id {
                Some(id) => load_version(&mut uow, &identity, id).await?,
                None => active_version(&mut uow, &identity).await?,
            };
            let mut change = apply_transition(
                &mut uow,
                deps,
                &actor,
                &identity,
                &mut target,
                ListingAction::AdminApprove,
                None,
            )
            .await?;

            if identity.active_version_id != Some(target.id) {
                if identity.active_version_id.is_some() {
                    let mut previous = active_version(&mut uow, &identity).await?;
                    apply_transition(
                        &mut uow,
                        deps,
                        &Actor::system(),
                        &identity,
                        &mut previous,
                        ListingAction::Archive,
                        Some(format!("superseded by version {}", target.version)),
                    )
                    .await?;
                }
                identity.active_version_id = Some(target.id);
                identity.updated_at = deps.clock.now();
                uow.update_identity(&identity).await?;
                change.active_version_id = identity.active_version_id;
                info!(identity_id = %identity.id, active_version_id = %target.id, "version promoted");
            }

            let post = uow.commit().await?;
            Ok((change, post))
        })
        .await?;

    post.dispatch(deps).await;
    Ok(change)
}

/// Admin rejection: PENDING_ADMIN_REVIEW → NEEDS_REVISION with a reason.
pub async fn admin_reject(
    identity_id: ListingIdentityId,
    reason: String,
    ctx: &RequestContext,
    deps: &ServerDeps,
) -> CoreResult<StatusChange> {
    let actor = ctx.actor;
    actor.can(Capability::Administer).check()?;
    let reason = reason.trim().to_string();
    if reason.is_empty() {
        return Err(CoreError::invalid("reason", "a rejection needs a reason"));
    }

    let (change, post) = ctx
        .within_deadline(async {
            let mut uow = UnitOfWork::begin(deps).await?;
            let identity = lock_identity(&mut uow, identity_id).await?;
            let mut version = active_version(&mut uow, &identity).await?;
            let change = apply_transition(
                &mut uow,
                deps,
                &actor,
                &identity,
                &mut version,
                ListingAction::AdminReject,
                Some(reason),
            )
            .await?;

            let post = uow.commit().await?;
            Ok((change, post))
        })
        .await?;

    post.dispatch(deps).await;
    Ok(change)
}
