//! Market-side status commands on the active version.

use super::support::{active_version, apply_transition, ensure_listing_party, lock_identity};
use crate::common::error::CoreResult;
use crate::common::{ListingIdentityId, RequestContext};
use crate::domains::listings::data::{ProposalEvent, StatusChange, StatusCommand};
use crate::domains::listings::machines::ListingAction;
use crate::kernel::{ServerDeps, UnitOfWork};

/// PUBLISH (un-suspend) or SUSPEND the active version.
pub async fn change_status(
    identity_id: ListingIdentityId,
    command: StatusCommand,
    ctx: &RequestContext,
    deps: &ServerDeps,
) -> CoreResult<StatusChange> {
    let action = match command {
        StatusCommand::Publish => ListingAction::Unsuspend,
        StatusCommand::Suspend => ListingAction::Suspend,
    };
    transition_active(identity_id, action, None, ctx, deps).await
}

/// Offer and negotiation signals from the proposal subsystem.
pub async fn apply_proposal_event(
    identity_id: ListingIdentityId,
    event: ProposalEvent,
    ctx: &RequestContext,
    deps: &ServerDeps,
) -> CoreResult<StatusChange> {
    let action = match event {
        ProposalEvent::OfferReceived => ListingAction::OfferReceived,
        ProposalEvent::OfferWithdrawn => ListingAction::OfferWithdrawn,
        ProposalEvent::NegotiationStarted => ListingAction::NegotiationStarted,
        ProposalEvent::NegotiationCancelled => ListingAction::NegotiationCancelled,
    };
    transition_active(identity_id, action, None, ctx, deps).await
}

/// PUBLISHED → EXPIRED when the publication period ends.
pub async fn expire_listing(
    identity_id: ListingIdentityId,
    ctx: &RequestContext,
    deps: &ServerDeps,
) -> CoreResult<StatusChange> {
    transition_active(identity_id, ListingAction::Expire, None, ctx, deps).await
}

/// Take a listing off the market for good.
pub async fn close_listing(
    identity_id: ListingIdentityId,
    reason: Option<String>,
    ctx: &RequestContext,
    deps: &ServerDeps,
) -> CoreResult<StatusChange> {
    transition_active(identity_id, ListingAction::Close, reason, ctx, deps).await
}

async fn transition_active(
    identity_id: ListingIdentityId,
    action: ListingAction,
    reason: Option<String>,
    ctx: &RequestContext,
    deps: &ServerDeps,
) -> CoreResult<StatusChange> {
    let actor = ctx.actor;

    let (change, post) = ctx
        .within_deadline(async {
            let mut uow = UnitOfWork::begin(deps).await?;
            let identity = lock_identity(&mut uow, identity_id).await?;
            ensure_listing_party(&actor, &identity)?;
            let mut version = active_version(&mut uow, &identity).await?;

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
