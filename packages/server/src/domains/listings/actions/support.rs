//! Shared steps of listing commands: locking, ownership, and status changes.

use tracing::info;

use crate::common::auth::{Actor, Role};
use crate::common::error::{CoreError, CoreResult};
use crate::common::{ListingIdentityId, ListingVersionId};
use crate::domains::listings::data::StatusChange;
use crate::domains::listings::events::ListingStatusChanged;
use crate::domains::listings::machines::{GuardContext, ListingAction};
use crate::domains::listings::models::{ListingIdentity, ListingStatus, ListingVersion};
use crate::kernel::{ServerDeps, SideEffect, UnitOfWork};

/// Row-locks the identity; every listing command starts here.
pub(crate) async fn lock_identity(
    uow: &mut UnitOfWork,
    id: ListingIdentityId,
) -> CoreResult<ListingIdentity> {
    uow.lock_identity(id)
        .await?
        .ok_or_else(|| CoreError::not_found("listing", id))
}

/// Owner-side actors may only touch their own listings. Admin and system
/// act on any listing; other roles are refused here.
pub(crate) fn ensure_listing_party(actor: &Actor, identity: &ListingIdentity) -> CoreResult<()> {
    match actor.role {
        Role::Admin | Role::System => Ok(()),
        role if role.is_listing_party() && identity.is_owned_by(actor.user_id) => Ok(()),
        role if role.is_listing_party() => Err(CoreError::forbidden(format!(
            "listing {} belongs to another user",
            identity.id
        ))),
        role => Err(CoreError::forbidden(format!(
            "role {} cannot act on listings",
            role
        ))),
    }
}

/// A live version of the identity.
pub(crate) async fn load_version(
    uow: &mut UnitOfWork,
    identity: &ListingIdentity,
    version_id: ListingVersionId,
) -> CoreResult<ListingVersion> {
    match uow.find_version(version_id).await? {
        Some(v) if v.identity_id == identity.id && !v.deleted => Ok(v),
        _ => Err(CoreError::not_found("listing version", version_id)),
    }
}

pub(crate) async fn active_version(
    uow: &mut UnitOfWork,
    identity: &ListingIdentity,
) -> CoreResult<ListingVersion> {
    let id = identity
        .active_version_id
        .ok_or_else(|| CoreError::not_found("active version of listing", identity.id))?;
    load_version(uow, identity, id).await
}

/// The non-active DRAFT of the identity, if one is open.
pub(crate) async fn open_draft(
    uow: &mut UnitOfWork,
    identity: &ListingIdentity,
) -> CoreResult<Option<ListingVersion>> {
    Ok(uow
        .versions_of(identity.id)
        .await?
        .into_iter()
        .find(|v| {
            v.status == ListingStatus::Draft
                && !v.deleted
                && identity.active_version_id != Some(v.id)
        }))
}

/// Ask the machine for the target of `action` and record the change.
pub(crate) async fn apply_transition(
    uow: &mut UnitOfWork,
    deps: &ServerDeps,
    actor: &Actor,
    identity: &ListingIdentity,
    version: &mut ListingVersion,
    action: ListingAction,
    reason: Option<String>,
) -> CoreResult<StatusChange> {
    let ctx = GuardContext::new(version, &deps.settings.property_type_rules);
    let to = deps.machine.decide(version.status, action, actor.role, &ctx)?;
    record_status_change(uow, deps, actor, identity, version, to, reason).await
}

/// Persist a decided status change, append it to the outbox and defer its
/// publication.
pub(crate) async fn record_status_change(
    uow: &mut UnitOfWork,
    deps: &ServerDeps,
    actor: &Actor,
    identity: &ListingIdentity,
    version: &mut ListingVersion,
    to: ListingStatus,
    reason: Option<String>,
) -> CoreResult<StatusChange> {
    let now = deps.clock.now();
    let from = version.status;
    version.status = to;
    version.updated_at = now;
    uow.update_version(version).await?;

    let event = ListingStatusChanged {
        identity_id: identity.id,
        version_id: version.id,
        owner_user_id: identity.owner_user_id,
        old_status: from,
        new_status: to,
        reason,
        actor_id: actor.user_id,
        occurred_at: now,
    };
    uow.insert_status_event(&event).await?;
    uow.defer(SideEffect::StatusChanged(event));

    info!(
        identity_id = %identity.id,
        version_id = %version.id,
        from = %from,
        to = %to,
        actor = %actor.user_id,
        "listing status changed"
    );

    Ok(StatusChange {
        identity_id: identity.id,
        version_id: version.id,
        previous_status: from,
        new_status: to,
        active_version_id: identity.active_version_id,
    })
}
