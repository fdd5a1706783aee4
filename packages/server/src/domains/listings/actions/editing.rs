//! Draft lifecycle: start, edit, submit, branch and discard.

use tracing::{debug, info};

use super::support::{
    active_version, apply_transition, ensure_listing_party, load_version, lock_identity,
    open_draft, record_status_change,
};
use crate::common::auth::{Actor, Capability, Role};
use crate::common::error::{CoreError, CoreResult};
use crate::common::{ListingIdentityId, ListingVersionId, RequestContext};
use crate::domains::listings::data::{StartListingInput, StartedListing, StatusChange, UpdateListingInput};
use crate::domains::listings::machines::{GuardContext, ListingAction};
use crate::domains::listings::models::{
    format_listing_code, AddressKey, ListingIdentity, ListingStatus, ListingVersion,
};
use crate::kernel::{ServerDeps, UnitOfWork};

/// Create a listing identity with version 1 in DRAFT.
pub async fn start_listing(
    input: StartListingInput,
    ctx: &RequestContext,
    deps: &ServerDeps,
) -> CoreResult<StartedListing> {
    let actor = ctx.actor;
    actor.can(Capability::ManageOwnListings).check()?;
    let (zip_code, number, complement) = input.validate()?;
    let key = AddressKey::new(&zip_code, &number, complement.as_deref(), None, None);

    let (started, post) = ctx
        .within_deadline(async {
            let mut uow = UnitOfWork::begin(deps).await?;

            uow.lock_address(actor.user_id, &key).await?;
            if let Some(existing) = uow.find_duplicate_identity(actor.user_id, &key).await? {
                return Err(CoreError::ConflictDuplicate(format!(
                    "listing {} already exists at this address",
                    existing
                )));
            }

            let now = deps.clock.now();
            let code = format_listing_code(uow.next_listing_code().await?);
            let mut identity = uow
                .insert_identity(&ListingIdentity::new(actor.user_id, code, now))
                .await?;
            let version = uow
                .insert_version(&ListingVersion::first_draft(
                    identity.id,
                    input.property_type,
                    zip_code,
                    number,
                    complement,
                    now,
                ))
                .await?;
            identity.active_version_id = Some(version.id);
            identity.updated_at = now;
            uow.update_identity(&identity).await?;

            info!(
                identity_id = %identity.id,
                version_id = %version.id,
                code = %identity.code,
                owner = %actor.user_id,
                "listing started"
            );

            let post = uow.commit().await?;
            Ok((
                StartedListing {
                    identity_id: identity.id,
                    uuid: identity.uuid,
                    code: identity.code,
                    version,
                },
                post,
            ))
        })
        .await?;

    post.dispatch(deps).await;
    Ok(started)
}

/// Apply a partial update to an editable version of the caller's listing.
pub async fn update_draft(
    input: UpdateListingInput,
    ctx: &RequestContext,
    deps: &ServerDeps,
) -> CoreResult<ListingVersion> {
    let actor = ctx.actor;
    actor.can(Capability::ManageOwnListings).check()?;

    let (version, post) = ctx
        .within_deadline(async {
            let mut uow = UnitOfWork::begin(deps).await?;
            let identity = lock_identity(&mut uow, input.identity_id).await?;
            ensure_listing_party(&actor, &identity)?;

            let mut version = load_version(&mut uow, &identity, input.version_id).await?;
            if !version.status.is_editable() {
                return Err(CoreError::state_invalid(format!(
                    "version {} is {} and cannot be edited",
                    version.id, version.status
                )));
            }

            input.apply(&mut version)?;
            version.updated_at = deps.clock.now();
            uow.update_version(&version).await?;

            debug!(identity_id = %identity.id, version_id = %version.id, "draft updated");

            let post = uow.commit().await?;
            Ok((version, post))
        })
        .await?;

    post.dispatch(deps).await;
    Ok(version)
}

/// Submit the open draft (or the sole DRAFT active version) for review.
///
/// A subsequent-version draft becomes the active version in the same
/// transaction; the version it replaces is archived.
pub async fn end_update(
    identity_id: ListingIdentityId,
    ctx: &RequestContext,
    deps: &ServerDeps,
) -> CoreResult<StatusChange> {
    let actor = ctx.actor;
    actor.can(Capability::ManageOwnListings).check()?;

    let (change, post) = ctx
        .within_deadline(async {
            let mut uow = UnitOfWork::begin(deps).await?;
            let mut identity = lock_identity(&mut uow, identity_id).await?;
            ensure_listing_party(&actor, &identity)?;

            let mut draft = match open_draft(&mut uow, &identity).await? {
                Some(draft) => draft,
                None => {
                    let active = active_version(&mut uow, &identity).await?;
                    if active.status != ListingStatus::Draft {
                        return Err(CoreError::state_invalid(format!(
                            "listing {} has no draft to submit",
                            identity.id
                        )));
                    }
                    active
                }
            };

            let mut change = apply_transition(
                &mut uow,
                deps,
                &actor,
                &identity,
                &mut draft,
                ListingAction::EndUpdate,
                None,
            )
            .await?;

            if identity.active_version_id != Some(draft.id) {
                let mut previous = active_version(&mut uow, &identity).await?;
                apply_transition(
                    &mut uow,
                    deps,
                    &Actor::system(),
                    &identity,
                    &mut previous,
                    ListingAction::Archive,
                    Some(format!("superseded by version {}", draft.version)),
                )
                .await?;

                identity.active_version_id = Some(draft.id);
                identity.updated_at = deps.clock.now();
                uow.update_identity(&identity).await?;
                change.active_version_id = identity.active_version_id;
                info!(
                    identity_id = %identity.id,
                    active_version_id = %draft.id,
                    archived_version_id = %previous.id,
                    "active version swapped"
                );
            }

            let post = uow.commit().await?;
            Ok((change, post))
        })
        .await?;

    post.dispatch(deps).await;
    Ok(change)
}

/// Branch a new DRAFT off the active version. The active version stays
/// untouched (and public, if it was).
pub async fn create_draft(
    identity_id: ListingIdentityId,
    ctx: &RequestContext,
    deps: &ServerDeps,
) -> CoreResult<ListingVersion> {
    let actor = ctx.actor;
    actor.can(Capability::ManageOwnListings).check()?;

    let (draft, post) = ctx
        .within_deadline(async {
            let mut uow = UnitOfWork::begin(deps).await?;
            let identity = lock_identity(&mut uow, identity_id).await?;
            ensure_listing_party(&actor, &identity)?;

            if open_draft(&mut uow, &identity).await?.is_some() {
                return Err(CoreError::ConflictDraftExists(identity.id));
            }

            let active = active_version(&mut uow, &identity).await?;
            let rules = &deps.settings.property_type_rules;
            deps.machine.decide(
                active.status,
                ListingAction::CreateDraft,
                actor.role,
                &GuardContext::new(&active, rules),
            )?;

            let next_number = uow
                .versions_of(identity.id)
                .await?
                .iter()
                .map(|v| v.version)
                .max()
                .unwrap_or(0)
                + 1;
            let draft = uow
                .insert_version(&active.next_draft(next_number, deps.clock.now()))
                .await?;

            info!(
                identity_id = %identity.id,
                draft_version_id = %draft.id,
                version = draft.version,
                "draft created from active version"
            );

            let post = uow.commit().await?;
            Ok((draft, post))
        })
        .await?;

    post.dispatch(deps).await;
    Ok(draft)
}

/// Soft-delete a non-active DRAFT.
pub async fn discard_draft(
    identity_id: ListingIdentityId,
    version_id: ListingVersionId,
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

            let mut version = load_version(&mut uow, &identity, version_id).await?;
            if version.status != ListingStatus::Draft {
                return Err(CoreError::state_invalid(format!(
                    "version {} is {}, only drafts can be discarded",
                    version.id, version.status
                )));
            }
            if identity.active_version_id == Some(version.id) {
                return Err(CoreError::state_invalid(
                    "the active version cannot be discarded",
                ));
            }

            let to = deps.machine.decide(
                version.status,
                ListingAction::Archive,
                Role::System,
                &GuardContext::new(&version, &deps.settings.property_type_rules),
            )?;
            version.deleted = true;
            let change = record_status_change(
                &mut uow,
                deps,
                &actor,
                &identity,
                &mut version,
                to,
                Some("draft discarded".to_string()),
            )
            .await?;

            let post = uow.commit().await?;
            Ok((change, post))
        })
        .await?;

    post.dispatch(deps).await;
    Ok(change)
}
