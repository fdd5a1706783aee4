//! Reserve, confirm and cancel a photographer slot for a listing.
//!
//! Locks are always taken identity → session → slot so concurrent
//! commands on the same listing or slot serialize instead of deadlocking.
//! Reserving never locks another listing's session: a lapsed holder's
//! pending session is settled by that holder's confirm or cancel, or by the
//! sweep.

use serde_json::json;
use tracing::{debug, info};

use crate::common::auth::{Actor, Capability};
use crate::common::error::{CoreError, CoreResult};
use crate::common::{PhotoSessionId, RequestContext};
use crate::config::EngineSettings;
use crate::domains::listings::actions::support::{
    active_version, apply_transition, ensure_listing_party, lock_identity, record_status_change,
};
use crate::domains::listings::machines::{GuardContext, ListingAction};
use crate::domains::photo_sessions::data::{
    ConfirmReservationInput, ReservationView, ReserveSlotInput, SessionView,
};
use crate::domains::photo_sessions::models::{PhotoSession, PhotoSessionStatus, SlotStatus};
use crate::kernel::{Notification, PostCommit, ServerDeps, SideEffect, UnitOfWork};

/// Hold a slot for the listing and create a PENDING session.
///
/// An AVAILABLE slot, or a RESERVED one whose hold has lapsed, can be taken.
pub async fn reserve_slot(
    input: ReserveSlotInput,
    ctx: &RequestContext,
    deps: &ServerDeps,
) -> CoreResult<ReservationView> {
    let actor = ctx.actor;
    actor.can(Capability::ManageOwnListings).check()?;

    let (view, post) = ctx
        .within_deadline(async {
            let mut uow = UnitOfWork::begin(deps).await?;
            let identity = lock_identity(&mut uow, input.listing_identity_id).await?;
            ensure_listing_party(&actor, &identity)?;
            let mut version = active_version(&mut uow, &identity).await?;

            let to = deps.machine.decide(
                version.status,
                ListingAction::ReserveSlot,
                actor.role,
                &GuardContext::new(&version, &deps.settings.property_type_rules),
            )?;

            let now = deps.clock.now();
            let mut slot = uow
                .lock_slot(input.slot_id)
                .await?
                .ok_or_else(|| CoreError::not_found("slot", input.slot_id))?;

            if !slot.is_reservable(now) || slot.slot_start <= now {
                metrics::counter!("slot_reservations_total", "outcome" => "conflict").increment(1);
                return Err(CoreError::ConflictSlot(format!(
                    "slot {} is not available",
                    slot.id
                )));
            }

            if slot.reservation_expired(now) {
                debug!(
                    slot_id = %slot.id,
                    lapsed_session = ?slot.photo_session_id,
                    "reclaiming lapsed reservation"
                );
            }

            let session = uow
                .insert_session(&PhotoSession {
                    id: PhotoSessionId::new(0),
                    listing_identity_id: identity.id,
                    slot_id: slot.id,
                    scheduled_start: slot.slot_start,
                    scheduled_end: slot.slot_end,
                    status: PhotoSessionStatus::Pending,
                    owner_user_id: identity.owner_user_id,
                    photographer_user_id: slot.photographer_user_id,
                    created_at: now,
                    updated_at: now,
                })
                .await?;

            let reserved_until = now + EngineSettings::ttl(deps.settings.reservation_ttl);
            slot.hold(actor.user_id, session.id, reserved_until);
            uow.update_slot(&slot).await?;

            version.photo_session_id = Some(session.id);
            let change =
                record_status_change(&mut uow, deps, &actor, &identity, &mut version, to, None)
                    .await?;

            info!(
                identity_id = %identity.id,
                slot_id = %slot.id,
                photo_session_id = %session.id,
                %reserved_until,
                "slot reserved"
            );
            metrics::counter!("slot_reservations_total", "outcome" => "reserved").increment(1);

            let post = uow.commit().await?;
            Ok((
                ReservationView {
                    photo_session_id: session.id,
                    slot_id: slot.id,
                    reserved_until,
                    listing_status: change.new_status,
                },
                post,
            ))
        })
        .await?;

    post.dispatch(deps).await;
    Ok(view)
}

/// Turn the held reservation into a booked session.
///
/// When the hold has already lapsed (or was taken by someone else) the
/// listing is handed back to scheduling, that change is committed, and the
/// caller gets CONFLICT_SLOT.
pub async fn confirm_reservation(
    input: ConfirmReservationInput,
    ctx: &RequestContext,
    deps: &ServerDeps,
) -> CoreResult<SessionView> {
    let actor = ctx.actor;
    actor.can(Capability::ManageOwnListings).check()?;

    let (outcome, post): (CoreResult<SessionView>, PostCommit) = ctx
        .within_deadline(async {
            let mut uow = UnitOfWork::begin(deps).await?;
            let identity = lock_identity(&mut uow, input.listing_identity_id).await?;
            ensure_listing_party(&actor, &identity)?;
            let mut version = active_version(&mut uow, &identity).await?;

            let mut session = uow
                .lock_session(input.photo_session_id)
                .await?
                .filter(|s| s.listing_identity_id == identity.id)
                .ok_or_else(|| CoreError::not_found("photo session", input.photo_session_id))?;
            if version.photo_session_id != Some(session.id) {
                return Err(CoreError::state_invalid(format!(
                    "photo session {} is not the listing's current reservation",
                    session.id
                )));
            }

            let to = deps.machine.decide(
                version.status,
                ListingAction::ConfirmReservation,
                actor.role,
                &GuardContext::new(&version, &deps.settings.property_type_rules),
            )?;

            let now = deps.clock.now();
            let mut slot = uow
                .lock_slot(session.slot_id)
                .await?
                .ok_or_else(|| CoreError::not_found("slot", session.slot_id))?;
            let held = slot.status == SlotStatus::Reserved && slot.photo_session_id == Some(session.id);

            if held && slot.reservation_holder_user_id != Some(actor.user_id) {
                return Err(CoreError::forbidden(
                    "only the user holding the reservation can confirm it",
                ));
            }

            if session.status != PhotoSessionStatus::Pending || !held || slot.reservation_expired(now) {
                if held {
                    slot.release();
                    uow.update_slot(&slot).await?;
                }
                if session.status.is_live() {
                    session.status = PhotoSessionStatus::Cancelled;
                    session.updated_at = now;
                    uow.update_session(&session).await?;
                }
                version.photo_session_id = None;
                apply_transition(
                    &mut uow,
                    deps,
                    &Actor::system(),
                    &identity,
                    &mut version,
                    ListingAction::ReservationExpired,
                    Some("reservation expired before confirmation".to_string()),
                )
                .await?;
                metrics::counter!("slot_reservations_total", "outcome" => "expired").increment(1);

                let post = uow.commit().await?;
                return Ok((
                    Err(CoreError::ConflictSlot(format!(
                        "reservation on slot {} is no longer held",
                        slot.id
                    ))),
                    post,
                ));
            }

            slot.book();
            uow.update_slot(&slot).await?;
            session.status = PhotoSessionStatus::Active;
            session.updated_at = now;
            uow.update_session(&session).await?;

            let change =
                record_status_change(&mut uow, deps, &actor, &identity, &mut version, to, None)
                    .await?;

            let payload = json!({
                "listingIdentityId": identity.id,
                "photoSessionId": session.id,
                "scheduledStart": session.scheduled_start,
                "scheduledEnd": session.scheduled_end,
            });
            uow.defer(SideEffect::Notify(Notification::new(
                session.photographer_user_id,
                "photo_session.booked",
                payload.clone(),
            )));
            uow.defer(SideEffect::Notify(Notification::new(
                identity.owner_user_id,
                "photo_session.confirmed",
                payload,
            )));

            info!(identity_id = %identity.id, photo_session_id = %session.id, "photo session confirmed");
            metrics::counter!("slot_reservations_total", "outcome" => "confirmed").increment(1);

            let post = uow.commit().await?;
            Ok((Ok(SessionView::new(&session, Some(change.new_status))), post))
        })
        .await?;

    post.dispatch(deps).await;
    outcome
}

/// Give the slot back and cancel the session, pending or active.
pub async fn cancel_reservation(
    photo_session_id: PhotoSessionId,
    ctx: &RequestContext,
    deps: &ServerDeps,
) -> CoreResult<SessionView> {
    let actor = ctx.actor;

    let (view, post) = ctx
        .within_deadline(async {
            let mut uow = UnitOfWork::begin(deps).await?;
            let listing_identity_id = uow
                .find_session(photo_session_id)
                .await?
                .ok_or_else(|| CoreError::not_found("photo session", photo_session_id))?
                .listing_identity_id;

            let identity = lock_identity(&mut uow, listing_identity_id).await?;
            ensure_listing_party(&actor, &identity)?;
            let mut session = uow
                .lock_session(photo_session_id)
                .await?
                .ok_or_else(|| CoreError::not_found("photo session", photo_session_id))?;
            if !session.status.is_live() {
                return Err(CoreError::state_invalid(format!(
                    "photo session {} is already {:?}",
                    session.id, session.status
                )));
            }

            let mut version = active_version(&mut uow, &identity).await?;
            let listing_status = if version.photo_session_id == Some(session.id) {
                version.photo_session_id = None;
                let change = apply_transition(
                    &mut uow,
                    deps,
                    &actor,
                    &identity,
                    &mut version,
                    ListingAction::CancelReservation,
                    Some("photo session cancelled".to_string()),
                )
                .await?;
                change.new_status
            } else {
                version.status
            };

            let now = deps.clock.now();
            if let Some(mut slot) = uow.lock_slot(session.slot_id).await? {
                if slot.photo_session_id == Some(session.id) {
                    slot.release();
                    uow.update_slot(&slot).await?;
                }
            }

            let was_active = session.status == PhotoSessionStatus::Active;
            session.status = PhotoSessionStatus::Cancelled;
            session.updated_at = now;
            uow.update_session(&session).await?;

            if was_active {
                uow.defer(SideEffect::Notify(Notification::new(
                    session.photographer_user_id,
                    "photo_session.cancelled",
                    json!({
                        "listingIdentityId": identity.id,
                        "photoSessionId": session.id,
                        "scheduledStart": session.scheduled_start,
                    }),
                )));
            }

            info!(identity_id = %identity.id, photo_session_id = %session.id, was_active, "photo session cancelled");

            let post = uow.commit().await?;
            Ok((SessionView::new(&session, Some(listing_status)), post))
        })
        .await?;

    post.dispatch(deps).await;
    Ok(view)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::auth::Role;
    use crate::common::{ListingIdentityId, SlotId, UserId};
    use crate::common::error::ErrorKind;
    use crate::domains::listings::models::{ListingIdentity, ListingStatus, ListingVersion, PropertyType};
    use crate::kernel::{SlotFixture, TestDependencies};
    use chrono::Duration;

    const OWNER: i64 = 55;
    const PHOTOGRAPHER: i64 = 9;

    async fn scheduling_listing(test: &TestDependencies) -> ListingIdentityId {
        let now = test.now();
        let deps = test.deps();
        let mut uow = UnitOfWork::begin(&deps).await.unwrap();
        let mut identity = uow
            .insert_identity(&ListingIdentity::new(UserId::new(OWNER), "TQ000001".into(), now))
            .await
            .unwrap();
        let mut version = ListingVersion::first_draft(
            identity.id,
            PropertyType::Apartment,
            "01310100".into(),
            "100".into(),
            None,
            now,
        );
        version.status = ListingStatus::PendingPhotoScheduling;
        version.city = Some("São Paulo".into());
        version.state = Some("SP".into());
        let version = uow.insert_version(&version).await.unwrap();
        identity.active_version_id = Some(version.id);
        uow.update_identity(&identity).await.unwrap();
        uow.commit().await.unwrap();
        identity.id
    }

    async fn seed_slot(test: &TestDependencies, id: i64) {
        let slot = SlotFixture::builder()
            .id(id)
            .photographer(PHOTOGRAPHER)
            .starts_in_hours(48)
            .build()
            .at(test.now());
        test.store.seed(|state| state.put_slot(slot)).await;
    }

    fn owner_ctx() -> RequestContext {
        RequestContext::new(Actor::new(UserId::new(OWNER), Role::Owner))
    }

    #[tokio::test]
    async fn test_reserve_then_confirm_books_slot() {
        let test = TestDependencies::new();
        let deps = test.deps();
        let identity_id = scheduling_listing(&test).await;
        seed_slot(&test, 2002).await;

        let reservation = reserve_slot(
            ReserveSlotInput {
                listing_identity_id: identity_id,
                slot_id: SlotId::new(2002),
            },
            &owner_ctx(),
            &deps,
        )
        .await
        .unwrap();
        assert_eq!(reservation.listing_status, ListingStatus::PendingPhotoConfirmation);
        assert_eq!(reservation.reserved_until, test.now() + Duration::minutes(15));

        let session = confirm_reservation(
            ConfirmReservationInput {
                listing_identity_id: identity_id,
                photo_session_id: reservation.photo_session_id,
            },
            &owner_ctx(),
            &deps,
        )
        .await
        .unwrap();
        assert_eq!(session.status, PhotoSessionStatus::Active);
        assert_eq!(session.listing_status, Some(ListingStatus::PhotosScheduled));

        let snapshot = test.store.snapshot().await;
        assert_eq!(snapshot.slots[&SlotId::new(2002)].status, SlotStatus::Booked);
        assert_eq!(
            test.notifier.templates_for(UserId::new(PHOTOGRAPHER)),
            vec!["photo_session.booked"]
        );
    }

    #[tokio::test]
    async fn test_held_slot_conflicts() {
        let test = TestDependencies::new();
        let deps = test.deps();
        let first = scheduling_listing(&test).await;
        seed_slot(&test, 2002).await;
        reserve_slot(
            ReserveSlotInput {
                listing_identity_id: first,
                slot_id: SlotId::new(2002),
            },
            &owner_ctx(),
            &deps,
        )
        .await
        .unwrap();

        let err = reserve_slot(
            ReserveSlotInput {
                listing_identity_id: first,
                slot_id: SlotId::new(2002),
            },
            &owner_ctx(),
            &deps,
        )
        .await
        .unwrap_err();
        // The listing already moved on, so the machine refuses first.
        assert_eq!(err.kind(), ErrorKind::StateInvalid);
    }

    #[tokio::test]
    async fn test_confirm_after_expiry_returns_listing_to_scheduling() {
        let test = TestDependencies::new();
        let deps = test.deps();
        let identity_id = scheduling_listing(&test).await;
        seed_slot(&test, 2002).await;

        let reservation = reserve_slot(
            ReserveSlotInput {
                listing_identity_id: identity_id,
                slot_id: SlotId::new(2002),
            },
            &owner_ctx(),
            &deps,
        )
        .await
        .unwrap();
        test.clock.advance(Duration::minutes(16));

        let err = confirm_reservation(
            ConfirmReservationInput {
                listing_identity_id: identity_id,
                photo_session_id: reservation.photo_session_id,
            },
            &owner_ctx(),
            &deps,
        )
        .await
        .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ConflictSlot);

        let snapshot = test.store.snapshot().await;
        assert_eq!(snapshot.slots[&SlotId::new(2002)].status, SlotStatus::Available);
        let version = snapshot.active_version(identity_id).unwrap();
        assert_eq!(version.status, ListingStatus::PendingPhotoScheduling);
        assert!(version.photo_session_id.is_none());
    }

    #[tokio::test]
    async fn test_cancel_active_session_notifies_photographer() {
        let test = TestDependencies::new();
        let deps = test.deps();
        let identity_id = scheduling_listing(&test).await;
        seed_slot(&test, 2002).await;
        let reservation = reserve_slot(
            ReserveSlotInput {
                listing_identity_id: identity_id,
                slot_id: SlotId::new(2002),
            },
            &owner_ctx(),
            &deps,
        )
        .await
        .unwrap();
        confirm_reservation(
            ConfirmReservationInput {
                listing_identity_id: identity_id,
                photo_session_id: reservation.photo_session_id,
            },
            &owner_ctx(),
            &deps,
        )
        .await
        .unwrap();

        let view = cancel_reservation(reservation.photo_session_id, &owner_ctx(), &deps)
            .await
            .unwrap();
        assert_eq!(view.status, PhotoSessionStatus::Cancelled);
        assert_eq!(view.listing_status, Some(ListingStatus::PendingPhotoScheduling));

        let snapshot = test.store.snapshot().await;
        assert_eq!(snapshot.slots[&SlotId::new(2002)].status, SlotStatus::Available);
        assert!(test
            .notifier
            .templates_for(UserId::new(PHOTOGRAPHER))
            .contains(&"photo_session.cancelled".to_string()));
    }

    #[tokio::test]
    async fn test_other_owner_cannot_reserve() {
        let test = TestDependencies::new();
        let deps = test.deps();
        let identity_id = scheduling_listing(&test).await;
        seed_slot(&test, 2002).await;

        let stranger = RequestContext::new(Actor::new(UserId::new(77), Role::Owner));
        let err = reserve_slot(
            ReserveSlotInput {
                listing_identity_id: identity_id,
                slot_id: SlotId::new(2002),
            },
            &stranger,
            &deps,
        )
        .await
        .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Forbidden);
    }
}
