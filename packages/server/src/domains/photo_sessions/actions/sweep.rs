use tracing::{info, warn};

use crate::common::auth::{Actor, Capability};
use crate::common::error::{CoreError, CoreResult};
use crate::common::RequestContext;
use crate::domains::listings::actions::support::apply_transition;
use crate::domains::listings::machines::ListingAction;
use crate::domains::listings::models::ListingStatus;
use crate::domains::photo_sessions::data::SweepReport;
use crate::domains::photo_sessions::models::{PhotoSessionStatus, PhotographerSlot};
use crate::kernel::{ServerDeps, UnitOfWork};

#[derive(Debug, Default)]
struct SweptSlot {
    released: bool,
    cancelled: bool,
    rescheduled: bool,
}

/// Release every RESERVED slot whose hold has lapsed, cancel the pending
/// session behind it and hand the listing back to scheduling.
///
/// Each slot is handled in its own transaction; one failing slot is logged
/// and the sweep moves on.
pub async fn release_expired_reservations(
    ctx: &RequestContext,
    deps: &ServerDeps,
) -> CoreResult<SweepReport> {
    let actor = ctx.actor;
    if !actor.is_system() {
        actor.can(Capability::Administer).check()?;
    }

    let now = deps.clock.now();
    let expired = ctx
        .within_deadline(async {
            let mut uow = UnitOfWork::begin(deps).await?;
            Ok(uow.expired_reservations(now).await?)
        })
        .await?;

    let mut report = SweepReport::default();
    for stale in expired {
        match sweep_slot(&stale, ctx, deps).await {
            Ok(swept) => {
                report.released_slots += swept.released as usize;
                report.cancelled_sessions += swept.cancelled as usize;
                report.listings_rescheduled += swept.rescheduled as usize;
            }
            Err(e) => {
                warn!(slot_id = %stale.id, error = %e, "failed to release expired reservation");
            }
        }
    }

    if report.released_slots > 0 {
        info!(
            released = report.released_slots,
            cancelled = report.cancelled_sessions,
            rescheduled = report.listings_rescheduled,
            "expired reservations released"
        );
    }
    Ok(report)
}

async fn sweep_slot(
    stale: &PhotographerSlot,
    ctx: &RequestContext,
    deps: &ServerDeps,
) -> Result<SweptSlot, CoreError> {
    let now = deps.clock.now();
    let system = Actor::system();

    let (swept, post) = ctx
        .within_deadline(async {
            let mut uow = UnitOfWork::begin(deps).await?;
            let mut swept = SweptSlot::default();

            let session = match stale.photo_session_id {
                Some(id) => uow.find_session(id).await?,
                None => None,
            };
            let identity = match &session {
                Some(s) => uow.lock_identity(s.listing_identity_id).await?,
                None => None,
            };
            let mut session = match session {
                Some(s) => uow.lock_session(s.id).await?,
                None => None,
            };

            // Re-check under lock: a confirm or a new reservation may have won.
            let Some(mut slot) = uow.lock_slot(stale.id).await? else {
                return Ok((swept, uow.commit().await?));
            };
            if !slot.reservation_expired(now) || slot.photo_session_id != stale.photo_session_id {
                return Ok((swept, uow.commit().await?));
            }

            slot.release();
            uow.update_slot(&slot).await?;
            swept.released = true;

            if let Some(session) = session.as_mut() {
                if session.status == PhotoSessionStatus::Pending {
                    session.status = PhotoSessionStatus::Cancelled;
                    session.updated_at = now;
                    uow.update_session(session).await?;
                    swept.cancelled = true;
                }
            }

            if let (Some(identity), Some(session)) = (identity, session) {
                if let Some(active_id) = identity.active_version_id {
                    if let Some(mut version) = uow.find_version(active_id).await? {
                        if version.status == ListingStatus::PendingPhotoConfirmation
                            && version.photo_session_id == Some(session.id)
                        {
                            version.photo_session_id = None;
                            apply_transition(
                                &mut uow,
                                deps,
                                &system,
                                &identity,
                                &mut version,
                                ListingAction::ReservationExpired,
                                Some("reservation expired".to_string()),
                            )
                            .await?;
                            swept.rescheduled = true;
                        }
                    }
                }
            }

            let post = uow.commit().await?;
            Ok((swept, post))
        })
        .await?;

    post.dispatch(deps).await;
    if swept.released {
        metrics::counter!("slot_reservations_total", "outcome" => "expired").increment(1);
    }
    Ok(swept)
}
