use serde_json::json;
use tracing::info;

use crate::common::auth::Role;
use crate::common::error::{CoreError, CoreResult};
use crate::common::{PhotoSessionId, RequestContext};
use crate::domains::listings::actions::support::{active_version, apply_transition, lock_identity};
use crate::domains::listings::machines::ListingAction;
use crate::domains::photo_sessions::data::SessionView;
use crate::domains::photo_sessions::models::PhotoSessionStatus;
use crate::kernel::{Notification, ServerDeps, SideEffect, UnitOfWork};

/// The photographer finished shooting: the listing moves on to media
/// processing and the photographer is told the upload window is open.
pub async fn mark_session_done(
    photo_session_id: PhotoSessionId,
    ctx: &RequestContext,
    deps: &ServerDeps,
) -> CoreResult<SessionView> {
    let actor = ctx.actor;

    let (view, post) = ctx
        .within_deadline(async {
            let mut uow = UnitOfWork::begin(deps).await?;
            let found = uow
                .find_session(photo_session_id)
                .await?
                .ok_or_else(|| CoreError::not_found("photo session", photo_session_id))?;

            match actor.role {
                Role::Admin | Role::System => {}
                Role::Photographer if found.photographer_user_id == actor.user_id => {}
                _ => {
                    return Err(CoreError::forbidden(
                        "only the assigned photographer can complete a session",
                    ))
                }
            }

            let identity = lock_identity(&mut uow, found.listing_identity_id).await?;
            let mut session = uow
                .lock_session(photo_session_id)
                .await?
                .ok_or_else(|| CoreError::not_found("photo session", photo_session_id))?;
            if session.status != PhotoSessionStatus::Active {
                return Err(CoreError::state_invalid(format!(
                    "photo session {} is {:?}, only active sessions can be completed",
                    session.id, session.status
                )));
            }

            let mut version = active_version(&mut uow, &identity).await?;
            if version.photo_session_id != Some(session.id) {
                return Err(CoreError::state_invalid(format!(
                    "photo session {} is not the listing's current session",
                    session.id
                )));
            }

            let change = apply_transition(
                &mut uow,
                deps,
                &actor,
                &identity,
                &mut version,
                ListingAction::SessionDone,
                None,
            )
            .await?;

            session.status = PhotoSessionStatus::Done;
            session.updated_at = deps.clock.now();
            uow.update_session(&session).await?;

            uow.defer(SideEffect::Notify(Notification::new(
                session.photographer_user_id,
                "media.upload_window_open",
                json!({
                    "listingIdentityId": identity.id,
                    "photoSessionId": session.id,
                }),
            )));

            info!(identity_id = %identity.id, photo_session_id = %session.id, "photo session done");

            let post = uow.commit().await?;
            Ok((SessionView::new(&session, Some(change.new_status)), post))
        })
        .await?;

    post.dispatch(deps).await;
    Ok(view)
}
