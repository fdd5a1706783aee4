//! Favorites: idempotent add/remove with a derived per-listing counter.

use std::collections::HashMap;

use tracing::debug;

use crate::common::auth::Capability;
use crate::common::error::{CoreError, CoreResult};
use crate::common::pagination::{Page, PageRequest};
use crate::common::{ListingIdentityId, RequestContext};
use crate::domains::favorites::data::{FavoriteCard, FavoriteState, ListFavoritesInput};
use crate::domains::favorites::models::Favorite;
use crate::domains::listings::actions::support::{active_version, lock_identity};
use crate::domains::listings::data::ListingCard;
use crate::kernel::{ServerDeps, UnitOfWork};

/// Bookmark a public listing. Adding twice is a no-op.
pub async fn add_favorite(
    identity_id: ListingIdentityId,
    ctx: &RequestContext,
    deps: &ServerDeps,
) -> CoreResult<FavoriteState> {
    let actor = ctx.actor;
    actor.can(Capability::KeepFavorites).check()?;

    let (state, post) = ctx
        .within_deadline(async {
            let mut uow = UnitOfWork::begin(deps).await?;
            let mut identity = lock_identity(&mut uow, identity_id).await?;
            if identity.is_owned_by(actor.user_id) {
                return Err(CoreError::forbidden("owners cannot favorite their own listing"));
            }
            let active = active_version(&mut uow, &identity).await?;
            if !active.status.is_public() {
                return Err(CoreError::state_invalid(format!(
                    "listing {} is {} and not public",
                    identity.id, active.status
                )));
            }

            let inserted = uow
                .insert_favorite(&Favorite {
                    user_id: actor.user_id,
                    listing_identity_id: identity.id,
                    created_at: deps.clock.now(),
                })
                .await?;
            if inserted {
                identity.favorites_count += 1;
                uow.update_identity(&identity).await?;
            }
            debug!(identity_id = %identity.id, user_id = %actor.user_id, inserted, "favorite added");

            let post = uow.commit().await?;
            Ok((
                FavoriteState {
                    listing_identity_id: identity.id,
                    favorited: true,
                    favorites_count: identity.favorites_count,
                },
                post,
            ))
        })
        .await?;

    post.dispatch(deps).await;
    Ok(state)
}

/// Drop a bookmark. Removing a missing one is a no-op.
pub async fn remove_favorite(
    identity_id: ListingIdentityId,
    ctx: &RequestContext,
    deps: &ServerDeps,
) -> CoreResult<FavoriteState> {
    let actor = ctx.actor;
    actor.can(Capability::KeepFavorites).check()?;

    let (state, post) = ctx
        .within_deadline(async {
            let mut uow = UnitOfWork::begin(deps).await?;
            let mut identity = lock_identity(&mut uow, identity_id).await?;

            let deleted = uow.delete_favorite(actor.user_id, identity.id).await?;
            if deleted {
                identity.favorites_count = (identity.favorites_count - 1).max(0);
                uow.update_identity(&identity).await?;
            }
            debug!(identity_id = %identity.id, user_id = %actor.user_id, deleted, "favorite removed");

            let post = uow.commit().await?;
            Ok((
                FavoriteState {
                    listing_identity_id: identity.id,
                    favorited: false,
                    favorites_count: identity.favorites_count,
                },
                post,
            ))
        })
        .await?;

    post.dispatch(deps).await;
    Ok(state)
}

/// The caller's favorites, newest first, each with its listing's active
/// version.
pub async fn list_favorites(
    input: ListFavoritesInput,
    ctx: &RequestContext,
    deps: &ServerDeps,
) -> CoreResult<Page<FavoriteCard>> {
    let actor = ctx.actor;
    actor.can(Capability::KeepFavorites).check()?;
    let page = PageRequest::new(input.page, input.size)
        .validate()
        .map_err(|msg| CoreError::invalid("page", msg))?;

    ctx.within_deadline(async {
        let mut uow = UnitOfWork::begin(deps).await?;
        let (favorites, total) = uow.favorites_of(actor.user_id, &page).await?;

        let ids: Vec<ListingIdentityId> = favorites.iter().map(|f| f.listing_identity_id).collect();
        let mut rows: HashMap<ListingIdentityId, ListingCard> = uow
            .active_rows(&ids)
            .await?
            .into_iter()
            .map(|row| (row.identity.id, ListingCard::from(row)))
            .collect();

        let cards = favorites
            .iter()
            .filter_map(|f| {
                rows.remove(&f.listing_identity_id).map(|listing| FavoriteCard {
                    favorited_at: f.created_at,
                    listing,
                })
            })
            .collect();
        Ok(Page::new(cards, total, &page))
    })
    .await
}
