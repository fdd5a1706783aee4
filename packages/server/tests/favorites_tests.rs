mod common;

use chrono::Duration;
use test_context::test_context;

use common::*;
use toq_core::common::auth::Role;
use toq_core::common::error::ErrorKind;
use toq_core::common::{ListingIdentityId, ListingVersionId, UserId};
use toq_core::domains::favorites::actions::{add_favorite, list_favorites, remove_favorite};
use toq_core::domains::favorites::data::ListFavoritesInput;
use toq_core::domains::listings::models::{
    ListingIdentity, ListingStatus, ListingVersion, PropertyType,
};

/// A published listing of another owner, written straight into the store.
async fn seed_published(ctx: &TestHarness, id: i64) -> ListingIdentityId {
    let now = ctx.test.now();
    let identity_id = ListingIdentityId::new(id);
    let version_id = ListingVersionId::new(id);
    ctx.test
        .store
        .seed(|state| {
            let mut identity =
                ListingIdentity::new(UserId::new(OTHER_OWNER), format!("TQ{:06}", id), now);
            identity.id = identity_id;
            identity.active_version_id = Some(version_id);
            state.identities.insert(identity_id, identity);

            let mut version = ListingVersion::first_draft(
                identity_id,
                PropertyType::House,
                "01310100".to_string(),
                id.to_string(),
                None,
                now,
            );
            version.id = version_id;
            version.status = ListingStatus::Published;
            state.versions.insert(version_id, version);
        })
        .await;
    identity_id
}

fn visitor(ctx: &TestHarness) -> toq_core::common::RequestContext {
    ctx.as_user(VISITOR, Role::Owner)
}

#[test_context(TestHarness)]
#[tokio::test]
async fn adding_twice_counts_once(ctx: &TestHarness) {
    let identity_id = seed_published(ctx, 900).await;

    let first = add_favorite(identity_id, &visitor(ctx), &ctx.deps).await.unwrap();
    let again = add_favorite(identity_id, &visitor(ctx), &ctx.deps).await.unwrap();
    assert!(first.favorited);
    assert_eq!(first.favorites_count, 1);
    assert_eq!(again.favorites_count, 1);

    let photographer_fav = add_favorite(identity_id, &ctx.photographer(), &ctx.deps)
        .await
        .unwrap();
    assert_eq!(photographer_fav.favorites_count, 2);

    let snapshot = ctx.test.store.snapshot().await;
    assert_eq!(snapshot.favorite_count(UserId::new(VISITOR), identity_id), 1);
    assert_eq!(snapshot.identities[&identity_id].favorites_count, 2);
}

#[test_context(TestHarness)]
#[tokio::test]
async fn removing_is_idempotent_and_never_negative(ctx: &TestHarness) {
    let identity_id = seed_published(ctx, 900).await;
    add_favorite(identity_id, &visitor(ctx), &ctx.deps).await.unwrap();

    let removed = remove_favorite(identity_id, &visitor(ctx), &ctx.deps).await.unwrap();
    assert!(!removed.favorited);
    assert_eq!(removed.favorites_count, 0);

    let again = remove_favorite(identity_id, &visitor(ctx), &ctx.deps).await.unwrap();
    assert_eq!(again.favorites_count, 0);
}

#[test_context(TestHarness)]
#[tokio::test]
async fn owners_cannot_favorite_their_own_listing(ctx: &TestHarness) {
    let identity_id = seed_published(ctx, 900).await;

    let err = add_favorite(identity_id, &ctx.as_user(OTHER_OWNER, Role::Owner), &ctx.deps)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Forbidden);
}

#[test_context(TestHarness)]
#[tokio::test]
async fn only_public_listings_can_be_favorited(ctx: &TestHarness) {
    let identity_id = ctx.submitted_apartment().await;

    let err = add_favorite(identity_id, &visitor(ctx), &ctx.deps)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::StateInvalid);

    let err = add_favorite(ListingIdentityId::new(424_242), &visitor(ctx), &ctx.deps)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
}

#[test_context(TestHarness)]
#[tokio::test]
async fn favorites_are_listed_newest_first(ctx: &TestHarness) {
    let older = seed_published(ctx, 900).await;
    let newer = seed_published(ctx, 901).await;

    add_favorite(older, &visitor(ctx), &ctx.deps).await.unwrap();
    ctx.test.clock.advance(Duration::minutes(5));
    add_favorite(newer, &visitor(ctx), &ctx.deps).await.unwrap();

    let page = list_favorites(ListFavoritesInput::default(), &visitor(ctx), &ctx.deps)
        .await
        .unwrap();
    assert_eq!(page.total, 2);
    let order: Vec<ListingIdentityId> = page.items.iter().map(|f| f.listing.identity_id).collect();
    assert_eq!(order, vec![newer, older]);
    assert_eq!(page.items[0].listing.favorites_count, 1);

    let err = list_favorites(
        ListFavoritesInput {
            page: Some(0),
            size: None,
        },
        &visitor(ctx),
        &ctx.deps,
    )
    .await
    .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);
}

#[test_context(TestHarness)]
#[tokio::test]
async fn the_system_actor_keeps_no_favorites(ctx: &TestHarness) {
    let identity_id = seed_published(ctx, 900).await;
    let err = add_favorite(identity_id, &ctx.system(), &ctx.deps)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Forbidden);
}
