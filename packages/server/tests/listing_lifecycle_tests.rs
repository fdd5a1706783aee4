//! End-to-end listing lifecycle over the in-memory store.

mod common;

use test_context::test_context;

use common::*;
use serde_json::json;
use toq_core::common::auth::Role;
use toq_core::common::error::ErrorKind;
use toq_core::common::{SlotId, UserId};
use toq_core::domains::listings::actions::{
    admin_approve, approve_media, change_status, confirm_availability, create_draft,
    discard_draft, end_update, list_listings, list_versions, load_active, start_listing,
    update_draft,
};
use toq_core::domains::listings::data::{ListListingsInput, StartListingInput, StatusCommand};
use toq_core::domains::listings::events::{ListingStatusChanged, STATUS_CHANGED_SUBJECT};
use toq_core::domains::listings::models::{ListingStatus, PropertyType};
use toq_core::domains::media::models::BatchStatus;
use toq_core::domains::photo_sessions::models::SlotStatus;

#[test_context(TestHarness)]
#[tokio::test]
async fn complete_draft_is_submitted_for_availability(ctx: &TestHarness) {
    let started = start_listing(
        StartListingInput {
            property_type: PropertyType::Apartment,
            zip_code: "06543001".to_string(),
            number: "100".to_string(),
            complement: None,
        },
        &ctx.owner(),
        &ctx.deps,
    )
    .await
    .unwrap();
    assert_eq!(started.version.version, 1);
    assert_eq!(started.version.status, ListingStatus::Draft);
    assert!(started.code.starts_with("TQ"));

    update_draft(
        ctx.update_input(complete_apartment(
            started.identity_id.get(),
            started.version.id.get(),
        )),
        &ctx.owner(),
        &ctx.deps,
    )
    .await
    .unwrap();

    let submitted = end_update(started.identity_id, &ctx.owner(), &ctx.deps)
        .await
        .unwrap();
    assert_eq!(submitted.previous_status, ListingStatus::Draft);
    assert_eq!(submitted.new_status, ListingStatus::PendingAvailability);
    assert_eq!(submitted.active_version_id, Some(started.version.id));
}

#[test_context(TestHarness)]
#[tokio::test]
async fn apartment_goes_all_the_way_to_published(ctx: &TestHarness) {
    let identity_id = ctx.published_apartment(2002).await;
    assert_eq!(ctx.status_of(identity_id).await, ListingStatus::Published);

    let snapshot = ctx.test.store.snapshot().await;
    assert_eq!(snapshot.slots[&SlotId::new(2002)].status, SlotStatus::Booked);
    let batch = snapshot
        .batches
        .values()
        .find(|b| b.listing_identity_id == identity_id)
        .unwrap();
    assert_eq!(batch.status, BatchStatus::Ready);
    assert!(batch.assets.iter().all(|a| a.processed_object_key.is_some()));

    let owner_templates = ctx.test.notifier.templates_for(UserId::new(OWNER));
    assert!(owner_templates.contains(&"listing.media_ready".to_string()));
    assert!(owner_templates.contains(&"listing.published".to_string()));
}

#[test_context(TestHarness)]
#[tokio::test]
async fn every_status_change_is_published_after_commit(ctx: &TestHarness) {
    let identity_id = ctx.schedulable_apartment().await;

    let transitions: Vec<(ListingStatus, ListingStatus)> = ctx
        .test
        .nats
        .messages_for_subject(STATUS_CHANGED_SUBJECT)
        .iter()
        .map(|m| serde_json::from_slice::<ListingStatusChanged>(&m.payload).unwrap())
        .filter(|e| e.identity_id == identity_id)
        .map(|e| (e.old_status, e.new_status))
        .collect();
    assert_eq!(
        transitions,
        vec![
            (ListingStatus::Draft, ListingStatus::PendingAvailability),
            (
                ListingStatus::PendingAvailability,
                ListingStatus::PendingPhotoScheduling
            ),
        ]
    );

    let snapshot = ctx.test.store.snapshot().await;
    assert_eq!(
        snapshot
            .status_events
            .iter()
            .filter(|e| e.identity_id == identity_id)
            .count(),
        2
    );
}

#[test_context(TestHarness)]
#[tokio::test]
async fn off_plan_listings_wait_for_plan_material(ctx: &TestHarness) {
    let started = start_listing(
        StartListingInput {
            property_type: PropertyType::OffPlanHouse,
            zip_code: "04571010".to_string(),
            number: "55".to_string(),
            complement: Some("Lote 3".to_string()),
        },
        &ctx.owner(),
        &ctx.deps,
    )
    .await
    .unwrap();
    update_draft(
        ctx.update_input(json!({
            "identityId": started.identity_id,
            "versionId": started.version.id,
            "title": "Casa na planta",
            "city": "São Paulo",
            "state": "SP",
            "sellNet": "950000",
            "completionForecast": "2027-06"
        })),
        &ctx.owner(),
        &ctx.deps,
    )
    .await
    .unwrap();
    end_update(started.identity_id, &ctx.owner(), &ctx.deps)
        .await
        .unwrap();

    let change = confirm_availability(started.identity_id, &ctx.system(), &ctx.deps)
        .await
        .unwrap();
    assert_eq!(change.new_status, ListingStatus::PendingPlanLoading);
}

#[test_context(TestHarness)]
#[tokio::test]
async fn availability_requires_owner_rules(ctx: &TestHarness) {
    let identity_id = ctx.submitted_apartment().await;

    let err = confirm_availability(identity_id, &ctx.system(), &ctx.deps)
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::StateInvalid);
    assert_eq!(ctx.status_of(identity_id).await, ListingStatus::PendingAvailability);
}

#[test_context(TestHarness)]
#[tokio::test]
async fn both_taxes_are_mutually_exclusive(ctx: &TestHarness) {
    let started = start_listing(
        StartListingInput {
            property_type: PropertyType::House,
            zip_code: "06543001".to_string(),
            number: "12".to_string(),
            complement: None,
        },
        &ctx.owner(),
        &ctx.deps,
    )
    .await
    .unwrap();

    let err = update_draft(
        ctx.update_input(json!({
            "identityId": started.identity_id,
            "versionId": started.version.id,
            "title": "should not stick",
            "annualTax": "3400",
            "monthlyTax": "283.40"
        })),
        &ctx.owner(),
        &ctx.deps,
    )
    .await
    .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ValidationMutex);

    let snapshot = ctx.test.store.snapshot().await;
    let version = snapshot.active_version(started.identity_id).unwrap();
    assert_eq!(version.title, None);
    assert_eq!(version.annual_tax, None);
    assert_eq!(version.monthly_tax, None);
}

#[test_context(TestHarness)]
#[tokio::test]
async fn submitting_an_incomplete_draft_lists_missing_fields(ctx: &TestHarness) {
    let started = start_listing(
        StartListingInput {
            property_type: PropertyType::Apartment,
            zip_code: "06543001".to_string(),
            number: "7".to_string(),
            complement: None,
        },
        &ctx.owner(),
        &ctx.deps,
    )
    .await
    .unwrap();

    let err = end_update(started.identity_id, &ctx.owner(), &ctx.deps)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);
    assert_eq!(ctx.status_of(started.identity_id).await, ListingStatus::Draft);
}

#[test_context(TestHarness)]
#[tokio::test]
async fn houses_submit_without_a_price(ctx: &TestHarness) {
    let started = start_listing(
        StartListingInput {
            property_type: PropertyType::House,
            zip_code: "06543001".to_string(),
            number: "31".to_string(),
            complement: None,
        },
        &ctx.owner(),
        &ctx.deps,
    )
    .await
    .unwrap();

    let submitted = end_update(started.identity_id, &ctx.owner(), &ctx.deps)
        .await
        .unwrap();
    assert_eq!(submitted.new_status, ListingStatus::PendingAvailability);
}

#[test_context(TestHarness)]
#[tokio::test]
async fn same_address_twice_is_a_duplicate(ctx: &TestHarness) {
    ctx.submitted_apartment().await;

    let err = start_listing(
        StartListingInput {
            property_type: PropertyType::Apartment,
            zip_code: "06543-001".to_string(),
            number: " 100 ".to_string(),
            complement: None,
        },
        &ctx.owner(),
        &ctx.deps,
    )
    .await
    .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ConflictDuplicate);
}

#[test_context(TestHarness)]
#[tokio::test]
async fn concurrent_starts_at_one_address_yield_exactly_one(ctx: &TestHarness) {
    let input = || StartListingInput {
        property_type: PropertyType::House,
        zip_code: "06543001".to_string(),
        number: "42".to_string(),
        complement: None,
    };
    let owner = ctx.owner();

    let (first, second) = tokio::join!(
        start_listing(input(), &owner, &ctx.deps),
        start_listing(input(), &owner, &ctx.deps),
    );
    let kinds: Vec<Option<ErrorKind>> = [&first, &second]
        .iter()
        .map(|r| r.as_ref().err().map(|e| e.kind()))
        .collect();
    assert_eq!(kinds.iter().filter(|k| k.is_none()).count(), 1);
    assert!(kinds.contains(&Some(ErrorKind::ConflictDuplicate)));
    assert_eq!(ctx.test.store.snapshot().await.identities.len(), 1);
}

#[test_context(TestHarness)]
#[tokio::test]
async fn concurrent_drafts_yield_exactly_one(ctx: &TestHarness) {
    let identity_id = ctx.published_apartment(2002).await;
    let owner = ctx.owner();

    let (first, second) = tokio::join!(
        create_draft(identity_id, &owner, &ctx.deps),
        create_draft(identity_id, &owner, &ctx.deps),
    );

    let results = [first, second];
    let created: Vec<_> = results.iter().filter_map(|r| r.as_ref().ok()).collect();
    let conflicts: Vec<_> = results
        .iter()
        .filter_map(|r| r.as_ref().err())
        .map(|e| e.kind())
        .collect();
    assert_eq!(created.len(), 1);
    assert_eq!(conflicts, vec![ErrorKind::ConflictDraftExists]);
    assert_eq!(created[0].version, 2);
    assert_eq!(created[0].status, ListingStatus::Draft);

    // The published version stays live while the draft is edited.
    assert_eq!(ctx.status_of(identity_id).await, ListingStatus::Published);
}

#[test_context(TestHarness)]
#[tokio::test]
async fn submitting_a_new_version_swaps_the_active_pointer(ctx: &TestHarness) {
    let identity_id = ctx.published_apartment(2002).await;
    let draft = create_draft(identity_id, &ctx.owner(), &ctx.deps).await.unwrap();

    update_draft(
        ctx.update_input(json!({
            "identityId": identity_id,
            "versionId": draft.id,
            "title": "Renovated two-bedroom"
        })),
        &ctx.owner(),
        &ctx.deps,
    )
    .await
    .unwrap();

    let change = end_update(identity_id, &ctx.owner(), &ctx.deps).await.unwrap();
    assert_eq!(change.active_version_id, Some(draft.id));
    assert_eq!(change.new_status, ListingStatus::PendingAvailability);

    let versions = list_versions(identity_id, false, &ctx.owner(), &ctx.deps)
        .await
        .unwrap();
    let numbers: Vec<i32> = versions.iter().map(|v| v.version).collect();
    assert_eq!(numbers, vec![2, 1]);
    assert_eq!(versions[1].status, ListingStatus::Archived);

    let snapshot = ctx.test.store.snapshot().await;
    let active = snapshot.active_version(identity_id).unwrap();
    assert_eq!(active.id, draft.id);
    assert_eq!(active.title.as_deref(), Some("Renovated two-bedroom"));
}

#[test_context(TestHarness)]
#[tokio::test]
async fn owners_only_see_their_own_listings(ctx: &TestHarness) {
    ctx.submitted_apartment().await;
    start_listing(
        StartListingInput {
            property_type: PropertyType::House,
            zip_code: "01310100".to_string(),
            number: "2000".to_string(),
            complement: None,
        },
        &ctx.as_user(OTHER_OWNER, Role::Owner),
        &ctx.deps,
    )
    .await
    .unwrap();

    let page = list_listings(
        ListListingsInput {
            user_id: Some(UserId::new(OTHER_OWNER)),
            ..Default::default()
        },
        &ctx.owner(),
        &ctx.deps,
    )
    .await
    .unwrap();

    assert_eq!(page.total, 1);
    assert!(page.items.iter().all(|card| card.user_id == UserId::new(OWNER)));
}

#[test_context(TestHarness)]
#[tokio::test]
async fn admins_review_what_owners_approved(ctx: &TestHarness) {
    let (identity_id, urls, job_id) = ctx.processing_apartment(2002).await;
    ctx.deliver(&success_callback(job_id, "arn:exec:1", &urls.instructions))
        .await
        .unwrap();

    let err = admin_approve(identity_id, None, &ctx.admin(), &ctx.deps)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::StateInvalid);

    let err = approve_media(identity_id, &ctx.as_user(OTHER_OWNER, Role::Owner), &ctx.deps)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Forbidden);

    approve_media(identity_id, &ctx.owner(), &ctx.deps).await.unwrap();
    assert_eq!(ctx.status_of(identity_id).await, ListingStatus::PendingAdminReview);
}

#[test_context(TestHarness)]
#[tokio::test]
async fn discarded_drafts_are_hidden_unless_asked_for(ctx: &TestHarness) {
    let identity_id = ctx.published_apartment(2002).await;
    let draft = create_draft(identity_id, &ctx.owner(), &ctx.deps).await.unwrap();

    let change = discard_draft(identity_id, draft.id, &ctx.owner(), &ctx.deps)
        .await
        .unwrap();
    assert_eq!(change.new_status, ListingStatus::Archived);

    let live = list_versions(identity_id, false, &ctx.owner(), &ctx.deps)
        .await
        .unwrap();
    assert_eq!(live.len(), 1);
    assert!(live[0].is_active);

    let all = list_versions(identity_id, true, &ctx.owner(), &ctx.deps)
        .await
        .unwrap();
    assert_eq!(all.len(), 2);
    assert!(all[0].deleted);

    let active = load_active(identity_id, &ctx.owner(), &ctx.deps).await.unwrap();
    assert_eq!(active.status, ListingStatus::Published);

    // A fresh draft can be branched once the old one is gone.
    create_draft(identity_id, &ctx.owner(), &ctx.deps).await.unwrap();
}

#[test_context(TestHarness)]
#[tokio::test]
async fn owners_suspend_and_relist(ctx: &TestHarness) {
    let identity_id = ctx.published_apartment(2002).await;

    let suspended = change_status(identity_id, StatusCommand::Suspend, &ctx.owner(), &ctx.deps)
        .await
        .unwrap();
    assert_eq!(suspended.previous_status, ListingStatus::Published);
    assert_eq!(suspended.new_status, ListingStatus::Suspended);
    assert_eq!(suspended.active_version_id, Some(suspended.version_id));

    let err = change_status(identity_id, StatusCommand::Suspend, &ctx.owner(), &ctx.deps)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::StateInvalid);

    let relisted = change_status(identity_id, StatusCommand::Publish, &ctx.owner(), &ctx.deps)
        .await
        .unwrap();
    assert_eq!(relisted.new_status, ListingStatus::Published);

    // The owner acted, so there is nothing to tell them.
    assert!(!ctx
        .test
        .notifier
        .templates_for(UserId::new(OWNER))
        .contains(&"listing.suspended".to_string()));
}
