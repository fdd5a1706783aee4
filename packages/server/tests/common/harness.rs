//! Test harness over the in-memory store and the kernel test doubles.
//!
//! Every test gets a fresh store, spies and a clock fixed at
//! 2025-06-02T12:00Z. Postgres-backed tests live in `postgres_store_tests.rs`.

use test_context::AsyncTestContext;

use toq_core::common::auth::{Actor, Role};
use toq_core::common::error::CoreResult;
use toq_core::common::{
    ListingIdentityId, PhotoSessionId, ProcessingJobId, RequestContext, SlotId, UserId,
};
use toq_core::domains::listings::actions::{
    admin_approve, approve_media, confirm_availability, end_update, start_listing, update_draft,
};
use toq_core::domains::listings::data::{StartListingInput, UpdateListingInput};
use toq_core::domains::listings::models::{ListingStatus, PropertyType};
use toq_core::domains::media::actions::{
    complete_upload_batch, handle_processing_callback, request_upload_urls,
};
use toq_core::domains::media::data::{
    CallbackReceipt, CompleteUploadInput, RequestUploadUrlsInput, UploadUrlsOutput,
};
use toq_core::domains::media::models::MediaBatch;
use toq_core::domains::photo_sessions::actions::{
    confirm_reservation, mark_session_done, reserve_slot,
};
use toq_core::domains::photo_sessions::data::{ConfirmReservationInput, ReserveSlotInput};
use toq_core::kernel::{ServerDeps, SlotFixture, TestDependencies};

use super::fixtures::*;

pub struct TestHarness {
    pub test: TestDependencies,
    pub deps: ServerDeps,
}

impl AsyncTestContext for TestHarness {
    async fn setup() -> Self {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();

        let test = TestDependencies::new();
        let deps = test.deps();
        Self { test, deps }
    }
}

impl TestHarness {
    pub fn as_user(&self, user: i64, role: Role) -> RequestContext {
        RequestContext::new(Actor::new(UserId::new(user), role))
    }

    pub fn owner(&self) -> RequestContext {
        self.as_user(OWNER, Role::Owner)
    }

    pub fn admin(&self) -> RequestContext {
        self.as_user(ADMIN, Role::Admin)
    }

    pub fn photographer(&self) -> RequestContext {
        self.as_user(PHOTOGRAPHER, Role::Photographer)
    }

    pub fn system(&self) -> RequestContext {
        RequestContext::system()
    }

    pub async fn status_of(&self, identity_id: ListingIdentityId) -> ListingStatus {
        self.test
            .store
            .snapshot()
            .await
            .active_version(identity_id)
            .map(|v| v.status)
            .expect("listing has an active version")
    }

    pub async fn batch(&self, identity_id: ListingIdentityId) -> MediaBatch {
        self.test
            .store
            .snapshot()
            .await
            .batches
            .values()
            .filter(|b| b.listing_identity_id == identity_id)
            .max_by_key(|b| b.created_at)
            .cloned()
            .expect("listing has a media batch")
    }

    pub fn update_input(&self, body: serde_json::Value) -> UpdateListingInput {
        serde_json::from_value(body).expect("valid update payload")
    }

    /// A complete apartment submitted for review: PENDING_AVAILABILITY.
    pub async fn submitted_apartment(&self) -> ListingIdentityId {
        let started = start_listing(
            StartListingInput {
                property_type: PropertyType::Apartment,
                zip_code: "06543-001".to_string(),
                number: "100".to_string(),
                complement: None,
            },
            &self.owner(),
            &self.deps,
        )
        .await
        .expect("start listing");

        update_draft(
            self.update_input(complete_apartment(
                started.identity_id.get(),
                started.version.id.get(),
            )),
            &self.owner(),
            &self.deps,
        )
        .await
        .expect("fill draft");

        end_update(started.identity_id, &self.owner(), &self.deps)
            .await
            .expect("submit draft");
        started.identity_id
    }

    /// Submitted apartment whose owner has availability: PENDING_PHOTO_SCHEDULING.
    pub async fn schedulable_apartment(&self) -> ListingIdentityId {
        self.test
            .store
            .seed(|state| state.set_owner_availability(UserId::new(OWNER), false, 2))
            .await;
        let identity_id = self.submitted_apartment().await;
        confirm_availability(identity_id, &self.system(), &self.deps)
            .await
            .expect("confirm availability");
        identity_id
    }

    pub async fn seed_slot(&self, slot_id: i64) {
        let slot = SlotFixture::builder()
            .id(slot_id)
            .photographer(PHOTOGRAPHER)
            .starts_in_hours(48)
            .build()
            .at(self.test.now());
        self.test
            .store
            .seed(|state| {
                state.put_slot(slot);
                state.add_service_area(UserId::new(PHOTOGRAPHER), "São Paulo", "SP");
            })
            .await;
    }

    /// Reserve and confirm `slot_id`: PHOTOS_SCHEDULED.
    pub async fn booked_apartment(&self, slot_id: i64) -> (ListingIdentityId, PhotoSessionId) {
        let identity_id = self.schedulable_apartment().await;
        self.seed_slot(slot_id).await;
        let reservation = reserve_slot(
            ReserveSlotInput {
                listing_identity_id: identity_id,
                slot_id: SlotId::new(slot_id),
            },
            &self.owner(),
            &self.deps,
        )
        .await
        .expect("reserve slot");
        confirm_reservation(
            ConfirmReservationInput {
                listing_identity_id: identity_id,
                photo_session_id: reservation.photo_session_id,
            },
            &self.owner(),
            &self.deps,
        )
        .await
        .expect("confirm reservation");
        (identity_id, reservation.photo_session_id)
    }

    /// Shoot done: PENDING_PHOTO_PROCESSING.
    pub async fn shot_apartment(&self, slot_id: i64) -> ListingIdentityId {
        let (identity_id, session_id) = self.booked_apartment(slot_id).await;
        mark_session_done(session_id, &self.photographer(), &self.deps)
            .await
            .expect("mark session done");
        identity_id
    }

    /// Ask for signed PUTs for `count` photos and store exactly what was declared.
    pub async fn upload_photos(&self, identity_id: ListingIdentityId, count: i32) -> UploadUrlsOutput {
        let urls = request_upload_urls(
            RequestUploadUrlsInput {
                listing_identity_id: identity_id,
                files: (1..=count).map(photo_file).collect(),
            },
            &self.photographer(),
            &self.deps,
        )
        .await
        .expect("request upload urls");

        for instruction in &urls.instructions {
            self.test.storage.put_object(
                &instruction.raw_object_key,
                &photo_bytes(instruction.sequence),
                "image/jpeg",
            );
        }
        urls
    }

    /// Photos uploaded and handed to the pipeline; returns the job id.
    pub async fn processing_apartment(&self, slot_id: i64) -> (ListingIdentityId, UploadUrlsOutput, ProcessingJobId) {
        let identity_id = self.shot_apartment(slot_id).await;
        let urls = self.upload_photos(identity_id, 3).await;
        let completed = complete_upload_batch(
            CompleteUploadInput {
                batch_id: urls.batch_id,
                assets: vec![],
            },
            &self.photographer(),
            &self.deps,
        )
        .await
        .expect("complete upload batch");
        (identity_id, urls, completed.job_id)
    }

    pub async fn deliver(&self, body: &[u8]) -> CoreResult<CallbackReceipt> {
        handle_processing_callback(body, &self.system(), &self.deps).await
    }

    /// Media approved by the owner and the admin: PUBLISHED.
    pub async fn published_apartment(&self, slot_id: i64) -> ListingIdentityId {
        let (identity_id, urls, job_id) = self.processing_apartment(slot_id).await;
        self.deliver(&success_callback(job_id, "arn:exec:publish", &urls.instructions))
            .await
            .expect("success callback");
        approve_media(identity_id, &self.owner(), &self.deps)
            .await
            .expect("owner approves media");
        admin_approve(identity_id, None, &self.admin(), &self.deps)
            .await
            .expect("admin approves");
        identity_id
    }
}
