//! Commands against a real Postgres 16, started with testcontainers.
//!
//! Needs a Docker daemon: `cargo test --test postgres_store_tests -- --ignored`.

mod common;

use std::sync::Arc;

use anyhow::{Context, Result};
use serde_json::json;
use sqlx::PgPool;
use test_context::{test_context, AsyncTestContext};
use testcontainers::runners::AsyncRunner;
use testcontainers::{ContainerAsync, ImageExt};
use testcontainers_modules::postgres::Postgres;
use tokio::sync::OnceCell;
use uuid::Uuid;

use common::*;
use toq_core::common::auth::{Actor, Role};
use toq_core::common::error::ErrorKind;
use toq_core::common::{ListingIdentityId, RequestContext, UserId};
use toq_core::domains::listings::actions::{
    confirm_availability, create_draft, end_update, list_listings, start_listing, update_draft,
};
use toq_core::domains::listings::data::{ListListingsInput, StartListingInput, UpdateListingInput};
use toq_core::domains::listings::models::{ListingStatus, PropertyType};
use toq_core::domains::media::actions::handle_processing_callback;
use toq_core::kernel::{PostgresStore, ServerDeps, TestDependencies};

struct SharedPostgres {
    db_url: String,
    _postgres: ContainerAsync<Postgres>,
}

static SHARED_POSTGRES: OnceCell<SharedPostgres> = OnceCell::const_new();

impl SharedPostgres {
    async fn init() -> Result<Self> {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();

        let postgres = Postgres::default()
            .with_tag("16")
            .start()
            .await
            .context("Failed to start Postgres container")?;
        let host = postgres.get_host().await?;
        let port = postgres.get_host_port_ipv4(5432).await?;
        let db_url = format!("postgresql://postgres:postgres@{}:{}/postgres", host, port);

        let pool = PgPool::connect(&db_url)
            .await
            .context("Failed to connect to Postgres for migrations")?;
        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .context("Failed to run migrations")?;

        Ok(Self {
            db_url,
            _postgres: postgres,
        })
    }

    async fn get() -> &'static Self {
        SHARED_POSTGRES
            .get_or_init(|| async {
                Self::init()
                    .await
                    .expect("Failed to initialize shared Postgres")
            })
            .await
    }
}

struct PgHarness {
    pool: PgPool,
    deps: ServerDeps,
    /// Owner id unique to this test, so tests sharing the database stay apart.
    owner: i64,
}

impl AsyncTestContext for PgHarness {
    async fn setup() -> Self {
        let shared = SharedPostgres::get().await;
        let pool = PgPool::connect(&shared.db_url)
            .await
            .expect("connect to shared Postgres");

        let test = TestDependencies::new();
        let deps = ServerDeps::new(
            Arc::new(PostgresStore::new(pool.clone())),
            test.storage.clone(),
            test.queue.clone(),
            test.nats.clone(),
            test.notifier.clone(),
            test.clock.clone(),
            test.settings.clone(),
        );
        let owner = 10_000 + (Uuid::new_v4().as_u128() % 1_000_000) as i64;
        Self { pool, deps, owner }
    }
}

impl PgHarness {
    fn owner(&self) -> RequestContext {
        RequestContext::new(Actor::new(UserId::new(self.owner), Role::Owner))
    }

    /// A complete apartment at an address no other test uses.
    async fn submitted_apartment(&self) -> ListingIdentityId {
        let started = start_listing(
            StartListingInput {
                property_type: PropertyType::Apartment,
                zip_code: "06543001".to_string(),
                number: self.owner.to_string(),
                complement: None,
            },
            &self.owner(),
            &self.deps,
        )
        .await
        .unwrap();
        let input: UpdateListingInput = serde_json::from_value(complete_apartment(
            started.identity_id.get(),
            started.version.id.get(),
        ))
        .unwrap();
        update_draft(input, &self.owner(), &self.deps).await.unwrap();
        end_update(started.identity_id, &self.owner(), &self.deps)
            .await
            .unwrap();
        started.identity_id
    }

    async fn status_of(&self, identity_id: ListingIdentityId) -> ListingStatus {
        let status: String = sqlx::query_scalar(
            "SELECT v.status::text FROM listing_versions v \
             JOIN listing_identities i ON i.active_version_id = v.id \
             WHERE i.id = $1",
        )
        .bind(identity_id.get())
        .fetch_one(&self.pool)
        .await
        .unwrap();
        serde_json::from_value(json!(status)).unwrap()
    }
}

#[test_context(PgHarness)]
#[tokio::test]
#[ignore = "needs a Docker daemon"]
async fn draft_lifecycle_round_trips_through_postgres(ctx: &PgHarness) {
    let identity_id = ctx.submitted_apartment().await;
    assert_eq!(ctx.status_of(identity_id).await, ListingStatus::PendingAvailability);

    let events: i64 =
        sqlx::query_scalar("SELECT count(*) FROM listing_status_events WHERE identity_id = $1")
            .bind(identity_id.get())
            .fetch_one(&ctx.pool)
            .await
            .unwrap();
    assert_eq!(events, 1);

    let page = list_listings(ListListingsInput::default(), &ctx.owner(), &ctx.deps)
        .await
        .unwrap();
    assert_eq!(page.total, 1);
    assert_eq!(page.items[0].identity_id, identity_id);
    assert!(page.items[0].code.starts_with("TQ"));
}

#[test_context(PgHarness)]
#[tokio::test]
#[ignore = "needs a Docker daemon"]
async fn duplicate_addresses_are_rejected(ctx: &PgHarness) {
    ctx.submitted_apartment().await;

    let err = start_listing(
        StartListingInput {
            property_type: PropertyType::Apartment,
            zip_code: "06543-001".to_string(),
            number: ctx.owner.to_string(),
            complement: None,
        },
        &ctx.owner(),
        &ctx.deps,
    )
    .await
    .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ConflictDuplicate);
}

#[test_context(PgHarness)]
#[tokio::test]
#[ignore = "needs a Docker daemon"]
async fn concurrent_starts_are_serialized_by_the_address_lock(ctx: &PgHarness) {
    let input = || StartListingInput {
        property_type: PropertyType::House,
        zip_code: "06543001".to_string(),
        number: format!("{}-B", ctx.owner),
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

    let count: i64 =
        sqlx::query_scalar("SELECT count(*) FROM listing_identities WHERE owner_user_id = $1")
            .bind(ctx.owner)
            .fetch_one(&ctx.pool)
            .await
            .unwrap();
    assert_eq!(count, 1);
}

#[test_context(PgHarness)]
#[tokio::test]
#[ignore = "needs a Docker daemon"]
async fn availability_is_read_from_the_owner_row(ctx: &PgHarness) {
    let identity_id = ctx.submitted_apartment().await;
    sqlx::query(
        "INSERT INTO owner_availability (user_id, automatic_scheduling, rules_count) \
         VALUES ($1, TRUE, 0)",
    )
    .bind(ctx.owner)
    .execute(&ctx.pool)
    .await
    .unwrap();

    confirm_availability(identity_id, &RequestContext::system(), &ctx.deps)
        .await
        .unwrap();
    assert_eq!(ctx.status_of(identity_id).await, ListingStatus::PendingPhotoScheduling);
}

#[test_context(PgHarness)]
#[tokio::test]
#[ignore = "needs a Docker daemon"]
async fn concurrent_drafts_are_serialized_by_the_row_lock(ctx: &PgHarness) {
    let identity_id = ctx.submitted_apartment().await;
    sqlx::query(
        "UPDATE listing_versions SET status = 'PUBLISHED' \
         WHERE id = (SELECT active_version_id FROM listing_identities WHERE id = $1)",
    )
    .bind(identity_id.get())
    .execute(&ctx.pool)
    .await
    .unwrap();

    let owner = ctx.owner();
    let (first, second) = tokio::join!(
        create_draft(identity_id, &owner, &ctx.deps),
        create_draft(identity_id, &owner, &ctx.deps),
    );
    let kinds: Vec<Option<ErrorKind>> = [&first, &second]
        .iter()
        .map(|r| r.as_ref().err().map(|e| e.kind()))
        .collect();
    assert_eq!(kinds.iter().filter(|k| k.is_none()).count(), 1);
    assert!(kinds.contains(&Some(ErrorKind::ConflictDraftExists)));
}

#[test_context(PgHarness)]
#[tokio::test]
#[ignore = "needs a Docker daemon"]
async fn rejected_callbacks_are_audited(ctx: &PgHarness) {
    let marker = format!("garbage-{}", ctx.owner);
    let err = handle_processing_callback(marker.as_bytes(), &RequestContext::system(), &ctx.deps)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);

    let outcome: String =
        sqlx::query_scalar("SELECT outcome FROM media_callback_audit WHERE raw_body = $1")
            .bind(&marker)
            .fetch_one(&ctx.pool)
            .await
            .unwrap();
    assert_eq!(outcome, "rejected");
}
