//! Transactional persistence behind one trait seam.
//!
//! Every command opens a [`StoreTx`], works through it and commits. Dropping
//! an uncommitted transaction rolls it back. Methods named `lock_*` take a
//! row lock that is held until commit or rollback.
//!
//! Two implementations exist: [`PostgresStore`] delegates to the SQL in each
//! domain's `models/`, and [`MemoryStore`] serializes whole transactions
//! over an in-process state for tests.

mod memory;
mod postgres;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

pub use memory::{MemoryState, MemoryStore};
pub use postgres::PostgresStore;

use crate::common::pagination::ValidatedPage;
use crate::common::{
    ListingIdentityId, ListingVersionId, MediaBatchId, PhotoSessionId, ProcessingJobId, SlotId,
    UserId,
};
use crate::domains::favorites::models::Favorite;
use crate::domains::listings::data::query::ListingSearch;
use crate::domains::listings::events::ListingStatusChanged;
use crate::domains::listings::models::{
    AddressKey, ListingIdentity, ListingRow, ListingVersion, OwnerAvailability,
};
use crate::domains::media::models::{CallbackAudit, MediaBatch};
use crate::domains::photo_sessions::data::SlotSearch;
use crate::domains::photo_sessions::models::{PhotoSession, PhotographerSlot};

#[async_trait]
pub trait BaseStore: Send + Sync {
    async fn begin(&self) -> Result<Box<dyn StoreTx>>;

    /// Connectivity check for the health route.
    async fn ping(&self) -> Result<()>;
}

#[async_trait]
pub trait StoreTx: Send {
    // -------------------------------------------------------------------------
    // Listings
    // -------------------------------------------------------------------------

    async fn find_identity(&mut self, id: ListingIdentityId) -> Result<Option<ListingIdentity>>;

    async fn lock_identity(&mut self, id: ListingIdentityId) -> Result<Option<ListingIdentity>>;

    /// Held until commit or rollback. Taken before the duplicate check so two
    /// starts for the same address cannot both pass it.
    async fn lock_address(&mut self, owner: UserId, key: &AddressKey) -> Result<()>;

    /// A live listing of the owner at the same address and unit.
    async fn find_duplicate_identity(
        &mut self,
        owner: UserId,
        key: &AddressKey,
    ) -> Result<Option<ListingIdentityId>>;

    async fn next_listing_code(&mut self) -> Result<i64>;

    async fn insert_identity(&mut self, identity: &ListingIdentity) -> Result<ListingIdentity>;

    async fn update_identity(&mut self, identity: &ListingIdentity) -> Result<()>;

    async fn insert_version(&mut self, version: &ListingVersion) -> Result<ListingVersion>;

    async fn update_version(&mut self, version: &ListingVersion) -> Result<()>;

    async fn find_version(&mut self, id: ListingVersionId) -> Result<Option<ListingVersion>>;

    /// Every version of the identity, newest first.
    async fn versions_of(&mut self, identity: ListingIdentityId) -> Result<Vec<ListingVersion>>;

    async fn insert_status_event(&mut self, event: &ListingStatusChanged) -> Result<()>;

    async fn owner_availability(&mut self, user: UserId) -> Result<Option<OwnerAvailability>>;

    async fn search_listings(&mut self, search: &ListingSearch) -> Result<(Vec<ListingRow>, i64)>;

    /// Active rows for the identities, in the order given; missing ones are skipped.
    async fn active_rows(&mut self, ids: &[ListingIdentityId]) -> Result<Vec<ListingRow>>;

    // -------------------------------------------------------------------------
    // Photo sessions
    // -------------------------------------------------------------------------

    async fn lock_slot(&mut self, id: SlotId) -> Result<Option<PhotographerSlot>>;

    async fn update_slot(&mut self, slot: &PhotographerSlot) -> Result<()>;

    /// Locks every RESERVED slot whose hold lapsed at `now`.
    async fn expired_reservations(&mut self, now: DateTime<Utc>) -> Result<Vec<PhotographerSlot>>;

    async fn search_slots(&mut self, search: &SlotSearch) -> Result<(Vec<PhotographerSlot>, i64)>;

    async fn insert_session(&mut self, session: &PhotoSession) -> Result<PhotoSession>;

    async fn find_session(&mut self, id: PhotoSessionId) -> Result<Option<PhotoSession>>;

    async fn lock_session(&mut self, id: PhotoSessionId) -> Result<Option<PhotoSession>>;

    async fn update_session(&mut self, session: &PhotoSession) -> Result<()>;

    // -------------------------------------------------------------------------
    // Media
    // -------------------------------------------------------------------------

    async fn open_batch_for(&mut self, identity: ListingIdentityId) -> Result<Option<MediaBatch>>;

    async fn insert_batch(&mut self, batch: &MediaBatch) -> Result<()>;

    async fn lock_batch(&mut self, id: MediaBatchId) -> Result<Option<MediaBatch>>;

    async fn lock_batch_by_job(&mut self, job: ProcessingJobId) -> Result<Option<MediaBatch>>;

    async fn update_batch(&mut self, batch: &MediaBatch) -> Result<()>;

    async fn next_processing_job_id(&mut self) -> Result<ProcessingJobId>;

    async fn latest_ready_batch(&mut self, identity: ListingIdentityId)
        -> Result<Option<MediaBatch>>;

    /// Whether this pipeline execution was already applied to the job.
    async fn callback_applied(&mut self, job: ProcessingJobId, execution_arn: &str) -> Result<bool>;

    async fn insert_callback_audit(&mut self, audit: &CallbackAudit) -> Result<()>;

    // -------------------------------------------------------------------------
    // Favorites
    // -------------------------------------------------------------------------

    /// False when the pair already existed.
    async fn insert_favorite(&mut self, favorite: &Favorite) -> Result<bool>;

    /// False when there was nothing to delete.
    async fn delete_favorite(&mut self, user: UserId, identity: ListingIdentityId) -> Result<bool>;

    async fn favorites_of(
        &mut self,
        user: UserId,
        page: &ValidatedPage,
    ) -> Result<(Vec<Favorite>, i64)>;

    async fn commit(self: Box<Self>) -> Result<()>;
}
