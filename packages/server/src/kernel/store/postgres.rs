use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Postgres, Transaction};

use super::{BaseStore, StoreTx};
use crate::common::pagination::ValidatedPage;
use crate::common::{
    ListingIdentityId, ListingVersionId, MediaBatchId, PhotoSessionId, ProcessingJobId, SlotId,
    UserId,
};
use crate::domains::favorites::models::Favorite;
use crate::domains::listings::data::query::ListingSearch;
use crate::domains::listings::events::ListingStatusChanged;
use crate::domains::listings::models::{
    status_event, AddressKey, ListingIdentity, ListingRow, ListingVersion, OwnerAvailability,
};
use crate::domains::media::models::{CallbackAudit, MediaBatch};
use crate::domains::photo_sessions::data::SlotSearch;
use crate::domains::photo_sessions::models::{PhotoSession, PhotographerSlot};

/// Store backed by the Postgres pool. Each transaction holds one connection.
#[derive(Clone)]
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl BaseStore for PostgresStore {
    async fn begin(&self) -> Result<Box<dyn StoreTx>> {
        let tx = self.pool.begin().await?;
        Ok(Box::new(PgStoreTx { tx }))
    }

    async fn ping(&self) -> Result<()> {
        let mut conn = self.pool.acquire().await?;
        sqlx::query("SELECT 1").execute(&mut *conn).await?;
        Ok(())
    }
}

struct PgStoreTx {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl StoreTx for PgStoreTx {
    async fn find_identity(&mut self, id: ListingIdentityId) -> Result<Option<ListingIdentity>> {
        ListingIdentity::find_by_id(id, &mut self.tx).await
    }

    async fn lock_identity(&mut self, id: ListingIdentityId) -> Result<Option<ListingIdentity>> {
        ListingIdentity::find_for_update(id, &mut self.tx).await
    }

    async fn lock_address(&mut self, owner: UserId, key: &AddressKey) -> Result<()> {
        ListingIdentity::lock_address(owner, key, &mut self.tx).await
    }

    async fn find_duplicate_identity(
        &mut self,
        owner: UserId,
        key: &AddressKey,
    ) -> Result<Option<ListingIdentityId>> {
        ListingIdentity::find_duplicate(owner, key, &mut self.tx).await
    }

    async fn next_listing_code(&mut self) -> Result<i64> {
        ListingIdentity::next_code(&mut self.tx).await
    }

    async fn insert_identity(&mut self, identity: &ListingIdentity) -> Result<ListingIdentity> {
        identity.insert(&mut self.tx).await
    }

    async fn update_identity(&mut self, identity: &ListingIdentity) -> Result<()> {
        identity.update(&mut self.tx).await
    }

    async fn insert_version(&mut self, version: &ListingVersion) -> Result<ListingVersion> {
        version.insert(&mut self.tx).await
    }

    async fn update_version(&mut self, version: &ListingVersion) -> Result<()> {
        version.update(&mut self.tx).await
    }

    async fn find_version(&mut self, id: ListingVersionId) -> Result<Option<ListingVersion>> {
        ListingVersion::find_by_id(id, &mut self.tx).await
    }

    async fn versions_of(&mut self, identity: ListingIdentityId) -> Result<Vec<ListingVersion>> {
        ListingVersion::find_by_identity(identity, &mut self.tx).await
    }

    async fn insert_status_event(&mut self, event: &ListingStatusChanged) -> Result<()> {
        status_event::insert_status_event(event, &mut self.tx).await
    }

    async fn owner_availability(&mut self, user: UserId) -> Result<Option<OwnerAvailability>> {
        OwnerAvailability::find_by_user(user, &mut self.tx).await
    }

    async fn search_listings(&mut self, search: &ListingSearch) -> Result<(Vec<ListingRow>, i64)> {
        ListingRow::search(search, &mut self.tx).await
    }

    async fn active_rows(&mut self, ids: &[ListingIdentityId]) -> Result<Vec<ListingRow>> {
        ListingRow::find_active(ids, &mut self.tx).await
    }

    async fn lock_slot(&mut self, id: SlotId) -> Result<Option<PhotographerSlot>> {
        PhotographerSlot::find_for_update(id, &mut self.tx).await
    }

    async fn update_slot(&mut self, slot: &PhotographerSlot) -> Result<()> {
        slot.update(&mut self.tx).await
    }

    async fn expired_reservations(&mut self, now: DateTime<Utc>) -> Result<Vec<PhotographerSlot>> {
        PhotographerSlot::find_expired_reservations(now, &mut self.tx).await
    }

    async fn search_slots(&mut self, search: &SlotSearch) -> Result<(Vec<PhotographerSlot>, i64)> {
        PhotographerSlot::search(search, &mut self.tx).await
    }

    async fn insert_session(&mut self, session: &PhotoSession) -> Result<PhotoSession> {
        session.insert(&mut self.tx).await
    }

    async fn find_session(&mut self, id: PhotoSessionId) -> Result<Option<PhotoSession>> {
        PhotoSession::find_by_id(id, &mut self.tx).await
    }

    async fn lock_session(&mut self, id: PhotoSessionId) -> Result<Option<PhotoSession>> {
        PhotoSession::find_for_update(id, &mut self.tx).await
    }

    async fn update_session(&mut self, session: &PhotoSession) -> Result<()> {
        session.update_status(&mut self.tx).await
    }

    async fn open_batch_for(&mut self, identity: ListingIdentityId) -> Result<Option<MediaBatch>> {
        MediaBatch::find_open_for_identity(identity, &mut self.tx).await
    }

    async fn insert_batch(&mut self, batch: &MediaBatch) -> Result<()> {
        batch.insert(&mut self.tx).await
    }

    async fn lock_batch(&mut self, id: MediaBatchId) -> Result<Option<MediaBatch>> {
        MediaBatch::find_for_update(id, &mut self.tx).await
    }

    async fn lock_batch_by_job(&mut self, job: ProcessingJobId) -> Result<Option<MediaBatch>> {
        MediaBatch::find_by_job_for_update(job, &mut self.tx).await
    }

    async fn update_batch(&mut self, batch: &MediaBatch) -> Result<()> {
        batch.update(&mut self.tx).await
    }

    async fn next_processing_job_id(&mut self) -> Result<ProcessingJobId> {
        MediaBatch::next_job_id(&mut self.tx).await
    }

    async fn latest_ready_batch(
        &mut self,
        identity: ListingIdentityId,
    ) -> Result<Option<MediaBatch>> {
        MediaBatch::find_latest_ready(identity, &mut self.tx).await
    }

    async fn callback_applied(&mut self, job: ProcessingJobId, execution_arn: &str) -> Result<bool> {
        CallbackAudit::was_applied(job, execution_arn, &mut self.tx).await
    }

    async fn insert_callback_audit(&mut self, audit: &CallbackAudit) -> Result<()> {
        audit.insert(&mut self.tx).await
    }

    async fn insert_favorite(&mut self, favorite: &Favorite) -> Result<bool> {
        favorite.insert_if_absent(&mut self.tx).await
    }

    async fn delete_favorite(&mut self, user: UserId, identity: ListingIdentityId) -> Result<bool> {
        Favorite::delete(user, identity, &mut self.tx).await
    }

    async fn favorites_of(
        &mut self,
        user: UserId,
        page: &ValidatedPage,
    ) -> Result<(Vec<Favorite>, i64)> {
        Favorite::find_page_for_user(user, page, &mut self.tx).await
    }

    async fn commit(self: Box<Self>) -> Result<()> {
        self.tx.commit().await?;
        Ok(())
    }
}
