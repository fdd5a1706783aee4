use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

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
    AddressKey, ListingIdentity, ListingRow, ListingVersion, OwnerAvailability,
};
use crate::domains::media::models::{BatchStatus, CallbackAudit, MediaBatch};
use crate::domains::photo_sessions::data::SlotSearch;
use crate::domains::photo_sessions::models::{PhotoSession, PhotographerSlot, ServiceArea};

#[derive(Debug, Clone)]
struct Sequences {
    identity: i64,
    version: i64,
    code: i64,
    session: i64,
    job: i64,
}

impl Default for Sequences {
    fn default() -> Self {
        Self {
            identity: 1,
            version: 1,
            code: 1,
            session: 1,
            job: 1,
        }
    }
}

fn take(seq: &mut i64) -> i64 {
    let value = *seq;
    *seq += 1;
    value
}

/// Every table the engine touches, held in memory.
#[derive(Debug, Clone, Default)]
pub struct MemoryState {
    pub identities: BTreeMap<ListingIdentityId, ListingIdentity>,
    pub versions: BTreeMap<ListingVersionId, ListingVersion>,
    pub status_events: Vec<ListingStatusChanged>,
    pub owner_availability: HashMap<UserId, OwnerAvailability>,
    pub slots: BTreeMap<SlotId, PhotographerSlot>,
    pub service_areas: Vec<ServiceArea>,
    pub sessions: BTreeMap<PhotoSessionId, PhotoSession>,
    pub batches: BTreeMap<MediaBatchId, MediaBatch>,
    pub callback_audits: Vec<CallbackAudit>,
    pub favorites: Vec<Favorite>,
    sequences: Sequences,
}

impl MemoryState {
    /// Start identity ids at `id` instead of 1.
    pub fn with_next_identity_id(mut self, id: i64) -> Self {
        self.sequences.identity = id;
        self
    }

    pub fn put_slot(&mut self, slot: PhotographerSlot) {
        self.slots.insert(slot.id, slot);
    }

    pub fn add_service_area(&mut self, photographer: UserId, city: &str, state: &str) {
        self.service_areas.push(ServiceArea {
            photographer_user_id: photographer,
            city: city.to_string(),
            state: state.to_string(),
        });
    }

    pub fn set_owner_availability(&mut self, user: UserId, automatic: bool, rules_count: i32) {
        self.owner_availability.insert(
            user,
            OwnerAvailability {
                user_id: user,
                automatic_scheduling: automatic,
                rules_count,
            },
        );
    }

    /// Versions of an identity, newest first.
    pub fn versions_of(&self, identity: ListingIdentityId) -> Vec<&ListingVersion> {
        let mut versions: Vec<&ListingVersion> = self
            .versions
            .values()
            .filter(|v| v.identity_id == identity)
            .collect();
        versions.sort_by(|a, b| b.version.cmp(&a.version));
        versions
    }

    pub fn active_version(&self, identity: ListingIdentityId) -> Option<&ListingVersion> {
        let id = self.identities.get(&identity)?.active_version_id?;
        self.versions.get(&id)
    }

    pub fn favorite_count(&self, user: UserId, identity: ListingIdentityId) -> usize {
        self.favorites
            .iter()
            .filter(|f| f.user_id == user && f.listing_identity_id == identity)
            .count()
    }

    fn row(&self, version: &ListingVersion) -> Option<ListingRow> {
        self.identities
            .get(&version.identity_id)
            .map(|identity| ListingRow::new(identity.clone(), version.clone()))
    }
}

/// In-process store. Transactions are serialized through one lock and work
/// on a copy of the state that replaces the original on commit.
#[derive(Clone, Default)]
pub struct MemoryStore {
    state: Arc<Mutex<MemoryState>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_state(state: MemoryState) -> Self {
        Self {
            state: Arc::new(Mutex::new(state)),
        }
    }

    /// Mutate the committed state directly (test setup).
    pub async fn seed(&self, f: impl FnOnce(&mut MemoryState)) {
        let mut state = self.state.lock().await;
        f(&mut state);
    }

    pub async fn snapshot(&self) -> MemoryState {
        self.state.lock().await.clone()
    }
}

#[async_trait]
impl BaseStore for MemoryStore {
    async fn begin(&self) -> Result<Box<dyn StoreTx>> {
        let guard = self.state.clone().lock_owned().await;
        let work = guard.clone();
        Ok(Box::new(MemoryTx { guard, work }))
    }

    async fn ping(&self) -> Result<()> {
        Ok(())
    }
}

struct MemoryTx {
    guard: OwnedMutexGuard<MemoryState>,
    work: MemoryState,
}

#[async_trait]
impl StoreTx for MemoryTx {
    async fn find_identity(&mut self, id: ListingIdentityId) -> Result<Option<ListingIdentity>> {
        Ok(self.work.identities.get(&id).cloned())
    }

    async fn lock_identity(&mut self, id: ListingIdentityId) -> Result<Option<ListingIdentity>> {
        Ok(self.work.identities.get(&id).cloned())
    }

    async fn lock_address(&mut self, _owner: UserId, _key: &AddressKey) -> Result<()> {
        // transactions already run one at a time
        Ok(())
    }

    async fn find_duplicate_identity(
        &mut self,
        owner: UserId,
        key: &AddressKey,
    ) -> Result<Option<ListingIdentityId>> {
        let work = &self.work;
        Ok(work
            .identities
            .values()
            .filter(|i| i.owner_user_id == owner)
            .find(|i| {
                work.active_version(i.id)
                    .is_some_and(|v| !v.status.is_retired() && v.address_key() == *key)
            })
            .map(|i| i.id))
    }

    async fn next_listing_code(&mut self) -> Result<i64> {
        Ok(take(&mut self.work.sequences.code))
    }

    async fn insert_identity(&mut self, identity: &ListingIdentity) -> Result<ListingIdentity> {
        if self.work.identities.values().any(|i| i.code == identity.code) {
            return Err(anyhow!("duplicate listing code {}", identity.code));
        }
        let id = ListingIdentityId::new(take(&mut self.work.sequences.identity));
        let stored = ListingIdentity {
            id,
            ..identity.clone()
        };
        self.work.identities.insert(id, stored.clone());
        Ok(stored)
    }

    async fn update_identity(&mut self, identity: &ListingIdentity) -> Result<()> {
        match self.work.identities.get_mut(&identity.id) {
            Some(existing) => {
                *existing = identity.clone();
                Ok(())
            }
            None => Err(anyhow!("listing identity {} does not exist", identity.id)),
        }
    }

    async fn insert_version(&mut self, version: &ListingVersion) -> Result<ListingVersion> {
        let clash = self
            .work
            .versions
            .values()
            .any(|v| v.identity_id == version.identity_id && v.version == version.version);
        if clash {
            return Err(anyhow!(
                "version {} already exists for identity {}",
                version.version,
                version.identity_id
            ));
        }
        let id = ListingVersionId::new(take(&mut self.work.sequences.version));
        let stored = ListingVersion {
            id,
            ..version.clone()
        };
        self.work.versions.insert(id, stored.clone());
        Ok(stored)
    }

    async fn update_version(&mut self, version: &ListingVersion) -> Result<()> {
        match self.work.versions.get_mut(&version.id) {
            Some(existing) => {
                *existing = version.clone();
                Ok(())
            }
            None => Err(anyhow!("listing version {} does not exist", version.id)),
        }
    }

    async fn find_version(&mut self, id: ListingVersionId) -> Result<Option<ListingVersion>> {
        Ok(self.work.versions.get(&id).cloned())
    }

    async fn versions_of(&mut self, identity: ListingIdentityId) -> Result<Vec<ListingVersion>> {
        Ok(self.work.versions_of(identity).into_iter().cloned().collect())
    }

    async fn insert_status_event(&mut self, event: &ListingStatusChanged) -> Result<()> {
        self.work.status_events.push(event.clone());
        Ok(())
    }

    async fn owner_availability(&mut self, user: UserId) -> Result<Option<OwnerAvailability>> {
        Ok(self.work.owner_availability.get(&user).cloned())
    }

    async fn search_listings(&mut self, search: &ListingSearch) -> Result<(Vec<ListingRow>, i64)> {
        let mut rows: Vec<ListingRow> = self
            .work
            .versions
            .values()
            .filter_map(|v| self.work.row(v))
            .filter(|row| search.matches(row))
            .collect();
        rows.sort_by(|a, b| search.compare(a, b));
        let total = rows.len() as i64;
        Ok((search.page.slice(&rows), total))
    }

    async fn active_rows(&mut self, ids: &[ListingIdentityId]) -> Result<Vec<ListingRow>> {
        Ok(ids
            .iter()
            .filter_map(|id| self.work.active_version(*id))
            .filter_map(|v| self.work.row(v))
            .collect())
    }

    async fn lock_slot(&mut self, id: SlotId) -> Result<Option<PhotographerSlot>> {
        Ok(self.work.slots.get(&id).cloned())
    }

    async fn update_slot(&mut self, slot: &PhotographerSlot) -> Result<()> {
        match self.work.slots.get_mut(&slot.id) {
            Some(existing) => {
                *existing = slot.clone();
                Ok(())
            }
            None => Err(anyhow!("slot {} does not exist", slot.id)),
        }
    }

    async fn expired_reservations(&mut self, now: DateTime<Utc>) -> Result<Vec<PhotographerSlot>> {
        Ok(self
            .work
            .slots
            .values()
            .filter(|s| s.reservation_expired(now))
            .cloned()
            .collect())
    }

    async fn search_slots(&mut self, search: &SlotSearch) -> Result<(Vec<PhotographerSlot>, i64)> {
        let areas = &self.work.service_areas;
        let mut slots: Vec<PhotographerSlot> = self
            .work
            .slots
            .values()
            .filter(|s| search.matches(s))
            .filter(|s| {
                areas.iter().any(|a| {
                    a.photographer_user_id == s.photographer_user_id
                        && a.covers(&search.city, &search.state)
                })
            })
            .cloned()
            .collect();
        slots.sort_by(|a, b| search.sort.compare(a, b, search.timezone));
        let total = slots.len() as i64;
        Ok((search.page.slice(&slots), total))
    }

    async fn insert_session(&mut self, session: &PhotoSession) -> Result<PhotoSession> {
        let id = PhotoSessionId::new(take(&mut self.work.sequences.session));
        let stored = PhotoSession {
            id,
            ..session.clone()
        };
        self.work.sessions.insert(id, stored.clone());
        Ok(stored)
    }

    async fn find_session(&mut self, id: PhotoSessionId) -> Result<Option<PhotoSession>> {
        Ok(self.work.sessions.get(&id).cloned())
    }

    async fn lock_session(&mut self, id: PhotoSessionId) -> Result<Option<PhotoSession>> {
        Ok(self.work.sessions.get(&id).cloned())
    }

    async fn update_session(&mut self, session: &PhotoSession) -> Result<()> {
        match self.work.sessions.get_mut(&session.id) {
            Some(existing) => {
                existing.status = session.status;
                existing.updated_at = session.updated_at;
                Ok(())
            }
            None => Err(anyhow!("photo session {} does not exist", session.id)),
        }
    }

    async fn open_batch_for(&mut self, identity: ListingIdentityId) -> Result<Option<MediaBatch>> {
        Ok(self
            .work
            .batches
            .values()
            .filter(|b| b.listing_identity_id == identity && b.status.is_open())
            .max_by_key(|b| b.created_at)
            .cloned())
    }

    async fn insert_batch(&mut self, batch: &MediaBatch) -> Result<()> {
        let open_exists = self
            .work
            .batches
            .values()
            .any(|b| b.listing_identity_id == batch.listing_identity_id && b.status.is_open());
        if open_exists && batch.status.is_open() {
            return Err(anyhow!(
                "listing {} already has an open media batch",
                batch.listing_identity_id
            ));
        }
        self.work.batches.insert(batch.id, batch.clone());
        Ok(())
    }

    async fn lock_batch(&mut self, id: MediaBatchId) -> Result<Option<MediaBatch>> {
        Ok(self.work.batches.get(&id).cloned())
    }

    async fn lock_batch_by_job(&mut self, job: ProcessingJobId) -> Result<Option<MediaBatch>> {
        Ok(self
            .work
            .batches
            .values()
            .find(|b| b.job_id == Some(job))
            .cloned())
    }

    async fn update_batch(&mut self, batch: &MediaBatch) -> Result<()> {
        match self.work.batches.get_mut(&batch.id) {
            Some(existing) => {
                *existing = batch.clone();
                Ok(())
            }
            None => Err(anyhow!("media batch {} does not exist", batch.id)),
        }
    }

    async fn next_processing_job_id(&mut self) -> Result<ProcessingJobId> {
        Ok(ProcessingJobId::new(take(&mut self.work.sequences.job)))
    }

    async fn latest_ready_batch(
        &mut self,
        identity: ListingIdentityId,
    ) -> Result<Option<MediaBatch>> {
        Ok(self
            .work
            .batches
            .values()
            .filter(|b| b.listing_identity_id == identity && b.status == BatchStatus::Ready)
            .max_by_key(|b| b.updated_at)
            .cloned())
    }

    async fn callback_applied(&mut self, job: ProcessingJobId, execution_arn: &str) -> Result<bool> {
        Ok(self.work.callback_audits.iter().any(|a| {
            a.job_id == Some(job)
                && a.execution_arn.as_deref() == Some(execution_arn)
                && matches!(a.outcome.as_str(), "applied" | "retrying")
        }))
    }

    async fn insert_callback_audit(&mut self, audit: &CallbackAudit) -> Result<()> {
        self.work.callback_audits.push(audit.clone());
        Ok(())
    }

    async fn insert_favorite(&mut self, favorite: &Favorite) -> Result<bool> {
        if self.work.favorite_count(favorite.user_id, favorite.listing_identity_id) > 0 {
            return Ok(false);
        }
        self.work.favorites.push(favorite.clone());
        Ok(true)
    }

    async fn delete_favorite(&mut self, user: UserId, identity: ListingIdentityId) -> Result<bool> {
        let before = self.work.favorites.len();
        self.work
            .favorites
            .retain(|f| !(f.user_id == user && f.listing_identity_id == identity));
        Ok(self.work.favorites.len() != before)
    }

    async fn favorites_of(
        &mut self,
        user: UserId,
        page: &ValidatedPage,
    ) -> Result<(Vec<Favorite>, i64)> {
        let mut favorites: Vec<Favorite> = self
            .work
            .favorites
            .iter()
            .filter(|f| f.user_id == user)
            .cloned()
            .collect();
        favorites.sort_by(|a, b| {
            b.created_at
                .cmp(&a.created_at)
                .then(b.listing_identity_id.cmp(&a.listing_identity_id))
        });
        let total = favorites.len() as i64;
        Ok((page.slice(&favorites), total))
    }

    async fn commit(self: Box<Self>) -> Result<()> {
        let MemoryTx { mut guard, work } = *self;
        *guard = work;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domains::listings::models::PropertyType;

    fn draft(identity: ListingIdentityId, version: i32) -> ListingVersion {
        let mut v = ListingVersion::first_draft(
            identity,
            PropertyType::House,
            "06543001".into(),
            "100".into(),
            None,
            Utc::now(),
        );
        v.version = version;
        v
    }

    #[tokio::test]
    async fn test_rollback_on_drop() {
        let store = MemoryStore::new();
        {
            let mut tx = store.begin().await.unwrap();
            let identity = ListingIdentity::new(UserId::new(55), "TQ000001".into(), Utc::now());
            tx.insert_identity(&identity).await.unwrap();
        }
        assert!(store.snapshot().await.identities.is_empty());
    }

    #[tokio::test]
    async fn test_commit_publishes_work() {
        let store = MemoryStore::with_state(MemoryState::default().with_next_identity_id(1024));
        let mut tx = store.begin().await.unwrap();
        let identity = ListingIdentity::new(UserId::new(55), "TQ000001".into(), Utc::now());
        let stored = tx.insert_identity(&identity).await.unwrap();
        tx.commit().await.unwrap();

        assert_eq!(stored.id, ListingIdentityId::new(1024));
        assert!(store.snapshot().await.identities.contains_key(&stored.id));
    }

    #[tokio::test]
    async fn test_duplicate_version_number_rejected() {
        let store = MemoryStore::new();
        let mut tx = store.begin().await.unwrap();
        let identity = ListingIdentityId::new(1);
        tx.insert_version(&draft(identity, 1)).await.unwrap();
        assert!(tx.insert_version(&draft(identity, 1)).await.is_err());
        tx.insert_version(&draft(identity, 2)).await.unwrap();

        let versions = tx.versions_of(identity).await.unwrap();
        assert_eq!(
            versions.iter().map(|v| v.version).collect::<Vec<_>>(),
            vec![2, 1]
        );
    }
}
