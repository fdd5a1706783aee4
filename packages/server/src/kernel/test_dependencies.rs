// TestDependencies - mock implementations for testing
//
// Provides mock services that can be injected into ServerDeps for tests.
// Everything records what it was asked to do so tests can assert on it.

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Duration, Utc};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, RwLock};
use typed_builder::TypedBuilder;

use super::store::MemoryStore;
use super::{
    BaseClock, BaseNotificationService, BaseObjectStorage, BaseProcessingQueue, Notification,
    ObjectHead, ServerDeps, SignRequest, SignedUrl, TestNats,
};
use crate::common::{PhotoSessionId, SlotId, UserId};
use crate::config::EngineSettings;
use crate::domains::photo_sessions::models::{PhotographerSlot, SlotStatus};

/// 2025-06-02T12:00:00Z, a Monday.
const DEFAULT_NOW_SECS: i64 = 1_748_865_600;

// =============================================================================
// Mock Object Storage
// =============================================================================

pub struct MockObjectStorage {
    objects: RwLock<HashMap<String, ObjectHead>>,
    signed: RwLock<Vec<SignRequest>>,
}

impl MockObjectStorage {
    pub fn new() -> Self {
        Self {
            objects: RwLock::new(HashMap::new()),
            signed: RwLock::new(Vec::new()),
        }
    }

    /// Store `bytes` under `key` the way a client PUT would.
    pub fn put_object(&self, key: &str, bytes: &[u8], content_type: &str) {
        self.put_head(
            key,
            ObjectHead {
                size: bytes.len() as i64,
                content_type: Some(content_type.to_string()),
                sha256: Some(hex::encode(Sha256::digest(bytes))),
            },
        );
    }

    pub fn put_head(&self, key: &str, head: ObjectHead) {
        self.objects
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(key.to_string(), head);
    }

    pub fn remove_object(&self, key: &str) {
        self.objects
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .remove(key);
    }

    pub fn object(&self, key: &str) -> Option<ObjectHead> {
        self.objects
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(key)
            .cloned()
    }

    /// Every request signed so far, in order.
    pub fn signed_requests(&self) -> Vec<SignRequest> {
        self.signed
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }
}

impl Default for MockObjectStorage {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl BaseObjectStorage for MockObjectStorage {
    fn sign(&self, request: &SignRequest) -> Result<SignedUrl> {
        self.signed
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .push(request.clone());
        Ok(SignedUrl {
            method: request.method,
            url: format!(
                "https://storage.test/{}?method={}&expires={}",
                request.key,
                request.method.as_str(),
                request.expires_at.timestamp()
            ),
            expires_at: request.expires_at,
            headers: request
                .headers
                .iter()
                .map(|(k, v)| (k.to_ascii_lowercase(), v.clone()))
                .collect(),
        })
    }

    async fn head(&self, key: &str) -> Result<Option<ObjectHead>> {
        Ok(self.object(key))
    }
}

// =============================================================================
// Spy Processing Queue
// =============================================================================

#[derive(Default)]
pub struct SpyProcessingQueue {
    jobs: RwLock<Vec<(String, Bytes)>>,
    failures: AtomicUsize,
}

impl SpyProcessingQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `n` enqueue calls fail.
    pub fn fail_next(&self, n: usize) {
        self.failures.store(n, Ordering::SeqCst);
    }

    pub fn job_ids(&self) -> Vec<String> {
        self.jobs
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .map(|(id, _)| id.clone())
            .collect()
    }

    /// Payloads decoded as JSON, in enqueue order.
    pub fn decode_all<T: serde::de::DeserializeOwned>(&self) -> Result<Vec<T>> {
        self.jobs
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .map(|(_, payload)| Ok(serde_json::from_slice(payload)?))
            .collect()
    }

    pub fn clear(&self) {
        self.jobs.write().unwrap_or_else(|e| e.into_inner()).clear();
    }
}

#[async_trait]
impl BaseProcessingQueue for SpyProcessingQueue {
    async fn enqueue(&self, job_id: &str, payload: Bytes) -> Result<()> {
        let failed = self
            .failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failed {
            return Err(anyhow!("queue unavailable"));
        }
        self.jobs
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .push((job_id.to_string(), payload));
        Ok(())
    }
}

// =============================================================================
// Spy Notifier
// =============================================================================

#[derive(Default)]
pub struct SpyNotifier {
    sent: RwLock<Vec<Notification>>,
}

impl SpyNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sent(&self) -> Vec<Notification> {
        self.sent.read().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Templates delivered to one user, in order.
    pub fn templates_for(&self, user: UserId) -> Vec<String> {
        self.sent
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .filter(|n| n.user_id == user)
            .map(|n| n.template.clone())
            .collect()
    }
}

#[async_trait]
impl BaseNotificationService for SpyNotifier {
    async fn notify(&self, notification: &Notification) -> Result<()> {
        self.sent
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .push(notification.clone());
        Ok(())
    }
}

// =============================================================================
// Fixed Clock
// =============================================================================

pub struct FixedClock {
    now: RwLock<DateTime<Utc>>,
}

impl FixedClock {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            now: RwLock::new(now),
        }
    }

    pub fn set(&self, now: DateTime<Utc>) {
        *self.now.write().unwrap_or_else(|e| e.into_inner()) = now;
    }

    pub fn advance(&self, by: Duration) {
        let mut now = self.now.write().unwrap_or_else(|e| e.into_inner());
        *now += by;
    }
}

impl Default for FixedClock {
    fn default() -> Self {
        Self::new(DateTime::from_timestamp(DEFAULT_NOW_SECS, 0).unwrap_or_default())
    }
}

impl BaseClock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.read().unwrap_or_else(|e| e.into_inner())
    }
}

// =============================================================================
// Fixtures
// =============================================================================

/// A photographer slot for seeding the memory store.
///
/// ```rust
/// use toq_core::kernel::SlotFixture;
///
/// let slot = SlotFixture::builder().id(2002).photographer(77).build();
/// # let _ = slot;
/// ```
#[derive(TypedBuilder)]
pub struct SlotFixture {
    id: i64,
    photographer: i64,
    /// Hours after the default test clock.
    #[builder(default = 24)]
    starts_in_hours: i64,
    #[builder(default = 2)]
    length_hours: i64,
    #[builder(default = SlotStatus::Available)]
    status: SlotStatus,
}

impl SlotFixture {
    pub fn at(&self, now: DateTime<Utc>) -> PhotographerSlot {
        let slot_start = now + Duration::hours(self.starts_in_hours);
        PhotographerSlot {
            id: SlotId::new(self.id),
            photographer_user_id: UserId::new(self.photographer),
            slot_start,
            slot_end: slot_start + Duration::hours(self.length_hours),
            status: self.status,
            reserved_until: None,
            reservation_holder_user_id: None,
            photo_session_id: None::<PhotoSessionId>,
        }
    }
}

// =============================================================================
// TestDependencies - Builder for test dependencies
// =============================================================================

#[derive(Clone)]
pub struct TestDependencies {
    pub store: MemoryStore,
    pub storage: Arc<MockObjectStorage>,
    pub queue: Arc<SpyProcessingQueue>,
    pub nats: Arc<TestNats>,
    pub notifier: Arc<SpyNotifier>,
    pub clock: Arc<FixedClock>,
    pub settings: EngineSettings,
}

impl TestDependencies {
    pub fn new() -> Self {
        Self {
            store: MemoryStore::new(),
            storage: Arc::new(MockObjectStorage::new()),
            queue: Arc::new(SpyProcessingQueue::new()),
            nats: Arc::new(TestNats::new()),
            notifier: Arc::new(SpyNotifier::new()),
            clock: Arc::new(FixedClock::default()),
            settings: EngineSettings::default(),
        }
    }

    /// Use a pre-populated store
    pub fn with_store(mut self, store: MemoryStore) -> Self {
        self.store = store;
        self
    }

    /// Override engine settings
    pub fn with_settings(mut self, settings: EngineSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    /// Wire everything into a ServerDeps.
    pub fn deps(&self) -> ServerDeps {
        ServerDeps::new(
            Arc::new(self.store.clone()),
            self.storage.clone(),
            self.queue.clone(),
            self.nats.clone(),
            self.notifier.clone(),
            self.clock.clone(),
            self.settings.clone(),
        )
    }
}

impl Default for TestDependencies {
    fn default() -> Self {
        Self::new()
    }
}
