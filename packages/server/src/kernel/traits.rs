// Trait definitions for dependency injection
//
// These are INFRASTRUCTURE traits only - no business logic.
// Listing rules live in the domains and call through these traits.
//
// Naming convention: Base* for trait names (e.g., BaseObjectStorage, BaseClock)

use anyhow::Result;
use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::common::UserId;

// =============================================================================
// Object Storage Trait (Infrastructure - signed URLs + HEAD)
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    Get,
    Put,
    Head,
}

impl HttpMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Put => "PUT",
            HttpMethod::Head => "HEAD",
        }
    }
}

/// What to sign. Header names are lowercased by the signer.
#[derive(Debug, Clone)]
pub struct SignRequest {
    pub method: HttpMethod,
    pub key: String,
    pub expires_at: DateTime<Utc>,
    pub headers: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SignedUrl {
    pub method: HttpMethod,
    pub url: String,
    pub expires_at: DateTime<Utc>,
    /// Headers the client must send verbatim.
    pub headers: BTreeMap<String, String>,
}

/// Metadata of a stored object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectHead {
    pub size: i64,
    pub content_type: Option<String>,
    /// Lowercase hex SHA-256 recorded by the storage, when it keeps one.
    pub sha256: Option<String>,
}

#[async_trait]
pub trait BaseObjectStorage: Send + Sync {
    /// Sign a URL for one method on one key.
    fn sign(&self, request: &SignRequest) -> Result<SignedUrl>;

    /// Object metadata, or None when nothing is stored under the key.
    async fn head(&self, key: &str) -> Result<Option<ObjectHead>>;
}

// =============================================================================
// Processing Queue Trait (Infrastructure - media pipeline jobs)
// =============================================================================

#[async_trait]
pub trait BaseProcessingQueue: Send + Sync {
    /// Hand a serialized job envelope to the pipeline.
    async fn enqueue(&self, job_id: &str, payload: Bytes) -> Result<()>;
}

// =============================================================================
// Notification Trait (Infrastructure - fire-and-forget delivery)
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub user_id: UserId,
    pub template: String,
    pub payload: serde_json::Value,
}

impl Notification {
    pub fn new(user_id: UserId, template: impl Into<String>, payload: serde_json::Value) -> Self {
        Self {
            user_id,
            template: template.into(),
            payload,
        }
    }
}

#[async_trait]
pub trait BaseNotificationService: Send + Sync {
    async fn notify(&self, notification: &Notification) -> Result<()>;
}

// =============================================================================
// Clock Trait (Infrastructure)
// =============================================================================

pub trait BaseClock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall clock.
pub struct SystemClock;

impl BaseClock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}
