use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::types::Json;
use sqlx::{FromRow, PgConnection};
use std::str::FromStr;

use crate::common::{ListingIdentityId, MediaBatchId, ProcessingJobId, UserId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "media_batch_status", rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BatchStatus {
    PendingUpload,
    Received,
    Processing,
    Ready,
    Failed,
}

impl BatchStatus {
    /// Open batches block a new upload cycle for the same listing.
    pub fn is_open(&self) -> bool {
        matches!(
            self,
            BatchStatus::PendingUpload | BatchStatus::Received | BatchStatus::Processing
        )
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, BatchStatus::Ready | BatchStatus::Failed)
    }
}

impl std::fmt::Display for BatchStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            BatchStatus::PendingUpload => "PENDING_UPLOAD",
            BatchStatus::Received => "RECEIVED",
            BatchStatus::Processing => "PROCESSING",
            BatchStatus::Ready => "READY",
            BatchStatus::Failed => "FAILED",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AssetType {
    Photo,
    Video,
    Panorama,
    FloorPlan,
    ProjectDoc,
    ProjectRender,
}

impl AssetType {
    pub const ALL: [AssetType; 6] = [
        AssetType::Photo,
        AssetType::Video,
        AssetType::Panorama,
        AssetType::FloorPlan,
        AssetType::ProjectDoc,
        AssetType::ProjectRender,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            AssetType::Photo => "PHOTO",
            AssetType::Video => "VIDEO",
            AssetType::Panorama => "PANORAMA",
            AssetType::FloorPlan => "FLOOR_PLAN",
            AssetType::ProjectDoc => "PROJECT_DOC",
            AssetType::ProjectRender => "PROJECT_RENDER",
        }
    }

    /// Project material uploaded by the owner of an off-plan listing.
    pub fn is_project(&self) -> bool {
        matches!(self, AssetType::ProjectDoc | AssetType::ProjectRender)
    }
}

impl std::fmt::Display for AssetType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AssetType {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        AssetType::ALL
            .iter()
            .copied()
            .find(|t| t.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| anyhow::anyhow!("Invalid asset type: {}", s))
    }
}

/// One file of a batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MediaAsset {
    pub asset_type: AssetType,
    pub sequence: i32,
    #[serde(default)]
    pub title: Option<String>,
    pub content_type: String,
    pub byte_size: i64,
    pub sha256: String,
    pub raw_object_key: String,
    #[serde(default)]
    pub processed_object_key: Option<String>,
    #[serde(default)]
    pub preview_object_key: Option<String>,
    #[serde(default)]
    pub thumbnail_object_key: Option<String>,
}

impl MediaAsset {
    pub fn clear_processed(&mut self) {
        self.processed_object_key = None;
        self.preview_object_key = None;
        self.thumbnail_object_key = None;
    }
}

/// One upload cycle for a listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct MediaBatch {
    pub id: MediaBatchId,
    pub listing_identity_id: ListingIdentityId,
    pub status: BatchStatus,
    #[sqlx(json)]
    pub assets: Vec<MediaAsset>,
    pub job_id: Option<ProcessingJobId>,
    /// Retries of the current job.
    pub retry_count: i32,
    pub created_by: UserId,
    /// Written once per job when it fails terminally.
    pub terminal_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl MediaBatch {
    pub fn asset_mut(&mut self, raw_object_key: &str) -> Option<&mut MediaAsset> {
        self.assets
            .iter_mut()
            .find(|a| a.raw_object_key == raw_object_key)
    }
}

// =============================================================================
// SQL Queries - ALL queries must be in models/
// =============================================================================

impl MediaBatch {
    pub async fn find_open_for_identity(
        identity_id: ListingIdentityId,
        conn: &mut PgConnection,
    ) -> Result<Option<Self>> {
        let batch = sqlx::query_as::<_, Self>(
            r#"
            SELECT * FROM media_batches
            WHERE listing_identity_id = $1
              AND status IN ('PENDING_UPLOAD', 'RECEIVED', 'PROCESSING')
            ORDER BY created_at DESC
            LIMIT 1
            "#,
        )
        .bind(identity_id)
        .fetch_optional(conn)
        .await?;
        Ok(batch)
    }

    pub async fn find_for_update(id: MediaBatchId, conn: &mut PgConnection) -> Result<Option<Self>> {
        let batch =
            sqlx::query_as::<_, Self>("SELECT * FROM media_batches WHERE id = $1 FOR UPDATE")
                .bind(id)
                .fetch_optional(conn)
                .await?;
        Ok(batch)
    }

    pub async fn find_by_job_for_update(
        job_id: ProcessingJobId,
        conn: &mut PgConnection,
    ) -> Result<Option<Self>> {
        let batch = sqlx::query_as::<_, Self>(
            "SELECT * FROM media_batches WHERE job_id = $1 FOR UPDATE",
        )
        .bind(job_id)
        .fetch_optional(conn)
        .await?;
        Ok(batch)
    }

    pub async fn find_latest_ready(
        identity_id: ListingIdentityId,
        conn: &mut PgConnection,
    ) -> Result<Option<Self>> {
        let batch = sqlx::query_as::<_, Self>(
            r#"
            SELECT * FROM media_batches
            WHERE listing_identity_id = $1 AND status = 'READY'
            ORDER BY updated_at DESC
            LIMIT 1
            "#,
        )
        .bind(identity_id)
        .fetch_optional(conn)
        .await?;
        Ok(batch)
    }

    pub async fn next_job_id(conn: &mut PgConnection) -> Result<ProcessingJobId> {
        let id: i64 = sqlx::query_scalar("SELECT nextval('media_processing_job_seq')")
            .fetch_one(conn)
            .await?;
        Ok(ProcessingJobId::new(id))
    }

    pub async fn insert(&self, conn: &mut PgConnection) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO media_batches
                (id, listing_identity_id, status, assets, job_id, retry_count, created_by,
                 terminal_reason, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            "#,
        )
        .bind(self.id)
        .bind(self.listing_identity_id)
        .bind(self.status)
        .bind(Json(&self.assets))
        .bind(self.job_id)
        .bind(self.retry_count)
        .bind(self.created_by)
        .bind(&self.terminal_reason)
        .bind(self.created_at)
        .bind(self.updated_at)
        .execute(conn)
        .await?;
        Ok(())
    }

    pub async fn update(&self, conn: &mut PgConnection) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE media_batches
            SET status = $2, assets = $3, job_id = $4, retry_count = $5,
                terminal_reason = $6, updated_at = $7
            WHERE id = $1
            "#,
        )
        .bind(self.id)
        .bind(self.status)
        .bind(Json(&self.assets))
        .bind(self.job_id)
        .bind(self.retry_count)
        .bind(&self.terminal_reason)
        .bind(self.updated_at)
        .execute(conn)
        .await?;
        Ok(())
    }
}
