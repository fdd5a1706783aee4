use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgConnection};

use crate::common::{ListingIdentityId, PhotoSessionId, SlotId, UserId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "photo_session_status", rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PhotoSessionStatus {
    /// Candidate created by a reservation, not yet confirmed.
    Pending,
    Active,
    Cancelled,
    Done,
    NoShow,
}

impl PhotoSessionStatus {
    /// Pending or active: the listing still points at this session.
    pub fn is_live(&self) -> bool {
        matches!(self, PhotoSessionStatus::Pending | PhotoSessionStatus::Active)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct PhotoSession {
    pub id: PhotoSessionId,
    pub listing_identity_id: ListingIdentityId,
    pub slot_id: SlotId,
    pub scheduled_start: DateTime<Utc>,
    pub scheduled_end: DateTime<Utc>,
    pub status: PhotoSessionStatus,
    pub owner_user_id: UserId,
    pub photographer_user_id: UserId,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

// =============================================================================
// SQL Queries - ALL queries must be in models/
// =============================================================================

impl PhotoSession {
    pub async fn find_by_id(id: PhotoSessionId, conn: &mut PgConnection) -> Result<Option<Self>> {
        let session = sqlx::query_as::<_, Self>("SELECT * FROM photo_sessions WHERE id = $1")
            .bind(id)
            .fetch_optional(conn)
            .await?;
        Ok(session)
    }

    pub async fn find_for_update(id: PhotoSessionId, conn: &mut PgConnection) -> Result<Option<Self>> {
        let session = sqlx::query_as::<_, Self>(
            "SELECT * FROM photo_sessions WHERE id = $1 FOR UPDATE",
        )
        .bind(id)
        .fetch_optional(conn)
        .await?;
        Ok(session)
    }

    pub async fn insert(&self, conn: &mut PgConnection) -> Result<Self> {
        let session = sqlx::query_as::<_, Self>(
            r#"
            INSERT INTO photo_sessions
                (listing_identity_id, slot_id, scheduled_start, scheduled_end, status,
                 owner_user_id, photographer_user_id, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            RETURNING *
            "#,
        )
        .bind(self.listing_identity_id)
        .bind(self.slot_id)
        .bind(self.scheduled_start)
        .bind(self.scheduled_end)
        .bind(self.status)
        .bind(self.owner_user_id)
        .bind(self.photographer_user_id)
        .bind(self.created_at)
        .bind(self.updated_at)
        .fetch_one(conn)
        .await?;
        Ok(session)
    }

    pub async fn update_status(&self, conn: &mut PgConnection) -> Result<()> {
        sqlx::query("UPDATE photo_sessions SET status = $2, updated_at = $3 WHERE id = $1")
            .bind(self.id)
            .bind(self.status)
            .bind(self.updated_at)
            .execute(conn)
            .await?;
        Ok(())
    }
}
