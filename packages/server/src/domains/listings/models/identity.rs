use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::{FromRow, PgConnection};
use uuid::Uuid;

use super::version::AddressKey;
use crate::common::{ListingIdentityId, ListingVersionId, UserId};

/// Long-lived handle for a property; versions hang off it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct ListingIdentity {
    pub id: ListingIdentityId,
    pub uuid: Uuid,
    pub owner_user_id: UserId,
    pub code: String,
    /// Null only between inserting the identity and its first version.
    pub active_version_id: Option<ListingVersionId>,
    pub favorites_count: i64,
    pub views_count: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ListingIdentity {
    pub fn new(owner_user_id: UserId, code: String, now: DateTime<Utc>) -> Self {
        Self {
            id: ListingIdentityId::new(0),
            uuid: Uuid::now_v7(),
            owner_user_id,
            code,
            active_version_id: None,
            favorites_count: 0,
            views_count: 0,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_owned_by(&self, user_id: UserId) -> bool {
        self.owner_user_id == user_id
    }
}

/// Short human code from the listing code sequence ("TQ000123").
pub fn format_listing_code(seq: i64) -> String {
    format!("TQ{:06}", seq)
}

// =============================================================================
// SQL Queries - ALL queries must be in models/
// =============================================================================

impl ListingIdentity {
    pub async fn find_by_id(id: ListingIdentityId, conn: &mut PgConnection) -> Result<Option<Self>> {
        let identity =
            sqlx::query_as::<_, Self>("SELECT * FROM listing_identities WHERE id = $1")
                .bind(id)
                .fetch_optional(conn)
                .await?;
        Ok(identity)
    }

    pub async fn find_by_ids(
        ids: &[ListingIdentityId],
        conn: &mut PgConnection,
    ) -> Result<Vec<Self>> {
        let identities =
            sqlx::query_as::<_, Self>("SELECT * FROM listing_identities WHERE id = ANY($1)")
                .bind(ids)
                .fetch_all(conn)
                .await?;
        Ok(identities)
    }

    /// Row-locks the identity; every state-changing command starts here.
    pub async fn find_for_update(
        id: ListingIdentityId,
        conn: &mut PgConnection,
    ) -> Result<Option<Self>> {
        let identity = sqlx::query_as::<_, Self>(
            "SELECT * FROM listing_identities WHERE id = $1 FOR UPDATE",
        )
        .bind(id)
        .fetch_optional(conn)
        .await?;
        Ok(identity)
    }

    pub async fn next_code(conn: &mut PgConnection) -> Result<i64> {
        let seq: i64 = sqlx::query_scalar("SELECT nextval('listing_code_seq')")
            .fetch_one(conn)
            .await?;
        Ok(seq)
    }

    /// Serializes starts for one owner and address until the transaction ends.
    pub async fn lock_address(
        owner: UserId,
        key: &AddressKey,
        conn: &mut PgConnection,
    ) -> Result<()> {
        sqlx::query("SELECT pg_advisory_xact_lock(hashtextextended($1, 0))")
            .bind(key.lock_text(owner))
            .execute(conn)
            .await?;
        Ok(())
    }

    /// An owner's live listing at the same address and unit, if any.
    pub async fn find_duplicate(
        owner: UserId,
        key: &AddressKey,
        conn: &mut PgConnection,
    ) -> Result<Option<ListingIdentityId>> {
        let id = sqlx::query_scalar::<_, ListingIdentityId>(
            r#"
            SELECT i.id
            FROM listing_identities i
            JOIN listing_versions v ON v.id = i.active_version_id
            WHERE i.owner_user_id = $1
              AND regexp_replace(v.zip_code, '[^0-9]', '', 'g') = $2
              AND lower(trim(v.number)) = $3
              AND lower(trim(coalesce(v.complement, ''))) = $4
              AND lower(trim(coalesce(v.unit_tower, ''))) = $5
              AND lower(trim(coalesce(v.unit_number, ''))) = $6
              AND v.status NOT IN ('CLOSED', 'ARCHIVED')
            LIMIT 1
            "#,
        )
        .bind(owner)
        .bind(&key.zip_code)
        .bind(&key.number)
        .bind(&key.complement)
        .bind(&key.unit_tower)
        .bind(&key.unit_number)
        .fetch_optional(conn)
        .await?;
        Ok(id)
    }

    pub async fn insert(&self, conn: &mut PgConnection) -> Result<Self> {
        let identity = sqlx::query_as::<_, Self>(
            r#"
            INSERT INTO listing_identities
                (uuid, owner_user_id, code, active_version_id, favorites_count, views_count, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING *
            "#,
        )
        .bind(self.uuid)
        .bind(self.owner_user_id)
        .bind(&self.code)
        .bind(self.active_version_id)
        .bind(self.favorites_count)
        .bind(self.views_count)
        .bind(self.created_at)
        .bind(self.updated_at)
        .fetch_one(conn)
        .await?;
        Ok(identity)
    }

    pub async fn update(&self, conn: &mut PgConnection) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE listing_identities
            SET active_version_id = $2, favorites_count = $3, views_count = $4, updated_at = $5
            WHERE id = $1
            "#,
        )
        .bind(self.id)
        .bind(self.active_version_id)
        .bind(self.favorites_count)
        .bind(self.views_count)
        .bind(self.updated_at)
        .execute(conn)
        .await?;
        Ok(())
    }
}
