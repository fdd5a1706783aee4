use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::{FromRow, PgConnection};

use crate::common::pagination::ValidatedPage;
use crate::common::{ListingIdentityId, UserId};

/// A user's bookmark on a listing; unique per (user, listing).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Favorite {
    pub user_id: UserId,
    pub listing_identity_id: ListingIdentityId,
    pub created_at: DateTime<Utc>,
}

// =============================================================================
// SQL Queries - ALL queries must be in models/
// =============================================================================

impl Favorite {
    /// Returns false when the pair already existed.
    pub async fn insert_if_absent(&self, conn: &mut PgConnection) -> Result<bool> {
        let result = sqlx::query(
            r#"
            INSERT INTO favorites (user_id, listing_identity_id, created_at)
            VALUES ($1, $2, $3)
            ON CONFLICT (user_id, listing_identity_id) DO NOTHING
            "#,
        )
        .bind(self.user_id)
        .bind(self.listing_identity_id)
        .bind(self.created_at)
        .execute(conn)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    /// Returns false when there was nothing to delete.
    pub async fn delete(
        user_id: UserId,
        identity_id: ListingIdentityId,
        conn: &mut PgConnection,
    ) -> Result<bool> {
        let result =
            sqlx::query("DELETE FROM favorites WHERE user_id = $1 AND listing_identity_id = $2")
                .bind(user_id)
                .bind(identity_id)
                .execute(conn)
                .await?;
        Ok(result.rows_affected() == 1)
    }

    /// A page of the user's favorites, newest first.
    pub async fn find_page_for_user(
        user_id: UserId,
        page: &ValidatedPage,
        conn: &mut PgConnection,
    ) -> Result<(Vec<Self>, i64)> {
        let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM favorites WHERE user_id = $1")
            .bind(user_id)
            .fetch_one(&mut *conn)
            .await?;
        let favorites = sqlx::query_as::<_, Self>(
            r#"
            SELECT user_id, listing_identity_id, created_at
            FROM favorites
            WHERE user_id = $1
            ORDER BY created_at DESC, listing_identity_id DESC
            LIMIT $2 OFFSET $3
            "#,
        )
        .bind(user_id)
        .bind(page.limit())
        .bind(page.offset())
        .fetch_all(conn)
        .await?;
        Ok((favorites, total))
    }
}
