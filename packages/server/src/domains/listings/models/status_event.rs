use anyhow::Result;
use sqlx::PgConnection;

use crate::domains::listings::events::ListingStatusChanged;

// =============================================================================
// SQL Queries - ALL queries must be in models/
// =============================================================================

/// Appends to the status outbox.
pub async fn insert_status_event(event: &ListingStatusChanged, conn: &mut PgConnection) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO listing_status_events
            (identity_id, version_id, old_status, new_status, reason, actor_id, occurred_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7)
        "#,
    )
    .bind(event.identity_id)
    .bind(event.version_id)
    .bind(event.old_status)
    .bind(event.new_status)
    .bind(&event.reason)
    .bind(event.actor_id)
    .bind(event.occurred_at)
    .execute(conn)
    .await?;
    Ok(())
}
