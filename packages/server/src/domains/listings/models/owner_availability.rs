use anyhow::Result;
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgConnection};

use crate::common::UserId;

/// An owner's scheduling preferences, maintained by the profile surface.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct OwnerAvailability {
    pub user_id: UserId,
    /// Owner lets the platform pick any photographer slot.
    pub automatic_scheduling: bool,
    pub rules_count: i32,
}

impl OwnerAvailability {
    pub fn is_schedulable(&self) -> bool {
        self.automatic_scheduling || self.rules_count > 0
    }

    pub async fn find_by_user(user_id: UserId, conn: &mut PgConnection) -> Result<Option<Self>> {
        let row = sqlx::query_as::<_, Self>(
            "SELECT user_id, automatic_scheduling, rules_count FROM owner_availability WHERE user_id = $1",
        )
        .bind(user_id)
        .fetch_optional(conn)
        .await?;
        Ok(row)
    }
}
