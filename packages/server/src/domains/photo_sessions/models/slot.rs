use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgConnection, Postgres, QueryBuilder};

use crate::common::{PhotoSessionId, SlotId, UserId};
use crate::domains::photo_sessions::data::{SlotSearch, SlotSort};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "slot_status", rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SlotStatus {
    Available,
    Reserved,
    Booked,
    Blocked,
    Past,
}

/// A photographer's bookable window. Times are UTC.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct PhotographerSlot {
    pub id: SlotId,
    pub photographer_user_id: UserId,
    pub slot_start: DateTime<Utc>,
    pub slot_end: DateTime<Utc>,
    pub status: SlotStatus,
    pub reserved_until: Option<DateTime<Utc>>,
    pub reservation_holder_user_id: Option<UserId>,
    pub photo_session_id: Option<PhotoSessionId>,
}

impl PhotographerSlot {
    /// RESERVED whose hold window has lapsed.
    pub fn reservation_expired(&self, now: DateTime<Utc>) -> bool {
        self.status == SlotStatus::Reserved && self.reserved_until.map_or(true, |until| until <= now)
    }

    pub fn is_reservable(&self, now: DateTime<Utc>) -> bool {
        self.status == SlotStatus::Available || self.reservation_expired(now)
    }

    pub fn hold(&mut self, holder: UserId, session: PhotoSessionId, until: DateTime<Utc>) {
        self.status = SlotStatus::Reserved;
        self.reserved_until = Some(until);
        self.reservation_holder_user_id = Some(holder);
        self.photo_session_id = Some(session);
    }

    pub fn release(&mut self) {
        self.status = SlotStatus::Available;
        self.reserved_until = None;
        self.reservation_holder_user_id = None;
        self.photo_session_id = None;
    }

    pub fn book(&mut self) {
        self.status = SlotStatus::Booked;
        self.reserved_until = None;
    }
}

/// City/state pair a photographer covers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct ServiceArea {
    pub photographer_user_id: UserId,
    pub city: String,
    pub state: String,
}

impl ServiceArea {
    pub fn covers(&self, city: &str, state: &str) -> bool {
        self.city.trim().eq_ignore_ascii_case(city.trim())
            && self.state.trim().eq_ignore_ascii_case(state.trim())
    }
}

// =============================================================================
// SQL Queries - ALL queries must be in models/
// =============================================================================

impl PhotographerSlot {
    pub async fn find_for_update(id: SlotId, conn: &mut PgConnection) -> Result<Option<Self>> {
        let slot = sqlx::query_as::<_, Self>(
            "SELECT * FROM photographer_slots WHERE id = $1 FOR UPDATE",
        )
        .bind(id)
        .fetch_optional(conn)
        .await?;
        Ok(slot)
    }

    /// Lapsed reservations, skipping rows another transaction holds.
    pub async fn find_expired_reservations(
        now: DateTime<Utc>,
        conn: &mut PgConnection,
    ) -> Result<Vec<Self>> {
        let slots = sqlx::query_as::<_, Self>(
            r#"
            SELECT * FROM photographer_slots
            WHERE status = 'RESERVED' AND (reserved_until IS NULL OR reserved_until <= $1)
            ORDER BY id
            FOR UPDATE SKIP LOCKED
            "#,
        )
        .bind(now)
        .fetch_all(conn)
        .await?;
        Ok(slots)
    }

    pub async fn update(&self, conn: &mut PgConnection) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE photographer_slots
            SET status = $2, reserved_until = $3, reservation_holder_user_id = $4, photo_session_id = $5
            WHERE id = $1
            "#,
        )
        .bind(self.id)
        .bind(self.status)
        .bind(self.reserved_until)
        .bind(self.reservation_holder_user_id)
        .bind(self.photo_session_id)
        .execute(conn)
        .await?;
        Ok(())
    }

    /// Bookable slots of photographers covering the search's city.
    pub async fn search(search: &SlotSearch, conn: &mut PgConnection) -> Result<(Vec<Self>, i64)> {
        let mut count = QueryBuilder::<Postgres>::new("SELECT COUNT(*) ");
        push_search_filters(&mut count, search);
        let total: i64 = count
            .build_query_scalar::<i64>()
            .fetch_one(&mut *conn)
            .await?;

        let mut query = QueryBuilder::<Postgres>::new("SELECT s.* ");
        push_search_filters(&mut query, search);
        query.push(" ORDER BY ");
        let tz = search.timezone.name();
        match search.sort {
            SlotSort::StartAsc => {
                query.push("s.slot_start ASC, s.id ASC");
            }
            SlotSort::StartDesc => {
                query.push("s.slot_start DESC, s.id DESC");
            }
            SlotSort::PhotographerAsc => {
                query.push("s.photographer_user_id ASC, s.slot_start ASC, s.id ASC");
            }
            SlotSort::PhotographerDesc => {
                query.push("s.photographer_user_id DESC, s.slot_start ASC, s.id ASC");
            }
            SlotSort::DateAsc | SlotSort::DateDesc => {
                query
                    .push("(s.slot_start AT TIME ZONE ")
                    .push_bind(tz)
                    .push(")::date ")
                    .push(if search.sort == SlotSort::DateAsc { "ASC" } else { "DESC" })
                    .push(", s.slot_start ASC, s.id ASC");
            }
        }
        query
            .push(" LIMIT ")
            .push_bind(search.page.limit())
            .push(" OFFSET ")
            .push_bind(search.page.offset());

        let slots = query.build_query_as::<Self>().fetch_all(conn).await?;
        Ok((slots, total))
    }
}

fn push_search_filters(query: &mut QueryBuilder<'_, Postgres>, search: &SlotSearch) {
    query
        .push(
            "FROM photographer_slots s WHERE EXISTS (SELECT 1 FROM photographer_service_areas a \
             WHERE a.photographer_user_id = s.photographer_user_id AND lower(a.city) = lower(",
        )
        .push_bind(search.city.clone())
        .push(") AND lower(a.state) = lower(")
        .push_bind(search.state.clone())
        .push(
            ")) AND (s.status = 'AVAILABLE' OR (s.status = 'RESERVED' \
             AND (s.reserved_until IS NULL OR s.reserved_until <= ",
        )
        .push_bind(search.now)
        .push("))) AND s.slot_start > ")
        .push_bind(search.now)
        .push(" AND s.slot_start >= ")
        .push_bind(search.from)
        .push(" AND s.slot_start < ")
        .push_bind(search.to);

    if let Some(period) = search.period {
        let (start_hour, end_hour) = period.hours();
        query
            .push(" AND EXTRACT(HOUR FROM (s.slot_start AT TIME ZONE ")
            .push_bind(search.timezone.name())
            .push(")) >= ")
            .push_bind(start_hour as i32)
            .push(" AND EXTRACT(HOUR FROM (s.slot_start AT TIME ZONE ")
            .push_bind(search.timezone.name())
            .push(")) < ")
            .push_bind(end_hour as i32);
    }
}
