use chrono::{DateTime, Duration, NaiveDate, NaiveTime, TimeZone, Timelike, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::str::FromStr;

use crate::common::error::CoreError;
use crate::common::pagination::ValidatedPage;
use crate::common::{ListingIdentityId, PhotoSessionId, SlotId, UserId};
use crate::domains::listings::models::ListingStatus;
use crate::domains::photo_sessions::models::{
    PhotoSession, PhotoSessionStatus, PhotographerSlot, SlotStatus,
};

/// Timezone assumed when the caller does not send one.
pub const DEFAULT_TIMEZONE: &str = "America/Sao_Paulo";

// =============================================================================
// Inputs
// =============================================================================

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListSlotsInput {
    pub listing_identity_id: ListingIdentityId,
    /// First local day of the range.
    pub from: NaiveDate,
    /// Last local day of the range, inclusive.
    pub to: NaiveDate,
    #[serde(default)]
    pub period: Option<DayPeriod>,
    #[serde(default)]
    pub page: Option<i64>,
    #[serde(default)]
    pub size: Option<i64>,
    #[serde(default)]
    pub sort: Option<SlotSort>,
    #[serde(default)]
    pub timezone: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DayPeriod {
    Morning,
    Afternoon,
    Evening,
}

impl DayPeriod {
    /// Local hour range `[start, end)`.
    pub fn hours(&self) -> (u32, u32) {
        match self {
            DayPeriod::Morning => (0, 12),
            DayPeriod::Afternoon => (12, 18),
            DayPeriod::Evening => (18, 24),
        }
    }

    pub fn contains_hour(&self, hour: u32) -> bool {
        let (start, end) = self.hours();
        hour >= start && hour < end
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SlotSort {
    #[default]
    StartAsc,
    StartDesc,
    PhotographerAsc,
    PhotographerDesc,
    DateAsc,
    DateDesc,
}

impl FromStr for SlotSort {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "start_asc" => Ok(SlotSort::StartAsc),
            "start_desc" => Ok(SlotSort::StartDesc),
            "photographer_asc" => Ok(SlotSort::PhotographerAsc),
            "photographer_desc" => Ok(SlotSort::PhotographerDesc),
            "date_asc" => Ok(SlotSort::DateAsc),
            "date_desc" => Ok(SlotSort::DateDesc),
            other => Err(CoreError::invalid("sort", format!("unknown sort key {}", other))),
        }
    }
}

impl SlotSort {
    /// In-memory equivalent of the SQL ORDER BY; always ends on `(slot_start, id)`.
    pub fn compare(&self, a: &PhotographerSlot, b: &PhotographerSlot, tz: Tz) -> Ordering {
        let start_id = |x: &PhotographerSlot, y: &PhotographerSlot| {
            x.slot_start.cmp(&y.slot_start).then(x.id.cmp(&y.id))
        };
        let local_date = |s: &PhotographerSlot| s.slot_start.with_timezone(&tz).date_naive();
        match self {
            SlotSort::StartAsc => start_id(a, b),
            SlotSort::StartDesc => start_id(b, a),
            SlotSort::PhotographerAsc => a
                .photographer_user_id
                .cmp(&b.photographer_user_id)
                .then_with(|| start_id(a, b)),
            SlotSort::PhotographerDesc => b
                .photographer_user_id
                .cmp(&a.photographer_user_id)
                .then_with(|| start_id(a, b)),
            SlotSort::DateAsc => local_date(a).cmp(&local_date(b)).then_with(|| start_id(a, b)),
            SlotSort::DateDesc => local_date(b).cmp(&local_date(a)).then_with(|| start_id(a, b)),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReserveSlotInput {
    pub listing_identity_id: ListingIdentityId,
    pub slot_id: SlotId,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfirmReservationInput {
    pub listing_identity_id: ListingIdentityId,
    pub photo_session_id: PhotoSessionId,
}

// =============================================================================
// Resolved search
// =============================================================================

/// Slot search with the range materialized to UTC.
#[derive(Debug, Clone)]
pub struct SlotSearch {
    pub city: String,
    pub state: String,
    pub from: DateTime<Utc>,
    pub to: DateTime<Utc>,
    pub now: DateTime<Utc>,
    pub period: Option<DayPeriod>,
    pub timezone: Tz,
    pub sort: SlotSort,
    pub page: ValidatedPage,
}

impl SlotSearch {
    /// Everything except the service-area check.
    pub fn matches(&self, slot: &PhotographerSlot) -> bool {
        let bookable = slot.is_reservable(self.now);
        let in_range =
            slot.slot_start > self.now && slot.slot_start >= self.from && slot.slot_start < self.to;
        let in_period = self.period.map_or(true, |p| {
            p.contains_hour(slot.slot_start.with_timezone(&self.timezone).hour())
        });
        bookable && in_range && in_period
    }
}

pub fn parse_timezone(name: Option<&str>) -> Result<Tz, CoreError> {
    let name = name.unwrap_or(DEFAULT_TIMEZONE);
    name.parse::<Tz>()
        .map_err(|_| CoreError::invalid("timezone", format!("unknown IANA timezone {}", name)))
}

/// First instant of a local day, in UTC.
///
/// Days whose midnight falls in a DST gap start at the first valid hour.
pub fn local_day_start(tz: Tz, date: NaiveDate) -> Result<DateTime<Utc>, CoreError> {
    for hour in 0..3 {
        let time = NaiveTime::from_hms_opt(hour, 0, 0)
            .ok_or_else(|| CoreError::invalid("from", "invalid time"))?;
        if let Some(local) = tz.from_local_datetime(&date.and_time(time)).earliest() {
            return Ok(local.with_timezone(&Utc));
        }
    }
    Err(CoreError::invalid(
        "from",
        format!("{} has no valid local start in {}", date, tz.name()),
    ))
}

/// `[from, to]` local days to a half-open UTC range.
pub fn materialize_range(
    tz: Tz,
    from: NaiveDate,
    to: NaiveDate,
) -> Result<(DateTime<Utc>, DateTime<Utc>), CoreError> {
    if to < from {
        return Err(CoreError::invalid("to", "must not be before from"));
    }
    let end_day = to
        .checked_add_signed(Duration::days(1))
        .ok_or_else(|| CoreError::invalid("to", "out of range"))?;
    Ok((local_day_start(tz, from)?, local_day_start(tz, end_day)?))
}

// =============================================================================
// Outputs
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SlotView {
    pub slot_id: SlotId,
    pub photographer_user_id: UserId,
    pub slot_start: DateTime<Utc>,
    pub slot_end: DateTime<Utc>,
    /// Start rendered in the requested timezone.
    pub local_start: String,
    pub local_end: String,
}

impl SlotView {
    pub fn new(slot: &PhotographerSlot, tz: Tz) -> Self {
        Self {
            slot_id: slot.id,
            photographer_user_id: slot.photographer_user_id,
            slot_start: slot.slot_start,
            slot_end: slot.slot_end,
            local_start: slot.slot_start.with_timezone(&tz).to_rfc3339(),
            local_end: slot.slot_end.with_timezone(&tz).to_rfc3339(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReservationView {
    pub photo_session_id: PhotoSessionId,
    pub slot_id: SlotId,
    pub reserved_until: DateTime<Utc>,
    pub listing_status: ListingStatus,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionView {
    pub photo_session_id: PhotoSessionId,
    pub slot_id: SlotId,
    pub status: PhotoSessionStatus,
    pub scheduled_start: DateTime<Utc>,
    pub scheduled_end: DateTime<Utc>,
    pub photographer_user_id: UserId,
    pub listing_status: Option<ListingStatus>,
}

impl SessionView {
    pub fn new(session: &PhotoSession, listing_status: Option<ListingStatus>) -> Self {
        Self {
            photo_session_id: session.id,
            slot_id: session.slot_id,
            status: session.status,
            scheduled_start: session.scheduled_start,
            scheduled_end: session.scheduled_end,
            photographer_user_id: session.photographer_user_id,
            listing_status,
        }
    }
}

/// Result of the reservation hygiene sweep.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SweepReport {
    pub released_slots: usize,
    pub cancelled_sessions: usize,
    pub listings_rescheduled: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sao_paulo_range_materializes_to_utc() {
        let tz = parse_timezone(Some("America/Sao_Paulo")).unwrap();
        let from = NaiveDate::from_ymd_opt(2024, 5, 10).unwrap();
        let (start, end) = materialize_range(tz, from, from).unwrap();
        assert_eq!(start.to_rfc3339(), "2024-05-10T03:00:00+00:00");
        assert_eq!(end.to_rfc3339(), "2024-05-11T03:00:00+00:00");
    }

    #[test]
    fn test_dst_gap_midnight_moves_to_first_valid_hour() {
        // Brazil started DST at local midnight on 2018-11-04.
        let tz = parse_timezone(Some("America/Sao_Paulo")).unwrap();
        let day = NaiveDate::from_ymd_opt(2018, 11, 4).unwrap();
        let start = local_day_start(tz, day).unwrap();
        assert_eq!(start.to_rfc3339(), "2018-11-04T03:00:00+00:00");
    }

    #[test]
    fn test_inverted_range_rejected() {
        let tz = parse_timezone(None).unwrap();
        let a = NaiveDate::from_ymd_opt(2024, 5, 10).unwrap();
        let b = NaiveDate::from_ymd_opt(2024, 5, 9).unwrap();
        assert!(materialize_range(tz, a, b).is_err());
    }

    #[test]
    fn test_unknown_timezone_rejected() {
        assert!(parse_timezone(Some("Mars/Olympus")).is_err());
    }

    #[test]
    fn test_sort_keys_parse() {
        assert_eq!("date_desc".parse::<SlotSort>().unwrap(), SlotSort::DateDesc);
        assert!("price_asc".parse::<SlotSort>().is_err());
        let parsed: SlotSort = serde_json::from_str("\"photographer_asc\"").unwrap();
        assert_eq!(parsed, SlotSort::PhotographerAsc);
    }

    #[test]
    fn test_search_treats_holds_like_reservation() {
        let now = Utc.with_ymd_and_hms(2025, 6, 2, 12, 0, 0).unwrap();
        let search = SlotSearch {
            city: "São Paulo".into(),
            state: "SP".into(),
            from: now,
            to: now + Duration::days(7),
            now,
            period: None,
            timezone: parse_timezone(None).unwrap(),
            sort: SlotSort::default(),
            page: ValidatedPage { page: 1, size: 20 },
        };
        let slot = |reserved_until: Option<DateTime<Utc>>| PhotographerSlot {
            id: SlotId::new(1),
            photographer_user_id: UserId::new(9),
            slot_start: now + Duration::hours(48),
            slot_end: now + Duration::hours(49),
            status: SlotStatus::Reserved,
            reserved_until,
            reservation_holder_user_id: Some(UserId::new(55)),
            photo_session_id: Some(PhotoSessionId::new(3)),
        };

        for until in [None, Some(now - Duration::minutes(1)), Some(now + Duration::minutes(5))] {
            let s = slot(until);
            assert_eq!(search.matches(&s), s.is_reservable(now), "reserved_until {:?}", until);
        }
        assert!(search.matches(&slot(None)));
        assert!(!search.matches(&slot(Some(now + Duration::minutes(5)))));
    }

    #[test]
    fn test_period_hours() {
        assert!(DayPeriod::Morning.contains_hour(9));
        assert!(!DayPeriod::Morning.contains_hour(12));
        assert!(DayPeriod::Evening.contains_hour(23));
    }
}
