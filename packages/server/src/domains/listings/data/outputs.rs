use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::common::{ListingIdentityId, ListingVersionId, UserId};
use crate::domains::listings::models::{ListingIdentity, ListingRow, ListingStatus, ListingVersion};
use crate::domains::photo_sessions::data::SessionView;

/// Result of starting a listing.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StartedListing {
    pub identity_id: ListingIdentityId,
    pub uuid: Uuid,
    pub code: String,
    pub version: ListingVersion,
}

/// Echo of a status command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusChange {
    pub identity_id: ListingIdentityId,
    pub version_id: ListingVersionId,
    pub previous_status: ListingStatus,
    pub new_status: ListingStatus,
    pub active_version_id: Option<ListingVersionId>,
}

/// Owner-driven status toggle on the active version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StatusCommand {
    Publish,
    Suspend,
}

/// Events the proposal/offer subsystem reports against a published listing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ProposalEvent {
    OfferReceived,
    OfferWithdrawn,
    NegotiationStarted,
    NegotiationCancelled,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VersionSummary {
    pub version_id: ListingVersionId,
    pub version: i32,
    pub status: ListingStatus,
    pub is_active: bool,
    pub deleted: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl VersionSummary {
    pub fn new(version: &ListingVersion, identity: &ListingIdentity) -> Self {
        Self {
            version_id: version.id,
            version: version.version,
            status: version.status,
            is_active: identity.active_version_id == Some(version.id),
            deleted: version.deleted,
            created_at: version.created_at,
            updated_at: version.updated_at,
        }
    }
}

/// Owner's view of one listing.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ListingDetail {
    pub identity_id: ListingIdentityId,
    pub uuid: Uuid,
    pub code: String,
    pub user_id: UserId,
    pub favorites_count: i64,
    pub views_count: i64,
    pub active_version: ListingVersion,
    pub draft_version_id: Option<ListingVersionId>,
    pub photo_session: Option<SessionView>,
}

/// One row of a listing query: a version plus its identity's counters.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ListingCard {
    pub identity_id: ListingIdentityId,
    pub code: String,
    pub user_id: UserId,
    pub is_active: bool,
    pub favorites_count: i64,
    pub views_count: i64,
    pub version: ListingVersion,
}

impl From<ListingRow> for ListingCard {
    fn from(row: ListingRow) -> Self {
        let is_active = row.is_active();
        Self {
            identity_id: row.identity.id,
            code: row.identity.code,
            user_id: row.identity.owner_user_id,
            is_active,
            favorites_count: row.identity.favorites_count,
            views_count: row.identity.views_count,
            version: row.version,
        }
    }
}
