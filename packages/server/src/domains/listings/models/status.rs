use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Lifecycle status of a listing version.
/// Declaration order matches the Postgres enum order used for sorting.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, sqlx::Type,
)]
#[sqlx(type_name = "listing_status", rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ListingStatus {
    Draft,
    PendingAvailability,
    PendingPhotoScheduling,
    PendingPhotoConfirmation,
    PhotosScheduled,
    PendingPhotoProcessing,
    /// Off-plan listings load project documents instead of booking a shoot.
    PendingPlanLoading,
    PendingOwnerApproval,
    RejectedByOwner,
    PendingAdminReview,
    NeedsRevision,
    Published,
    UnderOffer,
    UnderNegotiation,
    Suspended,
    Expired,
    Closed,
    Archived,
}

impl ListingStatus {
    pub const ALL: [ListingStatus; 18] = [
        ListingStatus::Draft,
        ListingStatus::PendingAvailability,
        ListingStatus::PendingPhotoScheduling,
        ListingStatus::PendingPhotoConfirmation,
        ListingStatus::PhotosScheduled,
        ListingStatus::PendingPhotoProcessing,
        ListingStatus::PendingPlanLoading,
        ListingStatus::PendingOwnerApproval,
        ListingStatus::RejectedByOwner,
        ListingStatus::PendingAdminReview,
        ListingStatus::NeedsRevision,
        ListingStatus::Published,
        ListingStatus::UnderOffer,
        ListingStatus::UnderNegotiation,
        ListingStatus::Suspended,
        ListingStatus::Expired,
        ListingStatus::Closed,
        ListingStatus::Archived,
    ];

    /// Statuses visible to non-owner, non-admin queries.
    pub const PUBLIC: [ListingStatus; 3] = [
        ListingStatus::Published,
        ListingStatus::UnderOffer,
        ListingStatus::UnderNegotiation,
    ];

    /// Statuses in which the version may be edited in place.
    pub const EDITABLE: [ListingStatus; 3] = [
        ListingStatus::Draft,
        ListingStatus::NeedsRevision,
        ListingStatus::RejectedByOwner,
    ];

    /// Statuses in which in-place updates are rejected outright.
    pub const EDITING_BLOCKED: [ListingStatus; 6] = [
        ListingStatus::Published,
        ListingStatus::UnderOffer,
        ListingStatus::UnderNegotiation,
        ListingStatus::Closed,
        ListingStatus::Expired,
        ListingStatus::Archived,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ListingStatus::Draft => "DRAFT",
            ListingStatus::PendingAvailability => "PENDING_AVAILABILITY",
            ListingStatus::PendingPhotoScheduling => "PENDING_PHOTO_SCHEDULING",
            ListingStatus::PendingPhotoConfirmation => "PENDING_PHOTO_CONFIRMATION",
            ListingStatus::PhotosScheduled => "PHOTOS_SCHEDULED",
            ListingStatus::PendingPhotoProcessing => "PENDING_PHOTO_PROCESSING",
            ListingStatus::PendingPlanLoading => "PENDING_PLAN_LOADING",
            ListingStatus::PendingOwnerApproval => "PENDING_OWNER_APPROVAL",
            ListingStatus::RejectedByOwner => "REJECTED_BY_OWNER",
            ListingStatus::PendingAdminReview => "PENDING_ADMIN_REVIEW",
            ListingStatus::NeedsRevision => "NEEDS_REVISION",
            ListingStatus::Published => "PUBLISHED",
            ListingStatus::UnderOffer => "UNDER_OFFER",
            ListingStatus::UnderNegotiation => "UNDER_NEGOTIATION",
            ListingStatus::Suspended => "SUSPENDED",
            ListingStatus::Expired => "EXPIRED",
            ListingStatus::Closed => "CLOSED",
            ListingStatus::Archived => "ARCHIVED",
        }
    }

    pub fn is_public(&self) -> bool {
        Self::PUBLIC.contains(self)
    }

    pub fn is_editable(&self) -> bool {
        Self::EDITABLE.contains(self)
    }

    pub fn is_editing_blocked(&self) -> bool {
        Self::EDITING_BLOCKED.contains(self)
    }

    /// Closed and archived listings no longer count for address uniqueness.
    pub fn is_retired(&self) -> bool {
        matches!(self, ListingStatus::Closed | ListingStatus::Archived)
    }
}

impl std::fmt::Display for ListingStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ListingStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ListingStatus::ALL
            .iter()
            .copied()
            .find(|status| status.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| anyhow::anyhow!("Invalid listing status: {}", s))
    }
}
