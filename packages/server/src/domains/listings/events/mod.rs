//! Listing domain events.
//!
//! Events are immutable facts. A `ListingStatusChanged` is written to the
//! `listing_status_events` outbox inside the command transaction and
//! published after commit.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::common::{ListingIdentityId, ListingVersionId, UserId};
use crate::domains::listings::models::ListingStatus;
use crate::kernel::Notification;

/// Subject the status stream is published on.
pub const STATUS_CHANGED_SUBJECT: &str = "listings.status_changed";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListingStatusChanged {
    pub identity_id: ListingIdentityId,
    pub version_id: ListingVersionId,
    pub owner_user_id: UserId,
    pub old_status: ListingStatus,
    pub new_status: ListingStatus,
    pub reason: Option<String>,
    pub actor_id: UserId,
    pub occurred_at: DateTime<Utc>,
}

impl ListingStatusChanged {
    /// Owner notifications fanned out for this change.
    pub fn notifications(&self) -> Vec<Notification> {
        let template = match self.new_status {
            ListingStatus::PendingOwnerApproval => "listing.media_ready",
            ListingStatus::NeedsRevision => "listing.needs_revision",
            ListingStatus::Published if self.old_status == ListingStatus::PendingAdminReview => {
                "listing.published"
            }
            ListingStatus::Suspended => "listing.suspended",
            ListingStatus::Expired => "listing.expired",
            _ => return Vec::new(),
        };

        // Owners are not notified about their own actions.
        if self.actor_id == self.owner_user_id {
            return Vec::new();
        }

        vec![Notification::new(
            self.owner_user_id,
            template,
            json!({
                "identityId": self.identity_id,
                "versionId": self.version_id,
                "status": self.new_status,
                "reason": self.reason,
            }),
        )]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(old: ListingStatus, new: ListingStatus, actor: i64) -> ListingStatusChanged {
        ListingStatusChanged {
            identity_id: ListingIdentityId::new(1024),
            version_id: ListingVersionId::new(1),
            owner_user_id: UserId::new(55),
            old_status: old,
            new_status: new,
            reason: None,
            actor_id: UserId::new(actor),
            occurred_at: Utc::now(),
        }
    }

    #[test]
    fn test_media_ready_notifies_owner() {
        let notes = event(
            ListingStatus::PendingPhotoProcessing,
            ListingStatus::PendingOwnerApproval,
            0,
        )
        .notifications();
        assert_eq!(notes.len(), 1);
        assert_eq!(notes[0].template, "listing.media_ready");
        assert_eq!(notes[0].user_id, UserId::new(55));
    }

    #[test]
    fn test_owner_actions_are_silent() {
        let notes = event(ListingStatus::Published, ListingStatus::Suspended, 55).notifications();
        assert!(notes.is_empty());
    }

    #[test]
    fn test_unsuspend_is_not_a_publication() {
        let notes = event(ListingStatus::Suspended, ListingStatus::Published, 1).notifications();
        assert!(notes.is_empty());
    }
}
