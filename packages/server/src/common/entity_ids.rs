//! Typed ID definitions for all domain entities.
//!
//! ```rust
//! use toq_core::common::{ListingIdentityId, SlotId};
//!
//! let identity: ListingIdentityId = ListingIdentityId::new(1024);
//! let slot: SlotId = SlotId::new(2002);
//! // let wrong: SlotId = identity; // compile error
//! # let _ = (identity, slot);
//! ```

pub use super::id::{Id, SeqId, V4, V7};

// ============================================================================
// Entity marker types
// ============================================================================

mod markers {
    pub struct User;
    pub struct ListingIdentity;
    pub struct ListingVersion;
    pub struct Feature;
    pub struct PhotographerSlot;
    pub struct PhotoSession;
    pub struct MediaBatch;
    pub struct ProcessingJob;
}

// ============================================================================
// Type aliases - the primary API
// ============================================================================

/// Typed ID for users (owners, realtors, photographers, admins).
pub type UserId = SeqId<markers::User>;

/// Typed ID for the long-lived listing handle.
pub type ListingIdentityId = SeqId<markers::ListingIdentity>;

/// Typed ID for a listing version row.
pub type ListingVersionId = SeqId<markers::ListingVersion>;

/// Typed ID for catalog features (suites, pool, ...).
pub type FeatureId = SeqId<markers::Feature>;

/// Typed ID for photographer agenda slots.
pub type SlotId = SeqId<markers::PhotographerSlot>;

/// Typed ID for photo sessions.
pub type PhotoSessionId = SeqId<markers::PhotoSession>;

/// Typed ID for media upload batches.
pub type MediaBatchId = Id<markers::MediaBatch>;

/// Typed ID for media processing jobs.
pub type ProcessingJobId = SeqId<markers::ProcessingJob>;
