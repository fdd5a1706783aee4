//! Listing actions - entry-point business logic
//!
//! Actions are self-contained: they take typed input and the request
//! context, check the actor, run one transaction through a `UnitOfWork`,
//! and dispatch post-commit side effects before returning.

mod editing;
mod queries;
mod review;
mod status;
pub(crate) mod support;

pub use editing::{create_draft, discard_draft, end_update, start_listing, update_draft};
pub use queries::{get_listing_detail, list_listings, list_versions, load_active, record_view};
pub use review::{
    admin_approve, admin_reject, approve_media, confirm_availability, reject_media, reshoot,
};
pub use status::{apply_proposal_event, change_status, close_listing, expire_listing};
