//! Photo session coordination.
//!
//! Slot search, the reserve → confirm → done path, cancellation, and the
//! sweep that returns lapsed holds to the pool. Every command drives the
//! listing's status machine through the same unit of work as the slot and
//! session rows it touches.

mod reservations;
mod sessions;
mod slots;
mod sweep;

pub use reservations::{cancel_reservation, confirm_reservation, reserve_slot};
pub use sessions::mark_session_done;
pub use slots::list_slots;
pub use sweep::release_expired_reservations;
