pub mod actions;
pub mod data;
pub mod events;
pub mod machines;
pub mod models;

pub use events::{ListingStatusChanged, STATUS_CHANGED_SUBJECT};
pub use machines::{ListingAction, StatusMachine};
pub use models::{ListingIdentity, ListingStatus, ListingVersion, PropertyType};
