pub mod collections;
pub mod identity;
pub mod owner_availability;
pub mod property_type;
pub mod search;
pub mod status;
pub mod status_event;
pub mod version;

pub use collections::*;
pub use identity::{format_listing_code, ListingIdentity};
pub use owner_availability::OwnerAvailability;
pub use property_type::{
    ConditionalField, FieldGroup, PropertyType, PropertyTypeRule, PropertyTypeRules, RequiredField,
};
pub use search::ListingRow;
pub use status::ListingStatus;
pub use version::{AddressKey, ListingVersion};
