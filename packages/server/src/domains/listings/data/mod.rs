pub mod inputs;
pub mod outputs;
pub mod query;

pub use inputs::{StartListingInput, UpdateListingInput};
pub use outputs::*;
pub use query::{ListListingsInput, ListingSearch, ListingSortField, SortOrder, Visibility};
