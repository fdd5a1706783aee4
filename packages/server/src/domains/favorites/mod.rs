pub mod actions;
pub mod data;
pub mod models;

pub use models::Favorite;
