// Business domains
pub mod favorites;
pub mod listings;
pub mod media;
pub mod photo_sessions;
