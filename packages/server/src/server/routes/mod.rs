// HTTP routes
pub mod callbacks;
pub mod health;

pub use callbacks::*;
pub use health::*;
