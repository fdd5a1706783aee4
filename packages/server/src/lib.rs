// toq - Listing Lifecycle Engine
//
// Versioned property listings driven through a table-based status machine by
// owner actions, photographer scheduling, asynchronous media processing
// callbacks and admin review.
//
// Domains live in domains/*; infrastructure (store, queue, storage,
// notifications) sits behind the traits in kernel/.

pub mod common;
pub mod config;
pub mod domains;
pub mod kernel;
pub mod server;

pub use config::*;
