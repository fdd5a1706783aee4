// HTTP server setup (thin Axum adapter over the engine)
pub mod app;
pub mod error;
pub mod routes;

pub use app::*;
