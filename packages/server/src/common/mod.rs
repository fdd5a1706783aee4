// Common types and utilities shared across the application

pub mod auth;
pub mod context;
pub mod entity_ids;
pub mod error;
pub mod id;
pub mod pagination;
pub mod patch;

pub use auth::{Actor, AuthError, Capability, Role};
pub use context::RequestContext;
pub use entity_ids::*;
pub use error::{AssetMismatch, CoreError, CoreResult, ErrorKind, FieldError};
pub use id::{Id, SeqId, V4, V7};
pub use pagination::{Page, PageRequest, ValidatedPage};
pub use patch::Patch;
