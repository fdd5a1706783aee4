/// Actor and role model for listing commands.
///
/// Authentication happens upstream; the core receives an already resolved
/// `(user_id, role_slug)` pair and asks capability questions of it:
///
/// ```rust
/// use toq_core::common::auth::{Actor, Capability, Role};
/// use toq_core::common::UserId;
///
/// let actor = Actor::new(UserId::new(7), Role::Photographer);
/// assert!(actor.can(Capability::UploadSessionMedia).check().is_ok());
/// ```

mod builder;
mod capability;
mod errors;

pub use builder::{Actor, CapabilityCheck};
pub use capability::{Capability, Role};
pub use errors::AuthError;
