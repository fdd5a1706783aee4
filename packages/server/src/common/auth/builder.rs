use serde::{Deserialize, Serialize};

use super::{AuthError, Capability, Role};
use crate::common::entity_ids::UserId;

/// The already-authenticated caller of a command.
///
/// Usage:
/// ```
/// use toq_core::common::auth::{Actor, Capability, Role};
/// use toq_core::common::UserId;
///
/// let admin = Actor::new(UserId::new(1), Role::Admin);
/// admin.can(Capability::Administer).check().unwrap();
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    pub user_id: UserId,
    pub role: Role,
}

impl Actor {
    pub fn new(user_id: UserId, role: Role) -> Self {
        Self { user_id, role }
    }

    /// The internal actor used for pipeline callbacks and bookkeeping.
    pub fn system() -> Self {
        Self {
            user_id: UserId::new(0),
            role: Role::System,
        }
    }

    /// Builds an actor from the role slug resolved by the auth middleware.
    pub fn from_slug(user_id: UserId, role_slug: &str) -> Result<Self, AuthError> {
        Ok(Self::new(user_id, role_slug.parse()?))
    }

    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }

    pub fn is_system(&self) -> bool {
        self.role == Role::System
    }

    /// Specify what capability the actor needs
    pub fn can(&self, capability: Capability) -> CapabilityCheck {
        CapabilityCheck {
            actor: *self,
            capability,
        }
    }
}

/// Builder after specifying capability
pub struct CapabilityCheck {
    actor: Actor,
    capability: Capability,
}

impl CapabilityCheck {
    /// Perform the authorization check
    pub fn check(self) -> Result<(), AuthError> {
        if self.capability.allows(self.actor.role) {
            return Ok(());
        }
        if self.capability == Capability::Administer {
            return Err(AuthError::AdminRequired);
        }
        Err(AuthError::PermissionDenied(format!(
            "role {} cannot {:?}",
            self.actor.role, self.capability
        )))
    }
}
