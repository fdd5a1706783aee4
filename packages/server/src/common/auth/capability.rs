use serde::{Deserialize, Serialize};

use super::AuthError;

/// Role slug carried by every request.
///
/// `System` never arrives over HTTP; it is used by the media pipeline callback,
/// scheduled hygiene tasks and promotion bookkeeping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Owner,
    Realtor,
    Agency,
    Photographer,
    Admin,
    System,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Owner => "owner",
            Role::Realtor => "realtor",
            Role::Agency => "agency",
            Role::Photographer => "photographer",
            Role::Admin => "admin",
            Role::System => "system",
        }
    }

    /// Roles that may own and edit listings.
    pub fn is_listing_party(&self) -> bool {
        matches!(self, Role::Owner | Role::Realtor | Role::Agency)
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Role {
    type Err = AuthError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "owner" => Ok(Role::Owner),
            "realtor" => Ok(Role::Realtor),
            "agency" => Ok(Role::Agency),
            "photographer" => Ok(Role::Photographer),
            "admin" => Ok(Role::Admin),
            "system" => Ok(Role::System),
            other => Err(AuthError::UnknownRole(other.to_string())),
        }
    }
}

/// Capabilities checked outside the status machine's own actor guard.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Capability {
    /// Start, edit and manage own listings
    ManageOwnListings,

    /// Query listings on behalf of any user id
    QueryAnyOwner,

    /// Upload and complete media for an assigned session
    UploadSessionMedia,

    /// Re-run processing for a media batch
    RetryMedia,

    /// Keep a favorites list
    KeepFavorites,

    /// Review, close and operate any listing
    Administer,
}

impl Capability {
    pub fn allows(&self, role: Role) -> bool {
        match self {
            Capability::ManageOwnListings => role.is_listing_party(),
            Capability::QueryAnyOwner => matches!(role, Role::Realtor | Role::Agency | Role::Admin),
            Capability::UploadSessionMedia => matches!(role, Role::Photographer | Role::Admin),
            Capability::RetryMedia => matches!(role, Role::Admin | Role::System),
            Capability::KeepFavorites => role != Role::System,
            Capability::Administer => role == Role::Admin,
        }
    }
}
