use thiserror::Error;

use crate::common::error::CoreError;

/// Authorization errors raised before a command touches state.
#[derive(Error, Debug)]
pub enum AuthError {
    #[error("Authentication required")]
    AuthenticationRequired,

    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    #[error("Admin access required")]
    AdminRequired,

    #[error("Unknown role: {0}")]
    UnknownRole(String),
}

impl From<AuthError> for CoreError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::AuthenticationRequired | AuthError::UnknownRole(_) => {
                CoreError::Unauthorized(err.to_string())
            }
            AuthError::PermissionDenied(_) | AuthError::AdminRequired => {
                CoreError::Forbidden(err.to_string())
            }
        }
    }
}
