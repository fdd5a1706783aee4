//! Error taxonomy for the listing lifecycle engine.
//!
//! Every command returns `Result<T, CoreError>`. The HTTP adapter maps
//! `CoreError::kind()` to a status code; nothing else inspects variants.

use serde::Serialize;
use thiserror::Error;

use crate::common::{ListingIdentityId, MediaBatchId};

/// Stable error kind names surfaced to clients.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorKind {
    Validation,
    ValidationMutex,
    ValidationChecksum,
    ValidationUploadExpired,
    StateInvalid,
    ConflictSlot,
    ConflictDraftExists,
    ConflictOpenBatch,
    ConflictDuplicate,
    NotFound,
    Forbidden,
    Unauthorized,
    Timeout,
    Internal,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Validation => "VALIDATION",
            ErrorKind::ValidationMutex => "VALIDATION_MUTEX",
            ErrorKind::ValidationChecksum => "VALIDATION_CHECKSUM",
            ErrorKind::ValidationUploadExpired => "VALIDATION_UPLOAD_EXPIRED",
            ErrorKind::StateInvalid => "STATE_INVALID",
            ErrorKind::ConflictSlot => "CONFLICT_SLOT",
            ErrorKind::ConflictDraftExists => "CONFLICT_DRAFT_EXISTS",
            ErrorKind::ConflictOpenBatch => "CONFLICT_OPEN_BATCH",
            ErrorKind::ConflictDuplicate => "CONFLICT_DUPLICATE",
            ErrorKind::NotFound => "NOT_FOUND",
            ErrorKind::Forbidden => "FORBIDDEN",
            ErrorKind::Unauthorized => "UNAUTHORIZED",
            ErrorKind::Timeout => "TIMEOUT",
            ErrorKind::Internal => "INTERNAL",
        }
    }

    /// HTTP status code the thin adapter surfaces for this kind.
    pub fn status_code(&self) -> u16 {
        match self {
            ErrorKind::Validation
            | ErrorKind::ValidationChecksum
            | ErrorKind::ValidationUploadExpired => 400,
            ErrorKind::ValidationMutex => 422,
            ErrorKind::StateInvalid
            | ErrorKind::ConflictSlot
            | ErrorKind::ConflictDraftExists
            | ErrorKind::ConflictOpenBatch
            | ErrorKind::ConflictDuplicate => 409,
            ErrorKind::NotFound => 404,
            ErrorKind::Forbidden => 403,
            ErrorKind::Unauthorized => 401,
            ErrorKind::Timeout => 504,
            ErrorKind::Internal => 500,
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single field-level validation problem.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldError {
    pub field: String,
    pub message: String,
}

impl FieldError {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

/// An uploaded asset whose stored object disagrees with its declaration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AssetMismatch {
    pub asset_type: String,
    pub sequence: i32,
    pub reason: String,
}

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("validation failed: {message}")]
    Validation {
        message: String,
        details: Vec<FieldError>,
    },

    #[error("mutually exclusive fields both set: {field}")]
    ValidationMutex { field: String },

    #[error("uploaded objects do not match their declarations ({} mismatched)", mismatches.len())]
    ValidationChecksum { mismatches: Vec<AssetMismatch> },

    #[error("upload window expired before objects were stored ({} missing)", missing.len())]
    ValidationUploadExpired { missing: Vec<AssetMismatch> },

    #[error("invalid state: {0}")]
    StateInvalid(String),

    #[error("slot unavailable: {0}")]
    ConflictSlot(String),

    #[error("listing {0} already has an open draft")]
    ConflictDraftExists(ListingIdentityId),

    #[error("media batch {0} is still open")]
    ConflictOpenBatch(MediaBatchId),

    #[error("duplicate: {0}")]
    ConflictDuplicate(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("forbidden: {0}")]
    Forbidden(String),

    #[error("unauthorized: {0}")]
    Unauthorized(String),

    #[error("deadline elapsed")]
    Timeout,

    #[error("internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl CoreError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            CoreError::Validation { .. } => ErrorKind::Validation,
            CoreError::ValidationMutex { .. } => ErrorKind::ValidationMutex,
            CoreError::ValidationChecksum { .. } => ErrorKind::ValidationChecksum,
            CoreError::ValidationUploadExpired { .. } => ErrorKind::ValidationUploadExpired,
            CoreError::StateInvalid(_) => ErrorKind::StateInvalid,
            CoreError::ConflictSlot(_) => ErrorKind::ConflictSlot,
            CoreError::ConflictDraftExists(_) => ErrorKind::ConflictDraftExists,
            CoreError::ConflictOpenBatch(_) => ErrorKind::ConflictOpenBatch,
            CoreError::ConflictDuplicate(_) => ErrorKind::ConflictDuplicate,
            CoreError::NotFound(_) => ErrorKind::NotFound,
            CoreError::Forbidden(_) => ErrorKind::Forbidden,
            CoreError::Unauthorized(_) => ErrorKind::Unauthorized,
            CoreError::Timeout => ErrorKind::Timeout,
            CoreError::Internal(_) => ErrorKind::Internal,
        }
    }

    /// Single-field validation error.
    pub fn invalid(field: impl Into<String>, message: impl Into<String>) -> Self {
        let detail = FieldError::new(field, message);
        CoreError::Validation {
            message: format!("{}: {}", detail.field, detail.message),
            details: vec![detail],
        }
    }

    /// Multi-field validation error; `None` when there is nothing to report.
    pub fn from_field_errors(message: &str, details: Vec<FieldError>) -> Option<Self> {
        if details.is_empty() {
            None
        } else {
            Some(CoreError::Validation {
                message: message.to_string(),
                details,
            })
        }
    }

    pub fn not_found(what: &str, id: impl std::fmt::Display) -> Self {
        CoreError::NotFound(format!("{} {}", what, id))
    }

    pub fn state_invalid(message: impl Into<String>) -> Self {
        CoreError::StateInvalid(message.into())
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        CoreError::Forbidden(message.into())
    }
}

impl From<sqlx::Error> for CoreError {
    fn from(err: sqlx::Error) -> Self {
        CoreError::Internal(anyhow::Error::new(err))
    }
}

pub type CoreResult<T> = Result<T, CoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mutex_maps_to_422() {
        let err = CoreError::ValidationMutex {
            field: "tax".to_string(),
        };
        assert_eq!(err.kind(), ErrorKind::ValidationMutex);
        assert_eq!(err.kind().status_code(), 422);
        assert_eq!(err.kind().as_str(), "VALIDATION_MUTEX");
    }

    #[test]
    fn conflicts_map_to_409() {
        for err in [
            CoreError::ConflictSlot("taken".into()),
            CoreError::ConflictDraftExists(ListingIdentityId::new(1)),
            CoreError::StateInvalid("nope".into()),
        ] {
            assert_eq!(err.kind().status_code(), 409);
        }
    }

    #[test]
    fn empty_field_errors_produce_nothing() {
        assert!(CoreError::from_field_errors("bad", vec![]).is_none());
        let err = CoreError::from_field_errors("bad", vec![FieldError::new("a", "b")]).unwrap();
        assert_eq!(err.kind(), ErrorKind::Validation);
    }

    #[test]
    fn anyhow_becomes_internal() {
        let err: CoreError = anyhow::anyhow!("boom").into();
        assert_eq!(err.kind(), ErrorKind::Internal);
        assert_eq!(err.kind().status_code(), 500);
    }
}
