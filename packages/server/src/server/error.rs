//! `CoreError` as an HTTP response.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use serde_json::Value;

use crate::common::error::CoreError;

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: &'static str,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
}

impl From<&CoreError> for ErrorBody {
    fn from(err: &CoreError) -> Self {
        let details = match err {
            CoreError::Validation { details, .. } => serde_json::to_value(details).ok(),
            CoreError::ValidationChecksum { mismatches } => serde_json::to_value(mismatches).ok(),
            CoreError::ValidationUploadExpired { missing } => serde_json::to_value(missing).ok(),
            _ => None,
        };
        // Internal causes stay in the logs.
        let message = match err {
            CoreError::Internal(_) => "internal error".to_string(),
            other => other.to_string(),
        };
        Self {
            error: err.kind().as_str(),
            message,
            details,
        }
    }
}

impl IntoResponse for CoreError {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.kind().status_code())
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        if status.is_server_error() {
            tracing::error!(error = ?self, kind = %self.kind(), "request failed");
        } else {
            tracing::debug!(error = %self, kind = %self.kind(), "request rejected");
        }
        (status, Json(ErrorBody::from(&self))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::error::{AssetMismatch, FieldError};

    #[test]
    fn validation_details_are_exposed() {
        let err = CoreError::Validation {
            message: "bad".to_string(),
            details: vec![FieldError::new("zipCode", "must have 8 digits")],
        };
        let body = ErrorBody::from(&err);
        assert_eq!(body.error, "VALIDATION");
        let details = body.details.unwrap();
        assert_eq!(details[0]["field"], "zipCode");
    }

    #[test]
    fn checksum_mismatches_are_exposed() {
        let err = CoreError::ValidationChecksum {
            mismatches: vec![AssetMismatch {
                asset_type: "PHOTO".to_string(),
                sequence: 2,
                reason: "object not found".to_string(),
            }],
        };
        let body = ErrorBody::from(&err);
        assert_eq!(body.details.unwrap()[0]["sequence"], 2);
    }

    #[test]
    fn internal_errors_hide_their_cause() {
        let err: CoreError = anyhow::anyhow!("password=hunter2").into();
        let body = ErrorBody::from(&err);
        assert_eq!(body.error, "INTERNAL");
        assert_eq!(body.message, "internal error");
        assert_eq!(err.into_response().status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn conflicts_are_409() {
        let response = CoreError::ConflictSlot("taken".to_string()).into_response();
        assert_eq!(response.status(), StatusCode::CONFLICT);
    }
}
