//! # Web API Errors
//!
//! Maps [`CassetteError`] onto HTTP status codes with a uniform JSON body:
//! `{"error": {"code": "...", "message": "..."}}`.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use crate::error::CassetteError;

#[derive(Error, Debug)]
pub enum ApiError {
    #[error(transparent)]
    Core(#[from] CassetteError),

    #[error("Authentication required: {reason}")]
    Unauthorized { reason: String },

    #[error("Bad request: {message}")]
    BadRequest { message: String },
}

impl ApiError {
    pub fn unauthorized(reason: impl Into<String>) -> Self {
        Self::Unauthorized {
            reason: reason.into(),
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::BadRequest {
            message: message.into(),
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::Unauthorized { .. } => StatusCode::UNAUTHORIZED,
            ApiError::BadRequest { .. } => StatusCode::BAD_REQUEST,
            ApiError::Core(err) => match err {
                CassetteError::InvalidTransition { .. }
                | CassetteError::IllegalCassetteTransition { .. }
                | CassetteError::Validation(_) => StatusCode::BAD_REQUEST,
                CassetteError::Conflict(_) => StatusCode::CONFLICT,
                CassetteError::NotFound { .. } => StatusCode::NOT_FOUND,
                CassetteError::PreconditionFailed(_) => StatusCode::PRECONDITION_FAILED,
                CassetteError::Forbidden { .. } => StatusCode::FORBIDDEN,
                CassetteError::Database(_)
                | CassetteError::Configuration(_)
                | CassetteError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            },
        }
    }

    fn code(&self) -> &'static str {
        match self {
            ApiError::Unauthorized { .. } => "UNAUTHORIZED",
            ApiError::BadRequest { .. } => "BAD_REQUEST",
            ApiError::Core(err) if err.is_client_error() => err.kind(),
            ApiError::Core(_) => "INTERNAL_ERROR",
        }
    }

    fn message(&self) -> String {
        match self {
            ApiError::Core(err) if !err.is_client_error() => "Internal server error".to_string(),
            ApiError::Core(err) => err.to_string(),
            ApiError::Unauthorized { reason } => reason.clone(),
            ApiError::BadRequest { message } => message.clone(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status_code = self.status_code();
        if status_code.is_server_error() {
            tracing::error!(error = %self, "Request failed");
        }

        let error_response = json!({
            "error": {
                "code": self.code(),
                "message": self.message()
            }
        });

        (status_code, Json(error_response)).into_response()
    }
}

/// Result type alias for web API operations
pub type ApiResult<T> = Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn test_status_mapping() {
        let cases = [
            (
                CassetteError::InvalidTransition {
                    entity: "service_order",
                    from: "OPEN".into(),
                    to: "CLOSED".into(),
                },
                StatusCode::BAD_REQUEST,
            ),
            (CassetteError::conflict("busy"), StatusCode::CONFLICT),
            (
                CassetteError::not_found("cassette", Uuid::nil()),
                StatusCode::NOT_FOUND,
            ),
            (
                CassetteError::precondition("not resolved"),
                StatusCode::PRECONDITION_FAILED,
            ),
            (
                CassetteError::Database("pool closed".into()),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];

        for (err, expected) in cases {
            assert_eq!(ApiError::from(err).status_code(), expected);
        }
    }

    #[test]
    fn test_server_errors_hide_details() {
        let err = ApiError::from(CassetteError::Database("password=secret".into()));
        assert_eq!(err.code(), "INTERNAL_ERROR");
        assert_eq!(err.message(), "Internal server error");
    }
}
