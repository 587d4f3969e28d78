//! Mapping of library errors onto HTTP statuses.

use axum::extract::rejection::{PathRejection, QueryRejection};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use tokio::task::JoinError;
use tracing::error;

use super::response::ErrorResponse;
use crate::error::AnalyticsError;

/// Errors surfaced to HTTP clients
#[derive(Debug)]
pub enum ApiError {
    /// Unknown channel or route (404)
    NotFound(String),
    /// Rejected query or path parameter (422)
    Validation(String),
    /// Anything else (500); the detail is only logged
    Internal(String),
}

impl ApiError {
    /// HTTP status for the error
    #[must_use]
    pub const fn status(&self) -> StatusCode {
        match self {
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Machine-readable `error_code`
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::NotFound(_) => "NOT_FOUND",
            Self::Validation(_) => "VALIDATION_ERROR",
            Self::Internal(_) => "INTERNAL_ERROR",
        }
    }
}

impl From<AnalyticsError> for ApiError {
    fn from(err: AnalyticsError) -> Self {
        match err {
            AnalyticsError::ChannelNotFound(_) => Self::NotFound(err.to_string()),
            AnalyticsError::Validation(message) => Self::Validation(message),
            AnalyticsError::InvalidDate(_) => Self::Validation(err.to_string()),
            other => Self::Internal(other.to_string()),
        }
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        Self::Validation(rejection.body_text())
    }
}

impl From<PathRejection> for ApiError {
    fn from(rejection: PathRejection) -> Self {
        Self::Validation(rejection.body_text())
    }
}

impl From<JoinError> for ApiError {
    fn from(err: JoinError) -> Self {
        Self::Internal(format!("Background task failed: {err}"))
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let message = match self {
            Self::Internal(ref detail) => {
                error!(error = %detail, "Request failed");
                "Internal server error".to_string()
            }
            Self::NotFound(ref message) | Self::Validation(ref message) => message.clone(),
        };

        let body = ErrorResponse {
            success: false,
            message,
            error_code: self.code(),
        };
        (self.status(), Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_mapping() {
        let not_found: ApiError = AnalyticsError::ChannelNotFound("x".to_string()).into();
        assert_eq!(not_found.status(), StatusCode::NOT_FOUND);
        assert_eq!(not_found.code(), "NOT_FOUND");

        let invalid: ApiError = AnalyticsError::Validation("bad".to_string()).into();
        assert_eq!(invalid.status(), StatusCode::UNPROCESSABLE_ENTITY);

        let internal: ApiError = AnalyticsError::Other("boom".to_string()).into();
        assert_eq!(internal.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(internal.code(), "INTERNAL_ERROR");
    }
}
