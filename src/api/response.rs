//! Success and error bodies.

use axum::response::{IntoResponse, Json, Response};
use serde::Serialize;

/// Success envelope shared by every endpoint
#[derive(Debug, Clone, Serialize)]
pub struct ApiResponse<T> {
    /// Always true
    pub success: bool,
    /// Human-readable summary
    pub message: String,
    /// Endpoint payload
    pub data: T,
    /// Item count for list payloads
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_count: Option<usize>,
}

impl<T> ApiResponse<T> {
    /// Successful response without a count
    pub fn ok(message: impl Into<String>, data: T) -> Self {
        Self {
            success: true,
            message: message.into(),
            data,
            total_count: None,
        }
    }

    /// Attach the item count
    #[must_use]
    pub fn with_total(mut self, total_count: usize) -> Self {
        self.total_count = Some(total_count);
        self
    }
}

impl<T: Serialize> IntoResponse for ApiResponse<T> {
    fn into_response(self) -> Response {
        Json(self).into_response()
    }
}

/// Body of every error response
#[derive(Debug, Clone, Serialize)]
pub struct ErrorResponse {
    /// Always false
    pub success: bool,
    /// What went wrong
    pub message: String,
    /// `NOT_FOUND`, `VALIDATION_ERROR` or `INTERNAL_ERROR`
    pub error_code: &'static str,
}
