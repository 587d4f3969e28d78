//! Error types for the channel-analytics library.
//!
//! This module provides custom error types using `thiserror` for better error handling
//! and more specific error messages throughout the ingestion pipeline and reporting layer.

use thiserror::Error;

/// Errors that can occur in the channel-analytics application.
#[derive(Error, Debug)]
pub enum AnalyticsError {
    /// Database-related errors
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Connection pool errors
    #[error("Connection pool error: {0}")]
    Pool(#[from] r2d2::Error),

    /// Channel missing from the channel dimension
    #[error("Channel '{0}' not found")]
    ChannelNotFound(String),

    /// Rejected input (query parameters, config values)
    #[error("Validation error: {0}")]
    Validation(String),

    /// File I/O errors
    #[error("File I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Directory traversal errors
    #[error("Directory walk error: {0}")]
    Walk(#[from] walkdir::Error),

    /// Serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Transport errors talking to the channel client bridge
    #[error("Channel client error: {0}")]
    Client(#[from] reqwest::Error),

    /// Non-success response from the channel client bridge
    #[error("Channel API returned {status}: {message}")]
    ChannelApi {
        /// HTTP status code
        status: u16,
        /// Response body
        message: String,
    },

    /// The object detector failed on an image
    #[error("Detection failed for {path}: {message}")]
    Detection {
        /// Image path
        path: String,
        /// Failure description
        message: String,
    },

    /// Invalid date format
    #[error("Invalid date format: {0}")]
    InvalidDate(String),

    /// General error with context
    #[error("{0}")]
    Other(String),
}

/// Convenience type alias for Result with `AnalyticsError`
pub type Result<T> = std::result::Result<T, AnalyticsError>;
