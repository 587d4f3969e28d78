//! Channel Analytics - Ingestion, Enrichment and Reporting
//!
//! A Rust library for pulling messages and photos from public messaging
//! channels, labeling the photos with an object detector, loading everything
//! into a SQLite warehouse and serving analytics over HTTP.
//!
//! # Features
//!
//! - Channel scraping through a pluggable client
//! - Image organization and object detection
//! - Idempotent warehouse loading and refresh
//! - Keyword, channel activity and detection reports
//! - JSON API

/// Aggregations over warehouse rows
pub mod analytics;
/// HTTP API
pub mod api;
/// JSON batch files
pub mod batch;
/// Configuration management
pub mod config;
/// Database operations and connection pooling
pub mod db;
/// Object detection
pub mod detection;
/// Error types
pub mod error;
/// Channel scraping
pub mod fetcher;
/// Image extraction
pub mod images;
/// Warehouse loading
pub mod loader;
/// Logging setup and utilities
pub mod logging;
/// Metrics collection
pub mod metrics;
/// Data models and structures
pub mod models;
/// Ingestion pipeline
pub mod pipeline;
/// Reporting service
pub mod reports;
/// Database schema definitions
pub mod schema;
/// Word extraction
pub mod text;
/// Warehouse refresh
pub mod transform;
/// Input validation and sanitization
pub mod validation;

// Re-export key components for easier access
pub use db::Database;
pub use error::{AnalyticsError, Result};
pub use models::{DateRange, MessageSearch};
pub use reports::ReportService;
