use chrono::NaiveDateTime;

use crate::error::{AnalyticsError, Result};
use crate::models::parse_message_date;

fn invalid(message: impl Into<String>) -> AnalyticsError {
    AnalyticsError::Validation(message.into())
}

/// Validation utilities for input sanitization and edge case handling
#[derive(Debug, Copy, Clone)]
pub struct InputValidator;

impl InputValidator {
    /// Validate channel name
    pub fn validate_channel_name(name: &str) -> Result<()> {
        if name.trim().is_empty() {
            return Err(invalid("Channel name cannot be empty"));
        }

        if name.chars().count() > 255 {
            return Err(invalid("Channel name too long (max 255 characters)"));
        }

        // Check for potentially dangerous characters
        if name.chars().any(char::is_control) {
            return Err(invalid("Channel name contains invalid characters"));
        }

        if name.contains('/') || name.contains('\\') {
            return Err(invalid("Channel name cannot contain path separators"));
        }

        Ok(())
    }

    /// Validate that `value` lies in `min..=max`
    pub fn validate_range(field: &str, value: i64, min: i64, max: i64) -> Result<()> {
        if value < min || value > max {
            return Err(invalid(format!(
                "{field} must be between {min} and {max}, got {value}"
            )));
        }
        Ok(())
    }

    /// Validate that `value` is at least `min`
    pub fn validate_min(field: &str, value: i64, min: i64) -> Result<()> {
        if value < min {
            return Err(invalid(format!("{field} must be at least {min}, got {value}")));
        }
        Ok(())
    }

    /// Validate the free-text search query
    pub fn validate_search_query(query: &str) -> Result<()> {
        if query.is_empty() {
            return Err(invalid("query must contain at least 1 character"));
        }

        if query.contains('\0') {
            return Err(invalid("query contains invalid characters"));
        }

        Ok(())
    }

    /// Parse a date query parameter
    pub fn parse_date(field: &str, value: &str) -> Result<NaiveDateTime> {
        parse_message_date(value).map_err(|_| {
            invalid(format!(
                "{field} must be a date (YYYY-MM-DD) or datetime (YYYY-MM-DDTHH:MM:SS), got '{value}'"
            ))
        })
    }

    /// Validate date range
    pub fn validate_date_range(start: Option<NaiveDateTime>, end: Option<NaiveDateTime>) -> Result<()> {
        if let (Some(start_date), Some(end_date)) = (start, end) {
            if start_date > end_date {
                return Err(invalid("Start date cannot be after end date"));
            }

            // Warn about very large date ranges that may impact performance
            let days = (end_date - start_date).num_days();
            if days > 365 * 5 {
                tracing::warn!(
                    "Large date range ({} days / {:.1} years) may impact search performance",
                    days,
                    days as f64 / 365.0
                );
            }
        }

        Ok(())
    }
}
