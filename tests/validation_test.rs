//! Tests for validation.rs

use chrono::NaiveDate;
use channel_analytics::error::AnalyticsError;
use channel_analytics::validation::InputValidator;

#[test]
fn test_validate_channel_name_valid() {
    assert!(InputValidator::validate_channel_name("tikvahpharma").is_ok());
    assert!(InputValidator::validate_channel_name("CheMed123").is_ok());
}

#[test]
fn test_validate_channel_name_empty() {
    assert!(InputValidator::validate_channel_name("").is_err());
    assert!(InputValidator::validate_channel_name("   ").is_err());
}

#[test]
fn test_validate_channel_name_too_long() {
    assert!(InputValidator::validate_channel_name(&"a".repeat(256)).is_err());
    assert!(InputValidator::validate_channel_name(&"a".repeat(255)).is_ok());
}

#[test]
fn test_validate_channel_name_control_chars() {
    assert!(InputValidator::validate_channel_name("bad\0name").is_err());
    assert!(InputValidator::validate_channel_name("bad\nname").is_err());
}

#[test]
fn test_validate_channel_name_path_separators() {
    assert!(InputValidator::validate_channel_name("../etc").is_err());
    assert!(InputValidator::validate_channel_name("a\\b").is_err());
}

#[test]
fn test_validate_range() {
    assert!(InputValidator::validate_range("days", 1, 1, 365).is_ok());
    assert!(InputValidator::validate_range("days", 365, 1, 365).is_ok());
    assert!(InputValidator::validate_range("days", 366, 1, 365).is_err());
    assert!(InputValidator::validate_range("days", -1, 1, 365).is_err());
}

#[test]
fn test_validate_min() {
    assert!(InputValidator::validate_min("min_views", 0, 0).is_ok());
    assert!(InputValidator::validate_min("min_views", -5, 0).is_err());
}

#[test]
fn test_validate_search_query() {
    assert!(InputValidator::validate_search_query("paracetamol").is_ok());
    assert!(InputValidator::validate_search_query("").is_err());
    // Only emptiness is bounded
    assert!(InputValidator::validate_search_query(&"x".repeat(500)).is_ok());
    assert!(InputValidator::validate_search_query("nul\0").is_err());
}

#[test]
fn test_parse_date_accepts_date_and_datetime() {
    let date = InputValidator::parse_date("start_date", "2024-05-01").unwrap();
    assert_eq!(date, NaiveDate::from_ymd_opt(2024, 5, 1).unwrap().and_hms_opt(0, 0, 0).unwrap());

    let datetime = InputValidator::parse_date("start_date", "2024-05-01T08:30:00").unwrap();
    assert_eq!(datetime, NaiveDate::from_ymd_opt(2024, 5, 1).unwrap().and_hms_opt(8, 30, 0).unwrap());
}

#[test]
fn test_parse_date_rejects_garbage() {
    let err = InputValidator::parse_date("end_date", "last tuesday").unwrap_err();
    assert!(matches!(err, AnalyticsError::Validation(_)));
    assert!(err.to_string().contains("end_date"));
}

#[test]
fn test_validate_date_range() {
    let earlier = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap().and_hms_opt(0, 0, 0);
    let later = NaiveDate::from_ymd_opt(2024, 2, 1).unwrap().and_hms_opt(0, 0, 0);

    assert!(InputValidator::validate_date_range(earlier, later).is_ok());
    assert!(InputValidator::validate_date_range(later, earlier).is_err());
    assert!(InputValidator::validate_date_range(None, later).is_ok());
    assert!(InputValidator::validate_date_range(None, None).is_ok());
}
