//! Data models for ingestion and the warehouse
//!
//! This module contains the raw message batch format, the warehouse row types
//! and the small query builder used for filtered message searches.

use chrono::{DateTime, NaiveDateTime, Utc};
use rusqlite::types::ToSqlOutput;
use rusqlite::ToSql;
use serde::{Deserialize, Serialize};

use crate::error::{AnalyticsError, Result};
use crate::schema::LOWER_UNICODE;

/// Layout used when writing message dates into raw batches
pub const RAW_DATE_FORMAT: &str = "%Y-%m-%d %H:%M:%S%:z";

/// A scraped message as stored in a raw JSON batch
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawMessage {
    /// Message id within its channel
    pub id: i64,
    /// Message timestamp, `YYYY-MM-DD HH:MM:SS+00:00`
    pub date: String,
    /// Message text (absent for media-only posts)
    #[serde(default)]
    pub text: Option<String>,
    /// View count
    #[serde(default)]
    pub views: Option<i64>,
    /// True if the message carries a photo
    #[serde(default)]
    pub has_media: bool,
    /// Channel name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channel: Option<String>,
    /// Local path of the downloaded photo
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub media_path: Option<String>,
}

impl RawMessage {
    /// Parse the message date into naive UTC
    pub fn timestamp(&self) -> Result<NaiveDateTime> {
        parse_message_date(&self.date)
    }
}

/// Format a UTC timestamp the way raw batches store it
#[must_use]
pub fn format_message_date(date: DateTime<Utc>) -> String {
    date.format(RAW_DATE_FORMAT).to_string()
}

/// Parse a message date into naive UTC.
///
/// Accepts RFC 3339 (with `T` or space separator), `YYYY-MM-DD HH:MM:SS` with or
/// without fractional seconds (treated as UTC), and a bare `YYYY-MM-DD`
/// (midnight UTC).
pub fn parse_message_date(value: &str) -> Result<NaiveDateTime> {
    let value = value.trim();

    if let Ok(dt) = value.parse::<DateTime<Utc>>() {
        return Ok(dt.naive_utc());
    }
    if let Ok(dt) = DateTime::parse_from_str(value, "%Y-%m-%d %H:%M:%S%.f%:z") {
        return Ok(dt.naive_utc());
    }
    for layout in ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(value, layout) {
            return Ok(dt);
        }
    }
    if let Ok(date) = chrono::NaiveDate::parse_from_str(value, "%Y-%m-%d") {
        return Ok(date.and_time(chrono::NaiveTime::MIN));
    }

    Err(AnalyticsError::InvalidDate(value.to_string()))
}

/// Row for `raw.telegram_messages`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewRawMessage {
    /// Message id within its channel
    pub id: i64,
    /// Channel name
    pub channel: String,
    /// Message timestamp (naive UTC)
    pub date: NaiveDateTime,
    /// Message text
    pub text: Option<String>,
    /// View count
    pub views: Option<i64>,
    /// Photo media flag
    pub has_media: bool,
    /// Downloaded media location
    pub media_path: Option<String>,
}

impl NewRawMessage {
    /// Build a raw row from a batch record, attributing it to `channel`
    pub fn from_batch(message: &RawMessage, channel: &str) -> Result<Self> {
        Ok(Self {
            id: message.id,
            channel: channel.to_string(),
            date: message.timestamp()?,
            text: message.text.clone(),
            views: message.views,
            has_media: message.has_media,
            media_path: message.media_path.clone(),
        })
    }
}

/// Row of `dbt_public.stg_telegram_messages`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StagedMessage {
    /// Message id within its channel
    pub id: i64,
    /// Channel name
    pub channel: String,
    /// Message timestamp
    pub message_date: NaiveDateTime,
    /// Message text
    pub message_text: Option<String>,
    /// View count
    pub views: Option<i64>,
    /// Photo media flag
    pub has_media: bool,
    /// Transform timestamp
    pub loaded_at: Option<NaiveDateTime>,
}

/// Row of `dbt_public.fct_messages`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FactMessage {
    /// Message id within its channel
    pub message_id: i64,
    /// Channel name
    pub channel: String,
    /// Message timestamp
    pub message_date: NaiveDateTime,
    /// Character length of the text
    pub message_length: i64,
    /// View count
    pub views: Option<i64>,
    /// Photo media flag
    pub has_media: bool,
    /// Engagement bucket label
    pub engagement_level: Option<String>,
    /// Transform timestamp
    pub loaded_at: Option<NaiveDateTime>,
}

/// Row of `dbt_public.dim_channels`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Channel {
    /// Channel name
    pub channel: String,
    /// Number of messages
    pub total_messages: i64,
    /// Earliest message date
    pub first_message_date: Option<NaiveDateTime>,
    /// Latest message date
    pub last_message_date: Option<NaiveDateTime>,
}

/// A search hit: the fact row joined with its staged text
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageView {
    /// Message id within its channel
    pub id: i64,
    /// Message timestamp
    pub message_date: NaiveDateTime,
    /// Message text
    pub message_text: Option<String>,
    /// View count
    pub views: Option<i64>,
    /// Photo media flag
    pub has_media: bool,
    /// Channel name
    pub channel: String,
    /// Character length of the text
    pub message_length: i64,
    /// Engagement bucket label
    pub engagement_level: Option<String>,
    /// Transform timestamp
    pub loaded_at: Option<NaiveDateTime>,
}

/// Categorical bucket derived from a message's view count
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EngagementLevel {
    /// Fewer than 100 views
    Low,
    /// 100 to 999 views
    Medium,
    /// 1000 views or more
    High,
}

impl EngagementLevel {
    /// Lower view bound of the medium bucket
    pub const MEDIUM_THRESHOLD: i64 = 100;
    /// Lower view bound of the high bucket
    pub const HIGH_THRESHOLD: i64 = 1000;

    /// Bucket a view count; missing views count as zero
    #[must_use]
    pub fn from_views(views: Option<i64>) -> Self {
        match views.unwrap_or(0) {
            v if v >= Self::HIGH_THRESHOLD => Self::High,
            v if v >= Self::MEDIUM_THRESHOLD => Self::Medium,
            _ => Self::Low,
        }
    }

    /// Label stored in the fact table
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
        }
    }
}

/// Output of the detection runner for one image
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectionRecord {
    /// Image path as scanned
    pub file_path: String,
    /// Path relative to the image root (`<channel>/<file>`)
    pub relative_path: String,
    /// Image file name
    pub filename: String,
    /// Distinct labels detected in the image
    pub detected_objects: Vec<String>,
    /// Number of distinct labels
    pub object_count: usize,
    /// Highest detection confidence, if anything was detected
    #[serde(default)]
    pub confidence_score: Option<f64>,
}

/// Row of `enriched.yolo_detections`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredDetection {
    /// Database primary key
    pub id: i64,
    /// Image path as scanned
    pub file_path: String,
    /// Path relative to the image root
    pub relative_path: String,
    /// Image file name
    pub filename: String,
    /// Detected labels
    pub detected_objects: Vec<String>,
    /// Number of distinct labels
    pub object_count: i64,
    /// Highest detection confidence
    pub confidence_score: Option<f64>,
    /// Load timestamp
    pub created_at: Option<NaiveDateTime>,
}

/// Date range for filtering messages
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DateRange {
    /// Start date (inclusive, optional)
    pub start: Option<NaiveDateTime>,
    /// End date (inclusive, optional)
    pub end: Option<NaiveDateTime>,
}

/// Filters for the message search
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MessageSearch {
    /// Case-insensitive substring to look for in message text
    pub query: String,
    /// Restrict to one channel
    pub channel: Option<String>,
    /// Restrict by message date
    pub date_range: DateRange,
    /// Restrict by media flag
    pub has_media: Option<bool>,
    /// Minimum view count
    pub min_views: Option<i64>,
    /// 1-based page number
    pub page: u32,
    /// Page size
    pub page_size: u32,
}

impl MessageSearch {
    /// Row offset of the requested page, widened so large pages cannot overflow
    #[must_use]
    pub fn offset(&self) -> i64 {
        i64::from(self.page.saturating_sub(1)) * i64::from(self.page_size)
    }

    /// Translate the search into query builder filters
    #[must_use]
    pub fn to_query(&self, text_column: &str, fact_alias: &str) -> QueryBuilder {
        let mut query = QueryBuilder::new();

        // SQLite LIKE only folds ASCII, so both sides are lowercased first
        query.add_filter(Filter {
            field: format!("{LOWER_UNICODE}({text_column})"),
            operator: Operator::Like,
            value: FilterType::Text(format!("%{}%", escape_like(&self.query.to_lowercase()))),
        });

        if let Some(channel) = &self.channel {
            query.add_filter(Filter {
                field: format!("{fact_alias}.channel"),
                operator: Operator::Equal,
                value: FilterType::Text(channel.clone()),
            });
        }
        if let Some(start) = self.date_range.start {
            query.add_filter(Filter {
                field: format!("{fact_alias}.message_date"),
                operator: Operator::GreaterThanOrEqual,
                value: FilterType::Date(start),
            });
        }
        if let Some(end) = self.date_range.end {
            query.add_filter(Filter {
                field: format!("{fact_alias}.message_date"),
                operator: Operator::LessThanOrEqual,
                value: FilterType::Date(end),
            });
        }
        if let Some(has_media) = self.has_media {
            query.add_filter(Filter {
                field: format!("{fact_alias}.has_media"),
                operator: Operator::Equal,
                value: FilterType::Boolean(has_media),
            });
        }
        if let Some(min_views) = self.min_views {
            query.add_filter(Filter {
                field: format!("COALESCE({fact_alias}.views, 0)"),
                operator: Operator::GreaterThanOrEqual,
                value: FilterType::Integer(min_views),
            });
        }

        query
    }
}

/// Escape `%`, `_` and `\` so user input matches literally inside LIKE
#[must_use]
pub fn escape_like(input: &str) -> String {
    let mut escaped = String::with_capacity(input.len());
    for c in input.chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

/// Query builder for constructing filtered WHERE clauses
#[derive(Debug, Default)]
pub struct QueryBuilder {
    /// List of filters to apply
    pub filters: Vec<Filter>,
}

/// A filter condition for database queries
#[derive(Debug)]
pub struct Filter {
    /// Column (or expression) to filter on
    pub field: String,
    /// Comparison operator
    pub operator: Operator,
    /// Value to compare against
    pub value: FilterType,
}

/// Comparison operators for filters
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Operator {
    /// Equality (=)
    Equal,
    /// Greater than or equal (>=)
    GreaterThanOrEqual,
    /// Less than or equal (<=)
    LessThanOrEqual,
    /// Pattern matching (LIKE, backslash escapes)
    Like,
}

impl Operator {
    const fn sql(self) -> &'static str {
        match self {
            Self::Equal => "=",
            Self::GreaterThanOrEqual => ">=",
            Self::LessThanOrEqual => "<=",
            Self::Like => "LIKE",
        }
    }
}

/// Value types for filter conditions
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FilterType {
    /// Text value
    Text(String),
    /// Integer value
    Integer(i64),
    /// Boolean value
    Boolean(bool),
    /// Date/time value
    Date(NaiveDateTime),
}

impl ToSql for FilterType {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        match self {
            Self::Text(value) => value.to_sql(),
            Self::Integer(value) => value.to_sql(),
            Self::Boolean(value) => value.to_sql(),
            Self::Date(value) => value.to_sql(),
        }
    }
}

impl QueryBuilder {
    /// Create a new empty query builder
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a filter condition to the query
    pub fn add_filter(&mut self, filter: Filter) {
        self.filters.push(filter);
    }

    /// Render the filters as a `WHERE` clause (empty when there are none)
    #[must_use]
    pub fn where_clause(&self) -> String {
        if self.filters.is_empty() {
            return String::new();
        }
        let conditions: Vec<String> = self
            .filters
            .iter()
            .map(|f| match f.operator {
                Operator::Like => format!("{} LIKE ? ESCAPE '\\'", f.field),
                op => format!("{} {} ?", f.field, op.sql()),
            })
            .collect();
        format!(" WHERE {}", conditions.join(" AND "))
    }

    /// Bound values, in the order the placeholders appear
    #[must_use]
    pub fn params(&self) -> Vec<&dyn ToSql> {
        self.filters.iter().map(|f| &f.value as &dyn ToSql).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, TimeZone};

    fn at(y: i32, m: u32, d: u32, h: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, m, d)
            .and_then(|date| date.and_hms_opt(h, 0, 0))
            .expect("valid date")
    }

    #[test]
    fn test_parse_message_date_formats() {
        let expected = at(2024, 5, 1, 10);
        assert_eq!(parse_message_date("2024-05-01 10:00:00+00:00").unwrap(), expected);
        assert_eq!(parse_message_date("2024-05-01T10:00:00Z").unwrap(), expected);
        assert_eq!(parse_message_date("2024-05-01 12:00:00+02:00").unwrap(), expected);
        assert_eq!(parse_message_date("2024-05-01 10:00:00").unwrap(), expected);
        assert_eq!(parse_message_date("2024-05-01").unwrap(), at(2024, 5, 1, 0));
        assert!(parse_message_date("yesterday").is_err());
    }

    #[test]
    fn test_format_round_trips_through_parse() {
        let date = Utc.with_ymd_and_hms(2024, 3, 9, 8, 30, 0).unwrap();
        let text = format_message_date(date);
        assert_eq!(text, "2024-03-09 08:30:00+00:00");
        assert_eq!(parse_message_date(&text).unwrap(), date.naive_utc());
    }

    #[test]
    fn test_engagement_levels() {
        assert_eq!(EngagementLevel::from_views(None), EngagementLevel::Low);
        assert_eq!(EngagementLevel::from_views(Some(99)), EngagementLevel::Low);
        assert_eq!(EngagementLevel::from_views(Some(100)), EngagementLevel::Medium);
        assert_eq!(EngagementLevel::from_views(Some(1000)), EngagementLevel::High);
        assert_eq!(EngagementLevel::High.as_str(), "high");
    }

    #[test]
    fn test_raw_message_defaults() {
        let message: RawMessage =
            serde_json::from_str(r#"{"id": 7, "date": "2024-05-01 10:00:00+00:00"}"#).unwrap();
        assert_eq!(message.text, None);
        assert!(!message.has_media);
        assert_eq!(message.channel, None);
    }

    #[test]
    fn test_search_where_clause() {
        let search = MessageSearch {
            query: "50%".to_string(),
            channel: Some("chemed".to_string()),
            has_media: Some(true),
            page: 2,
            page_size: 20,
            ..MessageSearch::default()
        };
        let query = search.to_query("s.message_text", "f");
        assert_eq!(
            query.where_clause(),
            " WHERE lower_unicode(s.message_text) LIKE ? ESCAPE '\\' AND f.channel = ? AND f.has_media = ?"
        );
        assert_eq!(query.params().len(), 3);
        assert_eq!(query.filters[0].value, FilterType::Text("%50\\%%".to_string()));
        assert_eq!(search.offset(), 20);
    }

    #[test]
    fn test_search_lowercases_query_and_widens_offset() {
        let search = MessageSearch {
            query: "ÉCHINACÉE".to_string(),
            page: u32::MAX,
            page_size: 100,
            ..MessageSearch::default()
        };
        let query = search.to_query("s.message_text", "f");
        assert_eq!(query.filters[0].value, FilterType::Text("%échinacée%".to_string()));
        assert_eq!(search.offset(), i64::from(u32::MAX - 1) * 100);
    }
}
