//! Warehouse schema definitions
//!
//! Table and column name constants used with rusqlite. Each warehouse schema
//! (`raw`, `dbt_public`, `enriched`) is an attached SQLite database, so table
//! names here are schema-qualified.

/// Names of the attached schemas, in attach order
pub const SCHEMAS: [&str; 3] = ["raw", "dbt_public", "enriched"];

/// Unicode-aware lowercase SQL function registered on every connection
pub const LOWER_UNICODE: &str = "lower_unicode";

/// Raw scraped messages (`raw` schema)
pub mod telegram_messages {
    /// Schema-qualified table name
    pub const TABLE: &str = "raw.telegram_messages";
    /// Message id within its channel
    pub const ID: &str = "id";
    /// Channel name (part of the primary key)
    pub const CHANNEL: &str = "channel";
    /// Message timestamp (naive UTC)
    pub const DATE: &str = "date";
    /// Message text
    pub const TEXT: &str = "text";
    /// View count
    pub const VIEWS: &str = "views";
    /// Photo media flag
    pub const HAS_MEDIA: &str = "has_media";
    /// Downloaded media location
    pub const MEDIA_PATH: &str = "media_path";
}

/// Staged messages produced by the warehouse transform
pub mod stg_telegram_messages {
    /// Schema-qualified table name
    pub const TABLE: &str = "dbt_public.stg_telegram_messages";
    /// Message id within its channel
    pub const ID: &str = "id";
    /// Channel name
    pub const CHANNEL: &str = "channel";
    /// Message timestamp
    pub const MESSAGE_DATE: &str = "message_date";
    /// Message text
    pub const MESSAGE_TEXT: &str = "message_text";
    /// View count
    pub const VIEWS: &str = "views";
    /// Photo media flag
    pub const HAS_MEDIA: &str = "has_media";
    /// Transform timestamp
    pub const LOADED_AT: &str = "loaded_at";
}

/// Channel dimension
pub mod dim_channels {
    /// Schema-qualified table name
    pub const TABLE: &str = "dbt_public.dim_channels";
    /// Channel name (primary key)
    pub const CHANNEL: &str = "channel";
    /// Number of messages for the channel
    pub const TOTAL_MESSAGES: &str = "total_messages";
    /// Earliest message date
    pub const FIRST_MESSAGE_DATE: &str = "first_message_date";
    /// Latest message date
    pub const LAST_MESSAGE_DATE: &str = "last_message_date";
}

/// Message facts
pub mod fct_messages {
    /// Schema-qualified table name
    pub const TABLE: &str = "dbt_public.fct_messages";
    /// Message id within its channel
    pub const MESSAGE_ID: &str = "message_id";
    /// Channel name
    pub const CHANNEL: &str = "channel";
    /// Message timestamp
    pub const MESSAGE_DATE: &str = "message_date";
    /// Character length of the message text
    pub const MESSAGE_LENGTH: &str = "message_length";
    /// View count
    pub const VIEWS: &str = "views";
    /// Photo media flag
    pub const HAS_MEDIA: &str = "has_media";
    /// Engagement bucket label
    pub const ENGAGEMENT_LEVEL: &str = "engagement_level";
    /// Transform timestamp
    pub const LOADED_AT: &str = "loaded_at";
}

/// Object detection results (`enriched` schema)
pub mod yolo_detections {
    /// Schema-qualified table name
    pub const TABLE: &str = "enriched.yolo_detections";
    /// Primary key column
    pub const ID: &str = "id";
    /// Image path as scanned
    pub const FILE_PATH: &str = "file_path";
    /// Image path relative to the image root
    pub const RELATIVE_PATH: &str = "relative_path";
    /// Image file name
    pub const FILENAME: &str = "filename";
    /// JSON array of labels
    pub const DETECTED_OBJECTS: &str = "detected_objects";
    /// Number of distinct labels
    pub const OBJECT_COUNT: &str = "object_count";
    /// Highest detection confidence
    pub const CONFIDENCE_SCORE: &str = "confidence_score";
    /// Load timestamp
    pub const CREATED_AT: &str = "created_at";
}
