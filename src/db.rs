use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::NaiveDateTime;
use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::functions::FunctionFlags;
use rusqlite::types::Type;
use rusqlite::{params, Connection, ErrorCode, OptionalExtension, Row};
use tracing::debug;

use crate::error::Result;
use crate::models::{
    escape_like, Channel, DetectionRecord, FactMessage, Filter, FilterType, MessageSearch, MessageView,
    NewRawMessage, Operator, QueryBuilder, StagedMessage, StoredDetection,
};
use crate::schema::{
    dim_channels, fct_messages, stg_telegram_messages, telegram_messages, yolo_detections, LOWER_UNICODE, SCHEMAS,
};

// Type alias for the database connection pool
/// Pool of warehouse connections
pub type DbPool = Pool<SqliteConnectionManager>;
/// Connection checked out of [`DbPool`]
pub type DbConnection = r2d2::PooledConnection<SqliteConnectionManager>;

const DEFAULT_MAX_CONNECTIONS: u32 = 8;
const DEFAULT_CONNECTION_TIMEOUT: Duration = Duration::from_secs(30);
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// `lower_unicode(text)`: full Unicode lowercasing, NULL stays NULL
fn register_functions(conn: &Connection) -> rusqlite::Result<()> {
    conn.create_scalar_function(
        LOWER_UNICODE,
        1,
        FunctionFlags::SQLITE_UTF8 | FunctionFlags::SQLITE_DETERMINISTIC,
        |ctx| {
            let text: Option<String> = ctx.get(0)?;
            Ok(text.map(|t| t.to_lowercase()))
        },
    )
}

/// Outcome of an idempotent insert
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    /// A new row was written
    Inserted,
    /// The primary/unique key already existed; nothing changed
    Duplicate,
}

/// Warehouse manager for handling connections and queries.
///
/// Cloning is cheap and shares the underlying pool.
#[derive(Clone)]
pub struct Database {
    pool: DbPool,
}

impl Database {
    /// Open (or create) the warehouse at `path` with default pool settings
    pub fn new(path: &Path) -> Result<Self> {
        Self::with_options(path, DEFAULT_MAX_CONNECTIONS, DEFAULT_CONNECTION_TIMEOUT)
    }

    /// Open (or create) the warehouse with explicit pool settings
    pub fn with_options(path: &Path, max_connections: u32, connection_timeout: Duration) -> Result<Self> {
        // Create parent directory if it doesn't exist
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }

        // Every pooled connection attaches the schema databases
        let attachments: Vec<(&'static str, String)> = SCHEMAS
            .iter()
            .map(|schema| (*schema, Self::schema_path(path, schema).to_string_lossy().into_owned()))
            .collect();

        let manager = SqliteConnectionManager::file(path).with_init(move |conn| {
            conn.busy_timeout(BUSY_TIMEOUT)?;
            register_functions(conn)?;
            for (schema, file) in &attachments {
                conn.execute(&format!("ATTACH DATABASE ?1 AS {schema}"), params![file])?;
            }
            Ok(())
        });

        let pool = Pool::builder()
            .max_size(max_connections)
            .connection_timeout(connection_timeout)
            .build(manager)?;

        // Run migrations
        let conn = pool.get()?;
        Self::run_migrations(&conn)?;
        debug!(path = %path.display(), "Warehouse opened");

        Ok(Self { pool })
    }

    /// File backing an attached schema: `<dir>/<stem>.<schema>.db`
    #[must_use]
    pub fn schema_path(main: &Path, schema: &str) -> PathBuf {
        let stem = main
            .file_stem()
            .map_or_else(|| "warehouse".to_string(), |s| s.to_string_lossy().into_owned());
        main.with_file_name(format!("{stem}.{schema}.db"))
    }

    /// Run database migrations
    fn run_migrations(conn: &Connection) -> Result<()> {
        conn.execute_batch(include_str!("../migrations/001_create_raw_messages.sql"))?;
        conn.execute_batch(include_str!("../migrations/002_create_warehouse_tables.sql"))?;
        conn.execute_batch(include_str!("../migrations/003_create_detections.sql"))?;
        Ok(())
    }

    /// Get a connection from the pool
    pub fn get_connection(&self) -> Result<DbConnection> {
        Ok(self.pool.get()?)
    }

    /// Insert a raw message; an existing `(channel, id)` is reported as a duplicate
    pub fn insert_raw_message(conn: &Connection, message: &NewRawMessage) -> Result<InsertOutcome> {
        let sql = format!(
            "INSERT INTO {} ({}, {}, {}, {}, {}, {}, {}) VALUES (?, ?, ?, ?, ?, ?, ?)",
            telegram_messages::TABLE,
            telegram_messages::ID,
            telegram_messages::CHANNEL,
            telegram_messages::DATE,
            telegram_messages::TEXT,
            telegram_messages::VIEWS,
            telegram_messages::HAS_MEDIA,
            telegram_messages::MEDIA_PATH,
        );

        let result = conn.execute(
            &sql,
            params![
                message.id,
                message.channel,
                message.date,
                message.text,
                message.views,
                message.has_media,
                message.media_path,
            ],
        );
        classify_insert(result)
    }

    /// Insert a detection record; an existing `file_path` is reported as a duplicate
    pub fn insert_detection(
        conn: &Connection,
        record: &DetectionRecord,
        created_at: NaiveDateTime,
    ) -> Result<InsertOutcome> {
        let sql = format!(
            "INSERT INTO {} ({}, {}, {}, {}, {}, {}, {}) VALUES (?, ?, ?, ?, ?, ?, ?)",
            yolo_detections::TABLE,
            yolo_detections::FILE_PATH,
            yolo_detections::RELATIVE_PATH,
            yolo_detections::FILENAME,
            yolo_detections::DETECTED_OBJECTS,
            yolo_detections::OBJECT_COUNT,
            yolo_detections::CONFIDENCE_SCORE,
            yolo_detections::CREATED_AT,
        );
        let objects = serde_json::to_string(&record.detected_objects)?;

        let result = conn.execute(
            &sql,
            params![
                record.file_path,
                record.relative_path,
                record.filename,
                objects,
                record.object_count as i64,
                record.confidence_score,
                created_at,
            ],
        );
        classify_insert(result)
    }

    /// Number of rows in the raw message table
    pub fn count_raw_messages(&self) -> Result<i64> {
        self.count(telegram_messages::TABLE)
    }

    /// Number of fact rows
    pub fn count_fact_messages(&self) -> Result<i64> {
        self.count(fct_messages::TABLE)
    }

    /// Number of channels in the dimension table
    pub fn count_channels(&self) -> Result<i64> {
        self.count(dim_channels::TABLE)
    }

    /// Number of detection records
    pub fn count_detections(&self) -> Result<i64> {
        self.count(yolo_detections::TABLE)
    }

    fn count(&self, table: &'static str) -> Result<i64> {
        let conn = self.get_connection()?;
        let count = conn.query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |row| row.get(0))?;
        Ok(count)
    }

    /// Staged messages dated at or after `since`, optionally for one channel
    pub fn staged_messages_since(&self, since: NaiveDateTime, channel: Option<&str>) -> Result<Vec<StagedMessage>> {
        let query = since_filter(stg_telegram_messages::MESSAGE_DATE, stg_telegram_messages::CHANNEL, since, channel);
        let sql = format!(
            "SELECT * FROM {}{} ORDER BY {} ASC",
            stg_telegram_messages::TABLE,
            query.where_clause(),
            stg_telegram_messages::MESSAGE_DATE,
        );

        let conn = self.get_connection()?;
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(query.params().as_slice(), map_staged_message)?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    /// Fact rows dated at or after `since`, optionally for one channel
    pub fn fact_messages_since(&self, since: NaiveDateTime, channel: Option<&str>) -> Result<Vec<FactMessage>> {
        let query = since_filter(fct_messages::MESSAGE_DATE, fct_messages::CHANNEL, since, channel);
        let sql = format!(
            "SELECT * FROM {}{} ORDER BY {} ASC",
            fct_messages::TABLE,
            query.where_clause(),
            fct_messages::MESSAGE_DATE,
        );

        let conn = self.get_connection()?;
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(query.params().as_slice(), map_fact_message)?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    /// Get a channel from the dimension table
    pub fn get_channel(&self, name: &str) -> Result<Option<Channel>> {
        let conn = self.get_connection()?;

        let channel = conn
            .query_row(
                &format!("SELECT * FROM {} WHERE {} = ?", dim_channels::TABLE, dim_channels::CHANNEL),
                params![name],
                map_channel,
            )
            .optional()?;

        Ok(channel)
    }

    /// All channels, ordered by name
    pub fn list_channels(&self) -> Result<Vec<Channel>> {
        let conn = self.get_connection()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT * FROM {} ORDER BY {} ASC",
            dim_channels::TABLE,
            dim_channels::CHANNEL
        ))?;
        let rows = stmt.query_map([], map_channel)?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    /// Paginated text search; returns the total hit count and the requested page
    pub fn search_messages(&self, search: &MessageSearch) -> Result<(i64, Vec<MessageView>)> {
        let query = search.to_query(&format!("s.{}", stg_telegram_messages::MESSAGE_TEXT), "f");
        let from = format!(
            "FROM {} f JOIN {} s ON s.{} = f.{} AND s.{} = f.{}",
            fct_messages::TABLE,
            stg_telegram_messages::TABLE,
            stg_telegram_messages::ID,
            fct_messages::MESSAGE_ID,
            stg_telegram_messages::CHANNEL,
            fct_messages::CHANNEL,
        );
        let where_clause = query.where_clause();

        let conn = self.get_connection()?;

        let total: i64 = conn.query_row(
            &format!("SELECT COUNT(*) {from}{where_clause}"),
            query.params().as_slice(),
            |row| row.get(0),
        )?;

        let limit = i64::from(search.page_size);
        let offset = search.offset();
        let mut bound = query.params();
        bound.push(&limit);
        bound.push(&offset);

        let sql = format!(
            "SELECT f.message_id, f.message_date, s.message_text, f.views, f.has_media, f.channel, \
             f.message_length, f.engagement_level, f.loaded_at {from}{where_clause} \
             ORDER BY f.message_date DESC, f.channel ASC, f.message_id DESC LIMIT ? OFFSET ?"
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(bound.as_slice(), |row| {
            Ok(MessageView {
                id: row.get(0)?,
                message_date: row.get(1)?,
                message_text: row.get(2)?,
                views: row.get(3)?,
                has_media: row.get(4)?,
                channel: row.get(5)?,
                message_length: row.get(6)?,
                engagement_level: row.get(7)?,
                loaded_at: row.get(8)?,
            })
        })?;

        Ok((total, rows.collect::<rusqlite::Result<Vec<_>>>()?))
    }

    /// Detection records whose relative path mentions `channel`, newest first
    pub fn detections_for_channel(&self, channel: &str, limit: u32) -> Result<Vec<StoredDetection>> {
        let conn = self.get_connection()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT * FROM {} WHERE {} LIKE ? ESCAPE '\\' ORDER BY {} DESC, {} DESC LIMIT ?",
            yolo_detections::TABLE,
            yolo_detections::RELATIVE_PATH,
            yolo_detections::CREATED_AT,
            yolo_detections::ID,
        ))?;
        let pattern = format!("%{}%", escape_like(channel));
        let rows = stmt.query_map(params![pattern, i64::from(limit)], map_detection)?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    /// Every detection record
    pub fn all_detections(&self) -> Result<Vec<StoredDetection>> {
        let conn = self.get_connection()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT * FROM {} ORDER BY {} ASC",
            yolo_detections::TABLE,
            yolo_detections::ID
        ))?;
        let rows = stmt.query_map([], map_detection)?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }
}

/// Treat unique/primary key violations as duplicates
fn classify_insert(result: rusqlite::Result<usize>) -> Result<InsertOutcome> {
    match result {
        Ok(_) => Ok(InsertOutcome::Inserted),
        Err(rusqlite::Error::SqliteFailure(err, _)) if err.code == ErrorCode::ConstraintViolation => {
            Ok(InsertOutcome::Duplicate)
        }
        Err(e) => Err(e.into()),
    }
}

fn since_filter(date_column: &str, channel_column: &str, since: NaiveDateTime, channel: Option<&str>) -> QueryBuilder {
    let mut query = QueryBuilder::new();
    query.add_filter(Filter {
        field: date_column.to_string(),
        operator: Operator::GreaterThanOrEqual,
        value: FilterType::Date(since),
    });
    if let Some(channel) = channel {
        query.add_filter(Filter {
            field: channel_column.to_string(),
            operator: Operator::Equal,
            value: FilterType::Text(channel.to_string()),
        });
    }
    query
}

/// Map a database row to a `StagedMessage`
fn map_staged_message(row: &Row) -> rusqlite::Result<StagedMessage> {
    Ok(StagedMessage {
        id: row.get(stg_telegram_messages::ID)?,
        channel: row.get(stg_telegram_messages::CHANNEL)?,
        message_date: row.get(stg_telegram_messages::MESSAGE_DATE)?,
        message_text: row.get(stg_telegram_messages::MESSAGE_TEXT)?,
        views: row.get(stg_telegram_messages::VIEWS)?,
        has_media: row.get(stg_telegram_messages::HAS_MEDIA)?,
        loaded_at: row.get(stg_telegram_messages::LOADED_AT)?,
    })
}

/// Map a database row to a `FactMessage`
fn map_fact_message(row: &Row) -> rusqlite::Result<FactMessage> {
    Ok(FactMessage {
        message_id: row.get(fct_messages::MESSAGE_ID)?,
        channel: row.get(fct_messages::CHANNEL)?,
        message_date: row.get(fct_messages::MESSAGE_DATE)?,
        message_length: row.get(fct_messages::MESSAGE_LENGTH)?,
        views: row.get(fct_messages::VIEWS)?,
        has_media: row.get(fct_messages::HAS_MEDIA)?,
        engagement_level: row.get(fct_messages::ENGAGEMENT_LEVEL)?,
        loaded_at: row.get(fct_messages::LOADED_AT)?,
    })
}

/// Map a database row to a `Channel`
fn map_channel(row: &Row) -> rusqlite::Result<Channel> {
    Ok(Channel {
        channel: row.get(dim_channels::CHANNEL)?,
        total_messages: row.get(dim_channels::TOTAL_MESSAGES)?,
        first_message_date: row.get(dim_channels::FIRST_MESSAGE_DATE)?,
        last_message_date: row.get(dim_channels::LAST_MESSAGE_DATE)?,
    })
}

/// Map a database row to a `StoredDetection`
fn map_detection(row: &Row) -> rusqlite::Result<StoredDetection> {
    let objects: String = row.get(yolo_detections::DETECTED_OBJECTS)?;
    let detected_objects: Vec<String> = serde_json::from_str(&objects).map_err(|e| {
        let index = row.as_ref().column_index(yolo_detections::DETECTED_OBJECTS).unwrap_or(0);
        rusqlite::Error::FromSqlConversionFailure(index, Type::Text, Box::new(e))
    })?;

    Ok(StoredDetection {
        id: row.get(yolo_detections::ID)?,
        file_path: row.get(yolo_detections::FILE_PATH)?,
        relative_path: row.get(yolo_detections::RELATIVE_PATH)?,
        filename: row.get(yolo_detections::FILENAME)?,
        detected_objects,
        object_count: row.get(yolo_detections::OBJECT_COUNT)?,
        confidence_score: row.get(yolo_detections::CONFIDENCE_SCORE)?,
        created_at: row.get(yolo_detections::CREATED_AT)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use tempfile::tempdir;

    fn message(id: i64, channel: &str) -> NewRawMessage {
        NewRawMessage {
            id,
            channel: channel.to_string(),
            date: NaiveDate::from_ymd_opt(2024, 5, 1)
                .and_then(|d| d.and_hms_opt(10, 0, 0))
                .expect("valid date"),
            text: Some("hello".to_string()),
            views: Some(10),
            has_media: false,
            media_path: None,
        }
    }

    #[test]
    fn test_schema_files_sit_next_to_main_file() {
        let path = Path::new("data/warehouse.db");
        assert_eq!(Database::schema_path(path, "raw"), Path::new("data/warehouse.raw.db"));
    }

    #[test]
    fn test_duplicate_key_is_reported() {
        let dir = tempdir().expect("tempdir");
        let db = Database::new(&dir.path().join("w.db")).expect("open warehouse");
        let conn = db.get_connection().expect("connection");

        assert_eq!(
            Database::insert_raw_message(&conn, &message(1, "a")).expect("insert"),
            InsertOutcome::Inserted
        );
        assert_eq!(
            Database::insert_raw_message(&conn, &message(1, "a")).expect("insert"),
            InsertOutcome::Duplicate
        );
        // Same id in another channel is a different message
        assert_eq!(
            Database::insert_raw_message(&conn, &message(1, "b")).expect("insert"),
            InsertOutcome::Inserted
        );
        assert_eq!(db.count_raw_messages().expect("count"), 2);
    }

    #[test]
    fn test_lower_unicode_is_registered() {
        let dir = tempdir().expect("tempdir");
        let db = Database::new(&dir.path().join("w.db")).expect("open warehouse");
        let conn = db.get_connection().expect("connection");

        let lowered: String = conn
            .query_row("SELECT lower_unicode('ÉCHINACÉE Syrup')", [], |row| row.get(0))
            .expect("query");
        assert_eq!(lowered, "échinacée syrup");

        let null: Option<String> = conn
            .query_row("SELECT lower_unicode(NULL)", [], |row| row.get(0))
            .expect("query");
        assert_eq!(null, None);
    }
}
