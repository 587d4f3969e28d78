//! Warehouse refresh: raw messages into the staged, dimension and fact tables.

use chrono::{NaiveDateTime, Utc};
use rusqlite::params;
use tracing::info;

use crate::db::Database;
use crate::error::Result;
use crate::logging::OperationTimer;
use crate::models::EngagementLevel;
use crate::schema::{dim_channels, fct_messages, stg_telegram_messages, telegram_messages};

/// Rows written by a refresh
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct TransformStats {
    /// Rows in the staged table
    pub staged: usize,
    /// Rows in the channel dimension
    pub channels: usize,
    /// Rows in the fact table
    pub facts: usize,
}

fn engagement_case(views: &str) -> String {
    format!(
        "CASE WHEN COALESCE({views}, 0) >= {high} THEN '{high_label}' \
         WHEN COALESCE({views}, 0) >= {medium} THEN '{medium_label}' \
         ELSE '{low_label}' END",
        high = EngagementLevel::HIGH_THRESHOLD,
        medium = EngagementLevel::MEDIUM_THRESHOLD,
        high_label = EngagementLevel::High.as_str(),
        medium_label = EngagementLevel::Medium.as_str(),
        low_label = EngagementLevel::Low.as_str(),
    )
}

/// Rebuild the derived tables from `raw.telegram_messages` in one transaction
pub fn refresh(db: &Database) -> Result<TransformStats> {
    refresh_at(db, Utc::now().naive_utc())
}

/// [`refresh`] with an explicit `loaded_at` stamp
pub fn refresh_at(db: &Database, loaded_at: NaiveDateTime) -> Result<TransformStats> {
    let timer = OperationTimer::new("transform");
    let mut conn = db.get_connection()?;
    let tx = conn.transaction()?;

    tx.execute(&format!("DELETE FROM {}", stg_telegram_messages::TABLE), [])?;
    let staged = tx.execute(
        &format!(
            "INSERT INTO {stg} (id, channel, message_date, message_text, views, has_media, loaded_at) \
             SELECT {id}, {channel}, {date}, {text}, {views}, {has_media}, ?1 FROM {raw}",
            stg = stg_telegram_messages::TABLE,
            raw = telegram_messages::TABLE,
            id = telegram_messages::ID,
            channel = telegram_messages::CHANNEL,
            date = telegram_messages::DATE,
            text = telegram_messages::TEXT,
            views = telegram_messages::VIEWS,
            has_media = telegram_messages::HAS_MEDIA,
        ),
        params![loaded_at],
    )?;

    tx.execute(&format!("DELETE FROM {}", dim_channels::TABLE), [])?;
    let channels = tx.execute(
        &format!(
            "INSERT INTO {dim} (channel, total_messages, first_message_date, last_message_date) \
             SELECT channel, COUNT(*), MIN(message_date), MAX(message_date) FROM {stg} GROUP BY channel",
            dim = dim_channels::TABLE,
            stg = stg_telegram_messages::TABLE,
        ),
        [],
    )?;

    tx.execute(&format!("DELETE FROM {}", fct_messages::TABLE), [])?;
    let facts = tx.execute(
        &format!(
            "INSERT INTO {fct} (message_id, channel, message_date, message_length, views, has_media, \
             engagement_level, loaded_at) \
             SELECT id, channel, message_date, LENGTH(COALESCE(message_text, '')), views, has_media, {engagement}, ?1 \
             FROM {stg}",
            fct = fct_messages::TABLE,
            stg = stg_telegram_messages::TABLE,
            engagement = engagement_case("views"),
        ),
        params![loaded_at],
    )?;

    tx.commit()?;

    let stats = TransformStats {
        staged,
        channels,
        facts,
    };
    timer.finish();
    info!(staged, channels, facts, "Warehouse refreshed");
    Ok(stats)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_engagement_case_uses_thresholds() {
        let sql = engagement_case("views");
        assert!(sql.contains(">= 1000 THEN 'high'"));
        assert!(sql.contains(">= 100 THEN 'medium'"));
        assert!(sql.ends_with("ELSE 'low' END"));
    }
}
