use chrono::{NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use crate::analytics::{
    self, activity_rows_since, window_start, ChannelActivity, ChannelActivityQuery, DashboardData, DetectionSummary,
    KeywordVocabulary, TopProduct, TopProductsQuery,
};
use crate::db::Database;
use crate::error::{AnalyticsError, Result};
use crate::models::{Channel, MessageSearch, MessageView, StoredDetection};
use crate::text::TextProcessor;

/// One page of search hits
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResult {
    /// Matches across all pages
    pub total_count: i64,
    /// Requested page, 1-based
    pub page: u32,
    /// Requested page size
    pub page_size: u32,
    /// Messages on this page
    pub messages: Vec<MessageView>,
}

/// Reporting over the warehouse.
///
/// Loads rows through [`Database`] and runs the [`analytics`] aggregations.
/// All methods block; async callers should use `spawn_blocking`.
#[derive(Clone)]
pub struct ReportService {
    db: Database,
    vocabulary: KeywordVocabulary,
    text: TextProcessor,
}

impl ReportService {
    pub fn new(db: Database, vocabulary: KeywordVocabulary) -> Result<Self> {
        Ok(Self {
            db,
            vocabulary,
            text: TextProcessor::new()?,
        })
    }

    #[must_use]
    pub const fn database(&self) -> &Database {
        &self.db
    }

    fn now() -> NaiveDateTime {
        Utc::now().naive_utc()
    }

    /// Vocabulary mentions over the window
    #[instrument(skip(self))]
    pub fn top_products(&self, query: &TopProductsQuery) -> Result<Vec<TopProduct>> {
        let now = Self::now();
        let messages = self
            .db
            .staged_messages_since(window_start(now, query.days), query.channel.as_deref())?;
        debug!(messages = messages.len(), "Scanning staged messages for keyword mentions");

        Ok(analytics::top_products(&messages, &self.vocabulary, query, now))
    }

    /// Activity summary for a channel; unknown channels are `ChannelNotFound`
    #[instrument(skip(self))]
    pub fn channel_activity(&self, channel: &str, query: &ChannelActivityQuery) -> Result<ChannelActivity> {
        self.require_channel(channel)?;

        let now = Self::now();
        let facts = self
            .db
            .fact_messages_since(activity_rows_since(now, query.days), Some(channel))?;
        let texts = if query.include_keywords {
            self.db.staged_messages_since(window_start(now, query.days), Some(channel))?
        } else {
            Vec::new()
        };

        Ok(analytics::channel_activity(channel, &facts, &texts, &self.text, query, now))
    }

    /// Paginated text search
    #[instrument(skip(self), fields(query = %search.query))]
    pub fn search_messages(&self, search: &MessageSearch) -> Result<SearchResult> {
        let (total_count, messages) = self.db.search_messages(search)?;
        Ok(SearchResult {
            total_count,
            page: search.page,
            page_size: search.page_size,
            messages,
        })
    }

    /// Every channel in the dimension table
    pub fn list_channels(&self) -> Result<Vec<Channel>> {
        self.db.list_channels()
    }

    /// Label statistics over all detections
    pub fn detection_summary(&self) -> Result<DetectionSummary> {
        let records = self.db.all_detections()?;
        Ok(analytics::detection_summary(&records))
    }

    /// Newest detections for a channel
    pub fn channel_detections(&self, channel: &str, limit: u32) -> Result<Vec<StoredDetection>> {
        self.db.detections_for_channel(channel, limit)
    }

    /// Cross-channel overview for the last `days`
    #[instrument(skip(self))]
    pub fn dashboard(&self, days: u32) -> Result<DashboardData> {
        let now = Self::now();
        let facts = self.db.fact_messages_since(window_start(now, days), None)?;
        let total_channels = self.db.count_channels()?;
        Ok(analytics::dashboard(&facts, total_channels, days, now))
    }

    fn require_channel(&self, channel: &str) -> Result<Channel> {
        self.db
            .get_channel(channel)?
            .ok_or_else(|| AnalyticsError::ChannelNotFound(channel.to_string()))
    }
}
