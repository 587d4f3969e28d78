//! Aggregations over warehouse rows
//!
//! Pure functions: the reporting service loads rows from the warehouse and
//! hands them here. Every function takes `now` explicitly so results are
//! reproducible.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use chrono::{Duration, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

use crate::config::DEFAULT_KEYWORDS;
use crate::models::{FactMessage, StagedMessage, StoredDetection};
use crate::text::{contains_term, excerpt, TextProcessor};

/// Sample excerpts kept per keyword
pub const MAX_SAMPLES: usize = 3;
/// Days covered by `recent_activity`, today included
pub const RECENT_ACTIVITY_DAYS: i64 = 7;
/// Entries in `most_common_objects`
pub const MOST_COMMON_OBJECTS: usize = 10;
/// Entries in the dashboard's `top_channels`
pub const TOP_CHANNELS: usize = 5;

/// First instant of a window of `days` ending at `now`
#[must_use]
pub fn window_start(now: NaiveDateTime, days: u32) -> NaiveDateTime {
    now - Duration::days(i64::from(days))
}

/// Earliest timestamp any channel activity report needs rows from
#[must_use]
pub fn activity_rows_since(now: NaiveDateTime, days: u32) -> NaiveDateTime {
    let recent_start = (now.date() - Duration::days(RECENT_ACTIVITY_DAYS - 1)).and_time(chrono::NaiveTime::MIN);
    window_start(now, days).min(recent_start)
}

/// Domain terms counted by the product mention report.
///
/// Terms are lowercased, trimmed and deduplicated; order is preserved and
/// breaks ties between equally mentioned terms.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeywordVocabulary {
    terms: Vec<String>,
}

impl KeywordVocabulary {
    /// Build a vocabulary from raw terms
    pub fn new<I, S>(terms: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut seen = BTreeSet::new();
        let terms = terms
            .into_iter()
            .map(|t| t.as_ref().trim().to_lowercase())
            .filter(|t| !t.is_empty() && seen.insert(t.clone()))
            .collect();
        Self { terms }
    }

    /// Normalized terms in report order
    #[must_use]
    pub fn terms(&self) -> &[String] {
        &self.terms
    }

    /// Number of distinct terms
    #[must_use]
    pub fn len(&self) -> usize {
        self.terms.len()
    }

    /// True when no usable term was given
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.terms.is_empty()
    }
}

impl Default for KeywordVocabulary {
    fn default() -> Self {
        Self::new(DEFAULT_KEYWORDS)
    }
}

/// Parameters of the product mention report
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopProductsQuery {
    /// Maximum number of products returned
    pub limit: usize,
    /// Window length in days, counted back from now
    pub days: u32,
    /// Minimum number of mentioning messages
    pub min_mentions: usize,
    /// Restrict to one channel
    pub channel: Option<String>,
}

impl Default for TopProductsQuery {
    fn default() -> Self {
        Self {
            limit: 10,
            days: 30,
            min_mentions: 3,
            channel: None,
        }
    }
}

/// Mention trend between the two halves of the report window
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrendDirection {
    /// More mentions in the later half of the window
    Up,
    /// Fewer mentions in the later half of the window
    Down,
    /// Both halves equal
    Stable,
}

impl TrendDirection {
    /// Compare mention counts of the earlier and later half of a window
    #[must_use]
    pub fn from_halves(earlier: usize, later: usize) -> Self {
        match later.cmp(&earlier) {
            std::cmp::Ordering::Greater => Self::Up,
            std::cmp::Ordering::Less => Self::Down,
            std::cmp::Ordering::Equal => Self::Stable,
        }
    }
}

/// One vocabulary term with its mention statistics
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TopProduct {
    /// Vocabulary term
    pub keyword: String,
    /// Messages mentioning the term
    pub mention_count: usize,
    /// Channels the mentions came from, sorted
    pub channels: Vec<String>,
    /// Mean views of the mentioning messages; missing views count as 0
    pub avg_views: f64,
    /// Direction of mentions across the window
    pub trend_direction: TrendDirection,
    /// Up to three excerpts of mentioning messages
    pub sample_messages: Vec<String>,
}

#[derive(Default)]
struct MentionStats {
    count: usize,
    channels: BTreeSet<String>,
    total_views: i64,
    samples: Vec<String>,
    earlier: usize,
    later: usize,
}

/// Count vocabulary mentions in staged messages.
///
/// A message mentions a term when its lowercased text contains the term.
/// Messages outside the window or channel filter, and messages without text,
/// are ignored. Terms mentioned by fewer than `min_mentions` messages are
/// dropped. Output is ordered by mention count, then vocabulary order.
#[must_use]
pub fn top_products(
    messages: &[StagedMessage],
    vocabulary: &KeywordVocabulary,
    query: &TopProductsQuery,
    now: NaiveDateTime,
) -> Vec<TopProduct> {
    let start = window_start(now, query.days);
    let midpoint = start + (now - start) / 2;

    let mut stats: Vec<MentionStats> = vocabulary.terms().iter().map(|_| MentionStats::default()).collect();

    let in_scope = messages.iter().filter(|m| {
        m.message_date >= start && query.channel.as_ref().map_or(true, |c| &m.channel == c)
    });

    for message in in_scope {
        let Some(text) = message.message_text.as_deref() else {
            continue;
        };
        let lowered = text.to_lowercase();

        for (term, entry) in vocabulary.terms().iter().zip(stats.iter_mut()) {
            if !contains_term(&lowered, term) {
                continue;
            }
            entry.count += 1;
            entry.channels.insert(message.channel.clone());
            entry.total_views += message.views.unwrap_or(0);
            if entry.samples.len() < MAX_SAMPLES {
                entry.samples.push(excerpt(text));
            }
            if message.message_date >= midpoint {
                entry.later += 1;
            } else {
                entry.earlier += 1;
            }
        }
    }

    let mut products: Vec<TopProduct> = vocabulary
        .terms()
        .iter()
        .zip(stats)
        .filter(|(_, s)| s.count > 0 && s.count >= query.min_mentions)
        .map(|(term, s)| TopProduct {
            keyword: term.clone(),
            mention_count: s.count,
            channels: s.channels.into_iter().collect(),
            avg_views: s.total_views as f64 / s.count as f64,
            trend_direction: TrendDirection::from_halves(s.earlier, s.later),
            sample_messages: s.samples,
        })
        .collect();

    // Stable sort keeps vocabulary order among equal counts
    products.sort_by(|a, b| b.mention_count.cmp(&a.mention_count));
    products.truncate(query.limit);
    products
}

/// Parameters of the channel activity report
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChannelActivityQuery {
    /// Window length in days
    pub days: u32,
    /// Compute `top_keywords`
    pub include_keywords: bool,
    /// Maximum number of keywords
    pub keyword_limit: usize,
}

impl Default for ChannelActivityQuery {
    fn default() -> Self {
        Self {
            days: 30,
            include_keywords: true,
            keyword_limit: 10,
        }
    }
}

/// Message volume of one calendar day
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DailyActivity {
    /// UTC calendar day
    pub date: NaiveDate,
    pub message_count: usize,
    pub total_views: i64,
}

/// A word and how often it occurred
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeywordFrequency {
    /// Lowercased word
    pub keyword: String,
    /// Occurrences across the window
    pub frequency: usize,
}

/// Activity summary of a single channel
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelActivity {
    /// Channel name
    pub channel: String,
    /// Messages in the window
    pub total_messages: usize,
    /// Mean views, missing views counted as 0
    pub avg_views: f64,
    /// Share of messages carrying media, 0-100
    pub media_percentage: f64,
    /// Engagement label to message count
    pub engagement_distribution: BTreeMap<String, usize>,
    /// Trailing seven days, today first
    pub recent_activity: Vec<DailyActivity>,
    /// Most frequent words; empty unless requested
    pub top_keywords: Vec<KeywordFrequency>,
}

/// Share of messages carrying media, as a percentage; 0 for no messages
#[must_use]
pub fn media_percentage(media: usize, total: usize) -> f64 {
    if total == 0 {
        return 0.0;
    }
    media as f64 / total as f64 * 100.0
}

fn average_views<'a>(views: impl Iterator<Item = &'a Option<i64>>) -> f64 {
    let (sum, count) = views.fold((0_i64, 0_usize), |(sum, count), v| (sum + v.unwrap_or(0), count + 1));
    if count == 0 {
        0.0
    } else {
        sum as f64 / count as f64
    }
}

fn engagement_distribution<'a>(facts: impl Iterator<Item = &'a FactMessage>) -> BTreeMap<String, usize> {
    let mut distribution = BTreeMap::new();
    for level in facts.filter_map(|f| f.engagement_level.as_ref()) {
        *distribution.entry(level.clone()).or_insert(0) += 1;
    }
    distribution
}

/// Most frequent words across `texts`, ties in alphabetical order
#[must_use]
pub fn keyword_frequencies<'a>(
    texts: impl IntoIterator<Item = &'a str>,
    processor: &TextProcessor,
    limit: usize,
) -> Vec<KeywordFrequency> {
    let mut counts: HashMap<String, usize> = HashMap::new();
    for text in texts {
        for word in processor.words(text) {
            *counts.entry(word).or_insert(0) += 1;
        }
    }

    let mut ranked: Vec<KeywordFrequency> = counts
        .into_iter()
        .map(|(keyword, frequency)| KeywordFrequency { keyword, frequency })
        .collect();
    ranked.sort_by(|a, b| b.frequency.cmp(&a.frequency).then_with(|| a.keyword.cmp(&b.keyword)));
    ranked.truncate(limit);
    ranked
}

/// Per-day counts for the trailing week, today first
#[must_use]
pub fn recent_activity(facts: &[FactMessage], now: NaiveDateTime) -> Vec<DailyActivity> {
    let today = now.date();
    (0..RECENT_ACTIVITY_DAYS)
        .map(|offset| {
            let date = today - Duration::days(offset);
            let (message_count, total_views) = facts
                .iter()
                .filter(|f| f.message_date.date() == date)
                .fold((0, 0), |(count, views), f| (count + 1, views + f.views.unwrap_or(0)));
            DailyActivity {
                date,
                message_count,
                total_views,
            }
        })
        .collect()
}

/// Summarize one channel.
///
/// `facts` must cover the report window and the trailing week (see
/// [`activity_rows_since`]); `texts` only needs the window.
#[must_use]
pub fn channel_activity(
    channel: &str,
    facts: &[FactMessage],
    texts: &[StagedMessage],
    processor: &TextProcessor,
    query: &ChannelActivityQuery,
    now: NaiveDateTime,
) -> ChannelActivity {
    let start = window_start(now, query.days);

    let channel_facts: Vec<FactMessage> = facts.iter().filter(|f| f.channel == channel).cloned().collect();
    let windowed: Vec<&FactMessage> = channel_facts.iter().filter(|f| f.message_date >= start).collect();

    let total_messages = windowed.len();
    let media = windowed.iter().filter(|f| f.has_media).count();

    let top_keywords = if query.include_keywords {
        let window_texts = texts
            .iter()
            .filter(|m| m.channel == channel && m.message_date >= start)
            .filter_map(|m| m.message_text.as_deref());
        keyword_frequencies(window_texts, processor, query.keyword_limit)
    } else {
        Vec::new()
    };

    ChannelActivity {
        channel: channel.to_string(),
        total_messages,
        avg_views: average_views(windowed.iter().map(|f| &f.views)),
        media_percentage: media_percentage(media, total_messages),
        engagement_distribution: engagement_distribution(windowed.iter().copied()),
        recent_activity: recent_activity(&channel_facts, now),
        top_keywords,
    }
}

/// A detected label and how often it occurred
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectFrequency {
    pub object: String,
    pub count: usize,
}

/// Totals over all detection records
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DetectionSummary {
    /// Stored detection records
    pub total_detections: usize,
    /// Labels across all records
    pub total_objects: usize,
    /// Distinct labels
    pub unique_objects: usize,
    /// Most frequent labels, ties by name
    pub most_common_objects: Vec<ObjectFrequency>,
}

/// Summarize stored detection records
#[must_use]
pub fn detection_summary(records: &[StoredDetection]) -> DetectionSummary {
    let mut counts: HashMap<&str, usize> = HashMap::new();
    let mut total_objects = 0;
    for record in records {
        total_objects += record.detected_objects.len();
        for label in &record.detected_objects {
            *counts.entry(label.as_str()).or_insert(0) += 1;
        }
    }

    let unique_objects = counts.len();
    let mut most_common: Vec<ObjectFrequency> = counts
        .into_iter()
        .map(|(object, count)| ObjectFrequency {
            object: object.to_string(),
            count,
        })
        .collect();
    most_common.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.object.cmp(&b.object)));
    most_common.truncate(MOST_COMMON_OBJECTS);

    DetectionSummary {
        total_detections: records.len(),
        total_objects,
        unique_objects,
        most_common_objects: most_common,
    }
}

/// Per-channel figures on the dashboard
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelSummary {
    /// Channel name
    pub channel: String,
    /// Messages in the window
    pub message_count: usize,
    /// Mean views, missing views counted as 0
    pub avg_views: f64,
}

/// Cross-channel overview for the last `period_days`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DashboardData {
    /// Window length in days
    pub period_days: u32,
    /// Fact rows in the window
    pub total_messages: usize,
    /// Rows in the channel dimension
    pub total_channels: i64,
    /// Engagement label to message count
    pub engagement_distribution: BTreeMap<String, usize>,
    /// Busiest channels
    pub top_channels: Vec<ChannelSummary>,
}

/// Build the dashboard for the last `days`
#[must_use]
pub fn dashboard(facts: &[FactMessage], total_channels: i64, days: u32, now: NaiveDateTime) -> DashboardData {
    let start = window_start(now, days);
    let windowed: Vec<&FactMessage> = facts.iter().filter(|f| f.message_date >= start).collect();

    let mut per_channel: BTreeMap<&str, Vec<&FactMessage>> = BTreeMap::new();
    for fact in &windowed {
        per_channel.entry(fact.channel.as_str()).or_default().push(fact);
    }

    let mut top_channels: Vec<ChannelSummary> = per_channel
        .into_iter()
        .map(|(channel, rows)| ChannelSummary {
            channel: channel.to_string(),
            message_count: rows.len(),
            avg_views: average_views(rows.iter().map(|f| &f.views)),
        })
        .collect();
    // Stable sort over the name-ordered map keeps ties alphabetical
    top_channels.sort_by(|a, b| b.message_count.cmp(&a.message_count));
    top_channels.truncate(TOP_CHANNELS);

    DashboardData {
        period_days: days,
        total_messages: windowed.len(),
        total_channels,
        engagement_distribution: engagement_distribution(windowed.iter().copied()),
        top_channels,
    }
}
