//! Channel scraping through an external client bridge.

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

use crate::batch::{batch_path, write_batch};
use crate::config::ClientConfig;
use crate::error::{AnalyticsError, Result};
use crate::metrics::PipelineMetrics;
use crate::models::{format_message_date, RawMessage};

/// A message as returned by the client bridge
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelMessage {
    /// Message id within the channel
    pub id: i64,
    /// Post time
    pub date: DateTime<Utc>,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub views: Option<i64>,
    /// True when the message carries a photo
    #[serde(default)]
    pub has_photo: bool,
}

/// Access to a messaging network's public channels
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ChannelClient: Send + Sync {
    /// Most recent messages of `channel`, newest first
    async fn fetch_messages(&self, channel: &str, limit: usize) -> Result<Vec<ChannelMessage>>;

    /// Save the photo attached to a message at `dest`
    async fn download_media(&self, channel: &str, message_id: i64, dest: &Path) -> Result<()>;
}

/// JSON-over-HTTP client for a bridge process that wraps the messaging network.
///
/// Endpoints:
/// - `GET {base}/channels/{channel}/messages?limit=N` returns `[ChannelMessage]`
/// - `GET {base}/channels/{channel}/messages/{id}/media` returns the photo bytes
pub struct HttpChannelClient {
    client: reqwest::Client,
    base_url: String,
    token: Option<String>,
}

impl HttpChannelClient {
    /// Client for the bridge at `config.base_url`
    pub fn new(config: &ClientConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            token: config.api_token.clone(),
        })
    }

    async fn get(&self, url: &str) -> Result<reqwest::Response> {
        let mut request = self.client.get(url);
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }
        let resp = request.send().await?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(AnalyticsError::ChannelApi {
                status: status.as_u16(),
                message: body,
            });
        }
        Ok(resp)
    }
}

#[async_trait]
impl ChannelClient for HttpChannelClient {
    async fn fetch_messages(&self, channel: &str, limit: usize) -> Result<Vec<ChannelMessage>> {
        let url = format!("{}/channels/{}/messages?limit={}", self.base_url, channel, limit);
        let resp = self.get(&url).await?;
        let messages: Vec<ChannelMessage> = resp.json().await?;
        Ok(messages)
    }

    async fn download_media(&self, channel: &str, message_id: i64, dest: &Path) -> Result<()> {
        let url = format!("{}/channels/{}/messages/{}/media", self.base_url, channel, message_id);
        let bytes = self.get(&url).await?.bytes().await?;

        if let Some(parent) = dest.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(dest, &bytes).await?;
        Ok(())
    }
}

/// Channel name from a reference such as `https://t.me/tikvahpharma` or `@tikvahpharma`
pub fn channel_name_from_ref(reference: &str) -> Result<String> {
    let name = reference
        .trim()
        .trim_end_matches('/')
        .rsplit('/')
        .next()
        .unwrap_or_default()
        .trim_start_matches('@');

    if name.is_empty() {
        return Err(AnalyticsError::Validation(format!("Invalid channel reference: '{reference}'")));
    }
    Ok(name.to_string())
}

/// A batch written for one channel
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchedBatch {
    /// Channel name
    pub channel: String,
    /// Batch file written
    pub path: PathBuf,
    /// Messages in the batch
    pub messages: usize,
}

/// Result of a fetch run over several channels
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct FetchSummary {
    /// Channels fetched successfully
    pub batches: Vec<FetchedBatch>,
    /// Channel references that failed
    pub failed: Vec<String>,
}

impl FetchSummary {
    /// Messages across all batches
    #[must_use]
    pub fn total_messages(&self) -> usize {
        self.batches.iter().map(|b| b.messages).sum()
    }
}

/// Pulls channels through a [`ChannelClient`] into raw JSON batches
pub struct ChannelFetcher {
    client: Box<dyn ChannelClient>,
    raw_dir: PathBuf,
    media_dir: PathBuf,
    limit: usize,
}

impl ChannelFetcher {
    pub fn new(client: Box<dyn ChannelClient>, raw_dir: PathBuf, media_dir: PathBuf, limit: usize) -> Self {
        Self {
            client,
            raw_dir,
            media_dir,
            limit,
        }
    }

    /// Fetch one channel and write its batch under `date`
    pub async fn fetch_channel(&self, reference: &str, date: NaiveDate) -> Result<FetchedBatch> {
        let channel = channel_name_from_ref(reference)?;
        info!(channel = %channel, limit = self.limit, "Fetching messages");

        let fetched = self.client.fetch_messages(&channel, self.limit).await?;

        let mut messages = Vec::with_capacity(fetched.len());
        for message in fetched {
            let media_path = if message.has_photo {
                self.download(&channel, message.id).await
            } else {
                None
            };

            messages.push(RawMessage {
                id: message.id,
                date: format_message_date(message.date),
                text: message.text,
                views: message.views,
                has_media: message.has_photo,
                channel: Some(channel.clone()),
                media_path,
            });
        }

        let path = batch_path(&self.raw_dir, date, &channel);
        write_batch(&messages, &path)?;
        info!(channel = %channel, count = messages.len(), path = %path.display(), "Saved messages");

        Ok(FetchedBatch {
            channel,
            path,
            messages: messages.len(),
        })
    }

    async fn download(&self, channel: &str, message_id: i64) -> Option<String> {
        let dest = self.media_dir.join(channel).join(format!("{message_id}.jpg"));
        match self.client.download_media(channel, message_id, &dest).await {
            Ok(()) => Some(dest.to_string_lossy().into_owned()),
            Err(e) => {
                warn!(channel, message_id, error = %e, "Media download failed");
                None
            }
        }
    }

    /// Fetch every channel; failures are logged and skipped
    pub async fn fetch_all(&self, references: &[String], metrics: &mut PipelineMetrics) -> FetchSummary {
        let today = Utc::now().date_naive();
        let mut summary = FetchSummary::default();

        for reference in references {
            match self.fetch_channel(reference, today).await {
                Ok(batch) => {
                    metrics.record_fetch(&batch.channel, batch.messages, true);
                    summary.batches.push(batch);
                }
                Err(e) => {
                    error!(channel = %reference, error = %e, "Failed to fetch channel");
                    metrics.record_fetch(reference, 0, false);
                    summary.failed.push(reference.clone());
                }
            }
        }

        summary
    }
}
