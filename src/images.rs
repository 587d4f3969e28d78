use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use crate::batch::{channel_from_path, find_batches, read_batch};
use crate::error::Result;
use crate::models::RawMessage;
use crate::validation::InputValidator;

/// Counters from one extraction run
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ExtractionStats {
    /// Batches read
    pub batches: usize,
    /// Images copied into the image tree
    pub extracted: usize,
    /// Media paths that did not exist on disk
    pub missing: usize,
    /// Images left out because their channel name is unusable as a directory
    pub skipped: usize,
    /// Batches that could not be parsed
    pub skipped_batches: usize,
}

/// Copies downloaded media into `image_dir/<channel>/<channel>_<id>.jpg`
pub struct ImageExtractor {
    raw_dir: PathBuf,
    image_dir: PathBuf,
}

impl ImageExtractor {
    pub fn new(raw_dir: PathBuf, image_dir: PathBuf) -> Self {
        Self { raw_dir, image_dir }
    }

    /// Destination of a message's image
    #[must_use]
    pub fn image_path(&self, channel: &str, message_id: i64) -> PathBuf {
        self.image_dir
            .join(channel)
            .join(format!("{channel}_{message_id}.jpg"))
    }

    /// Scan every raw batch and organize the referenced images.
    ///
    /// Unreadable batches and missing media files are logged and skipped.
    pub fn extract(&self) -> Result<ExtractionStats> {
        let mut stats = ExtractionStats::default();

        for batch in find_batches(&self.raw_dir)? {
            let messages = match read_batch(&batch) {
                Ok(messages) => messages,
                Err(e) => {
                    warn!(path = %batch.display(), error = %e, "Skipping unreadable batch");
                    stats.skipped_batches += 1;
                    continue;
                }
            };
            stats.batches += 1;
            debug!(path = %batch.display(), messages = messages.len(), "Processing batch");

            let fallback = channel_from_path(&batch);
            for message in &messages {
                self.extract_message(message, fallback.as_deref(), &mut stats)?;
            }
        }

        info!(
            extracted = stats.extracted,
            missing = stats.missing,
            skipped = stats.skipped,
            batches = stats.batches,
            "Image extraction complete"
        );
        Ok(stats)
    }

    fn extract_message(&self, message: &RawMessage, fallback: Option<&str>, stats: &mut ExtractionStats) -> Result<()> {
        let Some(source) = message.media_path.as_deref().filter(|_| message.has_media) else {
            return Ok(());
        };

        let source = Path::new(source);
        if !source.exists() {
            warn!(path = %source.display(), message_id = message.id, "Image file not found");
            stats.missing += 1;
            return Ok(());
        }

        let channel = message
            .channel
            .as_deref()
            .or(fallback)
            .unwrap_or("unknown");
        if let Err(e) = InputValidator::validate_channel_name(channel) {
            warn!(channel, error = %e, "Skipping image with unusable channel name");
            stats.skipped += 1;
            return Ok(());
        }

        let dest = self.image_path(channel, message.id);
        if source != dest {
            if let Some(parent) = dest.parent() {
                fs::create_dir_all(parent)?;
            }
            fs::copy(source, &dest)?;
            debug!(from = %source.display(), to = %dest.display(), "Organized image");
        }
        stats.extracted += 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::batch::write_batch;
    use tempfile::tempdir;

    fn media_message(id: i64, channel: Option<&str>, media_path: Option<String>) -> RawMessage {
        RawMessage {
            id,
            date: "2024-05-01 10:00:00+00:00".to_string(),
            text: None,
            views: None,
            has_media: true,
            channel: channel.map(ToString::to_string),
            media_path,
        }
    }

    #[test]
    fn test_extract_copies_existing_media() {
        let dir = tempdir().unwrap();
        let media = dir.path().join("media");
        fs::create_dir_all(&media).unwrap();
        let photo = media.join("1.jpg");
        fs::write(&photo, b"jpeg bytes").unwrap();

        let raw = dir.path().join("raw");
        let mut text_only = media_message(3, Some("chemed"), None);
        text_only.has_media = false;
        write_batch(
            &[
                media_message(1, Some("chemed"), Some(photo.to_string_lossy().into_owned())),
                media_message(2, Some("chemed"), Some(media.join("2.jpg").to_string_lossy().into_owned())),
                text_only,
            ],
            &raw.join("2024-05-01").join("chemed.json"),
        )
        .unwrap();

        let extractor = ImageExtractor::new(raw, dir.path().join("images"));
        let stats = extractor.extract().unwrap();

        assert_eq!(stats.extracted, 1);
        assert_eq!(stats.missing, 1);
        let dest = extractor.image_path("chemed", 1);
        assert!(dest.ends_with("images/chemed/chemed_1.jpg"));
        assert_eq!(fs::read(dest).unwrap(), b"jpeg bytes");
    }

    #[test]
    fn test_channel_falls_back_to_batch_name() {
        let dir = tempdir().unwrap();
        let photo = dir.path().join("5.jpg");
        fs::write(&photo, b"x").unwrap();

        let raw = dir.path().join("raw");
        write_batch(
            &[media_message(5, None, Some(photo.to_string_lossy().into_owned()))],
            &raw.join("2024-05-01").join("tikvahpharma.json"),
        )
        .unwrap();
        fs::write(raw.join("2024-05-01").join("broken.json"), "{not json").unwrap();

        let extractor = ImageExtractor::new(raw, dir.path().join("images"));
        let stats = extractor.extract().unwrap();

        assert_eq!(stats.extracted, 1);
        assert_eq!(stats.skipped_batches, 1);
        assert!(extractor.image_path("tikvahpharma", 5).exists());
    }

    #[test]
    fn test_bad_channel_name_is_skipped_not_missing() {
        let dir = tempdir().unwrap();
        let photo = dir.path().join("8.jpg");
        fs::write(&photo, b"x").unwrap();

        let raw = dir.path().join("raw");
        write_batch(
            &[media_message(8, Some("../escape"), Some(photo.to_string_lossy().into_owned()))],
            &raw.join("2024-05-01").join("chemed.json"),
        )
        .unwrap();

        let extractor = ImageExtractor::new(raw, dir.path().join("images"));
        let stats = extractor.extract().unwrap();

        assert_eq!(stats.skipped, 1);
        assert_eq!(stats.missing, 0);
        assert_eq!(stats.extracted, 0);
    }
}
