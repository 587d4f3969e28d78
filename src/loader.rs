use std::ops::AddAssign;
use std::path::Path;

use chrono::Utc;
use tracing::{debug, info, warn};

use crate::batch::{channel_from_path, find_batches, read_batch, read_detections};
use crate::db::{Database, InsertOutcome};
use crate::error::{AnalyticsError, Result};
use crate::logging::OperationTimer;
use crate::metrics::PipelineMetrics;
use crate::models::NewRawMessage;

/// Row counts from a load
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct LoadStats {
    /// Files read
    pub files: usize,
    /// Rows written
    pub inserted: usize,
    /// Rows whose key already existed
    pub skipped: usize,
    /// Records that could not be parsed
    pub invalid: usize,
}

impl AddAssign for LoadStats {
    fn add_assign(&mut self, other: Self) {
        self.files += other.files;
        self.inserted += other.inserted;
        self.skipped += other.skipped;
        self.invalid += other.invalid;
    }
}

/// Loads JSON batches and detection files into the warehouse
pub struct Loader {
    db: Database,
}

impl Loader {
    #[must_use]
    pub const fn new(db: Database) -> Self {
        Self { db }
    }

    /// Insert one batch; the channel is the file stem.
    ///
    /// Each record commits on its own, so a duplicate only skips that record.
    pub fn load_file(&self, path: &Path) -> Result<LoadStats> {
        let channel = channel_from_path(path)
            .ok_or_else(|| AnalyticsError::Validation(format!("Batch has no file name: {}", path.display())))?;
        let messages = read_batch(path)?;
        let conn = self.db.get_connection()?;

        let mut stats = LoadStats {
            files: 1,
            ..LoadStats::default()
        };
        for message in &messages {
            let row = match NewRawMessage::from_batch(message, &channel) {
                Ok(row) => row,
                Err(e) => {
                    warn!(path = %path.display(), id = message.id, error = %e, "Skipping unparseable message");
                    stats.invalid += 1;
                    continue;
                }
            };

            match Database::insert_raw_message(&conn, &row)? {
                InsertOutcome::Inserted => stats.inserted += 1,
                InsertOutcome::Duplicate => stats.skipped += 1,
            }
        }

        debug!(
            path = %path.display(),
            channel = %channel,
            inserted = stats.inserted,
            skipped = stats.skipped,
            "Loaded batch"
        );
        Ok(stats)
    }

    /// Load every batch below `raw_dir`
    pub fn load_directory(&self, raw_dir: &Path, metrics: &mut PipelineMetrics) -> Result<LoadStats> {
        let timer = OperationTimer::new("load_messages");
        let mut total = LoadStats::default();

        for batch in find_batches(raw_dir)? {
            info!(path = %batch.display(), "Loading batch");
            total += self.load_file(&batch)?;
        }

        metrics.record_load(total.inserted, total.skipped);
        timer.finish();
        info!(
            files = total.files,
            inserted = total.inserted,
            skipped = total.skipped,
            invalid = total.invalid,
            "Message load complete"
        );
        Ok(total)
    }

    /// Load a detections file into `enriched.yolo_detections`, skipping image
    /// paths that are already stored.
    pub fn load_detections(&self, path: &Path, metrics: &mut PipelineMetrics) -> Result<LoadStats> {
        let records = read_detections(path)?;
        let conn = self.db.get_connection()?;
        let created_at = Utc::now().naive_utc();

        let mut stats = LoadStats {
            files: 1,
            ..LoadStats::default()
        };
        for record in &records {
            match Database::insert_detection(&conn, record, created_at)? {
                InsertOutcome::Inserted => stats.inserted += 1,
                InsertOutcome::Duplicate => stats.skipped += 1,
            }
        }

        metrics.record_detections_loaded(stats.inserted);
        info!(
            path = %path.display(),
            inserted = stats.inserted,
            skipped = stats.skipped,
            "Detections stored"
        );
        Ok(stats)
    }
}
