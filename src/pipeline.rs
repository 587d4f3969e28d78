//! Sequential ingestion pipeline.

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use tracing::{error, info};

use crate::config::AppConfig;
use crate::db::Database;
use crate::detection::{DetectionRunner, ObjectDetector};
use crate::error::Result;
use crate::fetcher::{ChannelClient, ChannelFetcher};
use crate::images::ImageExtractor;
use crate::loader::Loader;
use crate::logging::OperationTimer;
use crate::metrics::PipelineMetrics;
use crate::transform;

/// Pipeline stages in execution order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Fetch,
    ExtractImages,
    Detect,
    LoadMessages,
    LoadDetections,
    Transform,
}

impl Stage {
    pub const ALL: [Self; 6] = [
        Self::Fetch,
        Self::ExtractImages,
        Self::Detect,
        Self::LoadMessages,
        Self::LoadDetections,
        Self::Transform,
    ];

    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Fetch => "fetch",
            Self::ExtractImages => "extract_images",
            Self::Detect => "detect",
            Self::LoadMessages => "load_messages",
            Self::LoadDetections => "load_detections",
            Self::Transform => "transform",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Outcome of one stage
#[derive(Debug, Clone, PartialEq)]
pub struct StageReport {
    /// Which stage ran
    pub stage: Stage,
    /// Whether it finished without error
    pub success: bool,
    /// Wall time
    pub duration: Duration,
    /// Summary line on success, error message on failure
    pub detail: String,
}

/// Outcome of a pipeline run
#[derive(Debug, Default, Clone, PartialEq)]
pub struct PipelineReport {
    /// Stages that ran, in order
    pub stages: Vec<StageReport>,
    /// Counters gathered during the run
    pub metrics: PipelineMetrics,
}

impl PipelineReport {
    /// Number of stages that completed successfully
    #[must_use]
    pub fn completed(&self) -> usize {
        self.stages.iter().filter(|s| s.success).count()
    }

    /// True when every stage ran and succeeded
    #[must_use]
    pub fn succeeded(&self) -> bool {
        self.completed() == Stage::ALL.len()
    }

    /// The stage that stopped the run, if any
    #[must_use]
    pub fn failed_stage(&self) -> Option<&StageReport> {
        self.stages.iter().find(|s| !s.success)
    }
}

/// fetch → extract images → detect → load messages → load detections → transform
pub struct Pipeline {
    channels: Vec<String>,
    raw_dir: PathBuf,
    detections_path: PathBuf,
    fetcher: ChannelFetcher,
    extractor: ImageExtractor,
    detector: DetectionRunner,
    loader: Loader,
    db: Database,
}

impl Pipeline {
    /// Wire the stages from configuration
    pub fn new(
        config: &AppConfig,
        db: Database,
        client: Box<dyn ChannelClient>,
        detector: Box<dyn ObjectDetector>,
    ) -> Self {
        let ingestion = &config.ingestion;
        let raw_dir = PathBuf::from(&ingestion.raw_dir);
        let image_dir = PathBuf::from(&ingestion.image_dir);
        let detections_path = PathBuf::from(&config.detection.output_path);

        Self {
            channels: ingestion.channels.clone(),
            fetcher: ChannelFetcher::new(
                client,
                raw_dir.clone(),
                PathBuf::from(&ingestion.media_dir),
                ingestion.message_limit,
            ),
            extractor: ImageExtractor::new(raw_dir.clone(), image_dir.clone()),
            detector: DetectionRunner::new(
                detector,
                image_dir,
                detections_path.clone(),
                &config.detection.extensions,
            ),
            loader: Loader::new(db.clone()),
            raw_dir,
            detections_path,
            db,
        }
    }

    /// Run every stage in order, stopping at the first failure
    pub async fn run(&self) -> PipelineReport {
        let mut report = PipelineReport::default();
        let mut metrics = PipelineMetrics::new();

        for stage in Stage::ALL {
            info!(stage = %stage, "Starting stage");
            let timer = OperationTimer::new(stage.name());
            let outcome = self.run_stage(stage, &mut metrics).await;
            let duration = timer.finish();
            metrics.record_stage(stage.name(), duration, outcome.is_ok());

            match outcome {
                Ok(detail) => {
                    info!(stage = %stage, detail = %detail, "Stage completed");
                    report.stages.push(StageReport {
                        stage,
                        success: true,
                        duration,
                        detail,
                    });
                }
                Err(e) => {
                    error!(stage = %stage, error = %e, "Pipeline stopped");
                    metrics.record_error(stage.name());
                    report.stages.push(StageReport {
                        stage,
                        success: false,
                        duration,
                        detail: e.to_string(),
                    });
                    break;
                }
            }
        }

        report.metrics = metrics;
        report
    }

    async fn run_stage(&self, stage: Stage, metrics: &mut PipelineMetrics) -> Result<String> {
        match stage {
            Stage::Fetch => {
                let summary = self.fetcher.fetch_all(&self.channels, metrics).await;
                Ok(format!(
                    "{} messages from {} channels, {} failed",
                    summary.total_messages(),
                    summary.batches.len(),
                    summary.failed.len()
                ))
            }
            Stage::ExtractImages => {
                let stats = self.extractor.extract()?;
                metrics.record_extraction(stats.extracted, stats.missing);
                Ok(format!("{} images organized, {} missing", stats.extracted, stats.missing))
            }
            Stage::Detect => {
                let summary = self.detector.run(metrics).await?;
                Ok(format!(
                    "{} images processed, {} objects detected",
                    summary.images, summary.objects
                ))
            }
            Stage::LoadMessages => {
                let stats = self.loader.load_directory(&self.raw_dir, metrics)?;
                Ok(format!(
                    "{} messages loaded, {} duplicates skipped",
                    stats.inserted, stats.skipped
                ))
            }
            Stage::LoadDetections => {
                let stats = self.loader.load_detections(&self.detections_path, metrics)?;
                Ok(format!(
                    "{} detections stored, {} already present",
                    stats.inserted, stats.skipped
                ))
            }
            Stage::Transform => {
                let stats = transform::refresh(&self.db)?;
                Ok(format!(
                    "{} staged messages, {} channels, {} facts",
                    stats.staged, stats.channels, stats.facts
                ))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detection::{DetectedObject, MockObjectDetector};
    use crate::error::AnalyticsError;
    use crate::fetcher::{ChannelMessage, MockChannelClient};
    use chrono::{Duration as ChronoDuration, Utc};
    use tempfile::{tempdir, TempDir};

    fn config(dir: &TempDir) -> AppConfig {
        let path = |p: &str| dir.path().join(p).to_string_lossy().into_owned();
        let mut config = AppConfig::default();
        config.database.path = path("warehouse.db");
        config.ingestion.channels = vec!["https://t.me/chemed".to_string()];
        config.ingestion.raw_dir = path("raw");
        config.ingestion.media_dir = path("media");
        config.ingestion.image_dir = path("images");
        config.detection.output_path = path("enriched/detections.json");
        config
    }

    fn client_with_photo() -> MockChannelClient {
        let mut client = MockChannelClient::new();
        client.expect_fetch_messages().returning(|_, _| {
            let date = Utc::now() - ChronoDuration::hours(1);
            Ok(vec![
                ChannelMessage {
                    id: 1,
                    date,
                    text: Some("Paracetamol tablet in stock".to_string()),
                    views: Some(1200),
                    has_photo: true,
                },
                ChannelMessage {
                    id: 2,
                    date,
                    text: None,
                    views: None,
                    has_photo: false,
                },
            ])
        });
        client.expect_download_media().returning(|_, _, dest| {
            if let Some(parent) = dest.parent() {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::write(dest, b"jpeg")?;
            Ok(())
        });
        client
    }

    #[tokio::test]
    async fn test_full_run_populates_warehouse() {
        let dir = tempdir().unwrap();
        let config = config(&dir);
        let db = Database::new(&config.database_path()).unwrap();

        let mut detector = MockObjectDetector::new();
        detector.expect_detect().returning(|_| {
            Ok(vec![DetectedObject {
                label: "bottle".to_string(),
                confidence: 0.91,
            }])
        });

        let pipeline = Pipeline::new(&config, db.clone(), Box::new(client_with_photo()), Box::new(detector));
        let report = pipeline.run().await;

        assert!(report.succeeded(), "stages: {:?}", report.stages);
        assert_eq!(report.metrics.messages_fetched_total, 2);
        assert_eq!(report.metrics.images_extracted_total, 1);
        assert_eq!(report.metrics.messages_loaded_total, 2);
        assert_eq!(report.metrics.detections_loaded_total, 1);

        assert_eq!(db.count_raw_messages().unwrap(), 2);
        assert_eq!(db.count_fact_messages().unwrap(), 2);
        assert_eq!(db.count_channels().unwrap(), 1);
        let detections = db.detections_for_channel("chemed", 10).unwrap();
        assert_eq!(detections.len(), 1);
        assert_eq!(detections[0].relative_path, "chemed/chemed_1.jpg");

        // A second run is idempotent for messages and detections
        let mut detector = MockObjectDetector::new();
        detector.expect_detect().returning(|_| Ok(Vec::new()));
        let again = Pipeline::new(&config, db.clone(), Box::new(client_with_photo()), Box::new(detector));
        let report = again.run().await;
        assert!(report.succeeded());
        assert_eq!(report.metrics.duplicates_skipped_total, 2);
        assert_eq!(db.count_raw_messages().unwrap(), 2);
        assert_eq!(db.count_detections().unwrap(), 1);
    }

    #[tokio::test]
    async fn test_run_stops_at_failing_stage() {
        let dir = tempdir().unwrap();
        let config = config(&dir);
        let db = Database::new(&config.database_path()).unwrap();

        let mut client = MockChannelClient::new();
        client.expect_fetch_messages().returning(|_, _| {
            Err(AnalyticsError::ChannelApi {
                status: 401,
                message: "unauthorized".to_string(),
            })
        });
        let pipeline = Pipeline::new(&config, db, Box::new(client), Box::new(MockObjectDetector::new()));
        // The detections output path is a directory, so writing it fails
        std::fs::create_dir_all(dir.path().join("enriched/detections.json")).unwrap();
        let report = pipeline.run().await;

        assert!(!report.succeeded());
        let failed = report.failed_stage().unwrap();
        assert_eq!(failed.stage, Stage::Detect);
        assert_eq!(report.completed(), 2);
        assert_eq!(report.stages.len(), 3);
        assert_eq!(report.metrics.channels_failed_total, 1);
    }
}
