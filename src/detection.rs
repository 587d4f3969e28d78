//! Object detection over organized images.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::time::Instant;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::process::Command;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::batch::write_detections;
use crate::config::DetectionConfig;
use crate::error::{AnalyticsError, Result};
use crate::metrics::PipelineMetrics;
use crate::models::DetectionRecord;

/// A single labeled detection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectedObject {
    /// Class label
    pub label: String,
    /// Detector confidence, 0-1
    pub confidence: f64,
}

/// A model that labels the objects in an image
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ObjectDetector: Send + Sync {
    async fn detect(&self, image: &Path) -> Result<Vec<DetectedObject>>;
}

/// Runs an external executable per image.
///
/// The image path is appended to the configured arguments; the process must
/// print a JSON array of `{"label", "confidence"}` objects on stdout.
pub struct CommandDetector {
    command: String,
    args: Vec<String>,
}

impl CommandDetector {
    /// Detector running `config.command` with `config.args`
    #[must_use]
    pub fn new(config: &DetectionConfig) -> Self {
        Self {
            command: config.command.clone(),
            args: config.args.clone(),
        }
    }
}

#[async_trait]
impl ObjectDetector for CommandDetector {
    async fn detect(&self, image: &Path) -> Result<Vec<DetectedObject>> {
        let failure = |message: String| AnalyticsError::Detection {
            path: image.display().to_string(),
            message,
        };

        let output = Command::new(&self.command)
            .args(&self.args)
            .arg(image)
            .output()
            .await
            .map_err(|e| failure(format!("failed to run {}: {e}", self.command)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(failure(format!("{} exited with {}: {}", self.command, output.status, stderr.trim())));
        }

        serde_json::from_slice(&output.stdout).map_err(|e| failure(format!("unreadable detector output: {e}")))
    }
}

/// Collapse raw detections into a record: distinct sorted labels and the
/// highest confidence.
#[must_use]
pub fn detection_record(file_path: &Path, image_dir: &Path, objects: &[DetectedObject]) -> DetectionRecord {
    let labels: BTreeSet<&str> = objects.iter().map(|o| o.label.as_str()).collect();
    let detected_objects: Vec<String> = labels.into_iter().map(ToString::to_string).collect();
    let confidence_score = objects.iter().map(|o| o.confidence).reduce(f64::max);

    let relative_path = file_path
        .strip_prefix(image_dir)
        .unwrap_or(file_path)
        .to_string_lossy()
        .into_owned();
    let filename = file_path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();

    DetectionRecord {
        file_path: file_path.to_string_lossy().into_owned(),
        relative_path,
        filename,
        object_count: detected_objects.len(),
        detected_objects,
        confidence_score,
    }
}

/// Outcome of a detection run
#[derive(Debug, Default, Clone, PartialEq)]
pub struct DetectionRunSummary {
    /// Images processed
    pub images: usize,
    /// Distinct labels summed over images
    pub objects: usize,
    /// Images the detector failed on
    pub failed: usize,
    /// Where the detections file was written
    pub output_path: PathBuf,
}

/// Walks the image tree, runs the detector and writes the detections file
pub struct DetectionRunner {
    detector: Box<dyn ObjectDetector>,
    image_dir: PathBuf,
    output_path: PathBuf,
    extensions: Vec<String>,
}

impl DetectionRunner {
    pub fn new(detector: Box<dyn ObjectDetector>, image_dir: PathBuf, output_path: PathBuf, extensions: &[String]) -> Self {
        Self {
            detector,
            image_dir,
            output_path,
            extensions: extensions.iter().map(|e| e.trim_start_matches('.').to_lowercase()).collect(),
        }
    }

    fn is_image(&self, path: &Path) -> bool {
        path.extension()
            .map(|ext| ext.to_string_lossy().to_lowercase())
            .is_some_and(|ext| self.extensions.contains(&ext))
    }

    /// Image files below the image directory, in path order
    pub fn find_images(&self) -> Result<Vec<PathBuf>> {
        if !self.image_dir.exists() {
            return Ok(Vec::new());
        }

        let mut images = Vec::new();
        for entry in WalkDir::new(&self.image_dir).sort_by_file_name() {
            let entry = entry?;
            if entry.file_type().is_file() && self.is_image(entry.path()) {
                images.push(entry.into_path());
            }
        }
        Ok(images)
    }

    /// Detect objects in every image.
    ///
    /// A failing image is logged and recorded with no objects. The detections
    /// file is always written, empty when there are no images.
    pub async fn run(&self, metrics: &mut PipelineMetrics) -> Result<DetectionRunSummary> {
        if !self.image_dir.exists() {
            warn!(path = %self.image_dir.display(), "Image directory does not exist; run image extraction first");
        }

        let images = self.find_images()?;
        let mut records = Vec::with_capacity(images.len());
        let mut summary = DetectionRunSummary {
            output_path: self.output_path.clone(),
            ..DetectionRunSummary::default()
        };

        for image in &images {
            let started = Instant::now();
            let (objects, success) = match self.detector.detect(image).await {
                Ok(objects) => (objects, true),
                Err(e) => {
                    warn!(path = %image.display(), error = %e, "Detection failed");
                    summary.failed += 1;
                    (Vec::new(), false)
                }
            };

            let record = detection_record(image, &self.image_dir, &objects);
            debug!(path = %image.display(), objects = ?record.detected_objects, "Detected");
            metrics.record_detection(record.object_count, started.elapsed(), success);

            summary.objects += record.object_count;
            records.push(record);
        }
        summary.images = records.len();

        write_detections(&records, &self.output_path)?;
        info!(
            images = summary.images,
            objects = summary.objects,
            failed = summary.failed,
            path = %self.output_path.display(),
            "Detection complete"
        );
        Ok(summary)
    }
}
