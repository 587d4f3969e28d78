use std::time::Duration;

use metrics::{counter, histogram};

/// Pipeline metrics.
///
/// Every event is forwarded to the `metrics` facade (a no-op until an exporter
/// installs a recorder) and tallied locally so a run can report its own summary.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct PipelineMetrics {
    pub messages_fetched_total: u64,
    pub channels_failed_total: u64,
    pub messages_loaded_total: u64,
    pub duplicates_skipped_total: u64,
    pub images_extracted_total: u64,
    pub images_missing_total: u64,
    pub images_scanned_total: u64,
    pub objects_detected_total: u64,
    pub detections_loaded_total: u64,
    pub errors_total: u64,
}

impl PipelineMetrics {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the outcome of fetching one channel
    pub fn record_fetch(&mut self, channel: &str, messages: usize, success: bool) {
        if success {
            self.messages_fetched_total += messages as u64;
            counter!("channel_analytics_messages_fetched_total", "channel" => channel.to_string())
                .increment(messages as u64);
        } else {
            self.channels_failed_total += 1;
            self.record_error("fetch");
        }
    }

    /// Record raw message loading
    pub fn record_load(&mut self, inserted: usize, skipped: usize) {
        self.messages_loaded_total += inserted as u64;
        self.duplicates_skipped_total += skipped as u64;
        counter!("channel_analytics_messages_loaded_total").increment(inserted as u64);
        counter!("channel_analytics_duplicates_skipped_total").increment(skipped as u64);
    }

    /// Record image extraction
    pub fn record_extraction(&mut self, extracted: usize, missing: usize) {
        self.images_extracted_total += extracted as u64;
        self.images_missing_total += missing as u64;
        counter!("channel_analytics_images_extracted_total").increment(extracted as u64);
        counter!("channel_analytics_images_missing_total").increment(missing as u64);
    }

    /// Record detection over one image
    pub fn record_detection(&mut self, objects: usize, duration: Duration, success: bool) {
        self.images_scanned_total += 1;
        self.objects_detected_total += objects as u64;
        counter!("channel_analytics_images_scanned_total").increment(1);
        counter!("channel_analytics_objects_detected_total").increment(objects as u64);
        histogram!("channel_analytics_detection_duration_seconds").record(duration.as_secs_f64());
        if !success {
            self.record_error("detection");
        }
    }

    /// Record detection rows loaded into the warehouse
    pub fn record_detections_loaded(&mut self, count: usize) {
        self.detections_loaded_total += count as u64;
        counter!("channel_analytics_detections_loaded_total").increment(count as u64);
    }

    /// Record how long a pipeline stage took
    pub fn record_stage(&self, stage: &str, duration: Duration, success: bool) {
        histogram!(
            "channel_analytics_stage_duration_seconds",
            "stage" => stage.to_string(),
            "status" => if success { "success" } else { "error" }
        )
        .record(duration.as_secs_f64());
    }

    /// Record an error of the given kind
    pub fn record_error(&mut self, kind: &str) {
        self.errors_total += 1;
        counter!("channel_analytics_errors_total", "type" => kind.to_string()).increment(1);
    }
}
