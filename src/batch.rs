//! JSON batch files on disk.
//!
//! Raw message batches live at `raw_dir/<YYYY-MM-DD>/<channel>.json`; detection
//! results are a single JSON array file. Both are written pretty-printed so
//! they stay diffable.

use std::fs::{create_dir_all, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use serde::de::DeserializeOwned;
use serde::Serialize;
use walkdir::WalkDir;

use crate::error::Result;
use crate::models::{DetectionRecord, RawMessage};

/// Location of the batch for `channel` scraped on `date`
#[must_use]
pub fn batch_path(raw_dir: &Path, date: NaiveDate, channel: &str) -> PathBuf {
    raw_dir
        .join(date.format("%Y-%m-%d").to_string())
        .join(format!("{channel}.json"))
}

/// Channel a batch belongs to, taken from its file stem
#[must_use]
pub fn channel_from_path(path: &Path) -> Option<String> {
    path.file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .filter(|stem| !stem.is_empty())
}

/// Write a raw message batch, creating parent directories.
///
/// # Errors
///
/// Returns an error if directory creation or writing fails.
pub fn write_batch(messages: &[RawMessage], path: &Path) -> Result<()> {
    write_json_file(messages, path)
}

/// Read one raw batch
pub fn read_batch(path: &Path) -> Result<Vec<RawMessage>> {
    read_json_file(path)
}

/// All `.json` batch files below `raw_dir`, in path order.
///
/// A missing directory yields no batches.
pub fn find_batches(raw_dir: &Path) -> Result<Vec<PathBuf>> {
    if !raw_dir.exists() {
        return Ok(Vec::new());
    }

    let mut batches = Vec::new();
    for entry in WalkDir::new(raw_dir).sort_by_file_name() {
        let entry = entry?;
        let is_json = entry
            .path()
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));
        if entry.file_type().is_file() && is_json {
            batches.push(entry.into_path());
        }
    }
    Ok(batches)
}

/// Write detection records as one JSON array
pub fn write_detections(records: &[DetectionRecord], path: &Path) -> Result<()> {
    write_json_file(records, path)
}

/// Read a detections file
pub fn read_detections(path: &Path) -> Result<Vec<DetectionRecord>> {
    read_json_file(path)
}

fn write_json_file<T: Serialize + ?Sized>(value: &T, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        create_dir_all(parent)?;
    }

    let file = File::create(path)?;
    let mut writer = BufWriter::new(file);
    serde_json::to_writer_pretty(&mut writer, value)?;
    writer.flush()?;
    Ok(())
}

fn read_json_file<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let file = File::open(path)?;
    Ok(serde_json::from_reader(BufReader::new(file))?)
}
