//! Output formatting and persistence for feed health and system summaries.
//!
//! Supports pretty-printing, JSON logging, and CSV append.

use anyhow::Result;
use chrono::{DateTime, Utc};
use csv::WriterBuilder;
use serde::Serialize;
use std::fs::OpenOptions;
use std::path::Path;
use tracing::{debug, info};

use crate::model::FeedKind;
use crate::stats::SystemStats;
use crate::store::{FeedState, HealthReport};

/// One feed's health at a point in time, flattened for CSV.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HealthRecord {
    pub timestamp: DateTime<Utc>,
    pub feed: FeedKind,
    pub state: FeedState,
    pub degraded: bool,
    pub consecutive_failures: u32,
    pub last_success: Option<DateTime<Utc>>,
    pub last_updated: Option<DateTime<Utc>>,
    pub dangling_reference_count: usize,
    pub violation_count: usize,
    pub last_error: Option<String>,
}

impl HealthRecord {
    pub fn from_report(report: &HealthReport, timestamp: DateTime<Utc>) -> Self {
        HealthRecord {
            timestamp,
            feed: report.feed,
            state: report.health.state,
            degraded: report.health.degraded,
            consecutive_failures: report.health.consecutive_failures,
            last_success: report.health.last_success,
            last_updated: report.last_updated,
            dangling_reference_count: report.dangling_reference_count,
            violation_count: report.health.last_violations.len(),
            last_error: report.health.last_error.clone(),
        }
    }
}

/// Logs system statistics using Rust's debug pretty-print format.
pub fn print_pretty(stats: &SystemStats) {
    debug!("{:#?}", stats);
}

/// Logs any serializable value as pretty-printed JSON.
pub fn print_json<T: Serialize>(value: &T) -> Result<()> {
    info!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Appends records as rows to a CSV file.
///
/// Creates the file with headers if it does not already exist.
pub fn append_records<T: Serialize>(path: &str, records: &[T]) -> Result<()> {
    let file_exists = Path::new(path).exists();
    debug!(path, file_exists, rows = records.len(), "Appending CSV records");

    let file = OpenOptions::new().append(true).create(true).open(path)?;

    let mut writer = WriterBuilder::new()
        .has_headers(!file_exists) // header only on a fresh file
        .from_writer(file);

    for record in records {
        writer.serialize(record)?;
    }
    writer.flush()?;

    Ok(())
}
