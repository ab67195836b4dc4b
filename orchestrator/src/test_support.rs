//! Shared fixtures for unit tests.

use std::path::Path;
use std::sync::Arc;

use chrono::NaiveDate;

use crate::models::TripRequest;
use crate::telemetry::{LocalLog, TelemetrySink};

pub fn trip(destinations: &[&str]) -> TripRequest {
    TripRequest {
        origin: "San Mateo, CA".into(),
        destinations: destinations.iter().map(|d| d.to_string()).collect(),
        start_date: NaiveDate::from_ymd_opt(2027, 1, 10).unwrap(),
        end_date: NaiveDate::from_ymd_opt(2027, 1, 16).unwrap(),
        interests: "swimming, hiking".into(),
        passengers: 2,
    }
}

/// Sink with no remote backend, writing JSONL under `dir`.
pub fn local_sink(dir: &Path) -> Arc<TelemetrySink> {
    Arc::new(TelemetrySink::new(None, LocalLog::new(dir)))
}

/// Every JSON record written to the local telemetry files under `dir`.
pub fn read_events(dir: &Path) -> Vec<serde_json::Value> {
    let mut files: Vec<_> = std::fs::read_dir(dir)
        .map(|entries| entries.filter_map(Result::ok).map(|e| e.path()).collect())
        .unwrap_or_default();
    files.sort();
    files
        .iter()
        .flat_map(|path| {
            std::fs::read_to_string(path)
                .unwrap()
                .lines()
                .map(|line| serde_json::from_str(line).unwrap())
                .collect::<Vec<serde_json::Value>>()
        })
        .collect()
}
