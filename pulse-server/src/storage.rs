//! File-based persistence and on-demand aggregate statistics.
//!
//! Each accepted submission becomes one immutable JSON record named
//! `telemetry_<date>_<random-hex>.json`. The random suffix makes collisions
//! negligible, so there is no retry-on-collision path. Stats aggregation is
//! best-effort: an unreadable record is logged and skipped, never aborting
//! the whole computation.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::SystemTime;

use chrono::Utc;
use pulse_core::limits::STATS_RECENT_RECORDS;
use pulse_core::models::ProcessedRecord;
use rand::RngCore;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub struct TelemetryStorage {
    dir: PathBuf,
}

/// Rolling aggregate over the most recent persisted records.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatsSummary {
    pub total_records: u64,
    pub total_events: u64,
    pub events_by_type: BTreeMap<String, u64>,
    pub by_platform: BTreeMap<String, u64>,
    pub by_version: BTreeMap<String, u64>,
}

impl TelemetryStorage {
    pub fn new(dir: PathBuf) -> Self {
        Self { dir }
    }

    pub fn dir(&self) -> &PathBuf {
        &self.dir
    }

    /// Persist one sanitized record; returns the generated file id. The
    /// directory create is idempotent and safe to race across requests.
    pub fn write_record(&self, record: &Value) -> Result<String, StorageError> {
        std::fs::create_dir_all(&self.dir)?;

        let mut suffix = [0u8; 6];
        rand::thread_rng().fill_bytes(&mut suffix);
        let file_id = format!(
            "telemetry_{}_{}.json",
            Utc::now().format("%Y-%m-%d"),
            hex::encode(suffix)
        );

        std::fs::write(self.dir.join(&file_id), serde_json::to_vec_pretty(record)?)?;
        Ok(file_id)
    }

    /// Scan the most recent records and accumulate counts. Fails open: a
    /// record that cannot be read or parsed is skipped with a log line.
    pub fn compute_stats(&self) -> Result<StatsSummary, StorageError> {
        let mut summary = StatsSummary::default();

        let entries = match std::fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(summary),
            Err(e) => return Err(e.into()),
        };

        let mut files: Vec<(SystemTime, PathBuf)> = entries
            .filter_map(|entry| entry.ok())
            .filter(|entry| {
                entry
                    .file_name()
                    .to_str()
                    .is_some_and(|name| name.starts_with("telemetry_") && name.ends_with(".json"))
            })
            .filter_map(|entry| {
                let modified = entry.metadata().and_then(|m| m.modified()).ok()?;
                Some((modified, entry.path()))
            })
            .collect();
        files.sort_by(|a, b| b.0.cmp(&a.0));
        files.truncate(STATS_RECENT_RECORDS);

        for (_, path) in files {
            let record: ProcessedRecord = match std::fs::read_to_string(&path)
                .map_err(StorageError::from)
                .and_then(|contents| serde_json::from_str(&contents).map_err(StorageError::from))
            {
                Ok(record) => record,
                Err(e) => {
                    tracing::warn!("Skipping unreadable record {}: {}", path.display(), e);
                    continue;
                }
            };

            summary.total_records += 1;
            summary.total_events += record.events.len() as u64;
            for event in &record.events {
                *summary
                    .events_by_type
                    .entry(event.event_type.as_wire().to_string())
                    .or_default() += 1;
            }
            let platform = serde_json::to_value(record.platform)
                .ok()
                .and_then(|v| v.as_str().map(String::from))
                .unwrap_or_else(|| "unknown".to_string());
            *summary.by_platform.entry(platform).or_default() += 1;
            *summary
                .by_version
                .entry(record.extension_version.clone())
                .or_default() += 1;
        }

        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    fn sample_record(extension_version: &str, event_types: &[&str]) -> Value {
        let events: Vec<Value> = event_types
            .iter()
            .map(|event_type| {
                json!({
                    "eventType": event_type,
                    "timestamp": "2026-08-28T10:00:00Z",
                    "anonymousId": "deadbeef"
                })
            })
            .collect();
        json!({
            "receivedAt": "2026-08-28T12:00:00Z",
            "serverVersion": "0.1.0",
            "ipHash": "aa".repeat(32),
            "extensionVersion": extension_version,
            "hostVersion": "1.90.0",
            "platform": "linux",
            "weekStart": "2026-08-24",
            "events": events,
            "aggregatedStats": {"thoughtsCreated": 0, "graphOpened": 0, "suggestRelatedUsed": 0,
                                "semanticSearchUsed": 0, "semanticAiGraphUsed": 0, "uniqueDaysActive": 1}
        })
    }

    #[test]
    fn test_write_record_uses_collision_resistant_name() {
        let dir = TempDir::new().unwrap();
        let storage = TelemetryStorage::new(dir.path().to_path_buf());
        let file_id = storage.write_record(&sample_record("1.0.0", &[])).unwrap();

        assert!(file_id.starts_with("telemetry_"));
        assert!(file_id.ends_with(".json"));
        // telemetry_YYYY-MM-DD_<12 hex>.json
        let suffix = file_id
            .trim_end_matches(".json")
            .rsplit('_')
            .next()
            .unwrap();
        assert_eq!(suffix.len(), 12);
        assert!(dir.path().join(&file_id).exists());
    }

    #[test]
    fn test_records_are_never_overwritten() {
        let dir = TempDir::new().unwrap();
        let storage = TelemetryStorage::new(dir.path().to_path_buf());
        let a = storage.write_record(&sample_record("1.0.0", &[])).unwrap();
        let b = storage.write_record(&sample_record("1.0.0", &[])).unwrap();
        assert_ne!(a, b);
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 2);
    }

    #[test]
    fn test_compute_stats_accumulates_counts() {
        let dir = TempDir::new().unwrap();
        let storage = TelemetryStorage::new(dir.path().to_path_buf());
        storage
            .write_record(&sample_record("1.0.0", &["thought_created", "thought_created"]))
            .unwrap();
        storage
            .write_record(&sample_record("1.1.0", &["graph_opened"]))
            .unwrap();

        let stats = storage.compute_stats().unwrap();
        assert_eq!(stats.total_records, 2);
        assert_eq!(stats.total_events, 3);
        assert_eq!(stats.events_by_type["thought_created"], 2);
        assert_eq!(stats.events_by_type["graph_opened"], 1);
        assert_eq!(stats.by_platform["linux"], 2);
        assert_eq!(stats.by_version["1.0.0"], 1);
        assert_eq!(stats.by_version["1.1.0"], 1);
    }

    #[test]
    fn test_compute_stats_skips_unreadable_records() {
        let dir = TempDir::new().unwrap();
        let storage = TelemetryStorage::new(dir.path().to_path_buf());
        storage
            .write_record(&sample_record("1.0.0", &["graph_opened"]))
            .unwrap();
        std::fs::write(dir.path().join("telemetry_2026-08-28_badbadbadbad.json"), b"{oops")
            .unwrap();

        let stats = storage.compute_stats().unwrap();
        assert_eq!(stats.total_records, 1);
        assert_eq!(stats.total_events, 1);
    }

    #[test]
    fn test_compute_stats_on_missing_dir_is_empty() {
        let storage = TelemetryStorage::new(PathBuf::from("/nonexistent/pulse-stats-test"));
        let stats = storage.compute_stats().unwrap();
        assert_eq!(stats.total_records, 0);
    }
}
