use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use super::batch::{AggregatedStats, Platform};
use super::event::TelemetryEvent;

/// One accepted, sanitized submission as persisted server-side. Write-once:
/// the file is never updated or appended to after creation.
///
/// Compared to the incoming batch: `sessionId` is gone, every event's
/// `anonymousId` is a one-way hash, and the server stamps receipt metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessedRecord {
    pub received_at: DateTime<Utc>,
    pub server_version: String,
    /// Salted hash of the caller's network address; the address itself is
    /// never retained.
    pub ip_hash: String,
    pub extension_version: String,
    pub host_version: String,
    pub platform: Platform,
    pub week_start: NaiveDate,
    pub events: Vec<TelemetryEvent>,
    pub aggregated_stats: AggregatedStats,
}
