//! Fixed protocol limits shared by the client and the server.
//!
//! The client enforces `CLIENT_PAYLOAD_MARGIN_BYTES` before sending so that
//! a well-behaved client never trips the server's hard `MAX_BODY_BYTES`
//! ceiling; the ceilings themselves are validated server-side regardless.

use std::time::Duration;

/// Maximum age an event may reach locally before pruning removes it.
pub const RETENTION_WINDOW: Duration = Duration::from_secs(7 * 24 * 60 * 60);

/// Default interval between scheduled submissions.
pub const SUBMIT_INTERVAL: Duration = Duration::from_secs(24 * 60 * 60);

/// Escalating retry delays after a failed submission attempt. Exhausting the
/// table falls back to the regular interval rather than retrying forever.
pub const RETRY_DELAYS: [Duration; 3] = [
    Duration::from_secs(30 * 60),
    Duration::from_secs(2 * 60 * 60),
    Duration::from_secs(6 * 60 * 60),
];

/// Requests allowed per caller identity within one rate window.
pub const RATE_LIMIT: u32 = 100;

/// Sliding rate-limit window.
pub const RATE_WINDOW: Duration = Duration::from_secs(60 * 60);

/// Hard server-side ceiling on a serialized submission body.
pub const MAX_BODY_BYTES: usize = 1024 * 1024;

/// Client-side safety margin under `MAX_BODY_BYTES`; payloads over this are
/// truncated before sending.
pub const CLIENT_PAYLOAD_MARGIN_BYTES: usize = 900 * 1024;

/// Number of most-recent events kept when a payload is truncated.
pub const TRUNCATE_KEEP_EVENTS: usize = 500;

/// Hard server-side ceiling on the number of events in one submission.
pub const MAX_EVENTS_PER_BATCH: usize = 1000;

/// Metadata keys allowed through sanitization; everything else is stripped.
pub const METADATA_WHITELIST: [&str; 4] = ["source", "trigger", "durationMs", "count"];

/// Number of most-recent persisted records scanned by the stats aggregator.
pub const STATS_RECENT_RECORDS: usize = 100;
