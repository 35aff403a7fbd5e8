//! Local event accumulation and retention pruning.
//!
//! One JSON file holds the open weekly batch. Read/parse failures are
//! treated as "no prior data" and never surface to the host application.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use pulse_core::limits::RETENTION_WINDOW;
use pulse_core::models::{AggregatedBatch, EventType, Metadata, TelemetryEvent};
use thiserror::Error;

use crate::state::{ClientState, StateError};

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("State error: {0}")]
    State(#[from] StateError),
}

#[derive(Clone)]
pub struct EventStore {
    path: PathBuf,
    state: ClientState,
    session_id: String,
    extension_version: String,
    host_version: String,
}

impl EventStore {
    pub fn new(
        path: PathBuf,
        state: ClientState,
        extension_version: String,
        host_version: String,
    ) -> Self {
        Self {
            path,
            state,
            // Ephemeral per-process token; stripped by the server, never stored.
            session_id: uuid::Uuid::new_v4().to_string(),
            extension_version,
            host_version,
        }
    }

    pub fn state(&self) -> &ClientState {
        &self.state
    }

    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    /// Current batch, or a fresh one keyed to the current ISO week when the
    /// file is absent or unreadable. Unreadable is deliberately not an error.
    pub fn load_batch(&self, now: DateTime<Utc>) -> Result<AggregatedBatch, StoreError> {
        match std::fs::read_to_string(&self.path) {
            Ok(contents) => match serde_json::from_str(&contents) {
                Ok(batch) => Ok(batch),
                Err(e) => {
                    tracing::warn!("Batch file unreadable, starting fresh: {}", e);
                    self.fresh_batch(now)
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => self.fresh_batch(now),
            Err(e) => {
                tracing::warn!("Batch file unreadable, starting fresh: {}", e);
                self.fresh_batch(now)
            }
        }
    }

    fn fresh_batch(&self, now: DateTime<Utc>) -> Result<AggregatedBatch, StoreError> {
        Ok(AggregatedBatch::new(
            self.session_id.clone(),
            self.extension_version.clone(),
            self.host_version.clone(),
            AggregatedBatch::week_start_for(now.date_naive()),
        ))
    }

    /// Append one event to the open batch. No-op while telemetry is
    /// disabled: no file is created, nothing is counted.
    pub fn record_event(
        &self,
        event_type: EventType,
        metadata: Option<Metadata>,
        now: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        if !self.state.is_enabled() {
            return Ok(());
        }

        let mut batch = self.load_batch(now)?;
        batch.record(TelemetryEvent {
            event_type,
            timestamp: now,
            anonymous_id: self.state.anonymous_id()?,
            metadata,
        });
        batch.aggregated_stats.unique_days_active = self.state.note_day_seen(now.date_naive())?;
        self.persist(&batch)
    }

    /// Drop events older than the retention window. Rewrites the file only
    /// when something was actually removed; runs once per session at
    /// telemetry initialization, not on every mutation.
    pub fn prune_expired(&self, now: DateTime<Utc>) -> Result<usize, StoreError> {
        if !self.exists() {
            return Ok(0);
        }
        let mut batch = self.load_batch(now)?;
        let cutoff = now
            - chrono::Duration::from_std(RETENTION_WINDOW).unwrap_or(chrono::Duration::days(7));
        let before = batch.events.len();
        batch.events.retain(|e| e.timestamp >= cutoff);
        let removed = before - batch.events.len();
        if removed > 0 {
            tracing::debug!("Pruned {} expired telemetry events", removed);
            self.persist(&batch)?;
        }
        Ok(removed)
    }

    /// Delete the local batch file (after a successful submission, or when
    /// the user disables telemetry).
    pub fn clear(&self) -> Result<(), StoreError> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    fn persist(&self, batch: &AggregatedBatch) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&self.path, serde_json::to_vec(batch)?)?;
        Ok(())
    }
}
