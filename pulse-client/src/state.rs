//! Durable client state behind an injected key-value interface.
//!
//! The scheduler and event store never touch ambient global state; everything
//! that must survive restarts (anonymous id, first-activation instant,
//! enabled flag, days-seen set) goes through `StateStore`.

use std::collections::BTreeSet;
use std::path::PathBuf;
use std::sync::Arc;

use chrono::{DateTime, NaiveDate, Utc};
use rand::RngCore;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StateError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Corrupt state value for key '{key}'")]
    Corrupt { key: String },
}

/// Minimal durable key-value surface. The host application may back this
/// with its own settings store; the default is a single JSON file.
pub trait StateStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>, StateError>;
    fn put(&self, key: &str, value: &str) -> Result<(), StateError>;
    fn remove(&self, key: &str) -> Result<(), StateError>;
}

/// JSON-file-backed `StateStore`. Reads and rewrites the whole file per
/// operation; all callers run on the client's single logical thread, so
/// there is no write contention to guard against.
pub struct FileStateStore {
    path: PathBuf,
}

impl FileStateStore {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    fn read_map(&self) -> Result<serde_json::Map<String, serde_json::Value>, StateError> {
        match std::fs::read_to_string(&self.path) {
            Ok(contents) => Ok(serde_json::from_str(&contents).unwrap_or_default()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Default::default()),
            Err(e) => Err(e.into()),
        }
    }

    fn write_map(&self, map: &serde_json::Map<String, serde_json::Value>) -> Result<(), StateError> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&self.path, serde_json::to_vec_pretty(map)?)?;
        Ok(())
    }
}

impl StateStore for FileStateStore {
    fn get(&self, key: &str) -> Result<Option<String>, StateError> {
        let map = self.read_map()?;
        Ok(map.get(key).and_then(|v| v.as_str()).map(String::from))
    }

    fn put(&self, key: &str, value: &str) -> Result<(), StateError> {
        let mut map = self.read_map()?;
        map.insert(key.to_string(), serde_json::Value::String(value.to_string()));
        self.write_map(&map)
    }

    fn remove(&self, key: &str) -> Result<(), StateError> {
        let mut map = self.read_map()?;
        if map.remove(key).is_some() {
            self.write_map(&map)?;
        }
        Ok(())
    }
}

const KEY_ANONYMOUS_ID: &str = "anonymous_id";
const KEY_FIRST_ACTIVATION: &str = "first_activation";
const KEY_ENABLED: &str = "enabled";
const KEY_DAYS_SEEN: &str = "days_seen";

/// Typed accessors over a `StateStore`.
#[derive(Clone)]
pub struct ClientState {
    store: Arc<dyn StateStore>,
}

impl ClientState {
    pub fn new(store: Arc<dyn StateStore>) -> Self {
        Self { store }
    }

    /// Per-installation random token, generated once and persisted. Never
    /// logged; leaves the machine only inside submissions, where the server
    /// hashes it before persisting.
    pub fn anonymous_id(&self) -> Result<String, StateError> {
        if let Some(id) = self.store.get(KEY_ANONYMOUS_ID)? {
            return Ok(id);
        }
        let mut bytes = [0u8; 16];
        rand::thread_rng().fill_bytes(&mut bytes);
        let id = hex::encode(bytes);
        self.store.put(KEY_ANONYMOUS_ID, &id)?;
        Ok(id)
    }

    /// Fixed anchor for the submission schedule. Initialized on first call
    /// and never reset afterwards, so the schedule survives restarts and
    /// disable/re-enable cycles without drift.
    pub fn first_activation(&self, now: DateTime<Utc>) -> Result<DateTime<Utc>, StateError> {
        if let Some(raw) = self.store.get(KEY_FIRST_ACTIVATION)? {
            return DateTime::parse_from_rfc3339(&raw)
                .map(|dt| dt.with_timezone(&Utc))
                .map_err(|_| StateError::Corrupt {
                    key: KEY_FIRST_ACTIVATION.to_string(),
                });
        }
        self.store.put(KEY_FIRST_ACTIVATION, &now.to_rfc3339())?;
        Ok(now)
    }

    pub fn is_enabled(&self) -> bool {
        matches!(self.store.get(KEY_ENABLED), Ok(Some(v)) if v == "true")
    }

    pub fn set_enabled(&self, enabled: bool) -> Result<(), StateError> {
        self.store.put(KEY_ENABLED, if enabled { "true" } else { "false" })
    }

    /// Record that `day` saw activity; returns the updated number of unique
    /// active days backing `aggregatedStats.uniqueDaysActive`.
    pub fn note_day_seen(&self, day: NaiveDate) -> Result<u64, StateError> {
        let mut days = self.days_seen()?;
        if days.insert(day) {
            let raw = serde_json::to_string(&days)?;
            self.store.put(KEY_DAYS_SEEN, &raw)?;
        }
        Ok(days.len() as u64)
    }

    fn days_seen(&self) -> Result<BTreeSet<NaiveDate>, StateError> {
        match self.store.get(KEY_DAYS_SEEN)? {
            Some(raw) => Ok(serde_json::from_str(&raw).unwrap_or_default()),
            None => Ok(BTreeSet::new()),
        }
    }
}
