//! Facade the host application embeds.
//!
//! Scheduled telemetry failures never propagate to the host beyond log
//! output; only the explicit `submit_now` path reports success or failure
//! to the caller.

use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::Context;
use chrono::Utc;
use pulse_core::models::{EventType, Metadata};
use pulse_core::ClientConfig;
use tokio_util::sync::CancellationToken;

use crate::clock::SystemClock;
use crate::scheduler::SubmissionScheduler;
use crate::state::{ClientState, FileStateStore};
use crate::store::EventStore;
use crate::transport::{HttpTransport, SubmitResponse, Transport};

pub struct TelemetryClient {
    config: ClientConfig,
    store: EventStore,
    transport: Arc<dyn Transport>,
    // Replaced on re-enable: a cancelled token is spent.
    cancel: Mutex<CancellationToken>,
}

impl TelemetryClient {
    pub fn new(
        config: ClientConfig,
        extension_version: String,
        host_version: String,
    ) -> anyhow::Result<Self> {
        let data_dir = match &config.data_dir {
            Some(dir) => dir.clone(),
            None => dirs::data_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join("pulse"),
        };
        let state = ClientState::new(Arc::new(FileStateStore::new(data_dir.join("state.json"))));
        let store = EventStore::new(
            data_dir.join("batch.json"),
            state,
            extension_version,
            host_version,
        );
        let transport = Arc::new(HttpTransport::new(&config).context("building transport")?);
        Ok(Self::with_parts(config, store, transport))
    }

    /// Assemble from pre-built parts; used by tests to inject doubles.
    pub fn with_parts(
        config: ClientConfig,
        store: EventStore,
        transport: Arc<dyn Transport>,
    ) -> Self {
        let client = Self {
            config,
            store,
            transport,
            cancel: Mutex::new(CancellationToken::new()),
        };
        // Periodic compaction: once per session, not on every mutation.
        if client.store.state().is_enabled() {
            if let Err(e) = client.store.prune_expired(Utc::now()) {
                tracing::warn!("Retention pruning failed: {}", e);
            }
        }
        client
    }

    pub fn store(&self) -> &EventStore {
        &self.store
    }

    /// Turn collection on. Anchors `first_activation` on the very first
    /// enable and leaves it untouched on re-enable, so the submission
    /// schedule never drifts.
    pub fn enable(&self) -> anyhow::Result<()> {
        let now = Utc::now();
        self.store.state().set_enabled(true)?;
        self.store.state().first_activation(now)?;
        self.store.prune_expired(now)?;

        let mut cancel = self.cancel.lock().expect("cancel lock poisoned");
        if cancel.is_cancelled() {
            *cancel = CancellationToken::new();
        }
        Ok(())
    }

    /// Turn collection off: cancels all pending timers synchronously and
    /// deletes local data.
    pub fn disable(&self) -> anyhow::Result<()> {
        self.cancel.lock().expect("cancel lock poisoned").cancel();
        self.store.state().set_enabled(false)?;
        self.store.clear()?;
        Ok(())
    }

    /// Record one usage event. Never fails the caller; storage problems are
    /// logged and swallowed.
    pub fn track_event(&self, event_type: EventType, metadata: Option<Metadata>) {
        if let Err(e) = self.store.record_event(event_type, metadata, Utc::now()) {
            tracing::warn!("Could not record telemetry event: {}", e);
        }
    }

    /// Spawn the background scheduler on the current runtime.
    pub fn spawn_scheduler(&self) -> tokio::task::JoinHandle<()> {
        let scheduler = SubmissionScheduler::new(
            self.store.clone(),
            Arc::clone(&self.transport),
            Arc::new(SystemClock),
            self.cancel.lock().expect("cancel lock poisoned").clone(),
            Duration::from_secs(self.config.submit_interval_hours * 60 * 60),
        );
        tokio::spawn(scheduler.run())
    }

    /// Manual "submit now". Unlike the scheduled path this reports the
    /// outcome to the caller.
    pub async fn submit_now(&self) -> anyhow::Result<SubmitResponse> {
        if !self.transport.probe().await {
            anyhow::bail!("No network connectivity");
        }
        if !self.store.exists() {
            anyhow::bail!("No telemetry data pending submission");
        }
        let batch = self.store.load_batch(Utc::now())?;
        match self.transport.submit(&batch).await {
            Ok(response) => {
                self.store.clear()?;
                Ok(response)
            }
            Err(e) if !e.is_transient() => {
                // Same payload can never pass validation later; drop it.
                self.store.clear()?;
                Err(e.into())
            }
            Err(e) => Err(e.into()),
        }
    }
}
