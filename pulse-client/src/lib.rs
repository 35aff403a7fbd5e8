//! Client-side telemetry collector for the Pulse pipeline.
//!
//! - `state` — injected key-value state (anonymous id, first activation,
//!   enabled flag, days-seen set)
//! - `store` — local batch accumulation and retention pruning
//! - `clock` — injectable time source driving the scheduler
//! - `transport` — anonymized HTTP submission with payload truncation
//! - `scheduler` — the Armed/Submitting/RetryArmed state machine
//! - `client` — facade the host application embeds

pub mod client;
pub mod clock;
pub mod scheduler;
pub mod state;
pub mod store;
pub mod transport;

pub use client::TelemetryClient;
pub use clock::{Clock, SystemClock};
pub use scheduler::{next_submission_instant, SchedulerState, SubmissionScheduler};
pub use state::{ClientState, FileStateStore, StateError, StateStore};
pub use store::{EventStore, StoreError};
pub use transport::{HttpTransport, SubmitError, SubmitResponse, Transport};
