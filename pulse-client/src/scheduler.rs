//! Submission scheduling state machine.
//!
//! States: `Idle → Armed → Submitting → {Idle | RetryArmed} → … → Idle`.
//!
//! Every submission instant is computed from the fixed first-activation
//! anchor as `first_activation + k * interval`, so the schedule survives
//! restarts without drift regardless of when the process happens to run.
//! A failed attempt walks the escalating `RETRY_DELAYS` table, re-probing
//! connectivity before each retry; exhausting the table falls back to the
//! next regular interval. Disabling telemetry cancels everything through
//! the shared `CancellationToken`.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use pulse_core::limits::RETRY_DELAYS;
use tokio_util::sync::CancellationToken;

use crate::clock::Clock;
use crate::store::EventStore;
use crate::transport::Transport;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    Idle,
    Armed,
    Submitting,
    RetryArmed(usize),
}

/// Smallest `first_activation + k * interval` strictly after `now`. A zero
/// or unrepresentable interval (reachable through configuration) falls back
/// to the default cadence instead of dividing by zero.
pub fn next_submission_instant(
    first_activation: DateTime<Utc>,
    now: DateTime<Utc>,
    interval: Duration,
) -> DateTime<Utc> {
    let interval = chrono::Duration::from_std(interval)
        .ok()
        .filter(|i| *i > chrono::Duration::zero())
        .unwrap_or_else(|| {
            chrono::Duration::from_std(pulse_core::limits::SUBMIT_INTERVAL)
                .unwrap_or(chrono::Duration::hours(24))
        });
    if now < first_activation {
        return first_activation;
    }
    let elapsed = now - first_activation;
    let k = elapsed.num_seconds() / interval.num_seconds() + 1;
    first_activation + interval * (k as i32)
}

enum Attempt {
    /// Cycle finished: submitted, discarded, or nothing to send.
    Done,
    /// Transient failure; eligible for the retry table.
    Retry,
}

pub struct SubmissionScheduler {
    store: EventStore,
    transport: Arc<dyn Transport>,
    clock: Arc<dyn Clock>,
    cancel: CancellationToken,
    interval: Duration,
    state: SchedulerState,
    in_flight: bool,
}

impl SubmissionScheduler {
    pub fn new(
        store: EventStore,
        transport: Arc<dyn Transport>,
        clock: Arc<dyn Clock>,
        cancel: CancellationToken,
        interval: Duration,
    ) -> Self {
        Self {
            store,
            transport,
            clock,
            cancel,
            interval,
            state: SchedulerState::Idle,
            in_flight: false,
        }
    }

    pub fn state(&self) -> SchedulerState {
        self.state
    }

    /// Drive the recurring schedule until cancelled. Each iteration arms a
    /// fresh one-shot for the next computed instant rather than reusing a
    /// periodic timer, so retry cycles never skew the regular cadence.
    pub async fn run(mut self) {
        loop {
            let now = self.clock.now();
            let first = match self.store.state().first_activation(now) {
                Ok(first) => first,
                Err(e) => {
                    tracing::warn!("Scheduler stopping, state unavailable: {}", e);
                    return;
                }
            };
            let next = next_submission_instant(first, now, self.interval);
            self.state = SchedulerState::Armed;
            let wait = (next - now).to_std().unwrap_or(Duration::ZERO);
            tracing::debug!("Next submission armed in {}s", wait.as_secs());

            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => {
                    self.state = SchedulerState::Idle;
                    return;
                }
                _ = self.clock.sleep(wait) => {}
            }

            self.submit_cycle().await;
        }
    }

    /// One full submission cycle: probe + submit, then walk the retry table
    /// on transient failure. Guarded against re-entrant double submission.
    async fn submit_cycle(&mut self) {
        if self.in_flight {
            tracing::debug!("Submission already in flight; skipping");
            return;
        }
        self.in_flight = true;
        self.state = SchedulerState::Submitting;

        let mut attempt = self.attempt_once().await;
        let mut index = 0;
        while matches!(attempt, Attempt::Retry) && index < RETRY_DELAYS.len() {
            self.state = SchedulerState::RetryArmed(index);
            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => {
                    self.state = SchedulerState::Idle;
                    self.in_flight = false;
                    return;
                }
                _ = self.clock.sleep(RETRY_DELAYS[index]) => {}
            }
            attempt = self.attempt_once().await;
            index += 1;
        }

        if matches!(attempt, Attempt::Retry) {
            tracing::info!("Retry delays exhausted; waiting for next regular interval");
        }
        self.state = SchedulerState::Idle;
        self.in_flight = false;
    }

    async fn attempt_once(&self) -> Attempt {
        if !self.transport.probe().await {
            tracing::debug!("Connectivity probe failed");
            return Attempt::Retry;
        }

        if !self.store.exists() {
            return Attempt::Done;
        }
        let now = self.clock.now();
        let batch = match self.store.load_batch(now) {
            Ok(batch) => batch,
            Err(e) => {
                tracing::warn!("Could not load batch for submission: {}", e);
                return Attempt::Done;
            }
        };

        match self.transport.submit(&batch).await {
            Ok(response) => {
                tracing::info!(
                    "Submission accepted: {} events processed, record {}",
                    response.events_processed,
                    response.file_id
                );
                if let Err(e) = self.store.clear() {
                    tracing::warn!("Could not clear submitted batch: {}", e);
                }
                Attempt::Done
            }
            Err(e) if e.is_transient() => {
                tracing::debug!("Transient submission failure: {}", e);
                Attempt::Retry
            }
            Err(e) => {
                // Resubmitting the identical payload can never succeed, so a
                // validation rejection discards the batch instead of retrying.
                tracing::warn!("Submission rejected as invalid; discarding batch: {}", e);
                if let Err(e) = self.store.clear() {
                    tracing::warn!("Could not clear rejected batch: {}", e);
                }
                Attempt::Done
            }
        }
    }
}
