//! Anonymizing HTTP transport.
//!
//! Serializes the open batch, enforces the payload safety margin (truncating
//! the oldest events when exceeded) and performs the single-request exchange
//! with the ingestion service. Rate-limit responses map to a distinct error
//! so the scheduler can treat them like a connectivity failure.

use std::time::Duration;

use async_trait::async_trait;
use pulse_core::limits::{CLIENT_PAYLOAD_MARGIN_BYTES, TRUNCATE_KEEP_EVENTS};
use pulse_core::models::AggregatedBatch;
use pulse_core::ClientConfig;
use serde::Deserialize;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SubmitError {
    #[error("Serialization failed: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Rate limited by server")]
    RateLimited,

    #[error("Server rejected submission with status {status}")]
    Rejected { status: u16 },
}

impl SubmitError {
    /// Whether the scheduler should retry this failure later. Client-side
    /// validation rejections (4xx other than 429) never become valid by
    /// resubmitting the same payload, so they are terminal.
    pub fn is_transient(&self) -> bool {
        match self {
            SubmitError::RateLimited | SubmitError::Http(_) | SubmitError::Serialize(_) => true,
            SubmitError::Rejected { status } => *status >= 500,
        }
    }
}

/// Success body from POST /api/telemetry.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitResponse {
    pub success: bool,
    #[serde(default)]
    pub events_processed: u64,
    #[serde(default)]
    pub file_id: String,
}

#[async_trait]
pub trait Transport: Send + Sync {
    /// Bounded-timeout reachability check against a stable endpoint. Any
    /// response at all counts as connectivity.
    async fn probe(&self) -> bool;

    /// Submit the batch. Only a 2xx response is success.
    async fn submit(&self, batch: &AggregatedBatch) -> Result<SubmitResponse, SubmitError>;
}

pub struct HttpTransport {
    http: reqwest::Client,
    submit_url: String,
    probe_url: String,
    probe_timeout: Duration,
}

impl HttpTransport {
    pub fn new(config: &ClientConfig) -> Result<Self, reqwest::Error> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()?;
        Ok(Self {
            http,
            submit_url: format!("{}/api/telemetry", config.endpoint.trim_end_matches('/')),
            probe_url: config.probe_url.clone(),
            probe_timeout: Duration::from_secs(config.probe_timeout_seconds),
        })
    }

    /// Batch to actually send: the original, or a copy truncated to the most
    /// recent events when the serialized payload exceeds the safety margin.
    /// Aggregated counters are cumulative and are never truncated.
    fn payload_for(&self, batch: &AggregatedBatch) -> Result<AggregatedBatch, SubmitError> {
        let size = serde_json::to_vec(batch)?.len();
        if size <= CLIENT_PAYLOAD_MARGIN_BYTES {
            return Ok(batch.clone());
        }
        let mut truncated = batch.clone();
        let keep_from = truncated.events.len().saturating_sub(TRUNCATE_KEEP_EVENTS);
        truncated.events.drain(..keep_from);
        tracing::warn!(
            "Payload of {} bytes over safety margin; truncated {} -> {} events",
            size,
            batch.events.len(),
            truncated.events.len()
        );
        Ok(truncated)
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn probe(&self) -> bool {
        self.http
            .get(&self.probe_url)
            .timeout(self.probe_timeout)
            .send()
            .await
            .is_ok()
    }

    async fn submit(&self, batch: &AggregatedBatch) -> Result<SubmitResponse, SubmitError> {
        let payload = self.payload_for(batch)?;
        let response = self.http.post(&self.submit_url).json(&payload).send().await?;

        let status = response.status();
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(SubmitError::RateLimited);
        }
        if !status.is_success() {
            return Err(SubmitError::Rejected {
                status: status.as_u16(),
            });
        }

        Ok(response.json().await.unwrap_or(SubmitResponse {
            success: true,
            events_processed: 0,
            file_id: String::new(),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, Utc};
    use pulse_core::models::{EventType, TelemetryEvent};
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn make_batch(event_count: usize) -> AggregatedBatch {
        let mut batch = AggregatedBatch::new(
            "session".to_string(),
            "1.2.3".to_string(),
            "1.90.0".to_string(),
            NaiveDate::from_ymd_opt(2026, 8, 24).unwrap(),
        );
        for _ in 0..event_count {
            batch.record(TelemetryEvent {
                event_type: EventType::ThoughtCreated,
                timestamp: Utc::now(),
                anonymous_id: "a".repeat(32),
                metadata: None,
            });
        }
        batch
    }

    async fn make_transport(server: &MockServer) -> HttpTransport {
        let config = ClientConfig {
            endpoint: server.uri(),
            probe_url: format!("{}/probe", server.uri()),
            probe_timeout_seconds: 2,
            ..Default::default()
        };
        HttpTransport::new(&config).unwrap()
    }

    #[tokio::test]
    async fn test_submit_success_parses_response() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/telemetry"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "success": true,
                "eventsProcessed": 3,
                "fileId": "telemetry_2026-08-28_abc123def456.json"
            })))
            .mount(&server)
            .await;

        let transport = make_transport(&server).await;
        let response = transport.submit(&make_batch(3)).await.unwrap();
        assert!(response.success);
        assert_eq!(response.events_processed, 3);
    }

    #[tokio::test]
    async fn test_submit_429_maps_to_rate_limited() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/telemetry"))
            .respond_with(ResponseTemplate::new(429))
            .mount(&server)
            .await;

        let transport = make_transport(&server).await;
        let err = transport.submit(&make_batch(1)).await.unwrap_err();
        assert!(matches!(err, SubmitError::RateLimited));
        assert!(err.is_transient());
    }

    #[tokio::test]
    async fn test_submit_400_is_terminal_rejection() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/telemetry"))
            .respond_with(ResponseTemplate::new(400))
            .mount(&server)
            .await;

        let transport = make_transport(&server).await;
        let err = transport.submit(&make_batch(1)).await.unwrap_err();
        assert!(matches!(err, SubmitError::Rejected { status: 400 }));
        assert!(!err.is_transient());
    }

    #[tokio::test]
    async fn test_submit_500_is_transient() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/telemetry"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let transport = make_transport(&server).await;
        let err = transport.submit(&make_batch(1)).await.unwrap_err();
        assert!(matches!(err, SubmitError::Rejected { status: 500 }));
        assert!(err.is_transient());
    }

    #[tokio::test]
    async fn test_probe_true_on_any_response() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/probe"))
            .respond_with(ResponseTemplate::new(204))
            .mount(&server)
            .await;

        let transport = make_transport(&server).await;
        assert!(transport.probe().await);
    }

    #[test]
    fn test_oversized_payload_truncates_events_not_counters() {
        let config = ClientConfig::default();
        let transport = HttpTransport::new(&config).unwrap();

        // Events with bulky metadata so 2000 of them exceed the margin.
        let mut batch = make_batch(0);
        for _ in 0..2000 {
            let mut metadata = pulse_core::models::Metadata::new();
            metadata.insert(
                "source".to_string(),
                serde_json::Value::String("x".repeat(600)),
            );
            batch.record(TelemetryEvent {
                event_type: EventType::GraphOpened,
                timestamp: Utc::now(),
                anonymous_id: "a".repeat(32),
                metadata: Some(metadata),
            });
        }

        let payload = transport.payload_for(&batch).unwrap();
        assert_eq!(payload.events.len(), TRUNCATE_KEEP_EVENTS);
        assert_eq!(payload.aggregated_stats.graph_opened, 2000);
    }

    #[test]
    fn test_small_payload_not_truncated() {
        let config = ClientConfig::default();
        let transport = HttpTransport::new(&config).unwrap();
        let batch = make_batch(10);
        let payload = transport.payload_for(&batch).unwrap();
        assert_eq!(payload.events.len(), 10);
    }
}
