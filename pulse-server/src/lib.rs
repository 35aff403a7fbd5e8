//! Pulse ingestion service.
//!
//! Request pipeline for `POST /api/telemetry`:
//! rate limit → validate → sanitize/anonymize → persist. Aggregate stats
//! are computed on demand from the persisted records.

pub mod http;
pub mod ratelimit;
pub mod sanitize;
pub mod storage;
pub mod validate;
