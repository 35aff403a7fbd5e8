pub mod config;
pub mod limits;
pub mod models;

pub use config::{ClientConfig, PulseConfig, ServerConfig};
pub use models::{
    AggregatedBatch, AggregatedStats, EventType, Platform, ProcessedRecord, TelemetryEvent,
};
