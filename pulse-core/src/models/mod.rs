pub mod batch;
pub mod event;
pub mod record;

pub use batch::{AggregatedBatch, AggregatedStats, Platform};
pub use event::{EventType, Metadata, TelemetryEvent};
pub use record::ProcessedRecord;
