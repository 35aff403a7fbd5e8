use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};

use super::event::{EventType, TelemetryEvent};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    Windows,
    Macos,
    Linux,
}

impl Platform {
    /// Platform of the running client, from the build target.
    pub fn current() -> Platform {
        if cfg!(target_os = "windows") {
            Platform::Windows
        } else if cfg!(target_os = "macos") {
            Platform::Macos
        } else {
            Platform::Linux
        }
    }
}

/// Running counters maintained alongside the raw event list. Cumulative, so
/// payload truncation never touches them.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AggregatedStats {
    pub thoughts_created: u64,
    pub graph_opened: u64,
    pub suggest_related_used: u64,
    pub semantic_search_used: u64,
    pub semantic_ai_graph_used: u64,
    pub unique_days_active: u64,
}

impl AggregatedStats {
    pub fn increment(&mut self, event_type: EventType) {
        match event_type {
            EventType::ThoughtCreated => self.thoughts_created += 1,
            EventType::GraphOpened => self.graph_opened += 1,
            EventType::SuggestRelatedUsed => self.suggest_related_used += 1,
            EventType::SemanticSearchUsed => self.semantic_search_used += 1,
            EventType::SemanticAiGraphUsed => self.semantic_ai_graph_used += 1,
        }
    }

    pub fn count_for(&self, event_type: EventType) -> u64 {
        match event_type {
            EventType::ThoughtCreated => self.thoughts_created,
            EventType::GraphOpened => self.graph_opened,
            EventType::SuggestRelatedUsed => self.suggest_related_used,
            EventType::SemanticSearchUsed => self.semantic_search_used,
            EventType::SemanticAiGraphUsed => self.semantic_ai_graph_used,
        }
    }
}

/// The client's locally accumulated submission unit: one per open weekly
/// period, persisted as a single JSON file, deleted after a successful
/// submission or when telemetry is disabled.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AggregatedBatch {
    /// Per-process token; stripped server-side, never stored.
    pub session_id: String,
    pub extension_version: String,
    pub host_version: String,
    pub platform: Platform,
    pub week_start: NaiveDate,
    pub events: Vec<TelemetryEvent>,
    pub aggregated_stats: AggregatedStats,
}

impl AggregatedBatch {
    pub fn new(
        session_id: String,
        extension_version: String,
        host_version: String,
        week_start: NaiveDate,
    ) -> Self {
        Self {
            session_id,
            extension_version,
            host_version,
            platform: Platform::current(),
            week_start,
            events: Vec::new(),
            aggregated_stats: AggregatedStats::default(),
        }
    }

    /// Append an event and bump its counter.
    pub fn record(&mut self, event: TelemetryEvent) {
        self.aggregated_stats.increment(event.event_type);
        self.events.push(event);
    }

    /// Monday of the ISO week containing `date`; the key for one batch period.
    pub fn week_start_for(date: NaiveDate) -> NaiveDate {
        date - chrono::Duration::days(date.weekday().num_days_from_monday() as i64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[test]
    fn test_week_start_is_monday() {
        // 2026-08-26 is a Wednesday
        let wednesday = NaiveDate::from_ymd_opt(2026, 8, 26).unwrap();
        let monday = NaiveDate::from_ymd_opt(2026, 8, 24).unwrap();
        assert_eq!(AggregatedBatch::week_start_for(wednesday), monday);
        assert_eq!(AggregatedBatch::week_start_for(monday), monday);
    }

    #[test]
    fn test_record_increments_matching_counter() {
        let mut batch = AggregatedBatch::new(
            "session".into(),
            "1.2.3".into(),
            "1.90.0".into(),
            NaiveDate::from_ymd_opt(2026, 8, 24).unwrap(),
        );
        batch.record(TelemetryEvent {
            event_type: EventType::GraphOpened,
            timestamp: Utc::now(),
            anonymous_id: "anon".into(),
            metadata: None,
        });
        assert_eq!(batch.events.len(), 1);
        assert_eq!(batch.aggregated_stats.graph_opened, 1);
        assert_eq!(batch.aggregated_stats.thoughts_created, 0);
    }

    #[test]
    fn test_stats_serialize_camel_case() {
        let stats = AggregatedStats::default();
        let json = serde_json::to_value(&stats).unwrap();
        for key in [
            "thoughtsCreated",
            "graphOpened",
            "suggestRelatedUsed",
            "semanticSearchUsed",
            "semanticAiGraphUsed",
            "uniqueDaysActive",
        ] {
            assert!(json.get(key).is_some(), "missing key {key}");
        }
    }
}
