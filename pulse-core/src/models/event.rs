use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Scalar key/value pairs attached to an event. The server strips any key
/// outside the fixed whitelist during sanitization.
pub type Metadata = serde_json::Map<String, serde_json::Value>;

/// The closed set of trackable usage events. Anything outside this set is
/// rejected server-side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    ThoughtCreated,
    GraphOpened,
    SuggestRelatedUsed,
    SemanticSearchUsed,
    SemanticAiGraphUsed,
}

impl EventType {
    pub const ALL: [EventType; 5] = [
        EventType::ThoughtCreated,
        EventType::GraphOpened,
        EventType::SuggestRelatedUsed,
        EventType::SemanticSearchUsed,
        EventType::SemanticAiGraphUsed,
    ];

    /// Wire name (snake_case), as it appears in submission JSON.
    pub fn as_wire(&self) -> &'static str {
        match self {
            EventType::ThoughtCreated => "thought_created",
            EventType::GraphOpened => "graph_opened",
            EventType::SuggestRelatedUsed => "suggest_related_used",
            EventType::SemanticSearchUsed => "semantic_search_used",
            EventType::SemanticAiGraphUsed => "semantic_ai_graph_used",
        }
    }

    /// Parse a wire name back into the enum. Returns `None` for anything
    /// outside the whitelist.
    pub fn parse_wire(s: &str) -> Option<EventType> {
        EventType::ALL.iter().copied().find(|e| e.as_wire() == s)
    }
}

/// A single recorded usage event. Immutable once appended to a batch.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TelemetryEvent {
    pub event_type: EventType,
    pub timestamp: DateTime<Utc>,
    pub anonymous_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Metadata>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_type_wire_names_round_trip() {
        for event_type in EventType::ALL {
            assert_eq!(EventType::parse_wire(event_type.as_wire()), Some(event_type));
        }
        assert_eq!(EventType::parse_wire("password_typed"), None);
    }

    #[test]
    fn test_event_serializes_camel_case() {
        let event = TelemetryEvent {
            event_type: EventType::ThoughtCreated,
            timestamp: Utc::now(),
            anonymous_id: "abc123".to_string(),
            metadata: None,
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["eventType"], "thought_created");
        assert_eq!(json["anonymousId"], "abc123");
        assert!(json.get("metadata").is_none());
    }
}
