//! Schema and semantic validation of incoming batches.
//!
//! All-or-nothing per batch: one invalid event rejects the whole submission.
//! Variants here stay specific for logging; the HTTP response is always the
//! generic "Invalid data format" body so callers learn nothing about which
//! rule fired.

use pulse_core::limits::{MAX_BODY_BYTES, MAX_EVENTS_PER_BATCH};
use pulse_core::models::EventType;
use serde_json::Value;
use thiserror::Error;

pub const REQUIRED_FIELDS: [&str; 7] = [
    "sessionId",
    "extensionVersion",
    "hostVersion",
    "platform",
    "weekStart",
    "events",
    "aggregatedStats",
];

const REQUIRED_EVENT_FIELDS: [&str; 3] = ["eventType", "timestamp", "anonymousId"];

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ValidationError {
    #[error("body of {0} bytes exceeds ceiling")]
    TooLarge(usize),

    #[error("body is not a JSON object")]
    NotAnObject,

    #[error("missing required field '{0}'")]
    MissingField(&'static str),

    #[error("'events' is not an array")]
    EventsNotArray,

    #[error("{0} events exceeds ceiling")]
    TooManyEvents(usize),

    #[error("event {index} missing '{field}'")]
    EventMissingField { index: usize, field: &'static str },

    #[error("event {index} field '{field}' is not a string")]
    EventFieldNotString { index: usize, field: &'static str },

    #[error("event {index} has unrecognized type '{event_type}'")]
    UnknownEventType { index: usize, event_type: String },
}

pub fn validate_batch(body_len: usize, body: &Value) -> Result<(), ValidationError> {
    if body_len > MAX_BODY_BYTES {
        return Err(ValidationError::TooLarge(body_len));
    }

    let object = body.as_object().ok_or(ValidationError::NotAnObject)?;
    for field in REQUIRED_FIELDS {
        if !object.contains_key(field) {
            return Err(ValidationError::MissingField(field));
        }
    }

    let events = object["events"]
        .as_array()
        .ok_or(ValidationError::EventsNotArray)?;
    if events.len() > MAX_EVENTS_PER_BATCH {
        return Err(ValidationError::TooManyEvents(events.len()));
    }

    for (index, event) in events.iter().enumerate() {
        // Presence is not enough: a non-string anonymousId would skip the
        // sanitizer's hashing and leak the original value into the record.
        for field in REQUIRED_EVENT_FIELDS {
            match event.get(field) {
                None => return Err(ValidationError::EventMissingField { index, field }),
                Some(value) if !value.is_string() => {
                    return Err(ValidationError::EventFieldNotString { index, field });
                }
                Some(_) => {}
            }
        }
        let event_type = event["eventType"].as_str().unwrap_or_default();
        if EventType::parse_wire(event_type).is_none() {
            return Err(ValidationError::UnknownEventType {
                index,
                event_type: event_type.to_string(),
            });
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn valid_body() -> Value {
        json!({
            "sessionId": "s-1",
            "extensionVersion": "1.2.3",
            "hostVersion": "1.90.0",
            "platform": "linux",
            "weekStart": "2026-08-24",
            "events": [
                {
                    "eventType": "thought_created",
                    "timestamp": "2026-08-28T10:00:00Z",
                    "anonymousId": "abcd1234"
                }
            ],
            "aggregatedStats": {
                "thoughtsCreated": 1,
                "graphOpened": 0,
                "suggestRelatedUsed": 0,
                "semanticSearchUsed": 0,
                "semanticAiGraphUsed": 0,
                "uniqueDaysActive": 1
            }
        })
    }

    #[test]
    fn test_valid_batch_passes() {
        assert_eq!(validate_batch(512, &valid_body()), Ok(()));
    }

    #[test]
    fn test_every_missing_top_level_field_rejects() {
        for field in REQUIRED_FIELDS {
            let mut body = valid_body();
            body.as_object_mut().unwrap().remove(field);
            assert_eq!(
                validate_batch(512, &body),
                Err(ValidationError::MissingField(field))
            );
        }
    }

    #[test]
    fn test_oversized_body_rejects() {
        assert_eq!(
            validate_batch(MAX_BODY_BYTES + 1, &valid_body()),
            Err(ValidationError::TooLarge(MAX_BODY_BYTES + 1))
        );
    }

    #[test]
    fn test_events_must_be_an_array() {
        let mut body = valid_body();
        body["events"] = json!("nope");
        assert_eq!(validate_batch(512, &body), Err(ValidationError::EventsNotArray));
    }

    #[test]
    fn test_event_count_ceiling() {
        let mut body = valid_body();
        let event = body["events"][0].clone();
        body["events"] = Value::Array(vec![event; MAX_EVENTS_PER_BATCH + 1]);
        assert_eq!(
            validate_batch(512, &body),
            Err(ValidationError::TooManyEvents(MAX_EVENTS_PER_BATCH + 1))
        );
    }

    #[test]
    fn test_event_missing_required_field_rejects_whole_batch() {
        for field in ["eventType", "timestamp", "anonymousId"] {
            let mut body = valid_body();
            body["events"][0].as_object_mut().unwrap().remove(field);
            assert_eq!(
                validate_batch(512, &body),
                Err(ValidationError::EventMissingField { index: 0, field })
            );
        }
    }

    #[test]
    fn test_non_string_event_fields_reject() {
        for field in ["eventType", "timestamp", "anonymousId"] {
            let mut body = valid_body();
            body["events"][0][field] = json!(4085551234u64);
            assert_eq!(
                validate_batch(512, &body),
                Err(ValidationError::EventFieldNotString { index: 0, field })
            );
        }
    }

    #[test]
    fn test_unknown_event_type_rejects() {
        let mut body = valid_body();
        body["events"][0]["eventType"] = json!("keystrokes_logged");
        assert!(matches!(
            validate_batch(512, &body),
            Err(ValidationError::UnknownEventType { index: 0, .. })
        ));
    }
}
