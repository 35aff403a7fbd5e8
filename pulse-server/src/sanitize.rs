//! Sanitization and de-identification of accepted batches.
//!
//! - `sessionId` is removed entirely (never persisted anywhere).
//! - Each event's `anonymousId` is replaced by an unsalted deterministic
//!   SHA-256, so events from one installation still correlate within a batch
//!   without the server ever storing the original value.
//! - Metadata is reduced to the fixed whitelist.
//! - The caller's address is kept only as a salted hash for abuse-pattern
//!   analysis.

use chrono::{DateTime, Utc};
use pulse_core::limits::METADATA_WHITELIST;
use serde_json::Value;
use sha2::{Digest, Sha256};

/// Deterministic, unsalted one-way hash of a client-chosen identifier.
pub fn hash_anonymous_id(id: &str) -> String {
    hex::encode(Sha256::digest(id.as_bytes()))
}

/// Salted one-way hash of the caller's network address.
pub fn hash_ip(salt: &str, ip: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(salt.as_bytes());
    hasher.update(ip.as_bytes());
    hex::encode(hasher.finalize())
}

/// Transform a validated batch into the persisted record shape: strip the
/// session token, de-identify events, whitelist metadata and stamp receipt
/// fields. Consumes and returns the JSON value.
pub fn sanitize_batch(
    mut body: Value,
    ip: &str,
    salt: &str,
    server_version: &str,
    received_at: DateTime<Utc>,
) -> Value {
    if let Some(object) = body.as_object_mut() {
        object.remove("sessionId");
        object.insert("receivedAt".to_string(), Value::String(received_at.to_rfc3339()));
        object.insert(
            "serverVersion".to_string(),
            Value::String(server_version.to_string()),
        );
        object.insert("ipHash".to_string(), Value::String(hash_ip(salt, ip)));

        if let Some(events) = object.get_mut("events").and_then(Value::as_array_mut) {
            for event in events.iter_mut().filter_map(Value::as_object_mut) {
                if let Some(id) = event.get("anonymousId").and_then(Value::as_str) {
                    let hashed = hash_anonymous_id(id);
                    event.insert("anonymousId".to_string(), Value::String(hashed));
                }
                if let Some(metadata) = event.get_mut("metadata").and_then(Value::as_object_mut) {
                    metadata.retain(|key, _| METADATA_WHITELIST.contains(&key.as_str()));
                }
            }
        }
    }
    body
}
