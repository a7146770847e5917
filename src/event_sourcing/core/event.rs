use serde::{de::DeserializeOwned, Deserialize, Serialize};
use uuid::Uuid;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use anyhow::Result;

// ============================================================================
// Event Envelope - Event Metadata for the Audit Log
// ============================================================================
//
// Wraps domain events with the metadata stored next to them in the event log.
// Generic over the event type so any aggregate can use it.
//
// ============================================================================

/// Generic Event Envelope - wraps any domain event with metadata
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct EventEnvelope<E> {
    // Event Identity
    pub event_id: Uuid,
    pub aggregate_id: Uuid,
    pub sequence_number: i64,

    // Event Type Information
    pub event_type: String,
    pub event_version: i32,

    // Event Payload
    pub event_data: E,

    // Causation & Correlation
    pub causation_id: Option<Uuid>,      // Payment or request that caused this
    pub correlation_id: Uuid,            // Groups events written by one operation

    // Actor Information
    pub user_id: Option<Uuid>,           // Operator or customer who triggered it

    // Timing
    pub timestamp: DateTime<Utc>,

    // Additional Metadata
    pub metadata: HashMap<String, String>,
}

impl<E: DomainEvent> EventEnvelope<E> {
    pub fn new(
        aggregate_id: Uuid,
        sequence_number: i64,
        event_data: E,
        correlation_id: Uuid,
    ) -> Self {
        Self {
            event_id: Uuid::now_v7(),
            aggregate_id,
            sequence_number,
            event_type: event_data.event_type().to_string(),
            event_version: event_data.event_version(),
            event_data,
            causation_id: None,
            correlation_id,
            user_id: None,
            timestamp: Utc::now(),
            metadata: HashMap::new(),
        }
    }
}

impl<E> EventEnvelope<E> {
    pub fn with_user(mut self, user_id: Option<Uuid>) -> Self {
        self.user_id = user_id;
        self
    }

    pub fn with_causation(mut self, causation_id: Uuid) -> Self {
        self.causation_id = Some(causation_id);
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}

// ============================================================================
// Domain Event Trait
// ============================================================================

/// Implemented by every event enum that can be written to the event log.
pub trait DomainEvent: Serialize + DeserializeOwned + Clone + Send + Sync {
    fn event_type(&self) -> &'static str;
    fn event_version(&self) -> i32 { 1 }
}

// ============================================================================
// Event Serialization Helpers
// ============================================================================

pub fn serialize_event<E: Serialize>(event: &E) -> Result<String> {
    Ok(serde_json::to_string(event)?)
}

pub fn deserialize_event<E: DeserializeOwned>(json: &str) -> Result<E> {
    Ok(serde_json::from_str(json)?)
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Serialize, Deserialize, Clone, Debug)]
    struct NoteAdded {
        text: String,
    }

    impl DomainEvent for NoteAdded {
        fn event_type(&self) -> &'static str { "NoteAdded" }
        fn event_version(&self) -> i32 { 2 }
    }

    #[test]
    fn test_envelope_takes_type_and_version_from_event() {
        let aggregate_id = Uuid::new_v4();
        let correlation_id = Uuid::new_v4();

        let envelope = EventEnvelope::new(
            aggregate_id,
            3,
            NoteAdded { text: "hello".to_string() },
            correlation_id,
        );

        assert_eq!(envelope.aggregate_id, aggregate_id);
        assert_eq!(envelope.sequence_number, 3);
        assert_eq!(envelope.event_type, "NoteAdded");
        assert_eq!(envelope.event_version, 2);
        assert_eq!(envelope.correlation_id, correlation_id);
        assert!(envelope.user_id.is_none());
    }

    #[test]
    fn test_envelope_builders() {
        let operator = Uuid::new_v4();
        let cause = Uuid::new_v4();

        let envelope = EventEnvelope::new(
            Uuid::new_v4(),
            1,
            NoteAdded { text: "x".to_string() },
            Uuid::new_v4(),
        )
        .with_user(Some(operator))
        .with_causation(cause)
        .with_metadata("source", "cli");

        assert_eq!(envelope.user_id, Some(operator));
        assert_eq!(envelope.causation_id, Some(cause));
        assert_eq!(envelope.metadata.get("source").map(String::as_str), Some("cli"));
    }

    #[test]
    fn test_event_payload_survives_storage_format() {
        let json = serialize_event(&NoteAdded { text: "stored".to_string() }).unwrap();
        let back: NoteAdded = deserialize_event(&json).unwrap();
        assert_eq!(back.text, "stored");
    }
}
