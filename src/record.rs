//! Write records and their delivery envelopes
//!
//! A `WriteRecord` is the payload the front end submits. The queue transport
//! wraps it in an `Envelope` carrying delivery metadata: a `write_id` minted
//! before the record is durably persisted (so producers get an
//! acknowledgment token immediately) and the transport's delivery handle
//! used for acknowledgment.

use chrono::{DateTime, Utc};
use rand::distributions::Alphanumeric;
use rand::Rng;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// A single write payload as submitted by the producer.
///
/// Immutable once created. This is exactly what reaches the durable store;
/// envelope fields never appear in persisted documents.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WriteRecord {
    /// Record type discriminator (e.g., "write")
    #[serde(rename = "type")]
    pub record_type: String,
    /// Producer-assigned position within its submission
    pub index: u32,
    /// Opaque payload body
    pub payload: String,
    /// Producer-side creation time
    pub created_at: DateTime<Utc>,
}

impl WriteRecord {
    /// Create a record with the current timestamp
    pub fn new(record_type: impl Into<String>, index: u32, payload: impl Into<String>) -> Self {
        Self {
            record_type: record_type.into(),
            index,
            payload: payload.into(),
            created_at: Utc::now(),
        }
    }
}

/// Generate a random alphanumeric payload of the given size
pub fn random_payload(size: usize) -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(size)
        .map(char::from)
        .collect()
}

/// Generate a unique write ID (16 hex chars)
///
/// Derived from the current time plus randomness rather than any
/// storage-assigned identifier, so it can be handed back to the producer
/// before persistence and survives redelivery unchanged.
pub fn generate_write_id() -> String {
    let mut hasher = Sha256::new();
    hasher.update(Utc::now().timestamp_nanos_opt().unwrap_or_default().to_le_bytes());
    hasher.update(rand::thread_rng().gen::<u64>().to_le_bytes());
    hex::encode(hasher.finalize())[..16].to_string()
}

/// Opaque acknowledgment token for a claimed envelope.
///
/// Wraps the JetStream ack reply subject; acknowledging publishes to it.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DeliveryHandle(pub String);

/// Wire representation of an enqueued record
///
/// This is what actually travels through the queue: the record plus the
/// producer-side envelope fields. The delivery handle is transport state
/// and is attached only when the message is claimed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueuedWrite {
    #[serde(flatten)]
    pub record: WriteRecord,
    pub write_id: String,
    pub queued_at: DateTime<Utc>,
}

/// A claimed record: wire payload plus the handle needed to acknowledge it
#[derive(Debug, Clone)]
pub struct Envelope {
    pub record: WriteRecord,
    pub write_id: String,
    pub queued_at: DateTime<Utc>,
    pub delivery_handle: DeliveryHandle,
}

impl Envelope {
    /// Rebuild an envelope from a claimed wire payload
    pub fn from_queued(queued: QueuedWrite, delivery_handle: DeliveryHandle) -> Self {
        Self {
            record: queued.record,
            write_id: queued.write_id,
            queued_at: queued.queued_at,
            delivery_handle,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_write_id_shape_and_uniqueness() {
        let ids: HashSet<String> = (0..1000).map(|_| generate_write_id()).collect();
        assert_eq!(ids.len(), 1000, "write IDs must be unique");
        for id in &ids {
            assert_eq!(id.len(), 16);
            assert!(id.chars().all(|c| c.is_ascii_hexdigit()));
        }
    }

    #[test]
    fn test_random_payload_size() {
        let p = random_payload(512);
        assert_eq!(p.len(), 512);
        assert!(p.chars().all(|c| c.is_ascii_alphanumeric()));
    }

    #[test]
    fn test_queued_write_wire_format() {
        let record = WriteRecord::new("write", 3, "abc");
        let queued = QueuedWrite {
            record,
            write_id: generate_write_id(),
            queued_at: Utc::now(),
        };

        let json = serde_json::to_value(&queued).expect("serialize");
        // Record fields are flattened alongside the envelope fields
        assert_eq!(json["type"], "write");
        assert_eq!(json["index"], 3);
        assert!(json["write_id"].is_string());

        let back: QueuedWrite = serde_json::from_value(json).expect("deserialize");
        assert_eq!(back.write_id, queued.write_id);
        assert_eq!(back.record.payload, "abc");
    }

    #[test]
    fn test_envelope_keeps_write_id_across_redelivery() {
        let queued = QueuedWrite {
            record: WriteRecord::new("write", 0, "x"),
            write_id: "abcd1234abcd1234".to_string(),
            queued_at: Utc::now(),
        };

        // Same wire payload claimed twice gets two handles but one write_id
        let first = Envelope::from_queued(queued.clone(), DeliveryHandle("$JS.ACK.1".into()));
        let second = Envelope::from_queued(queued, DeliveryHandle("$JS.ACK.2".into()));
        assert_eq!(first.write_id, second.write_id);
        assert_ne!(first.delivery_handle, second.delivery_handle);
    }
}
