//! Durable writer - one bulk insert per flushed batch
//!
//! Strips envelope fields before persisting (only the record itself reaches
//! the store) and maps the store's partial-failure report back onto delivery
//! handles so the worker knows exactly which entries to acknowledge.

use bson::Document;
use tracing::{info, warn};

use crate::db::DurableStore;
use crate::record::{DeliveryHandle, Envelope};
use crate::types::Result;

/// Result of flushing one batch
#[derive(Debug, Default)]
pub struct FlushOutcome {
    /// Documents the store accepted
    pub inserted_count: usize,
    /// Handles safe to acknowledge
    pub succeeded: Vec<DeliveryHandle>,
    /// Handles left unacknowledged for redelivery
    pub failed: Vec<DeliveryHandle>,
    /// Handles of unserializable records, acknowledged and dropped
    pub dropped: Vec<DeliveryHandle>,
}

/// Writes flushed batches to the durable store
pub struct DurableWriter {
    store: DurableStore,
}

impl DurableWriter {
    pub fn new(store: DurableStore) -> Self {
        Self { store }
    }

    /// Persist a batch with a single unordered bulk insert.
    ///
    /// Returns Err only on a store-level failure, in which case the caller
    /// acknowledges nothing and relies on transport redelivery. A partial
    /// failure is a successful call with a non-empty `failed` set.
    pub async fn write(&self, batch: Vec<Envelope>) -> Result<FlushOutcome> {
        if batch.is_empty() {
            return Ok(FlushOutcome::default());
        }

        // Envelope fields (write_id, queued_at, delivery handle) never
        // reach the store; serialize only the record.
        let mut docs: Vec<Document> = Vec::with_capacity(batch.len());
        let mut handles: Vec<DeliveryHandle> = Vec::with_capacity(batch.len());
        let mut dropped: Vec<DeliveryHandle> = Vec::new();

        for envelope in &batch {
            match bson::to_document(&envelope.record) {
                Ok(doc) => {
                    docs.push(doc);
                    handles.push(envelope.delivery_handle.clone());
                }
                Err(e) => {
                    warn!(
                        write_id = %envelope.write_id,
                        "Dropping unserializable record: {}", e
                    );
                    dropped.push(envelope.delivery_handle.clone());
                }
            }
        }

        if docs.is_empty() {
            return Ok(FlushOutcome {
                dropped,
                ..Default::default()
            });
        }

        let outcome = self.store.insert_batch(docs).await?;
        let (succeeded, failed) = partition_handles(handles, &outcome.failed_indexes);

        info!(inserted = outcome.inserted_count, "Batch inserted");

        Ok(FlushOutcome {
            inserted_count: outcome.inserted_count,
            succeeded,
            failed,
            dropped,
        })
    }
}

/// Split batch handles into acknowledged and redelivered sets given the
/// failed positions reported by the store
fn partition_handles(
    handles: Vec<DeliveryHandle>,
    failed_indexes: &[usize],
) -> (Vec<DeliveryHandle>, Vec<DeliveryHandle>) {
    if failed_indexes.is_empty() {
        return (handles, Vec::new());
    }

    let mut succeeded = Vec::with_capacity(handles.len().saturating_sub(failed_indexes.len()));
    let mut failed = Vec::with_capacity(failed_indexes.len());

    for (i, handle) in handles.into_iter().enumerate() {
        if failed_indexes.contains(&i) {
            failed.push(handle);
        } else {
            succeeded.push(handle);
        }
    }

    (succeeded, failed)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn handles(n: usize) -> Vec<DeliveryHandle> {
        (0..n).map(|i| DeliveryHandle(format!("$JS.ACK.{i}"))).collect()
    }

    #[test]
    fn test_partition_all_succeed() {
        let (ok, bad) = partition_handles(handles(4), &[]);
        assert_eq!(ok.len(), 4);
        assert!(bad.is_empty());
    }

    #[test]
    fn test_partition_partial_failure() {
        let (ok, bad) = partition_handles(handles(5), &[1, 3]);
        assert_eq!(
            ok.iter().map(|h| h.0.as_str()).collect::<Vec<_>>(),
            vec!["$JS.ACK.0", "$JS.ACK.2", "$JS.ACK.4"]
        );
        assert_eq!(
            bad.iter().map(|h| h.0.as_str()).collect::<Vec<_>>(),
            vec!["$JS.ACK.1", "$JS.ACK.3"]
        );
    }

    #[test]
    fn test_partition_all_fail() {
        let (ok, bad) = partition_handles(handles(2), &[0, 1]);
        assert!(ok.is_empty());
        assert_eq!(bad.len(), 2);
    }
}
