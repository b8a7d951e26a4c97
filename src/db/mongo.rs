//! MongoDB durable store wrapper
//!
//! One bulk unordered insert per flushed batch, plus the bounded read and
//! count queries the facade needs. Connection handles are explicit and
//! lifecycle-scoped: `connect` dials once with short timeouts, and
//! `connect_with_retry` wraps it in the bounded fixed-backoff startup loop.

use bson::{doc, Document};
use futures_util::TryStreamExt;
use mongodb::error::ErrorKind;
use mongodb::{Client, Collection};
use std::time::Duration;
use tracing::{error, info, warn};

use crate::types::{FloodgateError, Result};

/// Outcome of a bulk insert: which subset made it in, which did not.
///
/// `failed_indexes` are positions within the submitted batch; the caller
/// maps them back to delivery handles for redelivery.
#[derive(Debug, Clone, Default)]
pub struct BulkInsertOutcome {
    pub inserted_count: usize,
    pub failed_indexes: Vec<usize>,
}

/// Handle to the durable record collection
#[derive(Clone)]
pub struct DurableStore {
    client: Client,
    collection: Collection<Document>,
}

impl DurableStore {
    /// Connect to MongoDB and verify the connection with a ping
    pub async fn connect(uri: &str, db_name: &str, collection_name: &str) -> Result<Self> {
        // Short server-selection timeout so an unreachable store fails
        // fast instead of hanging the caller
        let timeout_uri = if uri.contains('?') {
            format!("{uri}&serverSelectionTimeoutMS=3000&connectTimeoutMS=3000")
        } else {
            format!("{uri}?serverSelectionTimeoutMS=3000&connectTimeoutMS=3000")
        };

        let client = Client::with_uri_str(&timeout_uri)
            .await
            .map_err(|e| FloodgateError::Database(format!("Failed to connect to MongoDB: {e}")))?;

        client
            .database(db_name)
            .run_command(doc! { "ping": 1 })
            .await
            .map_err(|e| FloodgateError::Database(format!("MongoDB ping failed: {e}")))?;

        info!("Connected to MongoDB database '{}'", db_name);

        let collection = client
            .database(db_name)
            .collection::<Document>(collection_name);

        Ok(Self { client, collection })
    }

    /// Connect with bounded attempts and fixed backoff between them
    pub async fn connect_with_retry(
        uri: &str,
        db_name: &str,
        collection_name: &str,
        attempts: u32,
        backoff: Duration,
    ) -> Result<Self> {
        let mut last_err = FloodgateError::Database("No connection attempts made".into());

        for attempt in 1..=attempts {
            match Self::connect(uri, db_name, collection_name).await {
                Ok(store) => {
                    info!("MongoDB connected on attempt {}/{}", attempt, attempts);
                    return Ok(store);
                }
                Err(e) => {
                    warn!("MongoDB attempt {}/{} failed: {}", attempt, attempts, e);
                    last_err = e;
                    if attempt < attempts {
                        tokio::time::sleep(backoff).await;
                    }
                }
            }
        }

        error!("MongoDB unreachable after {} attempts", attempts);
        Err(last_err)
    }

    /// Bulk insert a batch, unordered so one malformed document does not
    /// block the rest.
    ///
    /// On partial failure, reports the failed batch positions; on a
    /// store-level error (unreachable, auth) the whole batch is failed.
    pub async fn insert_batch(&self, docs: Vec<Document>) -> Result<BulkInsertOutcome> {
        if docs.is_empty() {
            return Ok(BulkInsertOutcome::default());
        }

        let total = docs.len();

        match self.collection.insert_many(docs).ordered(false).await {
            Ok(result) => Ok(BulkInsertOutcome {
                inserted_count: result.inserted_ids.len(),
                failed_indexes: Vec::new(),
            }),
            Err(e) => match *e.kind {
                ErrorKind::InsertMany(ref insert_err) => {
                    let failed_indexes: Vec<usize> = insert_err
                        .write_errors
                        .as_ref()
                        .map(|errs| errs.iter().map(|we| we.index).collect())
                        .unwrap_or_default();

                    if failed_indexes.is_empty() {
                        // Write-concern or other batch-level failure with no
                        // per-document detail: treat everything as failed
                        warn!("Batch insert failed without per-document detail: {}", e);
                        return Err(FloodgateError::Database(format!(
                            "Batch insert failed: {e}"
                        )));
                    }

                    warn!(
                        failed = failed_indexes.len(),
                        total = total,
                        "Partial batch insert failure"
                    );

                    Ok(partial_outcome(total, failed_indexes))
                }
                _ => Err(FloodgateError::Database(format!("Batch insert failed: {e}"))),
            },
        }
    }

    /// Bounded read: IDs of up to `limit` documents matching the type filter
    pub async fn fetch_reads(&self, record_type: &str, limit: usize) -> Result<Vec<String>> {
        let cursor = self
            .collection
            .find(doc! { "type": record_type })
            .limit(limit as i64)
            .await
            .map_err(|e| FloodgateError::Database(format!("Find failed: {e}")))?;

        let docs: Vec<Document> = cursor
            .try_collect()
            .await
            .map_err(|e| FloodgateError::Database(format!("Cursor read failed: {e}")))?;

        Ok(docs
            .iter()
            .filter_map(|d| d.get_object_id("_id").ok().map(|id| id.to_hex()))
            .collect())
    }

    /// Total persisted document count
    pub async fn count(&self) -> Result<u64> {
        self.collection
            .count_documents(doc! {})
            .await
            .map_err(|e| FloodgateError::Database(format!("Count failed: {e}")))
    }

    /// Verify the store is still reachable
    pub async fn ping(&self) -> Result<()> {
        self.client
            .database(self.collection.namespace().db.as_str())
            .run_command(doc! { "ping": 1 })
            .await
            .map(|_| ())
            .map_err(|e| FloodgateError::Database(format!("MongoDB ping failed: {e}")))
    }
}

/// Map a partial insert failure onto an outcome. An unordered insert
/// attempts every document, so the inserted count is the batch size minus
/// the enumerated write errors.
fn partial_outcome(total: usize, failed_indexes: Vec<usize>) -> BulkInsertOutcome {
    BulkInsertOutcome {
        inserted_count: total.saturating_sub(failed_indexes.len()),
        failed_indexes,
    }
}

#[cfg(test)]
mod tests {
    // Integration tests require a running MongoDB instance; the handle
    // mapping downstream is exercised through the durable writer tests.

    use super::*;

    #[test]
    fn test_partial_outcome_counts_the_unfailed_remainder() {
        let outcome = partial_outcome(5, vec![1, 3]);
        assert_eq!(outcome.inserted_count, 3);
        assert_eq!(outcome.failed_indexes, vec![1, 3]);
    }

    #[test]
    fn test_partial_outcome_with_every_document_failed() {
        let outcome = partial_outcome(2, vec![0, 1]);
        assert_eq!(outcome.inserted_count, 0);
        assert_eq!(outcome.failed_indexes, vec![0, 1]);
    }
}
