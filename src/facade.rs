//! Front-end facade
//!
//! The surface an external HTTP layer consumes: submit writes (queued,
//! returns immediately), get cached reads (read-through with store
//! fallback and absent-marker padding), plus status introspection.
//!
//! A queue failure is never a hard error here - writes degrade silently
//! by design. Reads with no store and no cached value return a fully
//! absent-marker result; `store_count` is the one operation that surfaces
//! a hard error for an unreachable store.

use std::sync::Arc;
use tracing::{debug, warn};

use crate::cache::{CacheStats, ReadSet, TieredReadCache};
use crate::db::DurableStore;
use crate::queue::QueueTransport;
use crate::record::WriteRecord;
use crate::types::{FloodgateError, Result};

/// Cache key under which the read view is stored
pub const READS_CACHE_KEY: &str = "api:data:reads";

/// Facade policy knobs
#[derive(Debug, Clone)]
pub struct FacadeConfig {
    /// Number of read results returned (padded with absent markers)
    pub read_limit: usize,
    /// Record type the read view filters on
    pub record_type: String,
    /// Cache key for the read view
    pub cache_key: String,
    /// Invalidate the read view on every write submission
    pub invalidate_on_write: bool,
}

impl Default for FacadeConfig {
    fn default() -> Self {
        Self {
            read_limit: 5,
            record_type: "write".to_string(),
            cache_key: READS_CACHE_KEY.to_string(),
            invalidate_on_write: false,
        }
    }
}

/// Read response with provenance
#[derive(Debug, Clone)]
pub struct ReadsResponse {
    pub reads: ReadSet,
    /// Whether the result came from the cache (either tier)
    pub cached: bool,
}

/// Service status for observability endpoints
#[derive(Debug, Clone)]
pub struct FacadeStatus {
    pub queue_connected: bool,
    pub queue_depth: Option<u64>,
    pub consumer_group_ready: bool,
    pub store_connected: bool,
    pub cache: CacheStats,
}

/// Composes the queue transport, tiered cache, and durable store into the
/// two operations the front end needs
pub struct Facade {
    transport: Arc<QueueTransport>,
    cache: Arc<TieredReadCache>,
    store: Option<DurableStore>,
    config: FacadeConfig,
}

impl Facade {
    pub fn new(
        transport: Arc<QueueTransport>,
        cache: Arc<TieredReadCache>,
        store: Option<DurableStore>,
        config: FacadeConfig,
    ) -> Self {
        Self {
            transport,
            cache,
            store,
            config,
        }
    }

    /// Enqueue records for background persistence; returns one write ID
    /// per record immediately, before any durable insert occurs.
    pub async fn submit_writes(&self, records: Vec<WriteRecord>) -> Vec<String> {
        let mut write_ids = Vec::with_capacity(records.len());

        for record in records {
            write_ids.push(self.transport.enqueue(record).await);
        }

        // Policy toggle: read-after-write freshness over raw throughput
        if self.config.invalidate_on_write {
            self.cache.invalidate(&self.config.cache_key).await;
        }

        debug!(count = write_ids.len(), "Writes queued");
        write_ids
    }

    /// Return the cached read view, or perform exactly one bounded store
    /// read on a miss, pad to the configured width with absent markers,
    /// and repopulate the cache.
    ///
    /// Never raises: an unreachable store yields absent-marker results.
    pub async fn get_reads(&self) -> ReadsResponse {
        if let Some(reads) = self.cache.get(&self.config.cache_key).await {
            return ReadsResponse { reads, cached: true };
        }

        let reads = match &self.store {
            Some(store) => {
                match store
                    .fetch_reads(&self.config.record_type, self.config.read_limit)
                    .await
                {
                    Ok(ids) => {
                        let mut reads: ReadSet = ids.into_iter().map(Some).collect();
                        reads.resize(self.config.read_limit, None);
                        // Only real query results are worth caching
                        self.cache.set(&self.config.cache_key, reads.clone()).await;
                        reads
                    }
                    Err(e) => {
                        warn!("Store read failed, returning absent markers: {}", e);
                        vec![None; self.config.read_limit]
                    }
                }
            }
            None => vec![None; self.config.read_limit],
        };

        ReadsResponse { reads, cached: false }
    }

    /// Total persisted document count.
    ///
    /// This surfaces a hard error when the store is unreachable: a count
    /// with no store has no answer, unlike reads which can degrade.
    pub async fn store_count(&self) -> Result<u64> {
        match &self.store {
            Some(store) => store.count().await,
            None => Err(FloodgateError::Database("Durable store not connected".into())),
        }
    }

    /// Drop the local cache tier and the shared read-view entry
    pub async fn flush_cache(&self) {
        self.cache.clear_local();
        self.cache.invalidate(&self.config.cache_key).await;
    }

    /// Queue and cache introspection (observability only, not correctness)
    pub async fn status(&self) -> FacadeStatus {
        let queue_depth = match self.transport.queue_depth().await {
            Ok(depth) => Some(depth),
            Err(e) => {
                debug!("Queue depth unavailable: {}", e);
                None
            }
        };

        FacadeStatus {
            queue_connected: self.transport.is_connected(),
            queue_depth,
            consumer_group_ready: self.transport.group_ready(),
            store_connected: self.store.is_some(),
            cache: self.cache.stats(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queue::QueueConfig;
    use std::collections::HashSet;
    use std::time::Duration;

    fn test_facade(config: FacadeConfig) -> (Facade, Arc<TieredReadCache>) {
        let transport = Arc::new(QueueTransport::disconnected(QueueConfig::default()));
        let cache = Arc::new(TieredReadCache::local_only(Duration::from_secs(5)));
        let facade = Facade::new(transport, Arc::clone(&cache), None, config);
        (facade, cache)
    }

    fn records(n: u32) -> Vec<WriteRecord> {
        (0..n)
            .map(|i| WriteRecord::new("write", i, crate::record::random_payload(32)))
            .collect()
    }

    #[tokio::test]
    async fn test_submit_writes_returns_distinct_ids_immediately() {
        let (facade, _) = test_facade(FacadeConfig::default());

        let ids = facade.submit_writes(records(5)).await;
        assert_eq!(ids.len(), 5);

        let distinct: HashSet<&String> = ids.iter().collect();
        assert_eq!(distinct.len(), 5, "write IDs must be distinct");
    }

    #[tokio::test]
    async fn test_get_reads_without_store_returns_absent_markers() {
        let (facade, _) = test_facade(FacadeConfig::default());

        let response = facade.get_reads().await;
        assert_eq!(response.reads, vec![None; 5]);
        assert!(!response.cached);

        // Placeholders are not cached; the next call misses again
        let again = facade.get_reads().await;
        assert!(!again.cached);
    }

    #[tokio::test]
    async fn test_get_reads_serves_cached_view() {
        let (facade, cache) = test_facade(FacadeConfig::default());

        let view: ReadSet = ["a", "b", "c", "d", "e"]
            .iter()
            .map(|s| Some(s.to_string()))
            .collect();
        cache.set(READS_CACHE_KEY, view.clone()).await;

        let response = facade.get_reads().await;
        assert!(response.cached);
        assert_eq!(response.reads, view);
    }

    #[tokio::test]
    async fn test_invalidate_on_write_drops_read_view() {
        let (facade, cache) = test_facade(FacadeConfig {
            invalidate_on_write: true,
            ..Default::default()
        });

        cache
            .set(READS_CACHE_KEY, vec![Some("stale".to_string())])
            .await;
        facade.submit_writes(records(1)).await;

        assert_eq!(cache.get(READS_CACHE_KEY).await, None);
    }

    #[tokio::test]
    async fn test_store_count_without_store_is_hard_error() {
        let (facade, _) = test_facade(FacadeConfig::default());
        assert!(matches!(
            facade.store_count().await,
            Err(FloodgateError::Database(_))
        ));
    }

    #[tokio::test]
    async fn test_flush_cache_clears_read_view() {
        let (facade, cache) = test_facade(FacadeConfig::default());
        cache
            .set(READS_CACHE_KEY, vec![Some("x".to_string())])
            .await;
        facade.flush_cache().await;
        assert_eq!(cache.get(READS_CACHE_KEY).await, None);
    }

    #[tokio::test]
    async fn test_status_reports_degraded_transport() {
        let (facade, _) = test_facade(FacadeConfig::default());
        let status = facade.status().await;
        assert!(!status.queue_connected);
        assert_eq!(status.queue_depth, None);
        assert!(!status.store_connected);
        assert!(!status.cache.shared_connected);
    }
}
