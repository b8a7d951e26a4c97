//! Write worker pool
//!
//! N independent workers compete for queued writes through the shared
//! consumer group. Each worker owns its own accumulator-plus-writer
//! pipeline (no shared mutable batch state), so the only cross-worker
//! coordination is the transport's claim lease.
//!
//! The loop per worker: claim -> accumulate -> flush when a threshold
//! fires -> acknowledge the succeeded handles. Transient transport or
//! store errors cause a fixed backoff sleep, never worker death. Shutdown
//! is cooperative: the supervisor flips the running flag and each worker
//! drains its in-flight batch before exiting.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::batch::BatchAccumulator;
use super::writer::DurableWriter;
use crate::db::DurableStore;
use crate::queue::QueueTransport;
use crate::types::Result;

/// Configuration for the write worker pool
#[derive(Debug, Clone)]
pub struct PoolConfig {
    /// Number of worker tasks
    pub worker_count: usize,
    /// Records per flushed batch
    pub max_batch_size: usize,
    /// Maximum batch age before a flush fires
    pub max_batch_age: Duration,
    /// How long each claim blocks waiting for entries
    pub claim_block: Duration,
    /// Fixed sleep after a transient error
    pub backoff: Duration,
    /// Node identity prefixed onto consumer names
    pub node_id: String,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            worker_count: 4,
            max_batch_size: 100,
            max_batch_age: Duration::from_millis(100),
            claim_block: Duration::from_secs(1),
            backoff: Duration::from_secs(1),
            node_id: "floodgate".to_string(),
        }
    }
}

/// Aggregate counters across all workers, for observability only
#[derive(Debug, Default)]
pub struct PoolMetrics {
    pub processed: AtomicU64,
    pub batches: AtomicU64,
    pub errors: AtomicU64,
    pub active_workers: AtomicUsize,
}

/// Point-in-time snapshot of pool metrics
#[derive(Debug, Clone)]
pub struct PoolMetricsSnapshot {
    pub processed: u64,
    pub batches: u64,
    pub errors: u64,
    pub active_workers: usize,
    pub worker_count: usize,
}

/// Per-worker statistics, owned by the worker and logged at stop
#[derive(Debug, Default)]
struct WorkerStats {
    processed: u64,
    batches: u64,
    errors: u64,
}

/// Supervisor for the write workers
pub struct WorkerPool {
    handles: Vec<JoinHandle<()>>,
    running: Arc<RwLock<bool>>,
    metrics: Arc<PoolMetrics>,
    worker_count: usize,
}

impl WorkerPool {
    /// Ensure the consumer group exists and spawn the workers
    pub async fn start(
        transport: Arc<QueueTransport>,
        store: DurableStore,
        config: PoolConfig,
    ) -> Result<Self> {
        transport.ensure_group().await?;

        let running = Arc::new(RwLock::new(true));
        let metrics = Arc::new(PoolMetrics::default());
        let mut handles = Vec::with_capacity(config.worker_count);

        info!(
            workers = config.worker_count,
            batch_size = config.max_batch_size,
            batch_age_ms = config.max_batch_age.as_millis() as u64,
            "Starting write worker pool"
        );

        for i in 0..config.worker_count {
            let consumer_name = format!("{}-worker-{}", config.node_id, i);
            let writer = DurableWriter::new(store.clone());
            let transport = Arc::clone(&transport);
            let running = Arc::clone(&running);
            let metrics = Arc::clone(&metrics);
            let config = config.clone();

            handles.push(tokio::spawn(async move {
                worker_loop(i, consumer_name, transport, writer, config, running, metrics).await;
            }));
        }

        Ok(Self {
            handles,
            running,
            metrics,
            worker_count: config.worker_count,
        })
    }

    /// Signal cooperative shutdown and wait for every worker to drain its
    /// in-flight batch and exit
    pub async fn shutdown(self) {
        info!("Stopping write worker pool");
        *self.running.write().await = false;

        for (i, handle) in self.handles.into_iter().enumerate() {
            if let Err(e) = handle.await {
                error!("Worker {} task join failed: {}", i, e);
            }
        }

        info!(
            processed = self.metrics.processed.load(Ordering::Relaxed),
            batches = self.metrics.batches.load(Ordering::Relaxed),
            errors = self.metrics.errors.load(Ordering::Relaxed),
            "Write worker pool stopped"
        );
    }

    /// Snapshot the aggregate metrics
    pub fn metrics(&self) -> PoolMetricsSnapshot {
        PoolMetricsSnapshot {
            processed: self.metrics.processed.load(Ordering::Relaxed),
            batches: self.metrics.batches.load(Ordering::Relaxed),
            errors: self.metrics.errors.load(Ordering::Relaxed),
            active_workers: self.metrics.active_workers.load(Ordering::Relaxed),
            worker_count: self.worker_count,
        }
    }

    /// Whether any worker is still running
    pub fn is_healthy(&self) -> bool {
        self.metrics.active_workers.load(Ordering::Relaxed) > 0
    }
}

/// One worker's claim/accumulate/flush/acknowledge loop
async fn worker_loop(
    worker_id: usize,
    consumer_name: String,
    transport: Arc<QueueTransport>,
    writer: DurableWriter,
    config: PoolConfig,
    running: Arc<RwLock<bool>>,
    metrics: Arc<PoolMetrics>,
) {
    info!(worker = worker_id, consumer = %consumer_name, "Worker started");
    metrics.active_workers.fetch_add(1, Ordering::Relaxed);

    let mut accumulator = BatchAccumulator::new(config.max_batch_size, config.max_batch_age);
    let mut stats = WorkerStats::default();

    while *running.read().await {
        // The claim timeout is a poll interval, not cancellation: the
        // running flag is rechecked after every cycle.
        match transport
            .claim(&consumer_name, accumulator.remaining(), config.claim_block)
            .await
        {
            Ok(claimed) => accumulator.extend(claimed),
            Err(e) => {
                warn!(worker = worker_id, "Claim failed, backing off: {}", e);
                stats.errors += 1;
                metrics.errors.fetch_add(1, Ordering::Relaxed);
                tokio::time::sleep(config.backoff).await;
                continue;
            }
        }

        if accumulator.should_flush() {
            flush(worker_id, &mut accumulator, &writer, &transport, &metrics, &mut stats).await;
        }
    }

    // Cooperative drain: finish the in-flight batch before exiting. This
    // is the only flush not driven by the size/age thresholds.
    if !accumulator.is_empty() {
        debug!(
            worker = worker_id,
            pending = accumulator.len(),
            "Draining in-flight batch before exit"
        );
        flush(worker_id, &mut accumulator, &writer, &transport, &metrics, &mut stats).await;
    }

    metrics.active_workers.fetch_sub(1, Ordering::Relaxed);
    info!(
        worker = worker_id,
        processed = stats.processed,
        batches = stats.batches,
        errors = stats.errors,
        "Worker stopped"
    );
}

/// Flush the accumulated batch and acknowledge what the store accepted
async fn flush(
    worker_id: usize,
    accumulator: &mut BatchAccumulator,
    writer: &DurableWriter,
    transport: &QueueTransport,
    metrics: &PoolMetrics,
    stats: &mut WorkerStats,
) {
    let batch = accumulator.take();
    let batch_len = batch.len();

    match writer.write(batch).await {
        Ok(outcome) => {
            // Succeeded handles are acked; failed ones stay unacked and
            // redeliver. Dropped (unserializable) ones are acked so they
            // cannot wedge the group.
            transport.acknowledge(&outcome.succeeded).await;
            transport.acknowledge(&outcome.dropped).await;

            if !outcome.failed.is_empty() {
                warn!(
                    worker = worker_id,
                    failed = outcome.failed.len(),
                    total = batch_len,
                    "Partial flush, leaving failed entries for redelivery"
                );
            }

            stats.processed += outcome.inserted_count as u64;
            stats.batches += 1;
            metrics
                .processed
                .fetch_add(outcome.inserted_count as u64, Ordering::Relaxed);
            metrics.batches.fetch_add(1, Ordering::Relaxed);
        }
        Err(e) => {
            // Store-level failure: nothing acked, whole batch redelivers
            error!(
                worker = worker_id,
                size = batch_len,
                "Batch insert failed, relying on redelivery: {}", e
            );
            stats.errors += 1;
            metrics.errors.fetch_add(1, Ordering::Relaxed);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = PoolConfig::default();
        assert_eq!(config.worker_count, 4);
        assert_eq!(config.max_batch_size, 100);
        assert_eq!(config.max_batch_age, Duration::from_millis(100));
    }

    #[test]
    fn test_metrics_snapshot() {
        let metrics = PoolMetrics::default();
        metrics.processed.fetch_add(7, Ordering::Relaxed);
        metrics.batches.fetch_add(2, Ordering::Relaxed);
        assert_eq!(metrics.processed.load(Ordering::Relaxed), 7);
        assert_eq!(metrics.batches.load(Ordering::Relaxed), 2);
    }
}
