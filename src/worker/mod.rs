//! Background write workers
//!
//! Claimed queue entries flow through a per-worker pipeline: the batch
//! accumulator decides when to flush, the durable writer performs the bulk
//! insert, and the pool supervises N such pipelines competing within one
//! consumer group.

pub mod batch;
pub mod pool;
pub mod writer;

pub use batch::BatchAccumulator;
pub use pool::{PoolConfig, PoolMetrics, PoolMetricsSnapshot, WorkerPool};
pub use writer::{DurableWriter, FlushOutcome};
