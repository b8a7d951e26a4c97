//! Floodgate - write-decoupling queue and tiered read cache
//!
//! Decouples a latency-sensitive front end from MongoDB with two moving
//! parts: an at-least-once write queue (NATS JetStream) drained by a pool
//! of batching workers, and a two-tier read cache (process-local map
//! backed by a shared key-value bucket) with TTL expiry.
//!
//! ## Components
//!
//! - **Record**: write payloads and their delivery envelopes
//! - **Queue**: append / claim / acknowledge against the bounded log
//! - **Worker**: batch accumulator, durable writer, worker pool
//! - **Cache**: tiered read-through cache
//! - **Facade**: `submit_writes` / `get_reads` surface for the HTTP layer
//! - **Db**: durable store handle with bounded startup retry

pub mod cache;
pub mod config;
pub mod db;
pub mod facade;
pub mod queue;
pub mod record;
pub mod types;
pub mod worker;

pub use config::Args;
pub use facade::{Facade, FacadeConfig, ReadsResponse};
pub use types::{FloodgateError, Result};
