//! Configuration for Floodgate
//!
//! CLI arguments and environment variable handling using clap.

use clap::Parser;
use std::time::Duration;
use uuid::Uuid;

use crate::types::{FloodgateError, Result};

/// Floodgate - write-decoupling queue and tiered read cache
///
/// Sits between a latency-sensitive front end and MongoDB: writes are
/// queued and persisted in batches by background workers; reads are served
/// from a two-tier cache.
#[derive(Parser, Debug, Clone)]
#[command(name = "floodgate")]
#[command(about = "Write-decoupling queue and tiered read cache for MongoDB")]
pub struct Args {
    /// Unique node identifier for this instance
    #[arg(long, env = "NODE_ID", default_value_t = Uuid::new_v4())]
    pub node_id: Uuid,

    /// NATS configuration (queue transport + shared cache tier)
    #[command(flatten)]
    pub nats: NatsArgs,

    /// MongoDB connection URI
    #[arg(long, env = "MONGO_URI", default_value = "mongodb://localhost:27017")]
    pub mongo_uri: String,

    /// MongoDB database name
    #[arg(long, env = "MONGO_DB", default_value = "assessmentdb")]
    pub mongo_db: String,

    /// MongoDB collection for persisted records
    #[arg(long, env = "MONGO_COLLECTION", default_value = "records")]
    pub mongo_collection: String,

    /// MongoDB connection attempts at startup
    #[arg(long, env = "MONGO_CONNECT_ATTEMPTS", default_value = "10")]
    pub mongo_connect_attempts: u32,

    /// Fixed backoff between MongoDB connection attempts, in seconds
    #[arg(long, env = "MONGO_CONNECT_BACKOFF_SECS", default_value = "5")]
    pub mongo_connect_backoff_secs: u64,

    /// Read cache TTL in seconds (applies to both tiers)
    #[arg(long, env = "CACHE_TTL", default_value = "300")]
    pub cache_ttl_secs: u64,

    /// Maximum queue length; oldest entries are trimmed beyond this
    #[arg(long, env = "MAX_QUEUE_SIZE", default_value = "100000")]
    pub max_queue_size: i64,

    /// Records per flushed batch
    #[arg(long, env = "BATCH_SIZE", default_value = "100")]
    pub batch_size: usize,

    /// Maximum batch age before a flush fires, in milliseconds
    #[arg(long, env = "BATCH_TIMEOUT_MS", default_value = "100")]
    pub batch_timeout_ms: u64,

    /// Number of background write workers
    #[arg(long, env = "WRITE_WORKERS", default_value = "4")]
    pub write_workers: usize,

    /// How long a claim blocks waiting for queue entries, in milliseconds
    #[arg(long, env = "CLAIM_BLOCK_MS", default_value = "1000")]
    pub claim_block_ms: u64,

    /// Fixed worker backoff after a transient error, in milliseconds
    #[arg(long, env = "WORKER_BACKOFF_MS", default_value = "1000")]
    pub worker_backoff_ms: u64,

    /// Redelivery lease: how long a claimed entry stays assigned to a
    /// worker before the transport hands it to another, in seconds
    #[arg(long, env = "ACK_WAIT_SECS", default_value = "30")]
    pub ack_wait_secs: u64,

    /// Number of read results returned by the facade (padded with absent
    /// markers when the store has fewer)
    #[arg(long, env = "READ_LIMIT", default_value = "5")]
    pub read_limit: usize,

    /// Invalidate the read cache on every write submission (trades
    /// throughput for read-after-write freshness)
    #[arg(long, env = "INVALIDATE_ON_WRITE", default_value = "false")]
    pub invalidate_on_write: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    pub log_level: String,
}

/// NATS connection configuration
#[derive(Parser, Debug, Clone)]
pub struct NatsArgs {
    /// NATS server URL
    #[arg(long, env = "NATS_URL", default_value = "nats://127.0.0.1:4222")]
    pub nats_url: String,

    /// NATS username (optional)
    #[arg(long, env = "NATS_USER")]
    pub nats_user: Option<String>,

    /// NATS password (optional)
    #[arg(long, env = "NATS_PASSWORD")]
    pub nats_password: Option<String>,
}

impl Args {
    /// Cache TTL as a duration
    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }

    /// Maximum batch age as a duration
    pub fn batch_timeout(&self) -> Duration {
        Duration::from_millis(self.batch_timeout_ms)
    }

    /// Claim block timeout as a duration
    pub fn claim_block(&self) -> Duration {
        Duration::from_millis(self.claim_block_ms)
    }

    /// Worker backoff as a duration
    pub fn worker_backoff(&self) -> Duration {
        Duration::from_millis(self.worker_backoff_ms)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.batch_size == 0 {
            return Err(FloodgateError::Config("BATCH_SIZE must be at least 1".into()));
        }
        if self.write_workers == 0 {
            return Err(FloodgateError::Config("WRITE_WORKERS must be at least 1".into()));
        }
        if self.max_queue_size <= 0 {
            return Err(FloodgateError::Config("MAX_QUEUE_SIZE must be positive".into()));
        }
        if self.read_limit == 0 {
            return Err(FloodgateError::Config("READ_LIMIT must be at least 1".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_args() -> Args {
        Args::parse_from(["floodgate"])
    }

    #[test]
    fn test_defaults() {
        let args = base_args();
        assert_eq!(args.batch_size, 100);
        assert_eq!(args.write_workers, 4);
        assert_eq!(args.cache_ttl_secs, 300);
        assert_eq!(args.max_queue_size, 100000);
        assert!(!args.invalidate_on_write);
        assert!(args.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_zero_batch() {
        let mut args = base_args();
        args.batch_size = 0;
        assert!(matches!(
            args.validate(),
            Err(FloodgateError::Config(_))
        ));
    }

    #[test]
    fn test_validate_rejects_zero_workers() {
        let mut args = base_args();
        args.write_workers = 0;
        assert!(matches!(
            args.validate(),
            Err(FloodgateError::Config(_))
        ));
    }
}
