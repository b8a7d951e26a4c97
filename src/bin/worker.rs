//! Floodgate worker - standalone write-worker pool
//!
//! Runs the claim/batch/flush pipeline without the facade, for deployments
//! that scale write draining separately from the front-end process.
//!
//! Usage:
//!   floodgate-worker --nats-url nats://localhost:4222 --mongo-uri mongodb://localhost:27017

use clap::Parser;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use floodgate::config::NatsArgs;
use floodgate::db::DurableStore;
use floodgate::queue::{QueueConfig, QueueTransport};
use floodgate::worker::{PoolConfig, WorkerPool};

#[derive(Parser, Debug)]
#[command(name = "floodgate-worker")]
#[command(about = "Standalone write-worker pool for the floodgate queue")]
#[command(version)]
struct Args {
    #[command(flatten)]
    nats: NatsArgs,

    /// MongoDB connection URI
    #[arg(long, env = "MONGO_URI", default_value = "mongodb://localhost:27017")]
    mongo_uri: String,

    /// MongoDB database name
    #[arg(long, env = "MONGO_DB", default_value = "assessmentdb")]
    mongo_db: String,

    /// MongoDB collection for persisted records
    #[arg(long, env = "MONGO_COLLECTION", default_value = "records")]
    mongo_collection: String,

    /// Unique worker-node ID (auto-generated if not provided)
    #[arg(long, env = "WORKER_ID")]
    worker_id: Option<String>,

    /// Number of worker tasks
    #[arg(long, env = "WRITE_WORKERS", default_value = "4")]
    write_workers: usize,

    /// Records per flushed batch
    #[arg(long, env = "BATCH_SIZE", default_value = "100")]
    batch_size: usize,

    /// Maximum batch age before a flush fires, in milliseconds
    #[arg(long, env = "BATCH_TIMEOUT_MS", default_value = "100")]
    batch_timeout_ms: u64,

    /// Maximum queue length; oldest entries trimmed beyond this
    #[arg(long, env = "MAX_QUEUE_SIZE", default_value = "100000")]
    max_queue_size: i64,

    /// Redelivery lease for claimed entries, in seconds
    #[arg(long, env = "ACK_WAIT_SECS", default_value = "30")]
    ack_wait_secs: u64,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,floodgate=debug")),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let _ = dotenvy::dotenv();
    let args = Args::parse();

    let worker_id = args
        .worker_id
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

    info!(
        "Starting floodgate worker node {} (NATS: {}, MongoDB: {})",
        worker_id, args.nats.nats_url, args.mongo_uri
    );

    let store = match DurableStore::connect_with_retry(
        &args.mongo_uri,
        &args.mongo_db,
        &args.mongo_collection,
        10,
        Duration::from_secs(5),
    )
    .await
    {
        Ok(store) => store,
        Err(e) => {
            error!("Durable store unreachable, cannot drain writes: {}", e);
            std::process::exit(1);
        }
    };

    let transport = Arc::new(
        QueueTransport::connect(
            &args.nats,
            &format!("floodgate-worker-{worker_id}"),
            QueueConfig {
                max_queue_size: args.max_queue_size,
                ack_wait: Duration::from_secs(args.ack_wait_secs),
            },
        )
        .await,
    );

    if !transport.is_connected() {
        error!("Queue transport unreachable, nothing to drain");
        std::process::exit(1);
    }

    let pool = match WorkerPool::start(
        transport,
        store,
        PoolConfig {
            worker_count: args.write_workers,
            max_batch_size: args.batch_size,
            max_batch_age: Duration::from_millis(args.batch_timeout_ms),
            claim_block: Duration::from_secs(1),
            backoff: Duration::from_secs(1),
            node_id: worker_id.clone(),
        },
    )
    .await
    {
        Ok(pool) => pool,
        Err(e) => {
            error!("Failed to start worker pool: {}", e);
            std::process::exit(1);
        }
    };

    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {}", e);
    }

    info!("Shutdown signal received, finishing in-flight batches");
    pool.shutdown().await;
    info!("Worker node {} stopped", worker_id);
}
