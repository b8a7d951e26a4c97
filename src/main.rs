//! Floodgate service binary
//!
//! Wires the queue transport, tiered cache, durable store, and worker pool
//! together, runs until a shutdown signal arrives, then drains the workers
//! cooperatively before releasing the shared handles.

use clap::Parser;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use floodgate::{
    cache::TieredReadCache,
    config::Args,
    db::DurableStore,
    facade::{Facade, FacadeConfig},
    queue::{QueueConfig, QueueTransport},
    worker::{PoolConfig, WorkerPool},
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file if present
    let _ = dotenvy::dotenv();

    let args = Args::parse();

    let log_level = args.log_level.clone();
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("floodgate={},info", log_level).into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    if let Err(e) = args.validate() {
        error!("Configuration error: {}", e);
        std::process::exit(1);
    }

    info!("======================================");
    info!("  Floodgate - write decoupling layer");
    info!("======================================");
    info!("Node ID: {}", args.node_id);
    info!("NATS: {}", args.nats.nats_url);
    info!("MongoDB: {}", args.mongo_uri);
    info!(
        "Batching: {} records / {} ms, {} workers",
        args.batch_size, args.batch_timeout_ms, args.write_workers
    );
    info!("Cache TTL: {}s", args.cache_ttl_secs);
    info!("Max queue length: {}", args.max_queue_size);
    info!("======================================");

    // Durable store: bounded retry with fixed backoff. Without it the
    // service still runs - reads degrade to absent markers and writes
    // stay queued for a later deployment that can drain them.
    let store = match DurableStore::connect_with_retry(
        &args.mongo_uri,
        &args.mongo_db,
        &args.mongo_collection,
        args.mongo_connect_attempts,
        Duration::from_secs(args.mongo_connect_backoff_secs),
    )
    .await
    {
        Ok(store) => Some(store),
        Err(e) => {
            warn!("Continuing without durable store: {}", e);
            None
        }
    };

    // Queue transport degrades internally if NATS is unreachable
    let transport = Arc::new(
        QueueTransport::connect(
            &args.nats,
            &format!("floodgate-{}", args.node_id),
            QueueConfig {
                max_queue_size: args.max_queue_size,
                ack_wait: Duration::from_secs(args.ack_wait_secs),
            },
        )
        .await,
    );

    let cache = Arc::new(
        TieredReadCache::connect(
            &args.nats,
            &format!("floodgate-cache-{}", args.node_id),
            args.cache_ttl(),
        )
        .await,
    );

    // Workers need a store to flush into; with none, queued writes are
    // left for redelivery rather than claimed and failed in a loop.
    let pool = match &store {
        Some(store) => {
            let pool = WorkerPool::start(
                Arc::clone(&transport),
                store.clone(),
                PoolConfig {
                    worker_count: args.write_workers,
                    max_batch_size: args.batch_size,
                    max_batch_age: args.batch_timeout(),
                    claim_block: args.claim_block(),
                    backoff: args.worker_backoff(),
                    node_id: args.node_id.to_string(),
                },
            )
            .await?;
            Some(pool)
        }
        None => {
            warn!("No durable store; write workers not started");
            None
        }
    };

    let facade = Arc::new(Facade::new(
        Arc::clone(&transport),
        Arc::clone(&cache),
        store,
        FacadeConfig {
            read_limit: args.read_limit,
            invalidate_on_write: args.invalidate_on_write,
            ..Default::default()
        },
    ));

    // Periodic status line for operators
    let status_facade = Arc::clone(&facade);
    let status_task = tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(60));
        interval.tick().await; // skip the immediate first tick
        loop {
            interval.tick().await;
            let status = status_facade.status().await;
            info!(
                queue_depth = ?status.queue_depth,
                cache_entries = status.cache.local.entries,
                cache_hit_rate = format!("{:.1}%", status.cache.local.hit_rate()),
                "Service status"
            );
        }
    });

    info!("Floodgate running; facade ready for the HTTP layer");

    tokio::signal::ctrl_c().await?;
    info!("Shutdown signal received, draining workers");

    status_task.abort();
    if let Some(pool) = pool {
        pool.shutdown().await;
    }

    info!("Shutdown complete");
    Ok(())
}
