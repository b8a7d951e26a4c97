//! Shared cache tier - NATS JetStream key-value bucket
//!
//! Authoritative tier behind the process-local map. The bucket's max_age
//! equals the deployment TTL (TTL is fixed per deployment, not per entry);
//! entries additionally carry a wall-clock `expires_at` that is checked on
//! read, so a reader never serves a value past its window even if the
//! server-side trim lags.
//!
//! Every operation is best-effort with a short timeout: an unreachable
//! shared tier degrades the cache to local-only, it never fails the call.

use async_nats::jetstream::{self, kv};
use async_nats::ConnectOptions;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info, warn};

use super::ReadSet;
use crate::config::NatsArgs;

/// KV bucket backing the shared tier
pub const CACHE_BUCKET: &str = "FLOODGATE_CACHE";

/// Per-operation deadline; a hung tier must not stall the facade
const OP_TIMEOUT: Duration = Duration::from_secs(2);

/// Wire format of a shared-tier entry
#[derive(Debug, Serialize, Deserialize)]
struct SharedEntry {
    value: ReadSet,
    expires_at: DateTime<Utc>,
}

/// Shared tier handle; `store` is None when the tier is unreachable
pub struct SharedTier {
    store: Option<kv::Store>,
}

impl SharedTier {
    /// Connect and ensure the cache bucket exists.
    ///
    /// Never fails: an unreachable tier yields a degraded handle whose
    /// reads miss and whose writes are silently skipped.
    pub async fn connect(args: &NatsArgs, name: &str, ttl: Duration) -> Self {
        let mut options = ConnectOptions::new()
            .name(name)
            .connection_timeout(Duration::from_secs(5));

        if let (Some(user), Some(pass)) = (&args.nats_user, &args.nats_password) {
            options = options.user_and_password(user.clone(), pass.clone());
        }

        let client = match options.connect(&args.nats_url).await {
            Ok(c) => c,
            Err(e) => {
                warn!("Shared cache tier unreachable, serving local-only: {}", e);
                return Self { store: None };
            }
        };

        let js = jetstream::new(client);

        let config = kv::Config {
            bucket: CACHE_BUCKET.to_string(),
            max_age: ttl,
            ..Default::default()
        };

        let store = match js.create_key_value(config).await {
            Ok(s) => Some(s),
            Err(create_err) => match js.get_key_value(CACHE_BUCKET).await {
                Ok(s) => Some(s),
                Err(_) => {
                    warn!(
                        "Failed to open cache bucket, serving local-only: {}",
                        create_err
                    );
                    None
                }
            },
        };

        if store.is_some() {
            info!(bucket = CACHE_BUCKET, ttl_secs = ttl.as_secs(), "Shared cache tier ready");
        }

        Self { store }
    }

    /// Construct a degraded tier with no backing bucket
    pub fn disconnected() -> Self {
        Self { store: None }
    }

    pub fn is_connected(&self) -> bool {
        self.store.is_some()
    }

    /// Get an unexpired value, or None on miss, expiry, or tier failure
    pub async fn get(&self, key: &str) -> Option<ReadSet> {
        let store = self.store.as_ref()?;

        let entry = match tokio::time::timeout(OP_TIMEOUT, store.get(key)).await {
            Ok(Ok(Some(bytes))) => bytes,
            Ok(Ok(None)) => return None,
            Ok(Err(e)) => {
                warn!(key = key, "Shared cache get error: {}", e);
                return None;
            }
            Err(_) => {
                warn!(key = key, "Shared cache get timed out");
                return None;
            }
        };

        match serde_json::from_slice::<SharedEntry>(&entry) {
            Ok(entry) if Utc::now() < entry.expires_at => {
                debug!(key = key, "Shared cache hit");
                Some(entry.value)
            }
            Ok(_) => {
                debug!(key = key, "Shared cache entry expired");
                None
            }
            Err(e) => {
                warn!(key = key, "Undecodable shared cache entry: {}", e);
                None
            }
        }
    }

    /// Store a value with the tier TTL. Failures are soft.
    pub async fn set(&self, key: &str, value: &ReadSet, ttl: Duration) {
        let Some(store) = &self.store else {
            return;
        };

        let entry = SharedEntry {
            value: value.clone(),
            expires_at: Utc::now() + chrono::Duration::from_std(ttl).unwrap_or_else(|_| chrono::Duration::zero()),
        };

        let payload = match serde_json::to_vec(&entry) {
            Ok(p) => p,
            Err(e) => {
                warn!(key = key, "Failed to serialize cache entry: {}", e);
                return;
            }
        };

        match tokio::time::timeout(OP_TIMEOUT, store.put(key, Bytes::from(payload))).await {
            Ok(Ok(_)) => debug!(key = key, "Shared cache populated"),
            Ok(Err(e)) => warn!(key = key, "Shared cache set error: {}", e),
            Err(_) => warn!(key = key, "Shared cache set timed out"),
        }
    }

    /// Delete an entry. Failures are soft.
    pub async fn remove(&self, key: &str) {
        let Some(store) = &self.store else {
            return;
        };

        match tokio::time::timeout(OP_TIMEOUT, store.purge(key)).await {
            Ok(Ok(_)) => debug!(key = key, "Shared cache entry removed"),
            Ok(Err(e)) => warn!(key = key, "Shared cache delete error: {}", e),
            Err(_) => warn!(key = key, "Shared cache delete timed out"),
        }
    }
}

#[cfg(test)]
mod tests {
    // Live-bucket tests require a running NATS server with JetStream;
    // degraded-mode behavior needs no server.

    use super::*;

    #[tokio::test]
    async fn test_disconnected_tier_misses_and_swallows_writes() {
        let tier = SharedTier::disconnected();
        assert!(!tier.is_connected());

        let value: ReadSet = vec![Some("a".to_string()), None];
        tier.set("k", &value, Duration::from_secs(60)).await;
        assert_eq!(tier.get("k").await, None);
        tier.remove("k").await;
    }
}
