//! Tiered read cache - local tier backed by a shared tier
//!
//! Read-through with an explicit tier order: the process-local map is
//! consulted first, then the shared bucket; a shared-tier hit repopulates
//! the local tier. Both tiers use the same deployment-fixed TTL.
//!
//! Consistency trade-offs, intentional and tested:
//!
//! - The local tier is a best-effort mirror; it may be briefly stale
//!   relative to the shared tier within one TTL window.
//! - A population race between two concurrent misses is last-writer-wins.
//!   No locking: values are idempotent snapshots of the same read query.
//! - Shared-tier failure never fails a call; the local tier alone keeps
//!   serving this process.

use std::time::Duration;
use tracing::debug;

use super::local::{LocalTier, TierStats};
use super::shared::SharedTier;
use super::ReadSet;
use crate::config::NatsArgs;

/// Combined cache statistics for introspection
#[derive(Debug, Clone)]
pub struct CacheStats {
    pub local: TierStats,
    pub shared_connected: bool,
    pub ttl_secs: u64,
}

/// Two-tier read-through cache with TTL expiry
pub struct TieredReadCache {
    local: LocalTier,
    shared: SharedTier,
    ttl: Duration,
}

impl TieredReadCache {
    /// Connect the shared tier and assemble the cache.
    ///
    /// A failed shared-tier connection degrades to local-only.
    pub async fn connect(args: &NatsArgs, name: &str, ttl: Duration) -> Self {
        let shared = SharedTier::connect(args, name, ttl).await;
        Self {
            local: LocalTier::new(),
            shared,
            ttl,
        }
    }

    /// Local-only cache (used by tests and degraded deployments)
    pub fn local_only(ttl: Duration) -> Self {
        Self {
            local: LocalTier::new(),
            shared: SharedTier::disconnected(),
            ttl,
        }
    }

    /// Look up a key: local tier first, then shared; a shared hit
    /// repopulates the local tier. None means both tiers missed.
    pub async fn get(&self, key: &str) -> Option<ReadSet> {
        if let Some(value) = self.local.get(key) {
            return Some(value);
        }

        if let Some(value) = self.shared.get(key).await {
            // Mirror into the local tier for subsequent requests on this
            // process; the shared tier remains authoritative.
            self.local.set(key, value.clone(), self.ttl);
            debug!(key = key, "Local tier repopulated from shared tier");
            return Some(value);
        }

        None
    }

    /// Populate both tiers with the same TTL window. Best-effort on the
    /// shared side; the local write alone is enough for this process.
    pub async fn set(&self, key: &str, value: ReadSet) {
        self.local.set(key, value.clone(), self.ttl);
        self.shared.set(key, &value, self.ttl).await;
    }

    /// Delete a key from both tiers
    pub async fn invalidate(&self, key: &str) {
        self.local.remove(key);
        self.shared.remove(key).await;
    }

    /// Drop every local entry (the shared tier keeps its own entries;
    /// use `invalidate` for keys that must disappear everywhere)
    pub fn clear_local(&self) {
        self.local.clear();
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            local: self.local.stats(),
            shared_connected: self.shared.is_connected(),
            ttl_secs: self.ttl.as_secs(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reads(values: &[&str]) -> ReadSet {
        values.iter().map(|v| Some(v.to_string())).collect()
    }

    #[tokio::test]
    async fn test_set_then_get_within_ttl() {
        let cache = TieredReadCache::local_only(Duration::from_secs(5));
        cache.set("reads", reads(&["a", "b", "c", "d", "e"])).await;
        assert_eq!(
            cache.get("reads").await,
            Some(reads(&["a", "b", "c", "d", "e"]))
        );
    }

    #[tokio::test]
    async fn test_get_after_ttl_is_absent() {
        let cache = TieredReadCache::local_only(Duration::from_millis(20));
        cache.set("reads", reads(&["a"])).await;
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert_eq!(cache.get("reads").await, None);
    }

    #[tokio::test]
    async fn test_shared_tier_failure_does_not_fail_set() {
        // Shared tier disconnected: set succeeds, local serves the value
        let cache = TieredReadCache::local_only(Duration::from_secs(5));
        cache.set("k", reads(&["x"])).await;
        assert!(cache.get("k").await.is_some());
        assert!(!cache.stats().shared_connected);
    }

    #[tokio::test]
    async fn test_invalidate_removes_entry() {
        let cache = TieredReadCache::local_only(Duration::from_secs(5));
        cache.set("k", reads(&["x"])).await;
        cache.invalidate("k").await;
        assert_eq!(cache.get("k").await, None);
    }

    #[tokio::test]
    async fn test_population_race_is_last_writer_wins() {
        let cache = TieredReadCache::local_only(Duration::from_secs(5));
        cache.set("k", reads(&["first"])).await;
        cache.set("k", reads(&["second"])).await;
        assert_eq!(cache.get("k").await, Some(reads(&["second"])));
    }

    #[tokio::test]
    async fn test_clear_local() {
        let cache = TieredReadCache::local_only(Duration::from_secs(5));
        cache.set("k", reads(&["x"])).await;
        cache.clear_local();
        assert_eq!(cache.get("k").await, None);
        assert_eq!(cache.stats().local.entries, 0);
    }
}
