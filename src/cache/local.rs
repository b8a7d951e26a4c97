//! Process-local cache tier
//!
//! A sharded map of read results with TTL expiry checked passively on
//! access. This is the only state in the core that needs in-process
//! mutual exclusion; DashMap shards the locking.

use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tracing::debug;

use super::ReadSet;

struct LocalEntry {
    value: ReadSet,
    expires_at: Instant,
}

/// Statistics for one cache tier
#[derive(Debug, Clone, Default)]
pub struct TierStats {
    pub entries: usize,
    pub hits: u64,
    pub misses: u64,
    pub expirations: u64,
}

impl TierStats {
    /// Hit rate as a percentage
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            (self.hits as f64 / total as f64) * 100.0
        }
    }
}

/// Lock-sharded local tier with passive TTL expiry
#[derive(Default)]
pub struct LocalTier {
    entries: DashMap<String, LocalEntry>,
    hits: AtomicU64,
    misses: AtomicU64,
    expirations: AtomicU64,
}

impl LocalTier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get an unexpired value. Expired entries are removed on access.
    pub fn get(&self, key: &str) -> Option<ReadSet> {
        if let Some(entry) = self.entries.get(key) {
            if Instant::now() < entry.expires_at {
                self.hits.fetch_add(1, Ordering::Relaxed);
                debug!(key = key, "Local cache hit");
                return Some(entry.value.clone());
            }
            drop(entry);
            self.entries.remove(key);
            self.expirations.fetch_add(1, Ordering::Relaxed);
        }

        self.misses.fetch_add(1, Ordering::Relaxed);
        debug!(key = key, "Local cache miss");
        None
    }

    /// Store a value; a single atomic replace of any previous entry
    pub fn set(&self, key: &str, value: ReadSet, ttl: Duration) {
        self.entries.insert(
            key.to_string(),
            LocalEntry {
                value,
                expires_at: Instant::now() + ttl,
            },
        );
    }

    /// Remove an entry
    pub fn remove(&self, key: &str) -> bool {
        self.entries.remove(key).is_some()
    }

    /// Drop every entry
    pub fn clear(&self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn stats(&self) -> TierStats {
        TierStats {
            entries: self.entries.len(),
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            expirations: self.expirations.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reads(values: &[&str]) -> ReadSet {
        values.iter().map(|v| Some(v.to_string())).collect()
    }

    #[test]
    fn test_get_within_ttl_returns_value() {
        let tier = LocalTier::new();
        tier.set("k", reads(&["a", "b"]), Duration::from_secs(60));
        assert_eq!(tier.get("k"), Some(reads(&["a", "b"])));
    }

    #[test]
    fn test_get_after_ttl_returns_absent() {
        let tier = LocalTier::new();
        tier.set("k", reads(&["a"]), Duration::from_millis(20));
        std::thread::sleep(Duration::from_millis(30));
        assert_eq!(tier.get("k"), None);
        // Expired entry is removed, not just hidden
        assert!(tier.is_empty());
        assert_eq!(tier.stats().expirations, 1);
    }

    #[test]
    fn test_set_overwrites_atomically() {
        let tier = LocalTier::new();
        tier.set("k", reads(&["old"]), Duration::from_secs(60));
        tier.set("k", reads(&["new"]), Duration::from_secs(60));
        assert_eq!(tier.get("k"), Some(reads(&["new"])));
        assert_eq!(tier.len(), 1);
    }

    #[test]
    fn test_remove_and_clear() {
        let tier = LocalTier::new();
        tier.set("a", reads(&["1"]), Duration::from_secs(60));
        tier.set("b", reads(&["2"]), Duration::from_secs(60));
        assert!(tier.remove("a"));
        assert!(!tier.remove("a"));
        tier.clear();
        assert!(tier.is_empty());
    }

    #[test]
    fn test_hit_rate_tracking() {
        let tier = LocalTier::new();
        tier.set("k", reads(&["x"]), Duration::from_secs(60));
        tier.get("k");
        tier.get("k");
        tier.get("missing");

        let stats = tier.stats();
        assert_eq!(stats.hits, 2);
        assert_eq!(stats.misses, 1);
        assert!((stats.hit_rate() - 66.6).abs() < 1.0);
    }
}
