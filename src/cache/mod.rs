//! Tiered read cache
//!
//! Local tier (process memory, lock-sharded) backed by a shared tier
//! (NATS key-value bucket). Read-through with a deployment-fixed TTL.

pub mod local;
pub mod shared;
pub mod tiered;

pub use local::{LocalTier, TierStats};
pub use shared::{SharedTier, CACHE_BUCKET};
pub use tiered::{CacheStats, TieredReadCache};

/// An ordered sequence of read results; None marks an absent slot
pub type ReadSet = Vec<Option<String>>;
