//! Component C: the three-tier read cache sitting in front of
//! `vca-store` (SS4.3). L1 is a bounded in-process LRU, L2 is an
//! optional shared Redis tier, L3 is an in-process TTL fallback.
//! Reads promote on hit; writes go through all enabled tiers; pattern
//! invalidation runs against the raw (pre-hash) keys kept per namespace.

mod cache;
mod error;
mod key;
mod l1;
mod l2;
mod l3;

pub use cache::{Cache, CacheConfig, CacheStats};
pub use error::{CacheError, CacheResult};
pub use key::{glob_match, hashed_key};
