//! Tiered profile cache.
//!
//! ## Tiers
//!
//! | Tier | Backing | Lifetime |
//! |------|---------|----------|
//! | memory | [`LocalMemoryTier`] (DashMap) | process |
//! | persistent | [`profilecache_storage::ProfileStore`] | shared across instances |
//! | upstream | [`crate::upstream::UpstreamClient`] | source of truth |
//!
//! [`CacheManager::resolve`] walks the tiers in that order and falls back to
//! the freshest stale record when the upstream service cannot answer.

pub mod clock;
pub mod manager;
pub mod memory;

pub use clock::{Clock, ManualClock, SystemClock};
pub use manager::{CacheManager, CacheSettings, ResolveError, ResolveSource, Resolved};
pub use memory::{CacheEntry, LocalMemoryTier, MemoryTier};
