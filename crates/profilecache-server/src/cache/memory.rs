//! Process-local memory tier.

use std::sync::Arc;

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use profilecache_core::{EntityKey, NormalizedProfile};

/// A memory-tier entry with its absolute expiry.
///
/// The profile is wrapped in `Arc` so hits hand out a pointer instead of
/// copying the record.
#[derive(Clone, Debug)]
pub struct CacheEntry {
    pub profile: Arc<NormalizedProfile>,
    /// Unix millis after which the entry is no longer served directly.
    pub expires_at: i64,
    /// Set when the entry was populated by a fallback after an upstream failure.
    pub stale: bool,
}

impl CacheEntry {
    pub fn new(profile: Arc<NormalizedProfile>, expires_at: i64) -> Self {
        Self {
            profile,
            expires_at,
            stale: false,
        }
    }

    pub fn stale(profile: Arc<NormalizedProfile>, expires_at: i64) -> Self {
        Self {
            profile,
            expires_at,
            stale: true,
        }
    }

    pub fn is_expired(&self, now_millis: i64) -> bool {
        now_millis >= self.expires_at
    }

    /// Milliseconds until expiry, clamped at zero.
    pub fn remaining_millis(&self, now_millis: i64) -> i64 {
        (self.expires_at - now_millis).max(0)
    }
}

/// Memory tier contract. One instance per process, shared by all requests.
pub trait MemoryTier: Send + Sync {
    /// Returns the entry for `key`, expired or not.
    fn get(&self, key: &EntityKey) -> Option<CacheEntry>;

    /// Stores `entry` unless the current entry holds a newer fetch.
    /// Returns whether the entry was stored.
    fn set(&self, key: &EntityKey, entry: CacheEntry) -> bool;

    fn delete(&self, key: &EntityKey) -> Option<CacheEntry>;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// DashMap-backed memory tier. Expired entries stay until overwritten so
/// they remain available as a stale fallback.
#[derive(Debug, Default)]
pub struct LocalMemoryTier {
    entries: DashMap<EntityKey, CacheEntry>,
}

impl LocalMemoryTier {
    pub fn new() -> Self {
        Self::default()
    }
}

impl MemoryTier for LocalMemoryTier {
    fn get(&self, key: &EntityKey) -> Option<CacheEntry> {
        self.entries.get(key).map(|entry| entry.value().clone())
    }

    fn set(&self, key: &EntityKey, entry: CacheEntry) -> bool {
        match self.entries.entry(key.clone()) {
            Entry::Occupied(mut occupied) => {
                if occupied.get().profile.fetched_at > entry.profile.fetched_at {
                    tracing::debug!(key = %key, "memory tier kept newer entry");
                    return false;
                }
                occupied.insert(entry);
                true
            }
            Entry::Vacant(vacant) => {
                vacant.insert(entry);
                true
            }
        }
    }

    fn delete(&self, key: &EntityKey) -> Option<CacheEntry> {
        self.entries.remove(key).map(|(_, entry)| entry)
    }

    fn len(&self) -> usize {
        self.entries.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use profilecache_core::{PresenceSnapshot, RawProfile, normalize};

    fn entry(fetched_at: i64, expires_at: i64) -> CacheEntry {
        let profile = normalize(
            &EntityKey::from("42"),
            RawProfile::default(),
            fetched_at,
            PresenceSnapshot::offline(),
        );
        CacheEntry::new(Arc::new(profile), expires_at)
    }

    #[test]
    fn expiry_boundaries() {
        let e = entry(0, 1_000);
        assert!(!e.is_expired(999));
        assert!(e.is_expired(1_000));
        assert_eq!(e.remaining_millis(400), 600);
        assert_eq!(e.remaining_millis(5_000), 0);
    }

    #[test]
    fn set_get_delete() {
        let tier = LocalMemoryTier::new();
        let key = EntityKey::from("42");
        assert!(tier.is_empty());

        assert!(tier.set(&key, entry(10, 100)));
        assert_eq!(tier.get(&key).unwrap().expires_at, 100);
        assert_eq!(tier.len(), 1);

        assert!(tier.delete(&key).is_some());
        assert!(tier.get(&key).is_none());
    }

    #[test]
    fn never_replaces_newer_fetch() {
        let tier = LocalMemoryTier::new();
        let key = EntityKey::from("42");

        assert!(tier.set(&key, entry(200, 500)));
        assert!(!tier.set(&key, entry(100, 900)));
        assert_eq!(tier.get(&key).unwrap().profile.fetched_at, 200);

        // Same fetch may be re-stored with a new window.
        assert!(tier.set(&key, entry(200, 900)));
        assert_eq!(tier.get(&key).unwrap().expires_at, 900);
    }

    #[test]
    fn expired_entries_remain_readable() {
        let tier = LocalMemoryTier::new();
        let key = EntityKey::from("42");
        tier.set(&key, entry(0, 10));
        assert!(tier.get(&key).unwrap().is_expired(20));
    }
}
