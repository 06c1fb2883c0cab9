use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use async_trait::async_trait;
use papaya::HashMap as PapayaHashMap;
use profilecache_core::{EntityKey, NormalizedProfile};
use profilecache_storage::{ProfileStore, StoreError};

/// In-memory profile store using papaya lock-free HashMap.
///
/// Used for single-instance development setups and as the persistent tier
/// in tests. Besides the store contract it keeps read/write counters and can
/// be switched into an unavailable state to exercise fallback paths.
#[derive(Debug, Default)]
pub struct InMemoryProfileStore {
    data: Arc<PapayaHashMap<EntityKey, NormalizedProfile>>,
    reads: AtomicU64,
    writes: AtomicU64,
    unavailable: AtomicBool,
}

impl InMemoryProfileStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds a record without counting it as a write.
    pub fn seed(&self, profile: NormalizedProfile) {
        let guard = self.data.pin();
        guard.insert(profile.id.clone(), profile);
    }

    /// Number of `get` calls served so far.
    pub fn read_count(&self) -> u64 {
        self.reads.load(Ordering::SeqCst)
    }

    /// Number of successful `put` calls so far.
    pub fn write_count(&self) -> u64 {
        self.writes.load(Ordering::SeqCst)
    }

    /// While set, every operation fails with a connection error.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    pub fn len(&self) -> usize {
        self.data.pin().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn check_available(&self) -> Result<(), StoreError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(StoreError::connection_error("in-memory store marked unavailable"));
        }
        Ok(())
    }
}

#[async_trait]
impl ProfileStore for InMemoryProfileStore {
    async fn get(&self, key: &EntityKey) -> Result<Option<NormalizedProfile>, StoreError> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        self.check_available()?;
        let guard = self.data.pin();
        Ok(guard.get(key).cloned())
    }

    async fn put(&self, key: &EntityKey, profile: &NormalizedProfile) -> Result<(), StoreError> {
        self.check_available()?;
        let guard = self.data.pin();
        guard.insert(key.clone(), profile.clone());
        self.writes.fetch_add(1, Ordering::SeqCst);
        tracing::trace!(key = %key, "profile stored (memory)");
        Ok(())
    }

    fn backend_name(&self) -> &'static str {
        "memory"
    }
}
