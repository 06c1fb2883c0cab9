//! Store traits for the persistent profile tier.

use async_trait::async_trait;
use profilecache_core::{EntityKey, NormalizedProfile};

use crate::error::StoreError;

/// Durable keyed store of normalized profiles.
///
/// The store is treated as a plain keyed blob store: no transactions, no
/// compare-and-swap, last writer wins per key. Implementations must be
/// thread-safe (`Send + Sync`).
///
/// # Example
///
/// ```ignore
/// use profilecache_storage::{ProfileStore, StoreError};
///
/// async fn touch(store: &dyn ProfileStore, key: &EntityKey) -> Result<bool, StoreError> {
///     Ok(store.get(key).await?.is_some())
/// }
/// ```
#[async_trait]
pub trait ProfileStore: Send + Sync {
    /// Reads the record stored under `key`.
    ///
    /// Returns `None` if no record exists.
    ///
    /// # Errors
    ///
    /// Returns an error only for infrastructure issues or undecodable
    /// records, never for missing ones.
    async fn get(&self, key: &EntityKey) -> Result<Option<NormalizedProfile>, StoreError>;

    /// Writes `profile` under `key`, replacing any existing record.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend is unreachable or rejects the write.
    async fn put(&self, key: &EntityKey, profile: &NormalizedProfile) -> Result<(), StoreError>;

    /// Returns the name of this store backend for logging/debugging.
    fn backend_name(&self) -> &'static str;
}
