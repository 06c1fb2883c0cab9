//! In-memory profile store backend for profilecache.
//!
//! This crate provides an in-memory implementation of the `ProfileStore`
//! trait from `profilecache-storage`, using papaya lock-free HashMap for
//! concurrent access.
//!
//! # Example
//!
//! ```ignore
//! use profilecache_db_memory::InMemoryProfileStore;
//! use profilecache_storage::ProfileStore;
//!
//! let store = InMemoryProfileStore::new();
//! store.put(&key, &profile).await?;
//! ```

pub mod storage;

pub use profilecache_storage::{ProfileStore, StoreError};
pub use storage::InMemoryProfileStore;

/// Creates a new shared in-memory store.
pub fn create_profile_store() -> profilecache_storage::DynProfileStore {
    std::sync::Arc::new(InMemoryProfileStore::new())
}
