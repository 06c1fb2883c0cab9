//! # profilecache-storage
//!
//! Persistent tier abstraction for profilecache.
//!
//! This crate defines the [`ProfileStore`] trait and its error type. It does
//! not contain any implementations; those live in `profilecache-db-rest`
//! (remote key-value service) and `profilecache-db-memory` (in-process).
//!
//! ## Example
//!
//! ```ignore
//! use profilecache_storage::{DynProfileStore, StoreError};
//!
//! async fn load(store: &DynProfileStore, key: &EntityKey) -> Result<(), StoreError> {
//!     if let Some(profile) = store.get(key).await? {
//!         tracing::info!(fetched_at = profile.fetched_at, "found");
//!     }
//!     Ok(())
//! }
//! ```

mod error;
mod traits;

pub use error::{ErrorCategory, StoreError};
pub use traits::ProfileStore;

/// Type alias for a shared store trait object.
pub type DynProfileStore = std::sync::Arc<dyn ProfileStore>;
