//! REST key-value profile store backend for profilecache.
//!
//! Talks to a hosted JSON key-value service that addresses records by path
//! (`{endpoint}/{namespace}/{id}.json`) and authenticates with an `auth`
//! query parameter. A missing record reads back as `null`.
//!
//! # Example
//!
//! ```ignore
//! use profilecache_db_rest::{RestProfileStore, RestStoreConfig};
//!
//! let store = RestProfileStore::new(RestStoreConfig::new(
//!     "https://my-project.firebaseio.com",
//!     "secret",
//! ))?;
//! let profile = store.get(&key).await?;
//! ```

mod store;

pub use store::{RestProfileStore, RestStoreConfig};
