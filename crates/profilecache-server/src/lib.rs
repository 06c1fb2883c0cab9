pub mod cache;
pub mod config;
pub mod error;
pub mod handlers;
pub mod metrics;
pub mod middleware;
pub mod observability;
pub mod presence;
pub mod server;
pub mod upstream;

pub use cache::{CacheEntry, CacheManager, CacheSettings, ResolveError, ResolveSource, Resolved};
pub use config::{AppConfig, CacheConfig, ServerConfig, StoreBackend, StoreConfig, UpstreamConfig};
pub use error::ApiError;
pub use observability::init_tracing;
pub use presence::{PresenceAggregator, PresenceIndex};
pub use server::{AppState, ProfileCacheServer, ServerBuilder, build_app};
pub use upstream::{FetchOutcome, RestUpstreamClient, UpstreamClient, UpstreamError};
