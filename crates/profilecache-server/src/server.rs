use std::{net::SocketAddr, sync::Arc, time::Duration};

use axum::{Router, middleware, routing::get};
use profilecache_db_rest::{RestProfileStore, RestStoreConfig};
use profilecache_storage::DynProfileStore;
use tower_http::{compression::CompressionLayer, cors::CorsLayer, trace::TraceLayer};

use crate::{
    cache::{CacheManager, CacheSettings, LocalMemoryTier},
    config::{AppConfig, StoreBackend, StoreConfig, UpstreamConfig},
    handlers,
    middleware::{self as app_middleware, ApiKeys},
    presence::{PresenceAggregator, PresenceIndex},
    upstream::{RestUpstreamClient, UpstreamClient, UpstreamClientConfig},
};

/// Shared state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    pub cache: Arc<CacheManager>,
    /// Write side of the presence index, for the real-time feed.
    pub presence: Arc<PresenceIndex>,
    pub api_keys: ApiKeys,
    pub metrics_enabled: bool,
}

impl AppState {
    /// Builds the state with the store and upstream client described by `cfg`.
    pub fn from_config(cfg: &AppConfig) -> anyhow::Result<Self> {
        let store = build_store(&cfg.store)?;
        let upstream = build_upstream(&cfg.upstream)?;
        Ok(Self::with_backends(cfg, store, upstream))
    }

    /// Builds the state around caller-supplied backends.
    pub fn with_backends(
        cfg: &AppConfig,
        store: DynProfileStore,
        upstream: Arc<dyn UpstreamClient>,
    ) -> Self {
        let presence = Arc::new(PresenceIndex::new());
        let settings = CacheSettings::default()
            .with_ttl(cfg.cache_ttl())
            .with_stale_ttl(cfg.stale_ttl())
            .with_upstream_timeout(cfg.upstream_timeout())
            .with_coalesce_misses(cfg.cache.coalesce_misses);
        let cache = CacheManager::new(
            Arc::new(LocalMemoryTier::new()),
            store,
            upstream,
            PresenceAggregator::new(presence.clone()),
            settings,
        );

        Self {
            cache: Arc::new(cache),
            presence,
            api_keys: ApiKeys::new(cfg.auth.api_keys.iter().cloned()),
            metrics_enabled: cfg.metrics.enabled,
        }
    }
}

fn build_store(cfg: &StoreConfig) -> anyhow::Result<DynProfileStore> {
    match cfg.backend {
        StoreBackend::Rest => {
            let endpoint = cfg.endpoint.clone().unwrap_or_default();
            let credential = cfg.credential.clone().unwrap_or_default();
            let store = RestProfileStore::new(
                RestStoreConfig::new(endpoint, credential)
                    .with_namespace(cfg.namespace.clone())
                    .with_request_timeout(Duration::from_millis(cfg.timeout_ms)),
            )?;
            Ok(Arc::new(store))
        }
        StoreBackend::Memory => {
            tracing::warn!("using in-memory persistent tier; records are lost on restart");
            Ok(profilecache_db_memory::create_profile_store())
        }
    }
}

fn build_upstream(cfg: &UpstreamConfig) -> anyhow::Result<Arc<dyn UpstreamClient>> {
    let client = RestUpstreamClient::new(
        UpstreamClientConfig::new(cfg.base_url.clone(), cfg.token.clone())
            .with_auth_scheme(cfg.auth_scheme.clone())
            .with_request_timeout(Duration::from_millis(cfg.timeout_ms))
            .with_connect_timeout(Duration::from_millis(cfg.connect_timeout_ms)),
    )?;
    Ok(Arc::new(client))
}

pub fn build_app(state: AppState) -> Router {
    let api = Router::new()
        .route("/v1/user/{id}", get(handlers::get_user))
        .route_layer(middleware::from_fn_with_state(
            state.api_keys.clone(),
            app_middleware::api_key_auth,
        ));

    Router::new()
        // Health and info endpoints
        .route("/", get(handlers::root))
        .route("/healthz", get(handlers::healthz))
        .route("/readyz", get(handlers::readyz))
        .route("/metrics", get(handlers::metrics))
        .merge(api)
        .fallback(handlers::not_found)
        // Middleware stack (outermost last: request id -> trace -> compression/cors -> metrics)
        .layer(middleware::from_fn(app_middleware::http_metrics))
        .layer(CorsLayer::permissive())
        .layer(CompressionLayer::new())
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(|req: &axum::http::Request<_>| {
                    use tracing::field::Empty;
                    let req_id = req
                        .extensions()
                        .get::<axum::http::HeaderValue>()
                        .and_then(|v| v.to_str().ok())
                        .unwrap_or("")
                        .to_string();
                    tracing::info_span!(
                        "http.request",
                        http.method = %req.method(),
                        http.target = %req.uri(),
                        http.status_code = Empty,
                        request_id = %req_id
                    )
                })
                .on_response(
                    |res: &axum::http::Response<_>,
                     latency: Duration,
                     span: &tracing::Span| {
                        span.record(
                            "http.status_code",
                            tracing::field::display(res.status().as_u16()),
                        );
                        tracing::info!(
                            http.status = %res.status().as_u16(),
                            elapsed_ms = %latency.as_millis(),
                            "request handled"
                        );
                    },
                ),
        )
        .layer(middleware::from_fn(app_middleware::request_id))
        .with_state(state)
}

pub struct ProfileCacheServer {
    addr: SocketAddr,
    app: Router,
}

pub struct ServerBuilder {
    addr: SocketAddr,
    config: AppConfig,
}

impl Default for ServerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ServerBuilder {
    pub fn new() -> Self {
        let cfg = AppConfig::default();
        Self {
            addr: cfg.addr(),
            config: cfg,
        }
    }

    pub fn with_addr(mut self, addr: SocketAddr) -> Self {
        self.addr = addr;
        self
    }

    pub fn with_config(mut self, cfg: AppConfig) -> Self {
        self.addr = cfg.addr();
        self.config = cfg;
        self
    }

    pub fn build(self) -> anyhow::Result<ProfileCacheServer> {
        let state = AppState::from_config(&self.config)?;
        tracing::info!(
            store = state.cache.store_backend(),
            ttl_secs = self.config.cache.ttl_secs,
            coalesce_misses = self.config.cache.coalesce_misses,
            api_keys = !state.api_keys.is_empty(),
            "cache pipeline ready"
        );

        Ok(ProfileCacheServer {
            addr: self.addr,
            app: build_app(state),
        })
    }
}

impl ProfileCacheServer {
    pub async fn run(self) -> anyhow::Result<()> {
        let listener = tokio::net::TcpListener::bind(self.addr).await?;
        tracing::info!("listening on {}", self.addr);
        axum::serve(listener, self.app)
            .with_graceful_shutdown(shutdown_signal())
            .await?;
        Ok(())
    }
}

async fn shutdown_signal() {
    // Wait for Ctrl+C
    let _ = tokio::signal::ctrl_c().await;
    tracing::info!("shutdown signal received");
}
