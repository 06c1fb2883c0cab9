use serde::{Deserialize, Serialize};
use std::{net::SocketAddr, time::Duration};

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    /// Upstream identity service (REST API) settings
    #[serde(default)]
    pub upstream: UpstreamConfig,
    /// Persistent tier settings
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    /// Inbound API-key allow-list
    #[serde(default)]
    pub auth: AuthConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
}

impl AppConfig {
    pub fn validate(&self) -> Result<(), String> {
        // Server validations
        if self.server.port == 0 {
            return Err("server.port must be > 0".into());
        }
        // Upstream validations
        if self.upstream.token.trim().is_empty() {
            return Err("upstream.token is required".into());
        }
        if url::Url::parse(&self.upstream.base_url).is_err() {
            return Err("upstream.base_url must be a valid URL".into());
        }
        if self.upstream.timeout_ms == 0 {
            return Err("upstream.timeout_ms must be > 0".into());
        }
        // Store validations
        if self.store.backend == StoreBackend::Rest {
            if self.store.endpoint.as_deref().unwrap_or("").is_empty() {
                return Err("store.endpoint is required for the rest backend".into());
            }
            if self.store.credential.as_deref().unwrap_or("").is_empty() {
                return Err("store.credential is required for the rest backend".into());
            }
        }
        // Cache validations
        if self.cache.ttl_secs == 0 {
            return Err("cache.ttl_secs must be > 0".into());
        }
        if self.cache.stale_ttl_secs == 0 {
            return Err("cache.stale_ttl_secs must be > 0".into());
        }
        // Logging validation
        let lvl = self.logging.level.to_ascii_lowercase();
        let valid_levels = ["trace", "debug", "info", "warn", "error", "off"];
        if !valid_levels.contains(&lvl.as_str()) {
            return Err(format!("logging.level must be one of {valid_levels:?}"));
        }
        Ok(())
    }

    pub fn addr(&self) -> SocketAddr {
        use std::net::{IpAddr, Ipv4Addr};
        let host: IpAddr = self
            .server
            .host
            .parse()
            .unwrap_or(IpAddr::V4(Ipv4Addr::new(0, 0, 0, 0)));
        SocketAddr::from((host, self.server.port))
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache.ttl_secs)
    }

    /// Window granted to a record served as a fallback. Never longer than
    /// the regular TTL.
    pub fn stale_ttl(&self) -> Duration {
        Duration::from_secs(self.cache.stale_ttl_secs.min(self.cache.ttl_secs))
    }

    pub fn upstream_timeout(&self) -> Duration {
        Duration::from_millis(self.upstream.timeout_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_host() -> String {
    "0.0.0.0".into()
}
fn default_port() -> u16 {
    3000
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpstreamConfig {
    /// REST API base, e.g. `https://discord.com/api/v10`
    #[serde(default = "default_upstream_base_url")]
    pub base_url: String,
    /// Bot token (required)
    #[serde(default)]
    pub token: String,
    /// Authorization scheme prefixed to the token
    #[serde(default = "default_auth_scheme")]
    pub auth_scheme: String,
    /// Per-fetch timeout in milliseconds; expiry counts as a transient error
    #[serde(default = "default_upstream_timeout_ms")]
    pub timeout_ms: u64,
    #[serde(default = "default_upstream_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
}

fn default_upstream_base_url() -> String {
    "https://discord.com/api/v10".into()
}
fn default_auth_scheme() -> String {
    "Bot".into()
}
fn default_upstream_timeout_ms() -> u64 {
    10_000
}
fn default_upstream_connect_timeout_ms() -> u64 {
    5_000
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            base_url: default_upstream_base_url(),
            token: String::new(),
            auth_scheme: default_auth_scheme(),
            timeout_ms: default_upstream_timeout_ms(),
            connect_timeout_ms: default_upstream_connect_timeout_ms(),
        }
    }
}

/// Persistent tier backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    /// Hosted REST key-value service
    #[default]
    Rest,
    /// Process-local map; records do not survive a restart
    Memory,
}

impl std::fmt::Display for StoreBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StoreBackend::Rest => write!(f, "rest"),
            StoreBackend::Memory => write!(f, "memory"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    #[serde(default)]
    pub backend: StoreBackend,
    /// Base URL of the key-value service (required for `rest`)
    #[serde(default)]
    pub endpoint: Option<String>,
    /// Access secret (required for `rest`)
    #[serde(default)]
    pub credential: Option<String>,
    #[serde(default = "default_store_namespace")]
    pub namespace: String,
    #[serde(default = "default_store_timeout_ms")]
    pub timeout_ms: u64,
}

fn default_store_namespace() -> String {
    "users".into()
}
fn default_store_timeout_ms() -> u64 {
    5_000
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: StoreBackend::default(),
            endpoint: None,
            credential: None,
            namespace: default_store_namespace(),
            timeout_ms: default_store_timeout_ms(),
        }
    }
}

/// Cache configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Freshness window in seconds, applied to every entity
    #[serde(default = "default_ttl_secs")]
    pub ttl_secs: u64,

    /// Window granted to stale records served on upstream failure
    #[serde(default = "default_stale_ttl_secs")]
    pub stale_ttl_secs: u64,

    /// Collapse concurrent misses for the same key into one upstream call
    #[serde(default = "default_coalesce_misses")]
    pub coalesce_misses: bool,
}

fn default_ttl_secs() -> u64 {
    300 // 5 minutes
}

fn default_stale_ttl_secs() -> u64 {
    30
}

fn default_coalesce_misses() -> bool {
    true
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl_secs: default_ttl_secs(),
            stale_ttl_secs: default_stale_ttl_secs(),
            coalesce_misses: default_coalesce_misses(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AuthConfig {
    /// Accepted API keys. Empty disables inbound authentication.
    #[serde(default)]
    pub api_keys: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}
fn default_log_level() -> String {
    "info".into()
}
impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsConfig {
    #[serde(default = "default_metrics_enabled")]
    pub enabled: bool,
}
fn default_metrics_enabled() -> bool {
    true
}
impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: default_metrics_enabled(),
        }
    }
}

pub mod loader {
    use super::AppConfig;
    use config::{Config, ConfigBuilder, Environment, File, builder::DefaultState};
    use std::path::PathBuf;

    /// Plain environment variables accepted alongside the prefixed form.
    /// Applied last and in order, so they win over the file and
    /// `PROFILECACHE__*`, and `STORE_*` wins over the `FIREBASE_*` names.
    const FLAT_ENV_ALIASES: [(&str, &str); 7] = [
        ("BOT_TOKEN", "upstream.token"),
        ("FIREBASE_URL", "store.endpoint"),
        ("STORE_URL", "store.endpoint"),
        ("FIREBASE_SECRET", "store.credential"),
        ("STORE_SECRET", "store.credential"),
        ("CACHE_TTL_SECONDS", "cache.ttl_secs"),
        ("PORT", "server.port"),
    ];

    pub fn load_config(path: Option<&str>) -> Result<AppConfig, String> {
        let mut builder = Config::builder();
        match path {
            Some(p) => {
                let pathbuf = PathBuf::from(p);
                if pathbuf.exists() {
                    builder = builder.add_source(File::from(pathbuf));
                }
            }
            None => {
                // Try default root-level file
                let default_path = PathBuf::from("profilecache.toml");
                if default_path.exists() {
                    builder = builder.add_source(File::from(default_path));
                }
            }
        }
        // Environment variable overrides, e.g., PROFILECACHE__SERVER__PORT=9090
        builder = builder.add_source(
            Environment::with_prefix("PROFILECACHE")
                .try_parsing(true)
                .separator("__")
                .list_separator(",")
                .with_list_parse_key("auth.api_keys"),
        );
        builder = apply_flat_env(builder)?;

        let cfg = builder
            .build()
            .map_err(|e| format!("config build error: {e}"))?;
        let merged: AppConfig = cfg
            .try_deserialize()
            .map_err(|e| format!("config deserialize error: {e}"))?;
        // Validate
        merged.validate()?;
        Ok(merged)
    }

    fn apply_flat_env(
        mut builder: ConfigBuilder<DefaultState>,
    ) -> Result<ConfigBuilder<DefaultState>, String> {
        for (var, key) in FLAT_ENV_ALIASES {
            let value = std::env::var(var).ok().filter(|v| !v.trim().is_empty());
            builder = builder
                .set_override_option(key, value)
                .map_err(|e| format!("config override error for {var}: {e}"))?;
        }

        if let Ok(raw) = std::env::var("API_KEYS") {
            let keys: Vec<String> = raw
                .split(',')
                .map(str::trim)
                .filter(|k| !k.is_empty())
                .map(str::to_string)
                .collect();
            if !keys.is_empty() {
                builder = builder
                    .set_override("auth.api_keys", keys)
                    .map_err(|e| format!("config override error for API_KEYS: {e}"))?;
            }
        }
        Ok(builder)
    }
}
