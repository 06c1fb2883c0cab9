//! Upstream identity service client.
//!
//! Fetches the raw profile of one entity from the REST API. Every call
//! resolves to exactly one [`FetchOutcome`]:
//!
//! - `Found` - the service returned a JSON profile
//! - `NotFound` - the service answered with a not-found status
//! - `Transient` - anything else: transport failure, timeout, non-success
//!   status (rate limiting included), unexpected content type, or a body
//!   that does not decode
//!
//! Transient failures are never retried here; the cache pipeline decides
//! whether a stale record can be served instead.

use std::time::Duration;

use async_trait::async_trait;
use profilecache_core::{EntityKey, RawProfile};
use reqwest::{Client, StatusCode, header};
use url::Url;

/// Result of a single upstream fetch.
#[derive(Debug)]
pub enum FetchOutcome {
    Found(RawProfile),
    NotFound,
    Transient(UpstreamError),
}

impl FetchOutcome {
    /// Label used for metrics and logs.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Found(_) => "found",
            Self::NotFound => "not_found",
            Self::Transient(_) => "transient",
        }
    }
}

/// Transient upstream failure.
#[derive(Debug, Clone, thiserror::Error)]
pub enum UpstreamError {
    /// A network error occurred while calling the service.
    #[error("Network error: {0}")]
    Network(String),

    /// The call did not complete within the configured timeout.
    #[error("Upstream request timed out")]
    Timeout,

    /// The service returned a non-success status code.
    #[error("HTTP error: status {0}")]
    Status(u16),

    /// The response was not JSON.
    #[error("Unexpected content type: {0}")]
    UnexpectedContentType(String),

    /// The response body could not be decoded as a profile.
    #[error("Failed to decode profile: {0}")]
    Decode(String),
}

/// Configuration for [`RestUpstreamClient`].
#[derive(Debug, Clone)]
pub struct UpstreamClientConfig {
    /// API base, e.g. `https://discord.com/api/v10`.
    pub base_url: String,
    /// Credential sent with every request.
    pub token: String,
    /// Scheme prefixed to the token in the `Authorization` header (default: `Bot`).
    pub auth_scheme: String,
    /// Whole-request timeout (default: 10 seconds).
    pub request_timeout: Duration,
    /// Connect timeout (default: 5 seconds).
    pub connect_timeout: Duration,
}

impl UpstreamClientConfig {
    #[must_use]
    pub fn new(base_url: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            token: token.into(),
            auth_scheme: "Bot".to_string(),
            request_timeout: Duration::from_secs(10),
            connect_timeout: Duration::from_secs(5),
        }
    }

    #[must_use]
    pub fn with_auth_scheme(mut self, scheme: impl Into<String>) -> Self {
        self.auth_scheme = scheme.into();
        self
    }

    #[must_use]
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    #[must_use]
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }
}

/// Source of raw profiles.
#[async_trait]
pub trait UpstreamClient: Send + Sync {
    async fn fetch(&self, key: &EntityKey) -> FetchOutcome;
}

/// REST client for `GET {base_url}/users/{id}`.
pub struct RestUpstreamClient {
    client: Client,
    base: Url,
    authorization: String,
}

impl RestUpstreamClient {
    /// Creates a client from configuration.
    ///
    /// # Errors
    ///
    /// Fails if the base URL is invalid or the HTTP client cannot be built.
    pub fn new(config: UpstreamClientConfig) -> anyhow::Result<Self> {
        let client = Client::builder()
            .timeout(config.request_timeout)
            .connect_timeout(config.connect_timeout)
            .user_agent(concat!("profilecache/", env!("CARGO_PKG_VERSION")))
            .build()?;

        let base = Url::parse(&config.base_url)?;
        if base.cannot_be_a_base() {
            anyhow::bail!("upstream base URL '{}' cannot be a base", config.base_url);
        }

        Ok(Self {
            client,
            base,
            authorization: format!("{} {}", config.auth_scheme, config.token),
        })
    }

    fn user_url(&self, key: &EntityKey) -> Url {
        let mut url = self.base.clone();
        if let Ok(mut segments) = url.path_segments_mut() {
            segments.pop_if_empty().push("users").push(key.as_str());
        }
        url
    }
}

#[async_trait]
impl UpstreamClient for RestUpstreamClient {
    async fn fetch(&self, key: &EntityKey) -> FetchOutcome {
        let response = match self
            .client
            .get(self.user_url(key))
            .header(header::AUTHORIZATION, &self.authorization)
            .header(header::ACCEPT, "application/json")
            .send()
            .await
        {
            Ok(response) => response,
            Err(e) if e.is_timeout() => return FetchOutcome::Transient(UpstreamError::Timeout),
            Err(e) => return FetchOutcome::Transient(UpstreamError::Network(e.to_string())),
        };

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return FetchOutcome::NotFound;
        }
        if !status.is_success() {
            return FetchOutcome::Transient(UpstreamError::Status(status.as_u16()));
        }

        let content_type = response
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
            .to_ascii_lowercase();
        if !is_json(&content_type) {
            return FetchOutcome::Transient(UpstreamError::UnexpectedContentType(content_type));
        }

        match response.json::<RawProfile>().await {
            Ok(raw) => FetchOutcome::Found(raw),
            Err(e) if e.is_timeout() => FetchOutcome::Transient(UpstreamError::Timeout),
            Err(e) => FetchOutcome::Transient(UpstreamError::Decode(e.to_string())),
        }
    }
}

fn is_json(content_type: &str) -> bool {
    let mime = content_type.split(';').next().unwrap_or("").trim();
    mime == "application/json" || mime.ends_with("+json")
}
