use std::time::Duration;

use async_trait::async_trait;
use profilecache_core::{EntityKey, NormalizedProfile};
use profilecache_storage::{ProfileStore, StoreError};
use reqwest::{Client, StatusCode, header};
use url::Url;

/// Configuration for the REST store backend.
#[derive(Debug, Clone)]
pub struct RestStoreConfig {
    /// Base URL of the key-value service.
    pub endpoint: String,
    /// Secret appended as the `auth` query parameter; empty disables it.
    pub credential: String,
    /// Path prefix under which profiles are stored (default: `users`).
    pub namespace: String,
    /// HTTP request timeout (default: 5 seconds).
    pub request_timeout: Duration,
}

impl RestStoreConfig {
    /// Creates a new configuration with default namespace and timeout.
    #[must_use]
    pub fn new(endpoint: impl Into<String>, credential: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            credential: credential.into(),
            namespace: "users".to_string(),
            request_timeout: Duration::from_secs(5),
        }
    }

    /// Sets the record namespace.
    #[must_use]
    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = namespace.into();
        self
    }

    /// Sets the HTTP request timeout.
    #[must_use]
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }
}

/// Profile store backed by a REST key-value service.
pub struct RestProfileStore {
    client: Client,
    base: Url,
    namespace: Vec<String>,
    credential: Option<String>,
}

impl RestProfileStore {
    /// Creates a store from configuration.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Internal` if the endpoint is not a valid base URL
    /// or the HTTP client cannot be built.
    pub fn new(config: RestStoreConfig) -> Result<Self, StoreError> {
        let client = Client::builder()
            .timeout(config.request_timeout)
            .connect_timeout(config.request_timeout)
            .build()
            .map_err(|e| StoreError::internal(format!("Failed to create HTTP client: {e}")))?;

        Self::with_client(client, config)
    }

    /// Creates a store with a custom client.
    pub fn with_client(client: Client, config: RestStoreConfig) -> Result<Self, StoreError> {
        let base = Url::parse(&config.endpoint).map_err(|e| {
            StoreError::internal(format!("Invalid store endpoint '{}': {e}", config.endpoint))
        })?;
        if base.cannot_be_a_base() {
            return Err(StoreError::internal(format!(
                "Store endpoint '{}' cannot be a base URL",
                config.endpoint
            )));
        }

        let namespace = config
            .namespace
            .split('/')
            .filter(|segment| !segment.is_empty())
            .map(str::to_string)
            .collect();
        let credential = Some(config.credential).filter(|c| !c.is_empty());

        Ok(Self {
            client,
            base,
            namespace,
            credential,
        })
    }

    /// Builds the URL of the record stored under `key`.
    fn record_url(&self, key: &EntityKey) -> Result<Url, StoreError> {
        let mut url = self.base.clone();
        {
            let mut segments = url
                .path_segments_mut()
                .map_err(|_| StoreError::internal("Store endpoint cannot be a base URL"))?;
            segments.pop_if_empty();
            for segment in &self.namespace {
                segments.push(segment);
            }
            segments.push(&format!("{key}.json"));
        }
        if let Some(ref credential) = self.credential {
            url.query_pairs_mut().append_pair("auth", credential);
        }
        Ok(url)
    }
}

#[async_trait]
impl ProfileStore for RestProfileStore {
    async fn get(&self, key: &EntityKey) -> Result<Option<NormalizedProfile>, StoreError> {
        let url = self.record_url(key)?;

        let response = self
            .client
            .get(url)
            .header(header::ACCEPT, "application/json")
            .send()
            .await
            .map_err(|e| {
                tracing::warn!(key = %key, error = %e, "store GET failed");
                StoreError::connection_error(e.to_string())
            })?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(StoreError::backend_status(status.as_u16(), body));
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| StoreError::connection_error(e.to_string()))?;

        // A missing record is returned as a literal `null`.
        let record: Option<NormalizedProfile> = serde_json::from_slice(&body)
            .map_err(|e| StoreError::invalid_record(key.as_str(), e.to_string()))?;

        tracing::debug!(key = %key, found = record.is_some(), "store read");
        Ok(record)
    }

    async fn put(&self, key: &EntityKey, profile: &NormalizedProfile) -> Result<(), StoreError> {
        let url = self.record_url(key)?;
        let body = serde_json::to_vec(profile)?;

        let response = self
            .client
            .put(url)
            .header(header::CONTENT_TYPE, "application/json")
            .body(body)
            .send()
            .await
            .map_err(|e| {
                tracing::warn!(key = %key, error = %e, "store PUT failed");
                StoreError::connection_error(e.to_string())
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(StoreError::backend_status(status.as_u16(), body));
        }

        tracing::debug!(key = %key, "store write");
        Ok(())
    }

    fn backend_name(&self) -> &'static str {
        "rest"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store(endpoint: &str, credential: &str, namespace: &str) -> RestProfileStore {
        RestProfileStore::new(
            RestStoreConfig::new(endpoint, credential).with_namespace(namespace),
        )
        .unwrap()
    }

    #[test]
    fn record_url_layout() {
        let s = store("https://kv.example.com/", "s3cret", "users");
        let url = s.record_url(&EntityKey::from("42")).unwrap();
        assert_eq!(url.as_str(), "https://kv.example.com/users/42.json?auth=s3cret");
    }

    #[test]
    fn record_url_nested_namespace_without_credential() {
        let s = store("https://kv.example.com/root", "", "/cache/users/");
        let url = s.record_url(&EntityKey::from("7")).unwrap();
        assert_eq!(url.as_str(), "https://kv.example.com/root/cache/users/7.json");
    }

    #[test]
    fn record_url_escapes_key() {
        let s = store("https://kv.example.com", "", "users");
        let url = s.record_url(&EntityKey::from("a/b")).unwrap();
        assert_eq!(url.as_str(), "https://kv.example.com/users/a%2Fb.json");
    }

    #[test]
    fn rejects_invalid_endpoint() {
        assert!(RestProfileStore::new(RestStoreConfig::new("not a url", "")).is_err());
        assert!(RestProfileStore::new(RestStoreConfig::new("mailto:x@example.com", "")).is_err());
    }

    #[test]
    fn backend_name() {
        assert_eq!(store("https://kv.example.com", "", "users").backend_name(), "rest");
    }
}
