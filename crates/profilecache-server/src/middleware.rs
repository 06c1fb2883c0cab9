use std::collections::HashSet;
use std::sync::Arc;
use std::time::Instant;

use axum::{
    body::Body,
    extract::{MatchedPath, State},
    http::{HeaderMap, HeaderName, HeaderValue, Request, header::AUTHORIZATION},
    middleware::Next,
    response::{IntoResponse, Response},
};
use uuid::Uuid;

use crate::error::ApiError;

// =============================================================================
// API Key Middleware
// =============================================================================

/// Accepted inbound API keys. An empty set disables the check.
#[derive(Debug, Clone, Default)]
pub struct ApiKeys(Arc<HashSet<String>>);

impl ApiKeys {
    pub fn new<I, S>(keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self(Arc::new(
            keys.into_iter()
                .map(Into::into)
                .filter(|k: &String| !k.is_empty())
                .collect(),
        ))
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.0.contains(key)
    }
}

/// Rejects requests that do not present a known key via `x-api-key` or
/// `Authorization: Bearer <key>`.
pub async fn api_key_auth(State(keys): State<ApiKeys>, req: Request<Body>, next: Next) -> Response {
    if keys.is_empty() {
        return next.run(req).await;
    }

    let known = presented_key(req.headers()).map(|key| keys.contains(key));
    match known {
        Some(true) => next.run(req).await,
        Some(false) => {
            tracing::debug!(path = %req.uri().path(), "unknown API key");
            ApiError::Unauthorized.into_response()
        }
        None => {
            tracing::debug!(path = %req.uri().path(), "no API key presented");
            ApiError::Unauthorized.into_response()
        }
    }
}

fn presented_key(headers: &HeaderMap) -> Option<&str> {
    if let Some(key) = headers.get("x-api-key").and_then(|v| v.to_str().ok()) {
        return Some(key.trim());
    }
    headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|k| !k.is_empty())
}

// =============================================================================
// Request ID / Metrics Middleware
// =============================================================================

// Simple request-id middleware: propagates or generates X-Request-Id
pub async fn request_id(mut req: Request<Body>, next: Next) -> Response {
    let header_name = HeaderName::from_static("x-request-id");

    // If the incoming request already has a request-id, preserve it; otherwise generate one
    let req_id_value = match req.headers().get(&header_name) {
        Some(value) => value.clone(),
        None => HeaderValue::from_str(&Uuid::new_v4().to_string())
            .unwrap_or_else(|_| HeaderValue::from_static("unknown")),
    };

    // Add to request extensions for downstream usage (e.g., logging)
    req.extensions_mut().insert(req_id_value.clone());

    let mut res = next.run(req).await;

    // Add/propagate the request id header to response
    res.headers_mut().insert(header_name, req_id_value);

    res
}

pub async fn http_metrics(req: Request<Body>, next: Next) -> Response {
    let method = req.method().clone();
    let route = req
        .extensions()
        .get::<MatchedPath>()
        .map(|p| p.as_str().to_owned())
        .unwrap_or_else(|| "unmatched".to_owned());
    let started = Instant::now();

    let res = next.run(req).await;

    crate::metrics::record_http_request(
        method.as_str(),
        &route,
        res.status().as_u16(),
        started.elapsed(),
    );
    res
}
