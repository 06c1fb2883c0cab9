//! HTTP-facing errors.

use axum::{
    Json,
    http::{StatusCode, header},
    response::{IntoResponse, Response},
};
use serde_json::json;
use std::fmt;

use crate::cache::ResolveError;

/// Errors rendered to API clients as `{"success": false, "error": <code>}`.
///
/// Only the stable code reaches the client; details go to the log.
#[derive(Debug)]
pub enum ApiError {
    /// The entity does not exist upstream and nothing is cached (404).
    NotFound,

    /// The upstream service failed and nothing is cached (502).
    UpstreamUnavailable,

    /// The persistent tier and the upstream service both failed (503).
    StoreUnavailable,

    /// Missing or unknown API key (401).
    Unauthorized,

    /// No route matched (404).
    RouteNotFound,
}

impl ApiError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::NotFound => "user_not_found",
            Self::UpstreamUnavailable => "upstream_unavailable",
            Self::StoreUnavailable => "store_unavailable",
            Self::Unauthorized => "unauthorized",
            Self::RouteNotFound => "route_not_found",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            Self::NotFound | Self::RouteNotFound => StatusCode::NOT_FOUND,
            Self::UpstreamUnavailable => StatusCode::BAD_GATEWAY,
            Self::StoreUnavailable => StatusCode::SERVICE_UNAVAILABLE,
            Self::Unauthorized => StatusCode::UNAUTHORIZED,
        }
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.code(), self.status().as_u16())
    }
}

impl std::error::Error for ApiError {}

impl From<ResolveError> for ApiError {
    fn from(err: ResolveError) -> Self {
        match err {
            ResolveError::NotFound { .. } => Self::NotFound,
            ResolveError::Upstream { .. } => Self::UpstreamUnavailable,
            ResolveError::Store { .. } => Self::StoreUnavailable,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = Json(json!({
            "success": false,
            "error": self.code(),
        }));
        match self {
            Self::Unauthorized => (
                self.status(),
                [(header::WWW_AUTHENTICATE, "Bearer")],
                body,
            )
                .into_response(),
            _ => (self.status(), body).into_response(),
        }
    }
}
