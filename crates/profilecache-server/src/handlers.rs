use axum::{
    Json,
    extract::{Path, Query, State},
    http::{StatusCode, header},
    response::IntoResponse,
};
use profilecache_core::{EntityKey, NormalizedProfile};
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::cache::Resolved;
use crate::error::ApiError;
use crate::server::AppState;

#[derive(Serialize)]
struct HealthResponse<'a> {
    status: &'a str,
}

pub async fn root() -> impl IntoResponse {
    let body = json!({
        "service": "profilecache",
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    });
    (StatusCode::OK, Json(body))
}

pub async fn healthz() -> impl IntoResponse {
    (StatusCode::OK, Json(HealthResponse { status: "ok" }))
}

pub async fn readyz(State(state): State<AppState>) -> impl IntoResponse {
    let body = json!({
        "status": "ready",
        "store": state.cache.store_backend(),
        "memoryEntries": state.cache.memory().len(),
        "presenceGuilds": state.presence.guild_count(),
    });
    (StatusCode::OK, Json(body))
}

pub async fn metrics(State(state): State<AppState>) -> impl IntoResponse {
    let rendered = state
        .metrics_enabled
        .then(crate::metrics::render_metrics)
        .flatten();
    match rendered {
        Some(text) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            text,
        )
            .into_response(),
        None => ApiError::RouteNotFound.into_response(),
    }
}

pub async fn not_found() -> ApiError {
    ApiError::RouteNotFound
}

// ---- Profile lookup ----

#[derive(Debug, Default, Deserialize)]
pub struct UserQuery {
    pub force: Option<String>,
}

impl UserQuery {
    /// `force=true` or `force=1` bypasses the fresh cache tiers.
    pub fn force_refresh(&self) -> bool {
        self.force
            .as_deref()
            .is_some_and(|v| v == "1" || v.eq_ignore_ascii_case("true"))
    }
}

/// Successful lookup body: cache metadata followed by the profile fields.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserEnvelope {
    pub success: bool,
    pub cached: bool,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub stale: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cache_ttl_remaining: Option<i64>,
    #[serde(flatten)]
    pub profile: NormalizedProfile,
}

impl UserEnvelope {
    pub fn new(resolved: &Resolved, now_millis: i64) -> Self {
        let cached = resolved.is_cached();
        Self {
            success: true,
            cached,
            stale: resolved.is_stale(),
            cache_ttl_remaining: cached.then(|| resolved.ttl_remaining_secs(now_millis)),
            profile: (*resolved.profile).clone(),
        }
    }
}

pub async fn get_user(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(query): Query<UserQuery>,
) -> Result<Json<UserEnvelope>, ApiError> {
    let key = EntityKey::new(id);
    let force_refresh = query.force_refresh();

    let resolved = state
        .cache
        .resolve(&key, force_refresh)
        .await
        .map_err(|e| {
            tracing::debug!(key = %key, code = e.code(), error = %e, "lookup failed");
            ApiError::from(e)
        })?;

    tracing::debug!(
        key = %key,
        source = resolved.source.as_str(),
        force_refresh,
        "lookup served"
    );
    Ok(Json(UserEnvelope::new(&resolved, state.cache.now_millis())))
}
