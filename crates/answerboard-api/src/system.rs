use axum::{Extension, Json, extract::State};
use serde_json::json;
use tracing::info;

use answerboard_core::BoardError;
use answerboard_core::webapp::web_app_url_cached;
use answerboard_types::api::{ClearCacheRequest, ClearCacheResponse, WebAppUrlResponse};

use crate::error::{ApiResult, ok};
use crate::middleware::{RequestScope, Viewer};
use crate::state::AppState;

const DEFAULT_CLEAR_MAX_KEYS: usize = 500;

pub async fn health() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

pub async fn web_app_url(
    State(state): State<AppState>,
    Extension(RequestScope(scope)): Extension<RequestScope>,
) -> ApiResult<WebAppUrlResponse> {
    let configured = state.public_url.clone();
    let url = web_app_url_cached(&scope, || async move {
        configured.ok_or_else(|| BoardError::not_found("public URL is not configured"))
    })
    .await?;
    ok(WebAppUrlResponse { url })
}

/// Drops cached keys by prefix. System administrators only.
pub async fn clear_cache(
    State(state): State<AppState>,
    Extension(viewer): Extension<Viewer>,
    Extension(RequestScope(scope)): Extension<RequestScope>,
    Json(req): Json<ClearCacheRequest>,
) -> ApiResult<ClearCacheResponse> {
    let email = viewer.email().ok_or(BoardError::Unauthenticated)?;
    if !state.services.access.admins().contains(email) {
        return Err(BoardError::denied("system administrators only").into());
    }
    if req.prefix.is_empty() {
        return Err(BoardError::validation("prefix must not be empty").into());
    }

    let removed = scope.clear_by_pattern(&req.prefix, req.max_keys.unwrap_or(DEFAULT_CLEAR_MAX_KEYS));
    info!(category = "cache", email, prefix = %req.prefix, removed, "cache cleared by administrator");
    ok(ClearCacheResponse { removed })
}
