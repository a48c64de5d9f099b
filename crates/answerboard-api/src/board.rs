use axum::{
    Extension, Json,
    extract::{Path, Query, State},
};
use serde::Serialize;
use uuid::Uuid;

use answerboard_types::api::{
    AccessQuery, AppSettings, BoardAnswers, PublishRequest, SaveSheetConfigRequest,
    SheetsListResponse, UnpublishRequest,
};
use answerboard_types::models::{AccessDecision, BoardConfig};

use crate::error::{ApiResult, ok};
use crate::middleware::{RequestScope, Viewer};
use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct ConfigResponse {
    pub config: BoardConfig,
}

pub async fn app_settings(
    State(state): State<AppState>,
    Extension(viewer): Extension<Viewer>,
    Extension(RequestScope(scope)): Extension<RequestScope>,
) -> ApiResult<AppSettings> {
    let settings = state
        .services
        .board
        .app_settings(&scope, viewer.email())
        .await?;
    ok(settings)
}

pub async fn sheets_list(
    State(state): State<AppState>,
    Path(user_id): Path<Uuid>,
    Extension(viewer): Extension<Viewer>,
    Extension(RequestScope(scope)): Extension<RequestScope>,
) -> ApiResult<SheetsListResponse> {
    let list = state
        .services
        .board
        .sheets_list(&scope, user_id, viewer.email())
        .await?;
    ok(list)
}

pub async fn save_sheet_config(
    State(state): State<AppState>,
    Extension(viewer): Extension<Viewer>,
    Extension(RequestScope(scope)): Extension<RequestScope>,
    Json(req): Json<SaveSheetConfigRequest>,
) -> ApiResult<ConfigResponse> {
    let config = state
        .services
        .board
        .save_sheet_config(&scope, viewer.email(), req)
        .await?;
    ok(ConfigResponse { config })
}

pub async fn publish(
    State(state): State<AppState>,
    Extension(viewer): Extension<Viewer>,
    Extension(RequestScope(scope)): Extension<RequestScope>,
    Json(req): Json<PublishRequest>,
) -> ApiResult<ConfigResponse> {
    let config = state
        .services
        .board
        .publish(&scope, viewer.email(), req)
        .await?;
    ok(ConfigResponse { config })
}

pub async fn unpublish(
    State(state): State<AppState>,
    Extension(viewer): Extension<Viewer>,
    Extension(RequestScope(scope)): Extension<RequestScope>,
    Json(req): Json<UnpublishRequest>,
) -> ApiResult<ConfigResponse> {
    let config = state
        .services
        .board
        .unpublish(&scope, viewer.email(), req)
        .await?;
    ok(ConfigResponse { config })
}

pub async fn answers(
    State(state): State<AppState>,
    Path(user_id): Path<Uuid>,
    Extension(viewer): Extension<Viewer>,
    Extension(RequestScope(scope)): Extension<RequestScope>,
) -> ApiResult<BoardAnswers> {
    let answers = state
        .services
        .board
        .answers(&scope, user_id, viewer.email())
        .await?;
    ok(answers)
}

/// Reports the decision rather than failing, so the front-end can pick a
/// screen for denied viewers.
pub async fn verify_access(
    State(state): State<AppState>,
    Path(user_id): Path<Uuid>,
    Extension(viewer): Extension<Viewer>,
    Extension(RequestScope(scope)): Extension<RequestScope>,
    Query(query): Query<AccessQuery>,
) -> ApiResult<AccessDecision> {
    let decision = state
        .services
        .access
        .verify_access(&scope, user_id, query.action, viewer.email())
        .await?;
    ok(decision)
}
