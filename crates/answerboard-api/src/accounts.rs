use axum::{
    Extension, Json,
    extract::{Path, Query, State},
};
use serde::Serialize;
use uuid::Uuid;

use answerboard_core::BoardError;
use answerboard_types::api::{
    ConnectSpreadsheetRequest, CurrentUserStatus, DeleteAccountQuery, DeleteAccountResponse,
    RegisterRequest, RegisterResponse, StatusQuery,
};
use answerboard_types::models::UserRecord;

use crate::error::{ApiResult, ok};
use crate::middleware::{RequestScope, Viewer};
use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct UserResponse {
    pub user: UserRecord,
}

pub async fn current_user_status(
    State(state): State<AppState>,
    Extension(viewer): Extension<Viewer>,
    Extension(RequestScope(scope)): Extension<RequestScope>,
    Query(query): Query<StatusQuery>,
) -> ApiResult<CurrentUserStatus> {
    let status = state
        .services
        .accounts
        .current_user_status(&scope, viewer.email(), query.request_user_id)
        .await?;
    ok(status)
}

pub async fn register(
    State(state): State<AppState>,
    Extension(viewer): Extension<Viewer>,
    Extension(RequestScope(scope)): Extension<RequestScope>,
    Json(req): Json<RegisterRequest>,
) -> ApiResult<RegisterResponse> {
    let email = viewer.email().ok_or(BoardError::Unauthenticated)?;
    let (user, created) = state
        .services
        .accounts
        .register(&scope, email, req.spreadsheet_url.as_deref())
        .await?;
    ok(RegisterResponse {
        user_id: user.user_id,
        created,
    })
}

pub async fn connect_spreadsheet(
    State(state): State<AppState>,
    Extension(viewer): Extension<Viewer>,
    Extension(RequestScope(scope)): Extension<RequestScope>,
    Json(req): Json<ConnectSpreadsheetRequest>,
) -> ApiResult<UserResponse> {
    let user = state
        .services
        .board
        .connect_spreadsheet(&scope, viewer.email(), req)
        .await?;
    ok(UserResponse { user })
}

pub async fn delete_account(
    State(state): State<AppState>,
    Path(user_id): Path<Uuid>,
    Extension(viewer): Extension<Viewer>,
    Extension(RequestScope(scope)): Extension<RequestScope>,
    Query(query): Query<DeleteAccountQuery>,
) -> ApiResult<DeleteAccountResponse> {
    state
        .services
        .accounts
        .delete_account(&scope, viewer.email(), user_id, query.hard)
        .await?;
    ok(DeleteAccountResponse {
        user_id,
        hard: query.hard,
    })
}
