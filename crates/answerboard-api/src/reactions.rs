use axum::{Extension, Json, extract::State};
use tracing::info;

use answerboard_types::api::{HighlightRequest, HighlightResponse, ReactionRequest, ReactionResponse};

use crate::error::{ApiResult, ok};
use crate::middleware::{RequestScope, Viewer};
use crate::state::AppState;

pub async fn toggle_reaction(
    State(state): State<AppState>,
    Extension(viewer): Extension<Viewer>,
    Extension(RequestScope(scope)): Extension<RequestScope>,
    Json(req): Json<ReactionRequest>,
) -> ApiResult<ReactionResponse> {
    let outcome = state
        .services
        .board
        .react(&scope, viewer.email(), &req)
        .await?;

    info!(
        board_id = %req.board_id,
        row = req.row_index,
        reaction = outcome.kind.as_str(),
        reacted = outcome.reacted,
        "reaction toggled"
    );

    ok(ReactionResponse {
        reaction: outcome.kind,
        reacted: outcome.reacted,
        new_score: outcome.new_count,
        counts: outcome.counts,
    })
}

pub async fn toggle_highlight(
    State(state): State<AppState>,
    Extension(viewer): Extension<Viewer>,
    Extension(RequestScope(scope)): Extension<RequestScope>,
    Json(req): Json<HighlightRequest>,
) -> ApiResult<HighlightResponse> {
    let highlighted = state
        .services
        .board
        .toggle_highlight(&scope, viewer.email(), &req)
        .await?;

    ok(HighlightResponse {
        row_index: req.row_index,
        highlighted,
    })
}
