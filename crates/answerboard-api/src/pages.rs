use axum::{
    Extension,
    extract::{Query, State},
};

use answerboard_types::api::{Page, PageQuery};

use crate::error::{ApiResult, ok};
use crate::middleware::{RequestScope, Viewer};
use crate::state::AppState;

/// `GET /`: which screen to render.
pub async fn index(
    State(state): State<AppState>,
    Extension(viewer): Extension<Viewer>,
    Extension(RequestScope(scope)): Extension<RequestScope>,
    Query(query): Query<PageQuery>,
) -> ApiResult<Page> {
    let page = state
        .services
        .board
        .select_page(&scope, &query, viewer.email())
        .await?;
    ok(page)
}
