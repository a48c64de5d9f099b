//! HTTP surface of the answer board.

pub mod accounts;
pub mod auth;
pub mod board;
pub mod error;
pub mod middleware;
pub mod pages;
pub mod reactions;
pub mod state;
pub mod system;

use axum::{
    Router, middleware as axum_middleware,
    routing::{delete, get, post},
};

pub use state::{AppState, AppStateInner};

/// Every route, with viewer resolution applied. Transport layers (CORS,
/// tracing) are added by the binary.
pub fn router(state: AppState) -> Router {
    let board_routes = Router::new()
        .route("/", get(pages::index))
        .route("/api/reactions", post(reactions::toggle_reaction))
        .route("/api/highlight", post(reactions::toggle_highlight))
        .route("/api/settings", get(board::app_settings))
        .route("/api/users/{user_id}/sheets", get(board::sheets_list))
        .route("/api/users/{user_id}", delete(accounts::delete_account))
        .route("/api/sheet-config", post(board::save_sheet_config))
        .route("/api/publish", post(board::publish))
        .route("/api/unpublish", post(board::unpublish))
        .route("/api/status", get(accounts::current_user_status))
        .route("/api/register", post(accounts::register))
        .route("/api/spreadsheet", post(accounts::connect_spreadsheet))
        .route("/api/boards/{user_id}/answers", get(board::answers))
        .route("/api/boards/{user_id}/access", get(board::verify_access))
        .route("/api/webapp-url", get(system::web_app_url))
        .route("/api/admin/cache/clear", post(system::clear_cache))
        .layer(axum_middleware::from_fn_with_state(
            state.clone(),
            middleware::resolve_viewer,
        ))
        .with_state(state.clone());

    let public_routes = Router::new()
        .route("/auth/dev-login", post(auth::dev_login))
        .route("/health", get(system::health))
        .with_state(state);

    Router::new().merge(public_routes).merge(board_routes)
}
