use std::sync::Arc;

use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use axum_extra::headers::{Authorization, HeaderMapExt, authorization::Bearer};
use jsonwebtoken::{DecodingKey, Validation, decode};
use tracing::debug;

use answerboard_cache::CacheScope;
use answerboard_types::api::Claims;

use crate::state::AppState;

/// The signed-in identity of the caller, if any.
#[derive(Debug, Clone, Default)]
pub struct Viewer {
    pub email: Option<String>,
}

impl Viewer {
    pub fn email(&self) -> Option<&str> {
        self.email.as_deref()
    }
}

/// Cache view shared by every lookup made while serving one request.
#[derive(Clone)]
pub struct RequestScope(pub Arc<CacheScope>);

/// Resolves the viewer from an optional Bearer token and opens the request's
/// cache scope. Missing or invalid tokens leave the viewer anonymous.
pub async fn resolve_viewer(State(state): State<AppState>, mut req: Request, next: Next) -> Response {
    let email = req
        .headers()
        .typed_get::<Authorization<Bearer>>()
        .and_then(|auth| {
            match decode::<Claims>(
                auth.token(),
                &DecodingKey::from_secret(state.session_secret.as_bytes()),
                &Validation::default(),
            ) {
                Ok(data) => Some(data.claims.email.trim().to_lowercase()),
                Err(e) => {
                    debug!(category = "auth", "ignoring invalid session token: {}", e);
                    None
                }
            }
        })
        .filter(|email| !email.is_empty());

    req.extensions_mut().insert(Viewer { email });
    req.extensions_mut()
        .insert(RequestScope(Arc::new(state.cache.scope())));
    next.run(req).await
}
