use axum::{Json, extract::State};
use chrono::Utc;
use jsonwebtoken::{EncodingKey, Header, encode};
use tracing::info;

use answerboard_core::BoardError;
use answerboard_types::api::{Claims, DevLoginRequest, DevLoginResponse};

use crate::error::{ApiError, ApiResult, ok};
use crate::state::AppState;

const SESSION_DAYS: i64 = 30;

pub fn create_session_token(secret: &str, email: &str) -> Result<String, jsonwebtoken::errors::Error> {
    let exp = Utc::now()
        .checked_add_signed(chrono::Duration::days(SESSION_DAYS))
        .unwrap_or_else(Utc::now)
        .timestamp() as usize;

    let claims = Claims {
        email: email.trim().to_lowercase(),
        exp,
    };

    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
}

/// Mints a session for any email. Only mounted when dev login is enabled.
pub async fn dev_login(
    State(state): State<AppState>,
    Json(req): Json<DevLoginRequest>,
) -> ApiResult<DevLoginResponse> {
    if !state.dev_login {
        return Err(BoardError::not_found("dev login is disabled").into());
    }
    let email = req.email.trim();
    if email.is_empty() || !email.contains('@') {
        return Err(BoardError::validation("a valid email is required").into());
    }

    let token = create_session_token(&state.session_secret, email)
        .map_err(|e| ApiError(BoardError::Internal(format!("token encoding failed: {e}"))))?;
    info!(category = "auth", email, "dev session issued");
    ok(DevLoginResponse { token })
}
