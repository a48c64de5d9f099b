use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use serde_json::json;

use answerboard_core::BoardError;
use answerboard_sheets::SheetsError;

pub type ApiResult<T> = Result<Json<Envelope<T>>, ApiError>;

/// Success body: `{"status":"ok", ...fields of T}`.
#[derive(Debug, Serialize)]
pub struct Envelope<T> {
    status: &'static str,
    #[serde(flatten)]
    body: T,
}

pub fn ok<T: Serialize>(body: T) -> ApiResult<T> {
    Ok(Json(Envelope { status: "ok", body }))
}

#[derive(Debug)]
pub struct ApiError(pub BoardError);

impl From<BoardError> for ApiError {
    fn from(e: BoardError) -> Self {
        Self(e)
    }
}

impl ApiError {
    pub fn status_code(&self) -> StatusCode {
        match &self.0 {
            BoardError::Validation(_) => StatusCode::BAD_REQUEST,
            BoardError::NotFound(_) => StatusCode::NOT_FOUND,
            BoardError::Denied(_) => StatusCode::FORBIDDEN,
            BoardError::Unauthenticated => StatusCode::UNAUTHORIZED,
            BoardError::Conflict(_) => StatusCode::CONFLICT,
            BoardError::LockTimeout(_) => StatusCode::SERVICE_UNAVAILABLE,
            BoardError::Sheets(SheetsError::NotFound(_) | SheetsError::SheetNotFound(_)) => {
                StatusCode::NOT_FOUND
            }
            BoardError::Sheets(_) => StatusCode::BAD_GATEWAY,
            BoardError::Database(_) | BoardError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn public_message(&self) -> String {
        match &self.0 {
            BoardError::Database(_) | BoardError::Internal(_) => "Internal server error".to_string(),
            BoardError::Sheets(SheetsError::Transport(_) | SheetsError::Auth(_)) => {
                "Spreadsheet service unavailable".to_string()
            }
            other => other.to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!(
                category = self.0.category(),
                error = %self.0,
                status = %status,
                "request failed"
            );
        } else {
            tracing::debug!(
                category = self.0.category(),
                error = %self.0,
                status = %status,
                "request rejected"
            );
        }

        let body = json!({
            "status": "error",
            "message": self.public_message(),
        });
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn maps_board_errors_to_status_codes() {
        let cases = [
            (BoardError::validation("x"), StatusCode::BAD_REQUEST),
            (BoardError::not_found("x"), StatusCode::NOT_FOUND),
            (BoardError::denied("x"), StatusCode::FORBIDDEN),
            (BoardError::Unauthenticated, StatusCode::UNAUTHORIZED),
            (BoardError::Conflict("x".into()), StatusCode::CONFLICT),
            (
                BoardError::LockTimeout(Duration::from_secs(10)),
                StatusCode::SERVICE_UNAVAILABLE,
            ),
            (
                BoardError::Sheets(SheetsError::SheetNotFound("Form".into())),
                StatusCode::NOT_FOUND,
            ),
            (
                BoardError::Sheets(SheetsError::PermissionDenied("abc".into())),
                StatusCode::BAD_GATEWAY,
            ),
            (BoardError::Internal("x".into()), StatusCode::INTERNAL_SERVER_ERROR),
        ];
        for (error, expected) in cases {
            assert_eq!(ApiError(error).status_code(), expected);
        }
    }

    #[test]
    fn internal_details_are_not_exposed() {
        let err = ApiError(BoardError::Internal("disk I/O error at /var/db".into()));
        assert_eq!(err.public_message(), "Internal server error");

        let err = ApiError(BoardError::validation("sheet name is required"));
        assert_eq!(err.public_message(), "Validation error: sheet name is required");
    }
}
