use std::time::Duration;

use thiserror::Error;

use answerboard_sheets::SheetsError;

pub type BoardResult<T> = Result<T, BoardError>;

/// Failures of board operations. Access denials that are part of normal
/// control flow are returned as `AccessDecision` values instead.
#[derive(Debug, Error)]
pub enum BoardError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Access denied: {0}")]
    Denied(String),

    #[error("Authentication required")]
    Unauthenticated,

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Lock not acquired within {0:?}")]
    LockTimeout(Duration),

    #[error("Spreadsheet error: {0}")]
    Sheets(#[from] SheetsError),

    #[error("Database error: {0}")]
    Database(#[from] anyhow::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl BoardError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn denied(msg: impl Into<String>) -> Self {
        Self::Denied(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    /// Short tag used as the `category` field in logs.
    pub fn category(&self) -> &'static str {
        match self {
            Self::Validation(_) => "validation",
            Self::NotFound(_) => "not_found",
            Self::Denied(_) | Self::Unauthenticated => "access",
            Self::Conflict(_) => "conflict",
            Self::LockTimeout(_) => "lock",
            Self::Sheets(_) => "sheets",
            Self::Database(_) => "database",
            Self::Internal(_) => "internal",
        }
    }
}
