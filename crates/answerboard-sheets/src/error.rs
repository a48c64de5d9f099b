use thiserror::Error;

pub type SheetsResult<T> = Result<T, SheetsError>;

#[derive(Debug, Error)]
pub enum SheetsError {
    #[error("Spreadsheet not found: {0}")]
    NotFound(String),

    #[error("Sheet not found: {0}")]
    SheetNotFound(String),

    #[error("Permission denied for spreadsheet {0}")]
    PermissionDenied(String),

    #[error("Sheets API returned {status}: {body}")]
    Api { status: u16, body: String },

    #[error("Transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Service account authentication failed: {0}")]
    Auth(String),

    #[error("Invalid service account key: {0}")]
    InvalidKey(String),

    #[error("Invalid endpoint: {0}")]
    Endpoint(String),
}

impl SheetsError {
    /// Worth retrying with backoff.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Api { status, .. } => *status == 429 || *status >= 500,
            Self::Transport(e) => e.is_timeout() || e.is_connect(),
            _ => false,
        }
    }
}
