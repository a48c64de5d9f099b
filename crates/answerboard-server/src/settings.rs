use std::env;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, bail};

/// Placeholder session secrets that must not reach a deployment.
const PLACEHOLDER_SECRETS: &[&str] = &[
    "change-me-to-a-random-string",
    "dev-secret-change-me",
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SheetsBackendKind {
    Api,
    Memory,
}

#[derive(Clone)]
pub struct Settings {
    pub host: String,
    pub port: u16,
    pub db_path: PathBuf,
    pub session_secret: String,
    pub public_url: Option<String>,
    pub sheets_backend: SheetsBackendKind,
    pub service_account_file: Option<PathBuf>,
    pub drive_delegate: Option<String>,
    pub admin_emails: String,
    pub lock_timeout: Duration,
    pub dev_login: bool,
    pub cleanup_interval_secs: u64,
}

impl Settings {
    pub fn from_env() -> anyhow::Result<Self> {
        let session_secret = env::var("BOARD_SESSION_SECRET").unwrap_or_default();
        if session_secret.is_empty() || PLACEHOLDER_SECRETS.contains(&session_secret.as_str()) {
            bail!("BOARD_SESSION_SECRET is unset or still a placeholder");
        }

        let port: u16 = env::var("BOARD_PORT")
            .unwrap_or_else(|_| "3000".into())
            .parse()
            .context("BOARD_PORT must be a port number")?;

        let sheets_backend = match env::var("BOARD_SHEETS_BACKEND").as_deref() {
            Ok("memory") => SheetsBackendKind::Memory,
            Ok("api") | Err(_) => SheetsBackendKind::Api,
            Ok(other) => bail!("unknown BOARD_SHEETS_BACKEND '{other}' (expected 'api' or 'memory')"),
        };
        let service_account_file = optional("BOARD_SERVICE_ACCOUNT_FILE").map(PathBuf::from);
        if sheets_backend == SheetsBackendKind::Api && service_account_file.is_none() {
            bail!("BOARD_SERVICE_ACCOUNT_FILE is required when BOARD_SHEETS_BACKEND=api");
        }

        let lock_timeout_ms: u64 = env::var("BOARD_LOCK_TIMEOUT_MS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(10_000);

        Ok(Self {
            host: env::var("BOARD_HOST").unwrap_or_else(|_| "0.0.0.0".into()),
            port,
            db_path: env::var("BOARD_DB_PATH")
                .unwrap_or_else(|_| "answerboard.db".into())
                .into(),
            session_secret,
            public_url: optional("BOARD_PUBLIC_URL"),
            sheets_backend,
            service_account_file,
            drive_delegate: optional("BOARD_DRIVE_DELEGATE"),
            admin_emails: env::var("BOARD_ADMIN_EMAILS").unwrap_or_default(),
            lock_timeout: Duration::from_millis(lock_timeout_ms),
            dev_login: matches!(
                env::var("BOARD_DEV_LOGIN").as_deref(),
                Ok("1" | "true" | "yes")
            ),
            cleanup_interval_secs: env::var("BOARD_CLEANUP_INTERVAL_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(600),
        })
    }
}

fn optional(name: &str) -> Option<String> {
    env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}
