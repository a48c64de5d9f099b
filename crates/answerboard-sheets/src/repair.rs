use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use tracing::{info, warn};

use crate::auth::ServiceAccountAuth;
use crate::error::{SheetsError, SheetsResult};

const DRIVE_FILES_URL: &str = "https://www.googleapis.com/drive/v3/files";

/// Tries to restore the service account's access after a 403.
#[async_trait]
pub trait AccessRepair: Send + Sync {
    async fn repair(&self, spreadsheet_id: &str) -> SheetsResult<()>;
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct PermissionRequest<'a> {
    role: &'static str,
    #[serde(rename = "type")]
    kind: &'static str,
    email_address: &'a str,
}

/// Re-shares the spreadsheet with the service account through the Drive API,
/// acting as a delegated user who can still edit it.
pub struct DriveShareRepair {
    http: reqwest::Client,
    auth: Arc<ServiceAccountAuth>,
    delegate: String,
}

impl DriveShareRepair {
    pub fn new(http: reqwest::Client, auth: Arc<ServiceAccountAuth>, delegate: impl Into<String>) -> Self {
        Self {
            http,
            auth,
            delegate: delegate.into(),
        }
    }
}

#[async_trait]
impl AccessRepair for DriveShareRepair {
    async fn repair(&self, spreadsheet_id: &str) -> SheetsResult<()> {
        let token = self.auth.get_delegated_token(&self.delegate, false).await?;

        let response = self
            .http
            .post(format!("{DRIVE_FILES_URL}/{spreadsheet_id}/permissions"))
            .query(&[("sendNotificationEmail", "false"), ("supportsAllDrives", "true")])
            .bearer_auth(token)
            .json(&PermissionRequest {
                role: "writer",
                kind: "user",
                email_address: self.auth.client_email(),
            })
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            info!(
                category = "sheets",
                spreadsheet_id, "re-shared spreadsheet with the service account"
            );
            return Ok(());
        }

        let body = response.text().await.unwrap_or_default();
        warn!(
            category = "sheets",
            spreadsheet_id,
            status = status.as_u16(),
            "access repair failed"
        );
        Err(SheetsError::Api {
            status: status.as_u16(),
            body,
        })
    }
}
