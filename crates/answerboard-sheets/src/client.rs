use std::sync::Arc;

use async_trait::async_trait;
use reqwest::{RequestBuilder, StatusCode, Url};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use answerboard_types::models::SheetInfo;

use crate::a1::A1Range;
use crate::auth::TokenSource;
use crate::backend::{SheetsBackend, ValueRange};
use crate::error::{SheetsError, SheetsResult};
use crate::repair::AccessRepair;
use crate::retry::{Disposition, RetryPolicy, classify};

const DEFAULT_BASE_URL: &str = "https://sheets.googleapis.com/v4/spreadsheets";

// ── Wire types ──────────────────────────────────────────────────────────

#[derive(Debug, Default, Deserialize)]
struct ValuesResponse {
    #[serde(default)]
    values: Vec<Vec<serde_json::Value>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BatchGetResponse {
    #[serde(default)]
    value_ranges: Vec<ValuesResponse>,
}

#[derive(Debug, Deserialize)]
struct SpreadsheetResponse {
    #[serde(default)]
    sheets: Vec<SheetEntry>,
}

#[derive(Debug, Deserialize)]
struct SheetEntry {
    properties: SheetProperties,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SheetProperties {
    sheet_id: i64,
    title: String,
    #[serde(default)]
    grid_properties: GridProperties,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GridProperties {
    #[serde(default)]
    row_count: u32,
    #[serde(default)]
    column_count: u32,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct BatchUpdateValuesRequest<'a> {
    value_input_option: &'static str,
    data: Vec<WireValueRange<'a>>,
}

#[derive(Debug, Serialize)]
struct WireValueRange<'a> {
    range: String,
    values: &'a [Vec<String>],
}

// ── Client ──────────────────────────────────────────────────────────────

/// Sheets API v4 client with backoff on transient failures and a one-shot
/// access repair on 403.
pub struct SheetsApiClient {
    http: reqwest::Client,
    tokens: Arc<dyn TokenSource>,
    repair: Option<Arc<dyn AccessRepair>>,
    retry: RetryPolicy,
    base_url: String,
}

impl SheetsApiClient {
    pub fn new(http: reqwest::Client, tokens: Arc<dyn TokenSource>) -> Self {
        Self {
            http,
            tokens,
            repair: None,
            retry: RetryPolicy::default(),
            base_url: DEFAULT_BASE_URL.to_string(),
        }
    }

    pub fn with_repair(mut self, repair: Arc<dyn AccessRepair>) -> Self {
        self.repair = Some(repair);
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    fn url(&self, segments: &[&str]) -> SheetsResult<Url> {
        let mut url = Url::parse(&self.base_url)
            .map_err(|e| SheetsError::Endpoint(format!("{}: {}", self.base_url, e)))?;
        url.path_segments_mut()
            .map_err(|_| SheetsError::Endpoint(format!("{} cannot hold a path", self.base_url)))?
            .extend(segments);
        Ok(url)
    }

    /// Sends the request built by `build`, retrying transient failures with
    /// backoff and repairing access once on 403.
    async fn execute<T, F>(&self, spreadsheet_id: &str, build: F) -> SheetsResult<T>
    where
        T: DeserializeOwned,
        F: Fn(&reqwest::Client) -> RequestBuilder,
    {
        let mut attempt = 0;
        let mut repaired = false;

        loop {
            let token = self.tokens.bearer_token().await?;
            let response = match build(&self.http).bearer_auth(token).send().await {
                Ok(response) => response,
                Err(e) => {
                    let err = SheetsError::from(e);
                    if err.is_transient() && self.retry.can_retry(attempt) {
                        self.back_off(spreadsheet_id, attempt, &err.to_string()).await;
                        attempt += 1;
                        continue;
                    }
                    return Err(err);
                }
            };

            let status = response.status();
            match classify(status) {
                Disposition::Done => return Ok(response.json::<T>().await?),
                Disposition::Retry if self.retry.can_retry(attempt) => {
                    self.back_off(spreadsheet_id, attempt, status.as_str()).await;
                    attempt += 1;
                }
                Disposition::RepairAccess if !repaired && self.repair.is_some() => {
                    repaired = true;
                    if let Some(repair) = &self.repair {
                        warn!(
                            category = "sheets",
                            spreadsheet_id, "permission denied, attempting access repair"
                        );
                        repair.repair(spreadsheet_id).await?;
                    }
                }
                _ => return Err(error_from_response(spreadsheet_id, status, response).await),
            }
        }
    }

    async fn back_off(&self, spreadsheet_id: &str, attempt: u32, reason: &str) {
        let delay = self.retry.delay_for(attempt);
        warn!(
            category = "sheets",
            spreadsheet_id,
            attempt = attempt + 1,
            delay_ms = delay.as_millis() as u64,
            "transient Sheets API failure ({}), retrying",
            reason
        );
        tokio::time::sleep(delay).await;
    }
}

async fn error_from_response(
    spreadsheet_id: &str,
    status: StatusCode,
    response: reqwest::Response,
) -> SheetsError {
    match status {
        StatusCode::NOT_FOUND => SheetsError::NotFound(spreadsheet_id.to_string()),
        StatusCode::FORBIDDEN => SheetsError::PermissionDenied(spreadsheet_id.to_string()),
        _ => SheetsError::Api {
            status: status.as_u16(),
            body: response.text().await.unwrap_or_default(),
        },
    }
}

fn cell_to_string(value: serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s,
        serde_json::Value::Null => String::new(),
        serde_json::Value::Bool(true) => "TRUE".to_string(),
        serde_json::Value::Bool(false) => "FALSE".to_string(),
        other => other.to_string(),
    }
}

fn into_grid(values: Vec<Vec<serde_json::Value>>) -> Vec<Vec<String>> {
    values
        .into_iter()
        .map(|row| row.into_iter().map(cell_to_string).collect())
        .collect()
}

#[async_trait]
impl SheetsBackend for SheetsApiClient {
    async fn list_sheets(&self, spreadsheet_id: &str) -> SheetsResult<Vec<SheetInfo>> {
        let url = self.url(&[spreadsheet_id])?;
        let response: SpreadsheetResponse = self
            .execute(spreadsheet_id, |http| {
                http.get(url.clone())
                    .query(&[("fields", "sheets.properties(sheetId,title,gridProperties)")])
            })
            .await?;

        Ok(response
            .sheets
            .into_iter()
            .map(|entry| SheetInfo {
                sheet_id: entry.properties.sheet_id,
                title: entry.properties.title,
                row_count: entry.properties.grid_properties.row_count,
                column_count: entry.properties.grid_properties.column_count,
            })
            .collect())
    }

    async fn get_values(
        &self,
        spreadsheet_id: &str,
        range: &A1Range,
    ) -> SheetsResult<Vec<Vec<String>>> {
        let a1 = range.to_a1();
        let url = self.url(&[spreadsheet_id, "values", &a1])?;
        let response: ValuesResponse = self
            .execute(spreadsheet_id, |http| http.get(url.clone()))
            .await?;
        Ok(into_grid(response.values))
    }

    async fn batch_get(
        &self,
        spreadsheet_id: &str,
        ranges: &[A1Range],
    ) -> SheetsResult<Vec<Vec<Vec<String>>>> {
        let url = self.url(&[spreadsheet_id, "values:batchGet"])?;
        let query: Vec<(&str, String)> = ranges.iter().map(|r| ("ranges", r.to_a1())).collect();

        let response: BatchGetResponse = self
            .execute(spreadsheet_id, |http| http.get(url.clone()).query(&query))
            .await?;

        let mut grids: Vec<Vec<Vec<String>>> = response
            .value_ranges
            .into_iter()
            .map(|vr| into_grid(vr.values))
            .collect();
        grids.resize(ranges.len(), Vec::new());
        Ok(grids)
    }

    async fn batch_update(&self, spreadsheet_id: &str, updates: &[ValueRange]) -> SheetsResult<()> {
        if updates.is_empty() {
            return Ok(());
        }
        let url = self.url(&[spreadsheet_id, "values:batchUpdate"])?;
        let body = BatchUpdateValuesRequest {
            value_input_option: "RAW",
            data: updates
                .iter()
                .map(|u| WireValueRange {
                    range: u.range.to_a1(),
                    values: &u.values,
                })
                .collect(),
        };

        let _: serde_json::Value = self
            .execute(spreadsheet_id, |http| http.post(url.clone()).json(&body))
            .await?;
        Ok(())
    }

    async fn ensure_columns(
        &self,
        spreadsheet_id: &str,
        sheet_name: &str,
        columns: u32,
    ) -> SheetsResult<()> {
        let sheets = self.list_sheets(spreadsheet_id).await?;
        let sheet = sheets
            .iter()
            .find(|s| s.title == sheet_name)
            .ok_or_else(|| SheetsError::SheetNotFound(sheet_name.to_string()))?;

        if sheet.column_count >= columns {
            return Ok(());
        }

        let missing = columns - sheet.column_count;
        let url = self.url(&[&format!("{spreadsheet_id}:batchUpdate")])?;
        let body = serde_json::json!({
            "requests": [{
                "appendDimension": {
                    "sheetId": sheet.sheet_id,
                    "dimension": "COLUMNS",
                    "length": missing,
                }
            }]
        });

        let _: serde_json::Value = self
            .execute(spreadsheet_id, |http| http.post(url.clone()).json(&body))
            .await?;
        info!(
            category = "sheets",
            spreadsheet_id, sheet_name, added = missing, "appended columns"
        );
        Ok(())
    }
}
