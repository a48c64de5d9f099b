use async_trait::async_trait;

use answerboard_types::models::SheetInfo;

use crate::a1::A1Range;
use crate::error::SheetsResult;

/// Values to write starting at the top-left corner of `range`.
#[derive(Debug, Clone, PartialEq)]
pub struct ValueRange {
    pub range: A1Range,
    pub values: Vec<Vec<String>>,
}

impl ValueRange {
    pub fn cell(range: A1Range, value: impl Into<String>) -> Self {
        Self {
            range,
            values: vec![vec![value.into()]],
        }
    }
}

/// Cell-level access to spreadsheets.
///
/// Reads follow the Sheets API convention: trailing empty cells of a row and
/// trailing empty rows are omitted, so callers must pad.
#[async_trait]
pub trait SheetsBackend: Send + Sync {
    async fn list_sheets(&self, spreadsheet_id: &str) -> SheetsResult<Vec<SheetInfo>>;

    async fn get_values(
        &self,
        spreadsheet_id: &str,
        range: &A1Range,
    ) -> SheetsResult<Vec<Vec<String>>>;

    /// One request for several ranges; results come back in request order.
    async fn batch_get(
        &self,
        spreadsheet_id: &str,
        ranges: &[A1Range],
    ) -> SheetsResult<Vec<Vec<Vec<String>>>>;

    /// One request writing every range.
    async fn batch_update(&self, spreadsheet_id: &str, updates: &[ValueRange]) -> SheetsResult<()>;

    /// Grows the sheet grid to at least `columns` columns.
    async fn ensure_columns(
        &self,
        spreadsheet_id: &str,
        sheet_name: &str,
        columns: u32,
    ) -> SheetsResult<()>;
}
