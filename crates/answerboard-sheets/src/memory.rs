use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::RwLock;

use async_trait::async_trait;

use answerboard_types::models::SheetInfo;

use crate::a1::A1Range;
use crate::backend::{SheetsBackend, ValueRange};
use crate::error::{SheetsError, SheetsResult};

struct Sheet {
    sheet_id: i64,
    rows: Vec<Vec<String>>,
}

/// In-process spreadsheets, keyed by spreadsheet id then sheet title.
#[derive(Default)]
pub struct MemorySheets {
    books: RwLock<HashMap<String, Vec<(String, Sheet)>>>,
    fail_writes: AtomicBool,
    reads: AtomicUsize,
    writes: AtomicUsize,
}

impl MemorySheets {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates or replaces a sheet with the given rows.
    pub fn put_sheet<S: AsRef<str>>(&self, spreadsheet_id: &str, title: &str, rows: &[Vec<S>]) {
        let rows: Vec<Vec<String>> = rows
            .iter()
            .map(|row| row.iter().map(|cell| cell.as_ref().to_string()).collect())
            .collect();

        let Ok(mut books) = self.books.write() else {
            return;
        };
        let book = books.entry(spreadsheet_id.to_string()).or_default();
        match book.iter_mut().find(|(name, _)| name == title) {
            Some((_, sheet)) => sheet.rows = rows,
            None => {
                let sheet_id = book.len() as i64;
                book.push((title.to_string(), Sheet { sheet_id, rows }));
            }
        }
    }

    /// Full grid of a sheet, untrimmed, for assertions.
    pub fn snapshot(&self, spreadsheet_id: &str, title: &str) -> Option<Vec<Vec<String>>> {
        let books = self.books.read().ok()?;
        books
            .get(spreadsheet_id)?
            .iter()
            .find(|(name, _)| name == title)
            .map(|(_, sheet)| sheet.rows.clone())
    }

    /// Makes every subsequent write fail with a 500, to exercise error paths.
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Number of read requests served (each batch counts once).
    pub fn read_count(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }

    /// Number of write requests served (each batch counts once).
    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    fn read_range(&self, spreadsheet_id: &str, range: &A1Range) -> SheetsResult<Vec<Vec<String>>> {
        let books = self.books.read().map_err(poisoned)?;
        let book = books
            .get(spreadsheet_id)
            .ok_or_else(|| SheetsError::NotFound(spreadsheet_id.to_string()))?;
        let (_, sheet) = book
            .iter()
            .find(|(name, _)| *name == range.sheet)
            .ok_or_else(|| SheetsError::SheetNotFound(range.sheet.clone()))?;

        let (first_row, last_row) = range.rows.unwrap_or((1, u32::MAX));
        let mut out: Vec<Vec<String>> = sheet
            .rows
            .iter()
            .enumerate()
            .filter(|(i, _)| {
                let row = *i as u32 + 1;
                row >= first_row && row <= last_row
            })
            .map(|(_, cells)| {
                let mut cells: Vec<String> = match range.columns {
                    Some((c1, c2)) => cells.iter().skip(c1).take(c2 - c1 + 1).cloned().collect(),
                    None => cells.clone(),
                };
                while cells.last().is_some_and(|c| c.is_empty()) {
                    cells.pop();
                }
                cells
            })
            .collect();

        while out.last().is_some_and(|row| row.is_empty()) {
            out.pop();
        }
        Ok(out)
    }
}

#[async_trait]
impl SheetsBackend for MemorySheets {
    async fn list_sheets(&self, spreadsheet_id: &str) -> SheetsResult<Vec<SheetInfo>> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        let books = self.books.read().map_err(poisoned)?;
        let book = books
            .get(spreadsheet_id)
            .ok_or_else(|| SheetsError::NotFound(spreadsheet_id.to_string()))?;

        Ok(book
            .iter()
            .map(|(title, sheet)| SheetInfo {
                sheet_id: sheet.sheet_id,
                title: title.clone(),
                row_count: sheet.rows.len() as u32,
                column_count: sheet.rows.iter().map(Vec::len).max().unwrap_or(0) as u32,
            })
            .collect())
    }

    async fn get_values(
        &self,
        spreadsheet_id: &str,
        range: &A1Range,
    ) -> SheetsResult<Vec<Vec<String>>> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        self.read_range(spreadsheet_id, range)
    }

    async fn batch_get(
        &self,
        spreadsheet_id: &str,
        ranges: &[A1Range],
    ) -> SheetsResult<Vec<Vec<Vec<String>>>> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        ranges
            .iter()
            .map(|range| self.read_range(spreadsheet_id, range))
            .collect()
    }

    async fn batch_update(&self, spreadsheet_id: &str, updates: &[ValueRange]) -> SheetsResult<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(SheetsError::Api {
                status: 500,
                body: "injected write failure".to_string(),
            });
        }
        self.writes.fetch_add(1, Ordering::SeqCst);

        let mut books = self.books.write().map_err(poisoned)?;
        let book = books
            .get_mut(spreadsheet_id)
            .ok_or_else(|| SheetsError::NotFound(spreadsheet_id.to_string()))?;

        for update in updates {
            let (_, sheet) = book
                .iter_mut()
                .find(|(name, _)| *name == update.range.sheet)
                .ok_or_else(|| SheetsError::SheetNotFound(update.range.sheet.clone()))?;

            let first_row = update.range.rows.map_or(1, |(r, _)| r.max(1)) as usize;
            let first_col = update.range.columns.map_or(0, |(c, _)| c);

            for (dy, values) in update.values.iter().enumerate() {
                let row_idx = first_row - 1 + dy;
                if sheet.rows.len() <= row_idx {
                    sheet.rows.resize(row_idx + 1, Vec::new());
                }
                let row = &mut sheet.rows[row_idx];
                for (dx, value) in values.iter().enumerate() {
                    let col_idx = first_col + dx;
                    if row.len() <= col_idx {
                        row.resize(col_idx + 1, String::new());
                    }
                    row[col_idx] = value.clone();
                }
            }
        }
        Ok(())
    }

    async fn ensure_columns(
        &self,
        spreadsheet_id: &str,
        sheet_name: &str,
        _columns: u32,
    ) -> SheetsResult<()> {
        // The in-memory grid grows on write.
        let books = self.books.read().map_err(poisoned)?;
        let book = books
            .get(spreadsheet_id)
            .ok_or_else(|| SheetsError::NotFound(spreadsheet_id.to_string()))?;
        if book.iter().any(|(name, _)| name == sheet_name) {
            Ok(())
        } else {
            Err(SheetsError::SheetNotFound(sheet_name.to_string()))
        }
    }
}

fn poisoned<T>(e: std::sync::PoisonError<T>) -> SheetsError {
    SheetsError::Api {
        status: 500,
        body: format!("memory backend lock poisoned: {e}"),
    }
}
