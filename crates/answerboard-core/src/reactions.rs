//! Reaction and highlight toggles on answer rows.
//!
//! A reaction cell holds the comma-joined emails of everyone who reacted.
//! Reactions on one row are mutually exclusive per actor, so a toggle reads
//! every reaction cell of the row in one range, rewrites only the cells that
//! changed and does both under the script lock.
//!
//! The header cells of the target columns are read in the same request. If
//! a column was inserted or moved since the target was resolved, the toggle
//! fails with `Conflict` before writing anything.

use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::{debug, info};

use answerboard_sheets::{A1Range, SheetsBackend, ValueRange};
use answerboard_types::models::{Field, ReactionKind};

use crate::error::{BoardError, BoardResult};
use crate::header::{SYSTEM_COLUMNS, normalize_header};
use crate::lock::ScriptLock;

/// First data row; row 1 holds the headers.
pub const FIRST_DATA_ROW: u32 = 2;

const HIGHLIGHT_ON: &str = "TRUE";
const HIGHLIGHT_OFF: &str = "FALSE";

/// Where the reaction and highlight cells of a board live.
#[derive(Debug, Clone, PartialEq)]
pub struct ReactionTarget {
    pub spreadsheet_id: String,
    pub sheet_name: String,
    /// 0-based column per reaction kind.
    pub columns: BTreeMap<ReactionKind, usize>,
    pub highlight: usize,
}

impl ReactionTarget {
    fn column(&self, kind: ReactionKind) -> BoardResult<usize> {
        self.columns
            .get(&kind)
            .copied()
            .ok_or_else(|| BoardError::Internal(format!("no column for reaction {kind}")))
    }

    /// Leftmost and rightmost reaction columns.
    fn span(&self) -> BoardResult<(usize, usize)> {
        let first = self.columns.values().min().copied();
        let last = self.columns.values().max().copied();
        first
            .zip(last)
            .ok_or_else(|| BoardError::Internal("no reaction columns".to_string()))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ReactionOutcome {
    pub kind: ReactionKind,
    /// Whether the actor holds the reaction after the toggle.
    pub reacted: bool,
    pub new_count: usize,
    pub counts: BTreeMap<ReactionKind, usize>,
}

/// Splits a reaction cell into lower-cased, de-duplicated emails.
pub fn parse_reactors(cell: &str) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for email in cell.split(',').map(|e| e.trim().to_lowercase()) {
        if !email.is_empty() && !out.contains(&email) {
            out.push(email);
        }
    }
    out
}

pub fn join_reactors(reactors: &[String]) -> String {
    reactors.join(", ")
}

pub fn is_highlighted(cell: &str) -> bool {
    cell.trim().eq_ignore_ascii_case(HIGHLIGHT_ON)
}

/// Fails with `Conflict` unless `found` is the header the board wrote for `field`.
fn check_header(found: Option<&String>, field: Field, col: usize) -> BoardResult<()> {
    let expected = SYSTEM_COLUMNS
        .iter()
        .find(|(f, _)| *f == field)
        .map(|(_, header)| normalize_header(header));
    match (expected, found) {
        (Some(expected), Some(found)) if normalize_header(found) == expected => Ok(()),
        _ => Err(BoardError::Conflict(format!(
            "header row changed: column {} no longer holds {}",
            col + 1,
            field
        ))),
    }
}

fn first_row(grid: Option<Vec<Vec<String>>>) -> Vec<String> {
    grid.and_then(|rows| rows.into_iter().next()).unwrap_or_default()
}

fn check_row(row_index: u32) -> BoardResult<()> {
    if row_index < FIRST_DATA_ROW {
        return Err(BoardError::validation(format!(
            "row index must be at least {FIRST_DATA_ROW}"
        )));
    }
    Ok(())
}

pub struct ReactionEngine {
    sheets: Arc<dyn SheetsBackend>,
    lock: ScriptLock,
}

impl ReactionEngine {
    pub fn new(sheets: Arc<dyn SheetsBackend>, lock: ScriptLock) -> Self {
        Self { sheets, lock }
    }

    pub async fn toggle_reaction(
        &self,
        target: &ReactionTarget,
        row_index: u32,
        kind: ReactionKind,
        actor_email: &str,
    ) -> BoardResult<ReactionOutcome> {
        let actor = actor_email.trim().to_lowercase();
        if actor.is_empty() {
            return Err(BoardError::validation("a signed-in email is required to react"));
        }
        check_row(row_index)?;
        let target_col = target.column(kind)?;
        let (first, last) = target.span()?;

        let _guard = self.lock.acquire("toggle_reaction").await?;

        let ranges = [
            A1Range::cells(&target.sheet_name, 1, first, last),
            A1Range::cells(&target.sheet_name, row_index, first, last),
        ];
        let mut grids = self
            .sheets
            .batch_get(&target.spreadsheet_id, &ranges)
            .await?
            .into_iter();
        let header = first_row(grids.next());
        let mut cells = first_row(grids.next());
        cells.resize(last - first + 1, String::new());

        let mut before: BTreeMap<ReactionKind, Vec<String>> = BTreeMap::new();
        for (&k, &col) in &target.columns {
            check_header(header.get(col - first), k.field(), col)?;
            before.insert(k, parse_reactors(&cells[col - first]));
        }

        let mut after = before.clone();
        let reacted = match after.get_mut(&kind) {
            Some(set) if set.contains(&actor) => {
                set.retain(|e| *e != actor);
                false
            }
            _ => {
                for (k, set) in after.iter_mut() {
                    if *k == kind {
                        set.push(actor.clone());
                    } else {
                        set.retain(|e| *e != actor);
                    }
                }
                true
            }
        };

        let updates: Vec<ValueRange> = after
            .iter()
            .filter(|(k, set)| before.get(*k) != Some(*set))
            .map(|(k, set)| {
                let col = target.columns[k];
                ValueRange::cell(
                    A1Range::cell(&target.sheet_name, row_index, col),
                    join_reactors(set),
                )
            })
            .collect();

        if !updates.is_empty() {
            self.sheets
                .batch_update(&target.spreadsheet_id, &updates)
                .await?;
        }

        let counts: BTreeMap<ReactionKind, usize> =
            after.iter().map(|(k, set)| (*k, set.len())).collect();
        let new_count = counts.get(&kind).copied().unwrap_or(0);

        debug!(
            spreadsheet_id = %target.spreadsheet_id,
            row_index,
            reaction = %kind,
            column = target_col,
            reacted,
            new_count,
            cells_written = updates.len(),
            "toggled reaction"
        );

        Ok(ReactionOutcome {
            kind,
            reacted,
            new_count,
            counts,
        })
    }

    /// Flips the highlight flag of a row and returns the new state.
    pub async fn toggle_highlight(&self, target: &ReactionTarget, row_index: u32) -> BoardResult<bool> {
        check_row(row_index)?;
        let _guard = self.lock.acquire("toggle_highlight").await?;

        let range = A1Range::cell(&target.sheet_name, row_index, target.highlight);
        let ranges = [
            A1Range::cell(&target.sheet_name, 1, target.highlight),
            range.clone(),
        ];
        let mut grids = self
            .sheets
            .batch_get(&target.spreadsheet_id, &ranges)
            .await?
            .into_iter();
        check_header(first_row(grids.next()).first(), Field::Highlight, target.highlight)?;
        let current = first_row(grids.next())
            .first()
            .is_some_and(|cell| is_highlighted(cell));

        let highlighted = !current;
        self.sheets
            .batch_update(
                &target.spreadsheet_id,
                &[ValueRange::cell(
                    range,
                    if highlighted { HIGHLIGHT_ON } else { HIGHLIGHT_OFF },
                )],
            )
            .await?;

        info!(
            spreadsheet_id = %target.spreadsheet_id,
            row_index,
            highlighted,
            "toggled highlight"
        );
        Ok(highlighted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use answerboard_sheets::MemorySheets;
    use std::time::Duration;

    const SSID: &str = "ss1";
    const SHEET: &str = "Answers";

    fn fixture() -> (Arc<MemorySheets>, ReactionEngine, ReactionTarget) {
        let sheets = Arc::new(MemorySheets::new());
        sheets.put_sheet(
            SSID,
            SHEET,
            &[
                vec!["回答", "なるほど！", "いいね！", "もっと知りたい！", "ハイライト"],
                vec!["first answer", "", "", "", ""],
                vec!["second answer", "", "a@x.com", "", "TRUE"],
            ],
        );
        let target = ReactionTarget {
            spreadsheet_id: SSID.to_string(),
            sheet_name: SHEET.to_string(),
            columns: BTreeMap::from([
                (ReactionKind::Understand, 1),
                (ReactionKind::Like, 2),
                (ReactionKind::Curious, 3),
            ]),
            highlight: 4,
        };
        let engine = ReactionEngine::new(sheets.clone(), ScriptLock::new(Duration::from_millis(200)));
        (sheets, engine, target)
    }

    fn cell(sheets: &MemorySheets, row: usize, col: usize) -> String {
        sheets.snapshot(SSID, SHEET).unwrap()[row]
            .get(col)
            .cloned()
            .unwrap_or_default()
    }

    #[test]
    fn reactor_lists_are_normalized() {
        assert_eq!(
            parse_reactors(" A@x.com,b@x.com, a@x.com ,,"),
            vec!["a@x.com".to_string(), "b@x.com".to_string()]
        );
        assert!(parse_reactors("").is_empty());
    }

    #[tokio::test]
    async fn like_toggles_on_then_off() {
        let (sheets, engine, target) = fixture();

        let on = engine
            .toggle_reaction(&target, 2, ReactionKind::Like, "b@x.com")
            .await
            .unwrap();
        assert!(on.reacted);
        assert_eq!(on.new_count, 1);
        assert_eq!(cell(&sheets, 1, 2), "b@x.com");

        let off = engine
            .toggle_reaction(&target, 2, ReactionKind::Like, "b@x.com")
            .await
            .unwrap();
        assert!(!off.reacted);
        assert_eq!(off.new_count, 0);
        assert_eq!(cell(&sheets, 1, 2), "");
    }

    #[tokio::test]
    async fn toggling_twice_restores_existing_reactors() {
        let (sheets, engine, target) = fixture();
        for _ in 0..2 {
            engine
                .toggle_reaction(&target, 3, ReactionKind::Like, "B@x.com")
                .await
                .unwrap();
        }
        assert_eq!(cell(&sheets, 2, 2), "a@x.com");
    }

    #[tokio::test]
    async fn reactions_are_mutually_exclusive() {
        let (sheets, engine, target) = fixture();
        engine
            .toggle_reaction(&target, 3, ReactionKind::Understand, "a@x.com")
            .await
            .unwrap();

        assert_eq!(cell(&sheets, 2, 1), "a@x.com");
        assert_eq!(cell(&sheets, 2, 2), "");

        let out = engine
            .toggle_reaction(&target, 3, ReactionKind::Curious, "a@x.com")
            .await
            .unwrap();
        assert_eq!(out.counts[&ReactionKind::Understand], 0);
        assert_eq!(out.counts[&ReactionKind::Curious], 1);
        assert_eq!(out.counts[&ReactionKind::Like], 0);
    }

    #[tokio::test]
    async fn one_read_and_one_write_per_toggle() {
        let (sheets, engine, target) = fixture();
        let (reads, writes) = (sheets.read_count(), sheets.write_count());
        engine
            .toggle_reaction(&target, 3, ReactionKind::Understand, "a@x.com")
            .await
            .unwrap();
        assert_eq!(sheets.read_count(), reads + 1);
        assert_eq!(sheets.write_count(), writes + 1);
    }

    #[tokio::test]
    async fn blank_email_is_rejected_without_touching_the_sheet() {
        let (sheets, engine, target) = fixture();
        let err = engine
            .toggle_reaction(&target, 2, ReactionKind::Like, "  ")
            .await
            .unwrap_err();
        assert!(matches!(err, BoardError::Validation(_)));
        assert_eq!(sheets.read_count(), 0);
        assert_eq!(sheets.write_count(), 0);
    }

    #[tokio::test]
    async fn header_row_cannot_be_reacted_to() {
        let (_, engine, target) = fixture();
        let err = engine
            .toggle_reaction(&target, 1, ReactionKind::Like, "b@x.com")
            .await
            .unwrap_err();
        assert!(matches!(err, BoardError::Validation(_)));
    }

    #[tokio::test]
    async fn moved_columns_are_a_conflict_and_nothing_is_written() {
        let (sheets, engine, target) = fixture();
        sheets.put_sheet(
            SSID,
            SHEET,
            &[
                vec!["回答", "メモ", "なるほど！", "いいね！", "もっと知りたい！", "ハイライト"],
                vec!["first answer", "", "", "", "", ""],
            ],
        );
        let writes = sheets.write_count();

        let err = engine
            .toggle_reaction(&target, 2, ReactionKind::Like, "b@x.com")
            .await
            .unwrap_err();
        assert!(matches!(err, BoardError::Conflict(_)));

        let err = engine.toggle_highlight(&target, 2).await.unwrap_err();
        assert!(matches!(err, BoardError::Conflict(_)));
        assert_eq!(sheets.write_count(), writes);
    }

    #[tokio::test]
    async fn failed_write_releases_the_lock() {
        let (sheets, engine, target) = fixture();
        sheets.set_fail_writes(true);
        let err = engine
            .toggle_reaction(&target, 2, ReactionKind::Like, "b@x.com")
            .await
            .unwrap_err();
        assert!(matches!(err, BoardError::Sheets(_)));

        sheets.set_fail_writes(false);
        let out = engine
            .toggle_reaction(&target, 2, ReactionKind::Like, "b@x.com")
            .await
            .unwrap();
        assert_eq!(out.new_count, 1);
    }

    #[tokio::test]
    async fn highlight_flips() {
        let (sheets, engine, target) = fixture();
        assert!(!engine.toggle_highlight(&target, 3).await.unwrap());
        assert_eq!(cell(&sheets, 2, 4), "FALSE");
        assert!(engine.toggle_highlight(&target, 2).await.unwrap());
        assert_eq!(cell(&sheets, 1, 4), "TRUE");
    }
}
