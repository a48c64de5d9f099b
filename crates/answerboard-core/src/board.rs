use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use uuid::Uuid;

use answerboard_cache::{CacheOptions, CacheScope, keys};
use answerboard_sheets::{A1Range, SheetsBackend, ValueRange};
use answerboard_types::api::{
    AnswerRow, AppSettings, BoardAnswers, ConnectSpreadsheetRequest, HighlightRequest,
    PublishRequest, ReactionRequest,
    ReactionSummary, SaveSheetConfigRequest, SheetsListResponse, UnpublishRequest,
};
use answerboard_types::models::{
    Action, BoardConfig, ColumnMapping, Field, ReactionKind, SetupStatus, UserRecord, UserType,
};

use crate::access::AccessController;
use crate::accounts::AccountService;
use crate::config::{check_etag, merge_config, merge_confidence, seal, validate_for_publish};
use crate::error::{BoardError, BoardResult};
use crate::header::{ANSWER_SHEET_FIELDS, HeaderIndex, SYSTEM_COLUMNS, resolve_with_mapping};
use crate::lock::ScriptLock;
use crate::reactions::{
    FIRST_DATA_ROW, ReactionEngine, ReactionOutcome, ReactionTarget, is_highlighted,
    parse_reactors,
};

const SHEETS_LIST_TTL: Duration = Duration::from_secs(120);
const HEADERS_TTL: Duration = Duration::from_secs(30 * 60);
const ANSWERS_TTL: Duration = Duration::from_secs(30);

/// A header row and the columns resolved from it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SheetHeaders {
    pub headers: Vec<String>,
    pub index: HeaderIndex,
}

/// Where a board's answers live.
#[derive(Debug, Clone, PartialEq)]
struct SheetRef {
    spreadsheet_id: String,
    sheet_name: String,
}

impl SheetRef {
    fn of(board: &UserRecord) -> BoardResult<Self> {
        let spreadsheet_id = board
            .config
            .published_spreadsheet_id
            .clone()
            .or_else(|| board.spreadsheet_id.clone())
            .ok_or_else(|| BoardError::validation("no spreadsheet connected"))?;
        let sheet_name = board
            .config
            .published_sheet_name
            .clone()
            .ok_or_else(|| BoardError::validation("no sheet selected"))?;
        Ok(Self {
            spreadsheet_id,
            sheet_name,
        })
    }
}

/// Owner-facing board operations and the reaction path.
pub struct BoardService {
    sheets: Arc<dyn SheetsBackend>,
    accounts: Arc<AccountService>,
    access: AccessController,
    engine: ReactionEngine,
    lock: ScriptLock,
}

impl BoardService {
    pub fn new(
        sheets: Arc<dyn SheetsBackend>,
        accounts: Arc<AccountService>,
        access: AccessController,
        lock: ScriptLock,
    ) -> Self {
        Self {
            engine: ReactionEngine::new(Arc::clone(&sheets), lock.clone()),
            sheets,
            accounts,
            access,
            lock,
        }
    }

    pub fn accounts(&self) -> &Arc<AccountService> {
        &self.accounts
    }

    pub fn access(&self) -> &AccessController {
        &self.access
    }

    pub async fn app_settings(&self, scope: &CacheScope, viewer: Option<&str>) -> BoardResult<AppSettings> {
        let owner = self.accounts.require_owner(scope, viewer).await?;
        if let Err(e) = self.accounts.touch(owner.user_id).await {
            warn!(category = "database", user_id = %owner.user_id, "touch failed: {}", e);
        }
        Ok(AppSettings {
            user_id: owner.user_id,
            admin_email: owner.admin_email,
            spreadsheet_id: owner.spreadsheet_id,
            spreadsheet_url: owner.spreadsheet_url,
            config: owner.config,
        })
    }

    pub async fn sheets_list(
        &self,
        scope: &CacheScope,
        user_id: Uuid,
        viewer: Option<&str>,
    ) -> BoardResult<SheetsListResponse> {
        let (board, _) = self.access.require(scope, user_id, Action::Edit, viewer).await?;
        let spreadsheet_id = board
            .spreadsheet_id
            .ok_or_else(|| BoardError::validation("no spreadsheet connected"))?;

        let sheets = scope
            .get_or_compute(
                &keys::sheets_list(&spreadsheet_id),
                CacheOptions::ttl(SHEETS_LIST_TTL),
                || self.sheets.list_sheets(&spreadsheet_id),
            )
            .await?;
        Ok(SheetsListResponse {
            spreadsheet_id,
            sheets,
        })
    }

    // -- Header cache --

    async fn read_header_row(&self, sheet: &SheetRef) -> BoardResult<Vec<String>> {
        let grid = self
            .sheets
            .get_values(&sheet.spreadsheet_id, &A1Range::row(&sheet.sheet_name, 1))
            .await?;
        Ok(grid.into_iter().next().unwrap_or_default())
    }

    fn resolve(headers: Vec<String>, mapping: &ColumnMapping) -> BoardResult<SheetHeaders> {
        let index = resolve_with_mapping(&headers, ANSWER_SHEET_FIELDS, mapping).map_err(|e| {
            BoardError::validation(format!("answer column not found in header row: {e}"))
        })?;
        Ok(SheetHeaders { headers, index })
    }

    /// Cached header index, read from the sheet on a miss.
    async fn headers(
        &self,
        scope: &CacheScope,
        sheet: &SheetRef,
        mapping: &ColumnMapping,
    ) -> BoardResult<SheetHeaders> {
        let key = keys::headers(&sheet.spreadsheet_id, &sheet.sheet_name);
        let options = CacheOptions::ttl(HEADERS_TTL);
        if let Some(cached) = scope.lookup::<SheetHeaders>(&key, options) {
            return Ok(cached);
        }
        let resolved = Self::resolve(self.read_header_row(sheet).await?, mapping)?;
        scope.store(&key, &resolved, options);
        Ok(resolved)
    }

    /// Compares a freshly read header row with the cached one and
    /// re-resolves when they differ.
    fn detect_header_change(
        scope: &CacheScope,
        sheet: &SheetRef,
        mapping: &ColumnMapping,
        fresh: Vec<String>,
    ) -> BoardResult<SheetHeaders> {
        let key = keys::headers(&sheet.spreadsheet_id, &sheet.sheet_name);
        let options = CacheOptions::ttl(HEADERS_TTL);
        if let Some(cached) = scope.lookup::<SheetHeaders>(&key, options) {
            if cached.headers == fresh {
                return Ok(cached);
            }
            debug!(
                spreadsheet_id = %sheet.spreadsheet_id,
                sheet_name = %sheet.sheet_name,
                "header row changed, re-resolving"
            );
        }
        let resolved = Self::resolve(fresh, mapping)?;
        scope.store(&key, &resolved, options);
        Ok(resolved)
    }

    fn forget_headers(scope: &CacheScope, sheet: &SheetRef) {
        scope.remove(&keys::headers(&sheet.spreadsheet_id, &sheet.sheet_name));
    }

    /// Appends any missing system columns to the right of the header row.
    /// Callers hold the script lock.
    async fn append_system_columns(
        &self,
        scope: &CacheScope,
        sheet: &SheetRef,
        mapping: &ColumnMapping,
        current: SheetHeaders,
    ) -> BoardResult<SheetHeaders> {
        let missing: Vec<&str> = SYSTEM_COLUMNS
            .iter()
            .filter(|(field, _)| current.index.get(*field).is_none())
            .map(|(_, header)| *header)
            .collect();
        if missing.is_empty() {
            return Ok(current);
        }

        let start = current.headers.len();
        let end = start + missing.len() - 1;
        self.sheets
            .ensure_columns(&sheet.spreadsheet_id, &sheet.sheet_name, (end + 1) as u32)
            .await?;
        self.sheets
            .batch_update(
                &sheet.spreadsheet_id,
                &[ValueRange {
                    range: A1Range::cells(&sheet.sheet_name, 1, start, end),
                    values: vec![missing.iter().map(|h| h.to_string()).collect()],
                }],
            )
            .await?;
        info!(
            spreadsheet_id = %sheet.spreadsheet_id,
            sheet_name = %sheet.sheet_name,
            added = ?missing,
            "appended system columns"
        );

        let mut headers = current.headers;
        headers.extend(missing.iter().map(|h| h.to_string()));
        let resolved = Self::resolve(headers, mapping)?;
        scope.store(
            &keys::headers(&sheet.spreadsheet_id, &sheet.sheet_name),
            &resolved,
            CacheOptions::ttl(HEADERS_TTL),
        );
        Ok(resolved)
    }

    /// Reaction and highlight cells of a board, appending the system columns
    /// on first use.
    pub async fn reaction_target(&self, scope: &CacheScope, board: &UserRecord) -> BoardResult<ReactionTarget> {
        let sheet = SheetRef::of(board)?;
        let mapping = &board.config.column_mapping;
        let mut headers = self.headers(scope, &sheet, mapping).await?;

        if SYSTEM_COLUMNS.iter().any(|(field, _)| headers.index.get(*field).is_none()) {
            let _guard = self.lock.acquire("append_system_columns").await?;
            // Another request may have appended them while we waited.
            Self::forget_headers(scope, &sheet);
            let fresh = Self::resolve(self.read_header_row(&sheet).await?, mapping)?;
            headers = self.append_system_columns(scope, &sheet, mapping, fresh).await?;
        }

        target_from(&sheet, &headers.index)
    }

    /// Drops the cached header index after the engine saw a moved column and
    /// resolves the target again from the live header row.
    async fn refresh_reaction_target(
        &self,
        scope: &CacheScope,
        board: &UserRecord,
        reason: &str,
    ) -> BoardResult<ReactionTarget> {
        let sheet = SheetRef::of(board)?;
        warn!(
            spreadsheet_id = %sheet.spreadsheet_id,
            sheet_name = %sheet.sheet_name,
            "{}; re-reading headers",
            reason
        );
        Self::forget_headers(scope, &sheet);
        self.reaction_target(scope, board).await
    }

    // -- Config --

    /// Connects a spreadsheet under the script lock, so a concurrent publish
    /// or config save is either seen or reported as a conflict.
    pub async fn connect_spreadsheet(
        &self,
        scope: &CacheScope,
        viewer: Option<&str>,
        req: ConnectSpreadsheetRequest,
    ) -> BoardResult<UserRecord> {
        let owner = self.accounts.require_owner(scope, viewer).await?;

        let _guard = self.lock.acquire("connect_spreadsheet").await?;
        let stored = self.accounts.reload(scope, owner.user_id).await?;
        check_etag(&stored.config, req.etag.as_deref())?;

        self.accounts
            .connect_spreadsheet(scope, &stored, &req.spreadsheet_url)
            .await
    }

    pub async fn save_sheet_config(
        &self,
        scope: &CacheScope,
        viewer: Option<&str>,
        req: SaveSheetConfigRequest,
    ) -> BoardResult<BoardConfig> {
        let owner = self.accounts.require_owner(scope, viewer).await?;
        if req.sheet_name.trim().is_empty() {
            return Err(BoardError::validation("sheet name is required"));
        }
        if owner.spreadsheet_id.as_deref() != Some(req.spreadsheet_id.as_str()) {
            return Err(BoardError::validation("spreadsheet is not connected to this account"));
        }

        let _guard = self.lock.acquire("save_sheet_config").await?;
        let stored = self.accounts.reload(scope, owner.user_id).await?;
        check_etag(&stored.config, req.etag.as_deref())?;

        let mut config = merge_config(&stored.config, &req.config);
        config.published_spreadsheet_id = Some(req.spreadsheet_id.clone());
        config.published_sheet_name = Some(req.sheet_name.clone());

        let sheet = SheetRef {
            spreadsheet_id: req.spreadsheet_id,
            sheet_name: req.sheet_name,
        };
        Self::forget_headers(scope, &sheet);
        let header_row = self.read_header_row(&sheet).await?;
        match resolve_with_mapping(&header_row, ANSWER_SHEET_FIELDS, &config.column_mapping) {
            Ok(index) => {
                config.confidence = merge_confidence(&index.confidence_by_name(), &config.confidence);
                if config.setup_status != SetupStatus::Completed {
                    config.setup_status = SetupStatus::Configured;
                }
            }
            Err(missing) => {
                debug!(user_id = %owner.user_id, "saved config with unresolved columns: {}", missing);
                config.setup_status = SetupStatus::SpreadsheetConnected;
            }
        }

        let config = seal(config, Utc::now());
        let saved = self.accounts.save_config(scope, &stored, config).await?;
        info!(user_id = %owner.user_id, sheet_name = %sheet.sheet_name, "saved sheet config");
        Ok(saved.config)
    }

    pub async fn publish(
        &self,
        scope: &CacheScope,
        viewer: Option<&str>,
        req: PublishRequest,
    ) -> BoardResult<BoardConfig> {
        let owner = self.accounts.require_owner(scope, viewer).await?;

        let _guard = self.lock.acquire("publish").await?;
        let stored = self.accounts.reload(scope, owner.user_id).await?;
        check_etag(&stored.config, req.etag.as_deref())?;

        let mut config = merge_config(&stored.config, &req.config);
        if config.published_spreadsheet_id.is_none() {
            config.published_spreadsheet_id = stored.spreadsheet_id.clone();
        }

        let sheet = SheetRef::of(&UserRecord {
            config: config.clone(),
            ..stored.clone()
        })?;
        Self::forget_headers(scope, &sheet);
        let header_row = self.read_header_row(&sheet).await?;
        let index = validate_for_publish(&config, &header_row)?;
        let resolved = self
            .append_system_columns(
                scope,
                &sheet,
                &config.column_mapping,
                SheetHeaders {
                    headers: header_row,
                    index,
                },
            )
            .await?;

        let now = Utc::now();
        config.is_published = true;
        config.published_at = Some(now);
        config.setup_status = SetupStatus::Completed;
        config.confidence = merge_confidence(&resolved.index.confidence_by_name(), &config.confidence);
        let config = seal(config, now);

        let saved = self.accounts.save_config(scope, &stored, config).await?;
        info!(
            user_id = %owner.user_id,
            spreadsheet_id = %sheet.spreadsheet_id,
            sheet_name = %sheet.sheet_name,
            "published board"
        );
        Ok(saved.config)
    }

    pub async fn unpublish(
        &self,
        scope: &CacheScope,
        viewer: Option<&str>,
        req: UnpublishRequest,
    ) -> BoardResult<BoardConfig> {
        let owner = self.accounts.require_owner(scope, viewer).await?;

        let _guard = self.lock.acquire("unpublish").await?;
        let stored = self.accounts.reload(scope, owner.user_id).await?;
        check_etag(&stored.config, req.etag.as_deref())?;

        let mut config = stored.config.clone();
        config.is_published = false;
        let config = seal(config, Utc::now());

        let saved = self.accounts.save_config(scope, &stored, config).await?;
        info!(user_id = %owner.user_id, "unpublished board");
        Ok(saved.config)
    }

    // -- Board data --

    pub async fn answers(
        &self,
        scope: &CacheScope,
        board_id: Uuid,
        viewer: Option<&str>,
    ) -> BoardResult<BoardAnswers> {
        let (board, decision) = self.access.require(scope, board_id, Action::View, viewer).await?;
        let sheet = SheetRef::of(&board)?;

        let grid: Vec<Vec<String>> = scope
            .get_or_compute(
                &keys::answers(&sheet.spreadsheet_id, &sheet.sheet_name),
                CacheOptions::ttl(ANSWERS_TTL),
                || async {
                    self.sheets
                        .get_values(&sheet.spreadsheet_id, &A1Range::sheet(&sheet.sheet_name))
                        .await
                },
            )
            .await?;

        let mut rows = grid.into_iter();
        let header_row = rows.next().unwrap_or_default();
        let headers =
            Self::detect_header_change(scope, &sheet, &board.config.column_mapping, header_row)?;

        let is_owner = decision.user_type == UserType::Owner;
        let viewer = viewer.map(|v| v.trim().to_lowercase());
        let ctx = RowContext {
            index: &headers.index,
            show_names: is_owner || board.config.display_settings.show_names,
            viewer: viewer.as_deref(),
        };

        let rows: Vec<AnswerRow> = rows
            .enumerate()
            .filter_map(|(i, cells)| ctx.row(FIRST_DATA_ROW + i as u32, &cells))
            .collect();

        let config = decision
            .config
            .ok_or_else(|| BoardError::Internal("allowed decision without config".to_string()))?;
        Ok(BoardAnswers {
            board_id,
            sheet_name: sheet.sheet_name,
            user_type: decision.user_type,
            config,
            rows,
        })
    }

    /// Toggles the viewer's reaction on a row of a board they can view.
    pub async fn react(
        &self,
        scope: &CacheScope,
        viewer: Option<&str>,
        req: &ReactionRequest,
    ) -> BoardResult<ReactionOutcome> {
        let email = viewer.ok_or(BoardError::Unauthenticated)?;
        let (board, _) = self
            .access
            .require(scope, req.board_id, Action::View, viewer)
            .await?;
        let mut target = self.reaction_target(scope, &board).await?;

        let outcome = match self
            .engine
            .toggle_reaction(&target, req.row_index, req.reaction, email)
            .await
        {
            Err(BoardError::Conflict(reason)) => {
                target = self.refresh_reaction_target(scope, &board, &reason).await?;
                self.engine
                    .toggle_reaction(&target, req.row_index, req.reaction, email)
                    .await?
            }
            other => other?,
        };
        scope.remove(&keys::answers(&target.spreadsheet_id, &target.sheet_name));
        Ok(outcome)
    }

    /// Owner-only.
    pub async fn toggle_highlight(
        &self,
        scope: &CacheScope,
        viewer: Option<&str>,
        req: &HighlightRequest,
    ) -> BoardResult<bool> {
        let (board, _) = self
            .access
            .require(scope, req.board_id, Action::Edit, viewer)
            .await?;
        let mut target = self.reaction_target(scope, &board).await?;

        let highlighted = match self.engine.toggle_highlight(&target, req.row_index).await {
            Err(BoardError::Conflict(reason)) => {
                target = self.refresh_reaction_target(scope, &board, &reason).await?;
                self.engine.toggle_highlight(&target, req.row_index).await?
            }
            other => other?,
        };
        scope.remove(&keys::answers(&target.spreadsheet_id, &target.sheet_name));
        Ok(highlighted)
    }
}

fn target_from(sheet: &SheetRef, index: &HeaderIndex) -> BoardResult<ReactionTarget> {
    let mut columns = BTreeMap::new();
    for kind in ReactionKind::ALL {
        let col = index
            .reaction(kind)
            .ok_or_else(|| BoardError::Internal(format!("reaction column {kind} missing")))?;
        columns.insert(kind, col);
    }
    let highlight = index
        .get(Field::Highlight)
        .ok_or_else(|| BoardError::Internal("highlight column missing".to_string()))?;

    Ok(ReactionTarget {
        spreadsheet_id: sheet.spreadsheet_id.clone(),
        sheet_name: sheet.sheet_name.clone(),
        columns,
        highlight,
    })
}

struct RowContext<'a> {
    index: &'a HeaderIndex,
    show_names: bool,
    viewer: Option<&'a str>,
}

impl RowContext<'_> {
    fn cell<'c>(&self, cells: &'c [String], field: Field) -> Option<&'c str> {
        self.index
            .get(field)
            .and_then(|col| cells.get(col))
            .map(|c| c.trim())
    }

    fn text(&self, cells: &[String], field: Field) -> Option<String> {
        self.cell(cells, field)
            .filter(|c| !c.is_empty())
            .map(str::to_string)
    }

    /// Rows without an answer are skipped.
    fn row(&self, row_index: u32, cells: &[String]) -> Option<AnswerRow> {
        let answer = self.text(cells, Field::Answer)?;

        let reactions = ReactionKind::ALL
            .iter()
            .filter_map(|kind| {
                let col = self.index.reaction(*kind)?;
                let reactors = parse_reactors(cells.get(col).map(String::as_str).unwrap_or(""));
                let reacted = self
                    .viewer
                    .is_some_and(|v| reactors.iter().any(|r| r == v));
                Some((
                    *kind,
                    ReactionSummary {
                        count: reactors.len(),
                        reacted,
                    },
                ))
            })
            .collect();

        Some(AnswerRow {
            row_index,
            answer,
            reason: self.text(cells, Field::Reason),
            class: self.text(cells, Field::Class),
            name: if self.show_names {
                self.text(cells, Field::Name)
            } else {
                None
            },
            reactions,
            highlighted: self.cell(cells, Field::Highlight).is_some_and(is_highlighted),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use answerboard_cache::CacheManager;
    use answerboard_db::Database;
    use answerboard_sheets::MemorySheets;
    use answerboard_types::api::ConfigPatch;

    use crate::access::SystemAdmins;

    const SSID: &str = "1AbCdEfGhIjKlMnOpQrStUvWxYz0123456789_-aaaa";
    const SHEET: &str = "Form Responses 1";
    const OWNER: &str = "teacher@school.example";
    const STUDENT: &str = "student@school.example";

    struct Fixture {
        sheets: Arc<MemorySheets>,
        cache: Arc<CacheManager>,
        board: BoardService,
        owner: UserRecord,
    }

    async fn fixture() -> Fixture {
        let sheets = Arc::new(MemorySheets::new());
        sheets.put_sheet(
            SSID,
            SHEET,
            &[
                vec!["タイムスタンプ", "名前", "クラス", "あなたの回答", "そう考える理由"],
                vec!["2024/04/01", "Aoi", "1-A", "Plants need light", "We tried it"],
                vec!["2024/04/01", "Ren", "1-B", "", ""],
                vec!["2024/04/02", "Mei", "1-A", "Water matters more", ""],
            ],
        );
        let db = Arc::new(Database::open_in_memory().unwrap());
        let cache = Arc::new(CacheManager::in_memory());
        let accounts = Arc::new(AccountService::new(db, SystemAdmins::default()));
        let access = AccessController::new(accounts.clone(), SystemAdmins::default());
        let board = BoardService::new(
            sheets.clone(),
            accounts.clone(),
            access,
            ScriptLock::new(Duration::from_millis(500)),
        );
        let (owner, _) = accounts
            .register(&cache.scope(), OWNER, Some(SSID))
            .await
            .unwrap();
        Fixture {
            sheets,
            cache,
            board,
            owner,
        }
    }

    async fn publish(f: &Fixture, allow_anonymous: bool) -> BoardConfig {
        let scope = f.cache.scope();
        let saved = f
            .board
            .save_sheet_config(
                &scope,
                Some(OWNER),
                SaveSheetConfigRequest {
                    spreadsheet_id: SSID.to_string(),
                    sheet_name: SHEET.to_string(),
                    config: ConfigPatch::default(),
                    etag: f.owner.config.etag.clone(),
                },
            )
            .await
            .unwrap();
        assert_eq!(saved.setup_status, SetupStatus::Configured);

        f.board
            .publish(
                &scope,
                Some(OWNER),
                PublishRequest {
                    config: ConfigPatch {
                        allow_anonymous: Some(allow_anonymous),
                        ..ConfigPatch::default()
                    },
                    etag: saved.etag,
                },
            )
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn publishing_appends_system_columns() {
        let f = fixture().await;
        let config = publish(&f, true).await;
        assert!(config.is_published);
        assert_eq!(config.setup_status, SetupStatus::Completed);
        assert_eq!(config.confidence.get("answer"), Some(&80));

        let grid = f.sheets.snapshot(SSID, SHEET).unwrap();
        assert_eq!(
            &grid[0][5..],
            &["なるほど！", "いいね！", "もっと知りたい！", "ハイライト"]
        );
    }

    #[tokio::test]
    async fn guests_see_answers_without_names() {
        let f = fixture().await;
        publish(&f, true).await;

        let answers = f.board.answers(&f.cache.scope(), f.owner.user_id, None).await.unwrap();
        assert_eq!(answers.user_type, UserType::Guest);
        assert_eq!(answers.rows.len(), 2);
        assert_eq!(answers.rows[0].row_index, 2);
        assert_eq!(answers.rows[0].reason.as_deref(), Some("We tried it"));
        assert_eq!(answers.rows[1].row_index, 4);
        assert!(answers.rows.iter().all(|r| r.name.is_none()));

        let owner_view = f
            .board
            .answers(&f.cache.scope(), f.owner.user_id, Some(OWNER))
            .await
            .unwrap();
        assert_eq!(owner_view.rows[0].name.as_deref(), Some("Aoi"));
    }

    #[tokio::test]
    async fn reactions_show_up_in_answers() {
        let f = fixture().await;
        publish(&f, true).await;
        let scope = f.cache.scope();

        let req = ReactionRequest {
            board_id: f.owner.user_id,
            row_index: 2,
            reaction: ReactionKind::Like,
        };
        let out = f.board.react(&scope, Some(STUDENT), &req).await.unwrap();
        assert_eq!(out.new_count, 1);

        let answers = f.board.answers(&scope, f.owner.user_id, Some(STUDENT)).await;
        // Signed-in non-owners are guests of an anonymous board.
        let answers = answers.unwrap();
        let like = &answers.rows[0].reactions[&ReactionKind::Like];
        assert_eq!(like.count, 1);
        assert!(like.reacted);

        let err = f.board.react(&scope, None, &req).await.unwrap_err();
        assert!(matches!(err, BoardError::Unauthenticated));
    }

    #[tokio::test]
    async fn only_the_owner_highlights() {
        let f = fixture().await;
        publish(&f, true).await;
        let scope = f.cache.scope();
        let req = HighlightRequest {
            board_id: f.owner.user_id,
            row_index: 4,
        };

        let err = f.board.toggle_highlight(&scope, Some(STUDENT), &req).await.unwrap_err();
        assert!(matches!(err, BoardError::Denied(_)));

        assert!(f.board.toggle_highlight(&scope, Some(OWNER), &req).await.unwrap());
        let answers = f.board.answers(&scope, f.owner.user_id, Some(OWNER)).await.unwrap();
        assert!(answers.rows[1].highlighted);
    }

    #[tokio::test]
    async fn reactions_follow_columns_inserted_after_headers_were_cached() {
        let f = fixture().await;
        publish(&f, true).await;
        let scope = f.cache.scope();
        // Warm the header cache.
        f.board.answers(&scope, f.owner.user_id, None).await.unwrap();

        let mut grid = f.sheets.snapshot(SSID, SHEET).unwrap();
        for row in &mut grid {
            row.insert(2, String::new());
        }
        grid[0][2] = "メモ".to_string();
        f.sheets.put_sheet(SSID, SHEET, &grid);

        let req = ReactionRequest {
            board_id: f.owner.user_id,
            row_index: 2,
            reaction: ReactionKind::Like,
        };
        let out = f.board.react(&scope, Some(STUDENT), &req).await.unwrap();
        assert_eq!(out.new_count, 1);

        let grid = f.sheets.snapshot(SSID, SHEET).unwrap();
        assert_eq!(grid[0][7], "いいね！");
        assert_eq!(grid[1][7], STUDENT);
        assert_eq!(grid[1][6], "");

        let highlight = HighlightRequest {
            board_id: f.owner.user_id,
            row_index: 2,
        };
        assert!(f.board.toggle_highlight(&scope, Some(OWNER), &highlight).await.unwrap());
        let grid = f.sheets.snapshot(SSID, SHEET).unwrap();
        assert_eq!(grid[1][9], "TRUE");
    }

    #[tokio::test]
    async fn stale_etag_is_a_conflict() {
        let f = fixture().await;
        let err = f
            .board
            .unpublish(
                &f.cache.scope(),
                Some(OWNER),
                UnpublishRequest {
                    etag: Some("stale".to_string()),
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, BoardError::Conflict(_)));
    }

    #[tokio::test]
    async fn reconnecting_with_a_stale_etag_keeps_the_published_board() {
        let f = fixture().await;
        let published = publish(&f, true).await;
        let scope = f.cache.scope();

        // The owner record from before the publish carries an old etag.
        let err = f
            .board
            .connect_spreadsheet(
                &scope,
                Some(OWNER),
                ConnectSpreadsheetRequest {
                    spreadsheet_url: SSID.to_string(),
                    etag: f.owner.config.etag.clone(),
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, BoardError::Conflict(_)));

        let stored = f.board.accounts().reload(&scope, f.owner.user_id).await.unwrap();
        assert!(stored.config.is_published);

        let user = f
            .board
            .connect_spreadsheet(
                &scope,
                Some(OWNER),
                ConnectSpreadsheetRequest {
                    spreadsheet_url: SSID.to_string(),
                    etag: published.etag,
                },
            )
            .await
            .unwrap();
        assert!(user.config.is_published);
        assert_eq!(user.config.published_sheet_name.as_deref(), Some(SHEET));
    }

    #[tokio::test]
    async fn unpublished_boards_are_private() {
        let f = fixture().await;
        let config = publish(&f, true).await;
        let scope = f.cache.scope();
        f.board
            .unpublish(&scope, Some(OWNER), UnpublishRequest { etag: config.etag })
            .await
            .unwrap();

        let err = f.board.answers(&f.cache.scope(), f.owner.user_id, None).await.unwrap_err();
        assert!(matches!(err, BoardError::Denied(_)));
    }

    #[tokio::test]
    async fn publish_fails_without_an_answer_column() {
        let f = fixture().await;
        f.sheets.put_sheet(SSID, "Empty", &[vec!["名前", "クラス"]]);
        let scope = f.cache.scope();

        let saved = f
            .board
            .save_sheet_config(
                &scope,
                Some(OWNER),
                SaveSheetConfigRequest {
                    spreadsheet_id: SSID.to_string(),
                    sheet_name: "Empty".to_string(),
                    config: ConfigPatch::default(),
                    etag: f.owner.config.etag.clone(),
                },
            )
            .await
            .unwrap();
        assert_eq!(saved.setup_status, SetupStatus::SpreadsheetConnected);

        let err = f
            .board
            .publish(
                &scope,
                Some(OWNER),
                PublishRequest {
                    config: ConfigPatch::default(),
                    etag: saved.etag,
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, BoardError::Validation(_)));
    }

    #[tokio::test]
    async fn sheets_list_is_owner_only() {
        let f = fixture().await;
        let scope = f.cache.scope();
        let list = f
            .board
            .sheets_list(&scope, f.owner.user_id, Some(OWNER))
            .await
            .unwrap();
        assert_eq!(list.sheets.len(), 1);
        assert_eq!(list.sheets[0].title, SHEET);

        assert!(
            f.board
                .sheets_list(&scope, f.owner.user_id, Some(STUDENT))
                .await
                .is_err()
        );
    }
}
