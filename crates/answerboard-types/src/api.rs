use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::{
    Action, BoardConfig, ColumnMapping, ReactionKind, SetupStatus, SheetInfo, UserRecord,
    UserType, VisibleConfig,
};

// -- Session --

/// Session token claims. `email` is the viewer's signed-in identity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub email: String,
    pub exp: usize,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DevLoginRequest {
    pub email: String,
}

#[derive(Debug, Serialize)]
pub struct DevLoginResponse {
    pub token: String,
}

// -- Pages --

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageQuery {
    pub mode: Option<String>,
    pub page: Option<String>,
    pub user_id: Option<String>,
    pub view: Option<String>,
}

/// Which screen the front-end should render for a GET on `/`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "page", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum Page {
    Board {
        user_id: Uuid,
        user_type: UserType,
        group_view: bool,
        config: VisibleConfig,
    },
    Admin {
        user_id: Uuid,
    },
    Register {
        email: Option<String>,
    },
    Unpublished {
        user_id: Uuid,
    },
    Denied {
        user_type: UserType,
    },
}

// -- Reactions --

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ReactionRequest {
    pub board_id: Uuid,
    pub row_index: u32,
    pub reaction: ReactionKind,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReactionResponse {
    pub reaction: ReactionKind,
    pub reacted: bool,
    pub new_score: usize,
    pub counts: BTreeMap<ReactionKind, usize>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct HighlightRequest {
    pub board_id: Uuid,
    pub row_index: u32,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HighlightResponse {
    pub row_index: u32,
    pub highlighted: bool,
}

// -- Board data --

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReactionSummary {
    pub count: usize,
    pub reacted: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnswerRow {
    pub row_index: u32,
    pub answer: String,
    pub reason: Option<String>,
    pub class: Option<String>,
    pub name: Option<String>,
    pub reactions: BTreeMap<ReactionKind, ReactionSummary>,
    pub highlighted: bool,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BoardAnswers {
    pub board_id: Uuid,
    pub sheet_name: String,
    pub user_type: UserType,
    pub config: VisibleConfig,
    pub rows: Vec<AnswerRow>,
}

#[derive(Debug, Default, Deserialize)]
pub struct AccessQuery {
    #[serde(default)]
    pub action: Action,
}

// -- Admin panel --

/// Partial config update. Absent fields keep their stored value.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ConfigPatch {
    #[serde(alias = "isPublic")]
    pub is_published: Option<bool>,
    pub allow_anonymous: Option<bool>,
    pub published_sheet_name: Option<String>,
    pub published_spreadsheet_id: Option<String>,
    pub display_settings: Option<DisplaySettingsPatch>,
    pub column_mapping: Option<ColumnMapping>,
    pub confidence: Option<BTreeMap<String, u8>>,
    pub form_url: Option<String>,
    pub setup_status: Option<SetupStatus>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DisplaySettingsPatch {
    pub show_names: Option<bool>,
    pub show_reactions: Option<bool>,
    pub show_counts: Option<bool>,
    pub theme: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SaveSheetConfigRequest {
    pub spreadsheet_id: String,
    pub sheet_name: String,
    #[serde(default)]
    pub config: ConfigPatch,
    pub etag: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PublishRequest {
    #[serde(default)]
    pub config: ConfigPatch,
    pub etag: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UnpublishRequest {
    pub etag: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AppSettings {
    pub user_id: Uuid,
    pub admin_email: String,
    pub spreadsheet_id: Option<String>,
    pub spreadsheet_url: Option<String>,
    pub config: BoardConfig,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SheetsListResponse {
    pub spreadsheet_id: String,
    pub sheets: Vec<SheetInfo>,
}

// -- Accounts --

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct RegisterRequest {
    pub spreadsheet_url: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterResponse {
    pub user_id: Uuid,
    pub created: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ConnectSpreadsheetRequest {
    pub spreadsheet_url: String,
    #[serde(default)]
    pub etag: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusQuery {
    pub request_user_id: Option<Uuid>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CurrentUserStatus {
    pub email: Option<String>,
    pub registered: bool,
    pub user: Option<UserRecord>,
}

#[derive(Debug, Default, Deserialize)]
pub struct DeleteAccountQuery {
    #[serde(default)]
    pub hard: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteAccountResponse {
    pub user_id: Uuid,
    pub hard: bool,
}

// -- System --

#[derive(Debug, Serialize)]
pub struct WebAppUrlResponse {
    pub url: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ClearCacheRequest {
    pub prefix: String,
    pub max_keys: Option<usize>,
}

#[derive(Debug, Serialize)]
pub struct ClearCacheResponse {
    pub removed: usize,
}
