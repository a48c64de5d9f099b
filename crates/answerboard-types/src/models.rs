use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Current layout of the serialized board config.
pub const CONFIG_VERSION: u32 = 1;

/// One teacher account: a row of the user database.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserRecord {
    pub user_id: Uuid,
    pub admin_email: String,
    pub spreadsheet_id: Option<String>,
    pub spreadsheet_url: Option<String>,
    pub config: BoardConfig,
    pub created_at: DateTime<Utc>,
    pub last_accessed_at: DateTime<Utc>,
    pub is_active: bool,
}

impl UserRecord {
    /// Owner match is case-insensitive and ignores surrounding whitespace.
    pub fn is_owned_by(&self, email: &str) -> bool {
        let email = email.trim();
        !email.is_empty() && self.admin_email.eq_ignore_ascii_case(email)
    }

    /// A board is public when it is published and its owner account is active.
    pub fn is_public(&self) -> bool {
        self.is_active && self.config.is_published
    }
}

/// Per-user settings blob, stored as JSON next to the user row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", from = "StoredBoardConfig")]
pub struct BoardConfig {
    pub version: u32,
    pub is_published: bool,
    pub allow_anonymous: bool,
    pub published_sheet_name: Option<String>,
    pub published_spreadsheet_id: Option<String>,
    pub display_settings: DisplaySettings,
    pub column_mapping: ColumnMapping,
    /// Detection confidence (0..=100) per mapped field name.
    pub confidence: BTreeMap<String, u8>,
    pub form_url: Option<String>,
    pub setup_status: SetupStatus,
    pub etag: Option<String>,
    pub published_at: Option<DateTime<Utc>>,
    pub last_modified: Option<DateTime<Utc>>,
}

impl Default for BoardConfig {
    fn default() -> Self {
        Self {
            version: CONFIG_VERSION,
            is_published: false,
            allow_anonymous: false,
            published_sheet_name: None,
            published_spreadsheet_id: None,
            display_settings: DisplaySettings::default(),
            column_mapping: ColumnMapping::default(),
            confidence: BTreeMap::new(),
            form_url: None,
            setup_status: SetupStatus::default(),
            etag: None,
            published_at: None,
            last_modified: None,
        }
    }
}

/// Config as read back from storage. Older blobs say `isPublic`; when a blob
/// carries both keys, `isPublished` wins.
#[derive(Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct StoredBoardConfig {
    version: Option<u32>,
    is_published: Option<bool>,
    is_public: Option<bool>,
    allow_anonymous: bool,
    published_sheet_name: Option<String>,
    published_spreadsheet_id: Option<String>,
    display_settings: DisplaySettings,
    column_mapping: ColumnMapping,
    confidence: BTreeMap<String, u8>,
    form_url: Option<String>,
    setup_status: SetupStatus,
    etag: Option<String>,
    published_at: Option<DateTime<Utc>>,
    last_modified: Option<DateTime<Utc>>,
}

impl From<StoredBoardConfig> for BoardConfig {
    fn from(stored: StoredBoardConfig) -> Self {
        Self {
            version: stored.version.unwrap_or(CONFIG_VERSION),
            is_published: stored.is_published.or(stored.is_public).unwrap_or(false),
            allow_anonymous: stored.allow_anonymous,
            published_sheet_name: stored.published_sheet_name,
            published_spreadsheet_id: stored.published_spreadsheet_id,
            display_settings: stored.display_settings,
            column_mapping: stored.column_mapping,
            confidence: stored.confidence,
            form_url: stored.form_url,
            setup_status: stored.setup_status,
            etag: stored.etag,
            published_at: stored.published_at,
            last_modified: stored.last_modified,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DisplaySettings {
    pub show_names: bool,
    pub show_reactions: bool,
    pub show_counts: bool,
    pub theme: Option<String>,
}

impl Default for DisplaySettings {
    fn default() -> Self {
        Self {
            show_names: false,
            show_reactions: true,
            show_counts: true,
            theme: None,
        }
    }
}

/// Header names chosen for each semantic field. `None` means auto-detect.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ColumnMapping {
    pub answer: Option<String>,
    pub reason: Option<String>,
    pub class: Option<String>,
    pub name: Option<String>,
}

impl ColumnMapping {
    pub fn get(&self, field: Field) -> Option<&str> {
        match field {
            Field::Answer => self.answer.as_deref(),
            Field::Reason => self.reason.as_deref(),
            Field::Class => self.class.as_deref(),
            Field::Name => self.name.as_deref(),
            _ => None,
        }
    }

    /// Returns false for fields that cannot be mapped explicitly.
    pub fn set(&mut self, field: Field, header: String) -> bool {
        let slot = match field {
            Field::Answer => &mut self.answer,
            Field::Reason => &mut self.reason,
            Field::Class => &mut self.class,
            Field::Name => &mut self.name,
            _ => return false,
        };
        *slot = Some(header);
        true
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SetupStatus {
    #[default]
    Pending,
    SpreadsheetConnected,
    Configured,
    Completed,
}

/// Semantic column of an answer sheet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Field {
    Answer,
    Reason,
    Class,
    Name,
    Email,
    Timestamp,
    Like,
    Understand,
    Curious,
    Highlight,
}

impl Field {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Answer => "answer",
            Self::Reason => "reason",
            Self::Class => "class",
            Self::Name => "name",
            Self::Email => "email",
            Self::Timestamp => "timestamp",
            Self::Like => "like",
            Self::Understand => "understand",
            Self::Curious => "curious",
            Self::Highlight => "highlight",
        }
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReactionKind {
    Like,
    Understand,
    Curious,
}

impl ReactionKind {
    pub const ALL: [ReactionKind; 3] = [Self::Like, Self::Understand, Self::Curious];

    pub fn field(self) -> Field {
        match self {
            Self::Like => Field::Like,
            Self::Understand => Field::Understand,
            Self::Curious => Field::Curious,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Like => "LIKE",
            Self::Understand => "UNDERSTAND",
            Self::Curious => "CURIOUS",
        }
    }
}

impl fmt::Display for ReactionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ReactionKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "LIKE" => Ok(Self::Like),
            "UNDERSTAND" => Ok(Self::Understand),
            "CURIOUS" => Ok(Self::Curious),
            other => Err(format!("unknown reaction type: {other}")),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    #[default]
    View,
    Edit,
    Admin,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UserType {
    Owner,
    Admin,
    Guest,
    Private,
    Unauthorized,
    NotFound,
}

/// What a guest is allowed to see of a board's config.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PublicBoardConfig {
    pub published_sheet_name: Option<String>,
    pub display_settings: DisplaySettings,
    pub form_url: Option<String>,
    pub published_at: Option<DateTime<Utc>>,
}

impl From<&BoardConfig> for PublicBoardConfig {
    fn from(config: &BoardConfig) -> Self {
        Self {
            published_sheet_name: config.published_sheet_name.clone(),
            display_settings: config.display_settings.clone(),
            form_url: config.form_url.clone(),
            published_at: config.published_at,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum VisibleConfig {
    Full(BoardConfig),
    Public(PublicBoardConfig),
}

/// Result of an access check. Denials are values, not errors.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccessDecision {
    pub allowed: bool,
    pub user_type: UserType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub config: Option<VisibleConfig>,
}

impl AccessDecision {
    pub fn denied(user_type: UserType) -> Self {
        Self {
            allowed: false,
            user_type,
            config: None,
        }
    }
}

/// One tab of a spreadsheet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SheetInfo {
    pub sheet_id: i64,
    pub title: String,
    pub row_count: u32,
    pub column_count: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn legacy_is_public_flag_is_accepted() {
        let config: BoardConfig =
            serde_json::from_str(r#"{"isPublic":true,"allowAnonymous":true}"#).unwrap();
        assert!(config.is_published);
        assert!(config.allow_anonymous);
        assert_eq!(config.version, CONFIG_VERSION);
        assert!(config.display_settings.show_reactions);
    }

    #[test]
    fn published_flag_wins_over_the_legacy_one() {
        let config: BoardConfig = serde_json::from_str(
            r#"{"isPublished":false,"isPublic":true,"formUrl":"https://forms.example/x","etag":"e1"}"#,
        )
        .unwrap();
        assert!(!config.is_published);
        assert_eq!(config.form_url.as_deref(), Some("https://forms.example/x"));
        assert_eq!(config.etag.as_deref(), Some("e1"));

        let written = serde_json::to_value(&config).unwrap();
        assert_eq!(written["isPublished"], false);
        assert!(written.get("isPublic").is_none());
    }

    #[test]
    fn public_config_omits_internal_flags() {
        let mut config = BoardConfig {
            is_published: true,
            etag: Some("abc".into()),
            ..BoardConfig::default()
        };
        config.confidence.insert("answer".into(), 95);

        let json = serde_json::to_value(VisibleConfig::Public(PublicBoardConfig::from(&config))).unwrap();
        for hidden in ["isPublished", "allowAnonymous", "etag", "confidence", "setupStatus"] {
            assert!(json.get(hidden).is_none(), "{hidden} leaked");
        }
    }

    #[test]
    fn reaction_kinds_parse_case_insensitively() {
        assert_eq!("like".parse::<ReactionKind>(), Ok(ReactionKind::Like));
        assert_eq!(" Curious ".parse::<ReactionKind>(), Ok(ReactionKind::Curious));
        assert!("LOVE".parse::<ReactionKind>().is_err());
        assert_eq!(serde_json::to_string(&ReactionKind::Understand).unwrap(), "\"UNDERSTAND\"");
    }
}
