/// Row types as stored in SQLite.
/// Distinct from answerboard-types models to keep the DB layer independent.

#[derive(Debug, Clone, PartialEq)]
pub struct UserRow {
    pub user_id: String,
    pub admin_email: String,
    pub spreadsheet_id: Option<String>,
    pub spreadsheet_url: Option<String>,
    pub config_json: String,
    pub created_at: String,
    pub last_accessed_at: String,
    pub is_active: bool,
}
