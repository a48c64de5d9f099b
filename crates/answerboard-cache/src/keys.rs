//! Cache key names. Every key derived from a user, an email or a spreadsheet
//! is built here so [`RelatedKeys`] can find all of them again.

use uuid::Uuid;

pub const SERVICE_ACCOUNT_TOKEN: &str = "sa_token";
pub const WEB_APP_URL: &str = "webapp_url";

pub fn user(user_id: &Uuid) -> String {
    format!("user_{user_id}")
}

pub fn user_email(email: &str) -> String {
    format!("email_{}", email.trim().to_lowercase())
}

pub fn sheets_list(spreadsheet_id: &str) -> String {
    format!("sheets_{spreadsheet_id}")
}

pub fn headers(spreadsheet_id: &str, sheet_name: &str) -> String {
    format!("{}{sheet_name}", headers_prefix(spreadsheet_id))
}

pub fn headers_prefix(spreadsheet_id: &str) -> String {
    format!("hdr_{spreadsheet_id}_")
}

pub fn answers(spreadsheet_id: &str, sheet_name: &str) -> String {
    format!("{}{sheet_name}", answers_prefix(spreadsheet_id))
}

pub fn answers_prefix(spreadsheet_id: &str) -> String {
    format!("answers_{spreadsheet_id}_")
}

pub fn service_account_token(subject: Option<&str>) -> String {
    match subject {
        Some(subject) => format!("{SERVICE_ACCOUNT_TOKEN}_{}", subject.to_lowercase()),
        None => SERVICE_ACCOUNT_TOKEN.to_string(),
    }
}

/// Identities touched by a write. Spreadsheet ids should include the old id
/// after a reconnection, not just the new one.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RelatedKeys {
    pub user_id: Option<Uuid>,
    pub email: Option<String>,
    pub spreadsheet_ids: Vec<String>,
}

impl RelatedKeys {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn user(mut self, user_id: Uuid) -> Self {
        self.user_id = Some(user_id);
        self
    }

    pub fn email(mut self, email: impl Into<String>) -> Self {
        self.email = Some(email.into());
        self
    }

    /// Adds a spreadsheet id; empty and duplicate ids are ignored.
    pub fn spreadsheet(mut self, spreadsheet_id: Option<&str>) -> Self {
        if let Some(id) = spreadsheet_id.map(str::trim).filter(|id| !id.is_empty()) {
            if !self.spreadsheet_ids.iter().any(|known| known == id) {
                self.spreadsheet_ids.push(id.to_string());
            }
        }
        self
    }

    /// Exact keys to remove.
    pub fn exact_keys(&self) -> Vec<String> {
        let mut out = Vec::new();
        if let Some(user_id) = &self.user_id {
            out.push(user(user_id));
        }
        if let Some(email) = &self.email {
            out.push(user_email(email));
        }
        for id in &self.spreadsheet_ids {
            out.push(sheets_list(id));
        }
        out
    }

    /// Prefixes whose keys must all go.
    pub fn prefixes(&self) -> Vec<String> {
        self.spreadsheet_ids
            .iter()
            .flat_map(|id| [headers_prefix(id), answers_prefix(id)])
            .collect()
    }
}
