use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{error, info, warn};
use uuid::Uuid;

use answerboard_cache::{CacheOptions, CacheScope, RelatedKeys, keys};
use answerboard_db::Database;
use answerboard_db::models::UserRow;
use answerboard_types::api::CurrentUserStatus;
use answerboard_types::models::{Action, BoardConfig, SetupStatus, UserRecord};

use crate::access::{SystemAdmins, decide};
use crate::config::seal;
use crate::error::{BoardError, BoardResult};

const USER_CACHE: CacheOptions = CacheOptions {
    ttl: Some(std::time::Duration::from_secs(300)),
    durable: false,
    memo: true,
};

/// Teacher accounts stored in the `users` table.
pub struct AccountService {
    db: Arc<Database>,
    admins: SystemAdmins,
}

impl AccountService {
    pub fn new(db: Arc<Database>, admins: SystemAdmins) -> Self {
        Self { db, admins }
    }

    /// Runs a blocking database call off the async runtime.
    async fn blocking<T, F>(&self, f: F) -> BoardResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&Database) -> anyhow::Result<T> + Send + 'static,
    {
        let db = Arc::clone(&self.db);
        tokio::task::spawn_blocking(move || f(&db))
            .await
            .map_err(|e| BoardError::Internal(format!("spawn_blocking join error: {e}")))?
            .map_err(BoardError::Database)
    }

    pub async fn find_by_id(&self, scope: &CacheScope, user_id: Uuid) -> BoardResult<Option<UserRecord>> {
        let key = keys::user(&user_id);
        if let Some(user) = scope.lookup::<UserRecord>(&key, USER_CACHE) {
            return Ok(Some(user));
        }

        let id = user_id.to_string();
        let row = self.blocking(move |db| db.get_user_by_id(&id)).await?;
        let user = row.map(to_record).transpose()?;
        if let Some(user) = &user {
            scope.store(&key, user, USER_CACHE);
        }
        Ok(user)
    }

    pub async fn find_by_email(&self, scope: &CacheScope, email: &str) -> BoardResult<Option<UserRecord>> {
        let email = email.trim().to_lowercase();
        if email.is_empty() {
            return Ok(None);
        }
        let key = keys::user_email(&email);
        if let Some(user) = scope.lookup::<UserRecord>(&key, USER_CACHE) {
            return Ok(Some(user));
        }

        let row = self.blocking(move |db| db.get_user_by_email(&email)).await?;
        let user = row.map(to_record).transpose()?;
        if let Some(user) = &user {
            scope.store(&key, user, USER_CACHE);
        }
        Ok(user)
    }

    /// Reads the account past the cache. Used under the script lock before a
    /// read-modify-write of the config.
    pub async fn reload(&self, scope: &CacheScope, user_id: Uuid) -> BoardResult<UserRecord> {
        scope.remove(&keys::user(&user_id));
        self.find_by_id(scope, user_id)
            .await?
            .ok_or_else(|| BoardError::not_found(format!("user {user_id}")))
    }

    /// The signed-in viewer's own account.
    pub async fn require_owner(&self, scope: &CacheScope, viewer: Option<&str>) -> BoardResult<UserRecord> {
        let email = viewer.ok_or(BoardError::Unauthenticated)?;
        match self.find_by_email(scope, email).await? {
            Some(user) if user.is_active => Ok(user),
            Some(_) => Err(BoardError::denied("account is deactivated")),
            None => Err(BoardError::not_found("no account registered for this user")),
        }
    }

    /// Creates the viewer's account, or returns the existing one. A
    /// soft-deleted account is reactivated. The boolean is true when a new
    /// account was created.
    pub async fn register(
        &self,
        scope: &CacheScope,
        email: &str,
        spreadsheet_url: Option<&str>,
    ) -> BoardResult<(UserRecord, bool)> {
        let email = validate_email(email)?;
        let spreadsheet = spreadsheet_url
            .filter(|url| !url.trim().is_empty())
            .map(parse_spreadsheet)
            .transpose()?;

        if let Some(existing) = self.find_by_email(scope, &email).await? {
            if existing.is_active {
                return Ok((existing, false));
            }
            let id = existing.user_id.to_string();
            let now = Utc::now().to_rfc3339();
            self.blocking(move |db| db.set_user_active(&id, true, &now)).await?;
            scope.invalidate_related(&related(&existing));
            info!(user_id = %existing.user_id, "reactivated account");
            let user = self
                .find_by_id(scope, existing.user_id)
                .await?
                .ok_or_else(|| BoardError::not_found("account vanished during reactivation"))?;
            return Ok((user, false));
        }

        let now = Utc::now();
        let mut config = BoardConfig::default();
        if spreadsheet.is_some() {
            config.setup_status = SetupStatus::SpreadsheetConnected;
        }
        let user = UserRecord {
            user_id: Uuid::new_v4(),
            admin_email: email.clone(),
            spreadsheet_id: spreadsheet.as_ref().map(|(id, _)| id.clone()),
            spreadsheet_url: spreadsheet.map(|(_, url)| url),
            config: seal(config, now),
            created_at: now,
            last_accessed_at: now,
            is_active: true,
        };

        let row = to_row(&user)?;
        self.blocking(move |db| db.create_user(&row)).await?;
        scope.invalidate_related(&related(&user));
        info!(user_id = %user.user_id, "registered account");
        Ok((user, true))
    }

    /// `request_user_id`, when given, must be the viewer's own account.
    pub async fn current_user_status(
        &self,
        scope: &CacheScope,
        viewer: Option<&str>,
        request_user_id: Option<Uuid>,
    ) -> BoardResult<CurrentUserStatus> {
        let Some(email) = viewer else {
            return Ok(CurrentUserStatus {
                email: None,
                registered: false,
                user: None,
            });
        };

        let user = self.find_by_email(scope, email).await?;
        if let (Some(requested), Some(user)) = (request_user_id, &user) {
            if requested != user.user_id {
                return Err(BoardError::denied("user id does not belong to the signed-in account"));
            }
        }

        Ok(CurrentUserStatus {
            email: Some(email.trim().to_lowercase()),
            registered: user.as_ref().is_some_and(|u| u.is_active),
            user,
        })
    }

    /// Binds the owner to another spreadsheet. Publishing state tied to the
    /// old spreadsheet is reset; caches for both spreadsheets are dropped.
    ///
    /// `owner` must have been read past the cache while the caller holds the
    /// script lock; `BoardService::connect_spreadsheet` does both.
    pub(crate) async fn connect_spreadsheet(
        &self,
        scope: &CacheScope,
        owner: &UserRecord,
        spreadsheet_url: &str,
    ) -> BoardResult<UserRecord> {
        let (spreadsheet_id, url) = parse_spreadsheet(spreadsheet_url)?;

        let mut config = owner.config.clone();
        if owner.spreadsheet_id.as_deref() != Some(spreadsheet_id.as_str()) {
            config.is_published = false;
            config.published_sheet_name = None;
            config.published_spreadsheet_id = None;
            config.published_at = None;
            config.column_mapping = Default::default();
            config.confidence.clear();
            config.setup_status = SetupStatus::SpreadsheetConnected;
        }
        let config = seal(config, Utc::now());
        let config_json = serialize_config(&config)?;

        let id = owner.user_id.to_string();
        let (new_id, new_url) = (spreadsheet_id.clone(), url.clone());
        let now = Utc::now().to_rfc3339();
        let updated = self
            .blocking(move |db| db.update_spreadsheet(&id, &new_id, &new_url, &config_json, &now))
            .await?;
        if !updated {
            return Err(BoardError::not_found(format!("user {}", owner.user_id)));
        }

        scope.invalidate_related(
            &related(owner).spreadsheet(Some(&spreadsheet_id)),
        );
        info!(
            user_id = %owner.user_id,
            old_spreadsheet = ?owner.spreadsheet_id,
            spreadsheet_id = %spreadsheet_id,
            "connected spreadsheet"
        );

        Ok(UserRecord {
            spreadsheet_id: Some(spreadsheet_id),
            spreadsheet_url: Some(url),
            config,
            ..owner.clone()
        })
    }

    /// Persists a new config for `user` and drops every cache entry derived
    /// from the account.
    pub async fn save_config(
        &self,
        scope: &CacheScope,
        user: &UserRecord,
        config: BoardConfig,
    ) -> BoardResult<UserRecord> {
        let config_json = serialize_config(&config)?;
        let id = user.user_id.to_string();
        let now = Utc::now().to_rfc3339();
        let updated = self
            .blocking(move |db| db.update_config(&id, &config_json, &now))
            .await?;
        if !updated {
            return Err(BoardError::not_found(format!("user {}", user.user_id)));
        }

        scope.invalidate_related(&related(user).spreadsheet(config.published_spreadsheet_id.as_deref()));
        Ok(UserRecord {
            config,
            ..user.clone()
        })
    }

    /// Soft delete deactivates the account; hard delete removes the row.
    /// Allowed for the owner and for system administrators.
    pub async fn delete_account(
        &self,
        scope: &CacheScope,
        actor: Option<&str>,
        user_id: Uuid,
        hard: bool,
    ) -> BoardResult<()> {
        let actor = actor.ok_or(BoardError::Unauthenticated)?;
        let user = self.find_by_id(scope, user_id).await?;
        let decision = decide(user.as_ref(), Action::Admin, Some(actor), &self.admins);
        let Some(user) = user else {
            return Err(BoardError::not_found(format!("user {user_id}")));
        };
        if !decision.allowed {
            warn!(category = "access", %user_id, "account deletion refused");
            return Err(BoardError::denied("only the owner or an administrator can delete this account"));
        }

        let id = user_id.to_string();
        let now = Utc::now().to_rfc3339();
        let changed = if hard {
            self.blocking(move |db| db.delete_user(&id)).await?
        } else {
            self.blocking(move |db| db.set_user_active(&id, false, &now)).await?
        };
        if !changed {
            return Err(BoardError::not_found(format!("user {user_id}")));
        }

        scope.invalidate_related(&related(&user));
        info!(%user_id, hard, user_type = ?decision.user_type, "deleted account");
        Ok(())
    }

    /// Records an access without touching the cached record.
    pub async fn touch(&self, user_id: Uuid) -> BoardResult<()> {
        let id = user_id.to_string();
        let now = Utc::now().to_rfc3339();
        self.blocking(move |db| db.touch_user(&id, &now)).await?;
        Ok(())
    }
}

/// Every cache identity derived from an account.
pub fn related(user: &UserRecord) -> RelatedKeys {
    RelatedKeys::new()
        .user(user.user_id)
        .email(user.admin_email.clone())
        .spreadsheet(user.spreadsheet_id.as_deref())
        .spreadsheet(user.config.published_spreadsheet_id.as_deref())
}

fn validate_email(raw: &str) -> BoardResult<String> {
    let email = raw.trim().to_lowercase();
    match email.split_once('@') {
        Some((local, domain)) if !local.is_empty() && domain.contains('.') => Ok(email),
        _ => Err(BoardError::validation("a valid email address is required")),
    }
}

/// Accepts a spreadsheet URL (`.../spreadsheets/d/<id>/edit`) or a bare id.
/// Returns the id and a canonical URL.
pub fn parse_spreadsheet(input: &str) -> BoardResult<(String, String)> {
    let input = input.trim();
    let id = match input.split_once("/d/") {
        Some((_, rest)) => rest
            .split(['/', '?', '#'])
            .next()
            .unwrap_or_default(),
        None => input,
    };

    let valid = id.len() >= 20
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
    if !valid {
        return Err(BoardError::validation("not a spreadsheet URL or id"));
    }

    let url = if input.starts_with("https://") {
        input.to_string()
    } else {
        format!("https://docs.google.com/spreadsheets/d/{id}/edit")
    };
    Ok((id.to_string(), url))
}

fn serialize_config(config: &BoardConfig) -> BoardResult<String> {
    serde_json::to_string(config).map_err(|e| BoardError::Internal(format!("config serialization: {e}")))
}

fn parse_time(raw: &str, user_id: &str) -> DateTime<Utc> {
    match DateTime::parse_from_rfc3339(raw) {
        Ok(t) => t.with_timezone(&Utc),
        Err(e) => {
            warn!(category = "database", user_id, "bad timestamp {:?}: {}", raw, e);
            Utc::now()
        }
    }
}

pub(crate) fn to_record(row: UserRow) -> BoardResult<UserRecord> {
    let user_id = Uuid::parse_str(&row.user_id)
        .map_err(|e| BoardError::Internal(format!("bad user id {}: {}", row.user_id, e)))?;

    let config = match serde_json::from_str::<BoardConfig>(&row.config_json) {
        Ok(config) => config,
        Err(e) => {
            error!(category = "database", user_id = %row.user_id, "unreadable config, using defaults: {}", e);
            BoardConfig::default()
        }
    };

    Ok(UserRecord {
        user_id,
        created_at: parse_time(&row.created_at, &row.user_id),
        last_accessed_at: parse_time(&row.last_accessed_at, &row.user_id),
        admin_email: row.admin_email,
        spreadsheet_id: row.spreadsheet_id,
        spreadsheet_url: row.spreadsheet_url,
        config,
        is_active: row.is_active,
    })
}

pub(crate) fn to_row(user: &UserRecord) -> BoardResult<UserRow> {
    Ok(UserRow {
        user_id: user.user_id.to_string(),
        admin_email: user.admin_email.clone(),
        spreadsheet_id: user.spreadsheet_id.clone(),
        spreadsheet_url: user.spreadsheet_url.clone(),
        config_json: serialize_config(&user.config)?,
        created_at: user.created_at.to_rfc3339(),
        last_accessed_at: user.last_accessed_at.to_rfc3339(),
        is_active: user.is_active,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use answerboard_cache::CacheManager;

    const SHEET_A: &str = "1AbCdEfGhIjKlMnOpQrStUvWxYz0123456789_-aaaa";
    const SHEET_B: &str = "1ZyXwVuTsRqPoNmLkJiHgFeDcBa9876543210_-bbbb";

    fn service() -> (AccountService, Arc<CacheManager>) {
        let db = Arc::new(Database::open_in_memory().unwrap());
        let cache = Arc::new(CacheManager::in_memory());
        (
            AccountService::new(db, SystemAdmins::from_csv("ops@school.example")),
            cache,
        )
    }

    #[test]
    fn spreadsheet_ids_are_parsed_from_urls() {
        let (id, url) = parse_spreadsheet(&format!(
            "https://docs.google.com/spreadsheets/d/{SHEET_A}/edit#gid=0"
        ))
        .unwrap();
        assert_eq!(id, SHEET_A);
        assert!(url.starts_with("https://docs.google.com/"));

        let (id, url) = parse_spreadsheet(SHEET_B).unwrap();
        assert_eq!(id, SHEET_B);
        assert_eq!(url, format!("https://docs.google.com/spreadsheets/d/{SHEET_B}/edit"));

        assert!(parse_spreadsheet("not a sheet").is_err());
        assert!(parse_spreadsheet("https://example.com/d/short/").is_err());
    }

    #[tokio::test]
    async fn register_is_idempotent_per_email() {
        let (svc, cache) = service();
        let scope = cache.scope();

        let (first, created) = svc.register(&scope, "Teacher@School.example", None).await.unwrap();
        assert!(created);
        assert_eq!(first.admin_email, "teacher@school.example");
        assert!(first.config.etag.is_some());

        let (again, created) = svc.register(&scope, "teacher@school.example ", None).await.unwrap();
        assert!(!created);
        assert_eq!(again.user_id, first.user_id);
    }

    #[tokio::test]
    async fn register_rejects_bad_email() {
        let (svc, cache) = service();
        let err = svc.register(&cache.scope(), "  ", None).await.unwrap_err();
        assert!(matches!(err, BoardError::Validation(_)));
    }

    #[tokio::test]
    async fn soft_delete_then_register_reactivates() {
        let (svc, cache) = service();
        let scope = cache.scope();
        let (user, _) = svc.register(&scope, "t@school.example", None).await.unwrap();

        svc.delete_account(&scope, Some("t@school.example"), user.user_id, false)
            .await
            .unwrap();
        let stored = svc.find_by_id(&cache.scope(), user.user_id).await.unwrap().unwrap();
        assert!(!stored.is_active);

        let (back, created) = svc.register(&cache.scope(), "t@school.example", None).await.unwrap();
        assert!(!created);
        assert!(back.is_active);
        assert_eq!(back.user_id, user.user_id);
    }

    #[tokio::test]
    async fn delete_requires_owner_or_admin() {
        let (svc, cache) = service();
        let scope = cache.scope();
        let (user, _) = svc.register(&scope, "t@school.example", None).await.unwrap();

        let err = svc
            .delete_account(&scope, Some("student@school.example"), user.user_id, true)
            .await
            .unwrap_err();
        assert!(matches!(err, BoardError::Denied(_)));

        let err = svc.delete_account(&scope, None, user.user_id, true).await.unwrap_err();
        assert!(matches!(err, BoardError::Unauthenticated));

        svc.delete_account(&scope, Some("ops@school.example"), user.user_id, true)
            .await
            .unwrap();
        assert!(svc.find_by_id(&cache.scope(), user.user_id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn reconnecting_drops_cached_entries_for_both_spreadsheets() {
        let (svc, cache) = service();
        let scope = cache.scope();
        let (user, _) = svc.register(&scope, "t@school.example", Some(SHEET_A)).await.unwrap();
        assert_eq!(user.spreadsheet_id.as_deref(), Some(SHEET_A));

        cache.store(&keys::sheets_list(SHEET_A), &vec!["old"], CacheOptions::default());
        cache.store(&keys::headers(SHEET_A, "Sheet1"), &vec!["old"], CacheOptions::default());
        cache.store(&keys::sheets_list(SHEET_B), &vec!["stale"], CacheOptions::default());

        let updated = svc.connect_spreadsheet(&scope, &user, SHEET_B).await.unwrap();
        assert_eq!(updated.spreadsheet_id.as_deref(), Some(SHEET_B));
        assert_eq!(updated.config.setup_status, SetupStatus::SpreadsheetConnected);

        let opts = CacheOptions::default();
        assert!(cache.lookup::<Vec<String>>(&keys::sheets_list(SHEET_A), opts).is_none());
        assert!(cache.lookup::<Vec<String>>(&keys::headers(SHEET_A, "Sheet1"), opts).is_none());
        assert!(cache.lookup::<Vec<String>>(&keys::sheets_list(SHEET_B), opts).is_none());

        let stored = svc.find_by_email(&cache.scope(), "t@school.example").await.unwrap().unwrap();
        assert_eq!(stored.spreadsheet_id.as_deref(), Some(SHEET_B));
    }

    #[tokio::test]
    async fn status_rejects_foreign_user_ids() {
        let (svc, cache) = service();
        let scope = cache.scope();
        let (user, _) = svc.register(&scope, "t@school.example", None).await.unwrap();

        let status = svc
            .current_user_status(&scope, Some("t@school.example"), Some(user.user_id))
            .await
            .unwrap();
        assert!(status.registered);

        let err = svc
            .current_user_status(&scope, Some("t@school.example"), Some(Uuid::new_v4()))
            .await
            .unwrap_err();
        assert!(matches!(err, BoardError::Denied(_)));

        let anon = svc.current_user_status(&scope, None, None).await.unwrap();
        assert!(!anon.registered);
    }

    #[test]
    fn unreadable_config_falls_back_to_defaults() {
        let row = UserRow {
            user_id: Uuid::new_v4().to_string(),
            admin_email: "t@school.example".to_string(),
            spreadsheet_id: None,
            spreadsheet_url: None,
            config_json: "{not json".to_string(),
            created_at: Utc::now().to_rfc3339(),
            last_accessed_at: "yesterday".to_string(),
            is_active: true,
        };
        let record = to_record(row).unwrap();
        assert_eq!(record.config, BoardConfig::default());
    }

    #[test]
    fn config_with_both_publish_keys_is_kept() {
        let row = UserRow {
            user_id: Uuid::new_v4().to_string(),
            admin_email: "t@school.example".to_string(),
            spreadsheet_id: Some(SHEET_A.to_string()),
            spreadsheet_url: None,
            config_json: r#"{"isPublic":false,"isPublished":true,"publishedSheetName":"Form Responses 1","etag":"e1"}"#
                .to_string(),
            created_at: Utc::now().to_rfc3339(),
            last_accessed_at: Utc::now().to_rfc3339(),
            is_active: true,
        };
        let record = to_record(row).unwrap();
        assert!(record.config.is_published);
        assert_eq!(record.config.published_sheet_name.as_deref(), Some("Form Responses 1"));
        assert_eq!(record.config.etag.as_deref(), Some("e1"));
    }
}
