use std::collections::BTreeSet;
use std::sync::Arc;

use tracing::debug;
use uuid::Uuid;

use answerboard_cache::CacheScope;
use answerboard_types::models::{
    AccessDecision, Action, PublicBoardConfig, UserRecord, UserType, VisibleConfig,
};

use crate::accounts::AccountService;
use crate::error::{BoardError, BoardResult};

/// Operator accounts from `BOARD_ADMIN_EMAILS`. Compared case-insensitively.
#[derive(Debug, Clone, Default)]
pub struct SystemAdmins(BTreeSet<String>);

impl SystemAdmins {
    pub fn new<I, S>(emails: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self(
            emails
                .into_iter()
                .map(|e| e.as_ref().trim().to_lowercase())
                .filter(|e| !e.is_empty())
                .collect(),
        )
    }

    /// Parses a comma-separated list.
    pub fn from_csv(raw: &str) -> Self {
        Self::new(raw.split(','))
    }

    pub fn contains(&self, email: &str) -> bool {
        self.0.contains(&email.trim().to_lowercase())
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Who may do what with a board. Checked in order: missing board, owner,
/// system admin (account management only), anonymous viewing of a public
/// board, then denial.
pub fn decide(
    board: Option<&UserRecord>,
    action: Action,
    viewer: Option<&str>,
    admins: &SystemAdmins,
) -> AccessDecision {
    let Some(board) = board else {
        return AccessDecision::denied(UserType::NotFound);
    };

    if viewer.is_some_and(|email| board.is_owned_by(email)) {
        return AccessDecision {
            allowed: true,
            user_type: UserType::Owner,
            config: Some(VisibleConfig::Full(board.config.clone())),
        };
    }

    if action == Action::Admin && viewer.is_some_and(|email| admins.contains(email)) {
        return AccessDecision {
            allowed: true,
            user_type: UserType::Admin,
            config: Some(VisibleConfig::Full(board.config.clone())),
        };
    }

    if action == Action::View && board.is_public() && board.config.allow_anonymous {
        return AccessDecision {
            allowed: true,
            user_type: UserType::Guest,
            config: Some(VisibleConfig::Public(PublicBoardConfig::from(&board.config))),
        };
    }

    if board.is_public() {
        AccessDecision::denied(UserType::Unauthorized)
    } else {
        AccessDecision::denied(UserType::Private)
    }
}

/// Loads boards through the cache and applies [`decide`].
#[derive(Clone)]
pub struct AccessController {
    accounts: Arc<AccountService>,
    admins: SystemAdmins,
}

impl AccessController {
    pub fn new(accounts: Arc<AccountService>, admins: SystemAdmins) -> Self {
        Self { accounts, admins }
    }

    pub fn admins(&self) -> &SystemAdmins {
        &self.admins
    }

    pub async fn verify_access(
        &self,
        scope: &CacheScope,
        board_id: Uuid,
        action: Action,
        viewer: Option<&str>,
    ) -> BoardResult<AccessDecision> {
        let board = self.accounts.find_by_id(scope, board_id).await?;
        let decision = decide(board.as_ref(), action, viewer, &self.admins);
        debug!(
            %board_id,
            action = ?action,
            user_type = ?decision.user_type,
            allowed = decision.allowed,
            "access decision"
        );
        Ok(decision)
    }

    /// Like [`verify_access`](Self::verify_access) but returns the board,
    /// failing when access is denied.
    pub async fn require(
        &self,
        scope: &CacheScope,
        board_id: Uuid,
        action: Action,
        viewer: Option<&str>,
    ) -> BoardResult<(UserRecord, AccessDecision)> {
        let board = self.accounts.find_by_id(scope, board_id).await?;
        let decision = decide(board.as_ref(), action, viewer, &self.admins);
        match board {
            Some(board) if decision.allowed => Ok((board, decision)),
            Some(_) => Err(denial(decision.user_type, viewer)),
            None => Err(BoardError::not_found(format!("board {board_id}"))),
        }
    }
}

fn denial(user_type: UserType, viewer: Option<&str>) -> BoardError {
    match (user_type, viewer) {
        (UserType::Private, _) => BoardError::denied("this board is not published"),
        (_, None) => BoardError::Unauthenticated,
        _ => BoardError::denied("you do not have access to this board"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use answerboard_types::models::BoardConfig;
    use chrono::Utc;

    fn board(published: bool, anonymous: bool) -> UserRecord {
        UserRecord {
            user_id: Uuid::new_v4(),
            admin_email: "owner@school.example".to_string(),
            spreadsheet_id: Some("ss1".to_string()),
            spreadsheet_url: None,
            config: BoardConfig {
                is_published: published,
                allow_anonymous: anonymous,
                etag: Some("abc".to_string()),
                ..BoardConfig::default()
            },
            created_at: Utc::now(),
            last_accessed_at: Utc::now(),
            is_active: true,
        }
    }

    const ACTIONS: [Action; 3] = [Action::View, Action::Edit, Action::Admin];

    #[test]
    fn missing_board_is_not_found() {
        let decision = decide(None, Action::View, Some("a@x.com"), &SystemAdmins::default());
        assert!(!decision.allowed);
        assert_eq!(decision.user_type, UserType::NotFound);
    }

    #[test]
    fn owners_are_allowed_everything() {
        for (published, anonymous) in [(false, false), (true, false), (true, true), (false, true)] {
            let b = board(published, anonymous);
            for action in ACTIONS {
                let d = decide(Some(&b), action, Some("Owner@School.example "), &SystemAdmins::default());
                assert!(d.allowed);
                assert_eq!(d.user_type, UserType::Owner);
                assert!(matches!(d.config, Some(VisibleConfig::Full(_))));
            }
        }
    }

    #[test]
    fn non_public_boards_deny_other_viewers() {
        let admins = SystemAdmins::from_csv("ops@school.example");
        for anonymous in [false, true] {
            let b = board(false, anonymous);
            for viewer in [None, Some("student@school.example"), Some("ops@school.example"), Some("")] {
                let d = decide(Some(&b), Action::View, viewer, &admins);
                assert!(!d.allowed, "viewer {viewer:?}");
                assert_eq!(d.user_type, UserType::Private);
            }
        }
    }

    #[test]
    fn inactive_boards_are_private() {
        let mut b = board(true, true);
        b.is_active = false;
        let d = decide(Some(&b), Action::View, None, &SystemAdmins::default());
        assert!(!d.allowed);
        assert_eq!(d.user_type, UserType::Private);
    }

    #[test]
    fn guests_get_a_redacted_config() {
        let b = board(true, true);
        let d = decide(Some(&b), Action::View, None, &SystemAdmins::default());
        assert!(d.allowed);
        assert_eq!(d.user_type, UserType::Guest);

        let json = serde_json::to_value(d.config.unwrap()).unwrap();
        for hidden in ["isPublished", "isPublic", "allowAnonymous", "etag", "confidence", "setupStatus"] {
            assert!(json.get(hidden).is_none(), "{hidden} leaked");
        }
        assert!(json.get("displaySettings").is_some());
    }

    #[test]
    fn guests_cannot_edit() {
        let b = board(true, true);
        let d = decide(Some(&b), Action::Edit, Some("student@school.example"), &SystemAdmins::default());
        assert!(!d.allowed);
        assert_eq!(d.user_type, UserType::Unauthorized);
    }

    #[test]
    fn published_without_anonymous_is_unauthorized() {
        let b = board(true, false);
        let d = decide(Some(&b), Action::View, Some("student@school.example"), &SystemAdmins::default());
        assert!(!d.allowed);
        assert_eq!(d.user_type, UserType::Unauthorized);
    }

    #[test]
    fn system_admins_only_manage_accounts() {
        let admins = SystemAdmins::from_csv(" Ops@School.example , ");
        assert_eq!(admins.len(), 1);
        let b = board(false, false);

        let d = decide(Some(&b), Action::Admin, Some("ops@school.example"), &admins);
        assert!(d.allowed);
        assert_eq!(d.user_type, UserType::Admin);

        let d = decide(Some(&b), Action::Edit, Some("ops@school.example"), &admins);
        assert!(!d.allowed);
    }
}
