use tracing::debug;
use uuid::Uuid;

use answerboard_cache::CacheScope;
use answerboard_types::api::{Page, PageQuery};
use answerboard_types::models::{Action, UserType};

use crate::board::BoardService;
use crate::error::BoardResult;

/// What a `GET /` asks for, before any lookups.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PageRequest {
    /// Admin panel, optionally for another user's board.
    Admin { user_id: Option<String> },
    /// A board, optionally grouped by class.
    Board { user_id: String, group_view: bool },
    /// No parameters: admin panel or registration.
    Landing,
}

impl PageRequest {
    pub fn from_query(query: &PageQuery) -> Self {
        let user_id = query
            .user_id
            .as_deref()
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .map(str::to_string);
        let wants_admin =
            query.mode.as_deref() == Some("admin") || query.page.as_deref() == Some("admin");

        if wants_admin {
            return Self::Admin { user_id };
        }
        match user_id {
            Some(user_id) => Self::Board {
                user_id,
                group_view: query.view.as_deref() == Some("groups"),
            },
            None => Self::Landing,
        }
    }
}

impl BoardService {
    /// Chooses the screen for a page load.
    pub async fn select_page(
        &self,
        scope: &CacheScope,
        query: &PageQuery,
        viewer: Option<&str>,
    ) -> BoardResult<Page> {
        let request = PageRequest::from_query(query);
        debug!(?request, signed_in = viewer.is_some(), "selecting page");

        match request {
            PageRequest::Landing => self.own_admin_page(scope, viewer).await,
            PageRequest::Admin { user_id: None } => self.own_admin_page(scope, viewer).await,
            PageRequest::Admin {
                user_id: Some(raw),
            } => {
                let Ok(user_id) = Uuid::parse_str(&raw) else {
                    return Ok(Page::Denied {
                        user_type: UserType::NotFound,
                    });
                };
                let decision = self
                    .access()
                    .verify_access(scope, user_id, Action::Admin, viewer)
                    .await?;
                Ok(if decision.allowed {
                    Page::Admin { user_id }
                } else {
                    Page::Denied {
                        user_type: decision.user_type,
                    }
                })
            }
            PageRequest::Board {
                user_id: raw,
                group_view,
            } => {
                let Ok(user_id) = Uuid::parse_str(&raw) else {
                    return Ok(Page::Denied {
                        user_type: UserType::NotFound,
                    });
                };
                let decision = self
                    .access()
                    .verify_access(scope, user_id, Action::View, viewer)
                    .await?;
                Ok(match (decision.allowed, decision.config) {
                    (true, Some(config)) => Page::Board {
                        user_id,
                        user_type: decision.user_type,
                        group_view,
                        config,
                    },
                    _ if decision.user_type == UserType::Private => Page::Unpublished { user_id },
                    _ => Page::Denied {
                        user_type: decision.user_type,
                    },
                })
            }
        }
    }

    async fn own_admin_page(&self, scope: &CacheScope, viewer: Option<&str>) -> BoardResult<Page> {
        let Some(email) = viewer else {
            return Ok(Page::Register { email: None });
        };
        match self.accounts().find_by_email(scope, email).await? {
            Some(user) if user.is_active => Ok(Page::Admin {
                user_id: user.user_id,
            }),
            _ => Ok(Page::Register {
                email: Some(email.trim().to_lowercase()),
            }),
        }
    }
}
