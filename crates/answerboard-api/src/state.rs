use std::sync::Arc;

use answerboard_cache::CacheManager;
use answerboard_core::Services;

pub type AppState = Arc<AppStateInner>;

pub struct AppStateInner {
    pub services: Services,
    pub cache: Arc<CacheManager>,
    pub session_secret: String,
    /// Externally reachable URL of this deployment, if configured.
    pub public_url: Option<String>,
    /// Enables `/auth/dev-login`.
    pub dev_login: bool,
}
