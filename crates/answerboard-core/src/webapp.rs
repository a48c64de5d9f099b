use std::future::Future;

use tracing::info;

use answerboard_cache::{CacheOptions, CacheScope, keys};

use crate::error::BoardResult;

fn options() -> CacheOptions {
    CacheOptions::forever().durable()
}

/// The public URL of the deployment. Kept in the durable tier until
/// [`invalidate_web_app_url`] is called, even if `resolve` would now return
/// something else.
pub async fn web_app_url_cached<F, Fut>(scope: &CacheScope, resolve: F) -> BoardResult<String>
where
    F: FnOnce() -> Fut,
    Fut: Future<Output = BoardResult<String>>,
{
    scope.get_or_compute(keys::WEB_APP_URL, options(), resolve).await
}

pub fn invalidate_web_app_url(scope: &CacheScope) {
    scope.remove(keys::WEB_APP_URL);
    info!("web app URL cache cleared");
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use answerboard_cache::{CacheManager, KvStore, MemoryStore};
    use answerboard_db::Database;

    fn manager() -> Arc<CacheManager> {
        let durable: Arc<dyn KvStore> = Arc::new(Database::open_in_memory().unwrap());
        Arc::new(CacheManager::new(Arc::new(MemoryStore::new()), Some(durable)))
    }

    #[tokio::test]
    async fn url_stays_stale_until_invalidated() {
        let cache = manager();

        let first = web_app_url_cached(&cache.scope(), || async { Ok("https://old.example".to_string()) })
            .await
            .unwrap();
        assert_eq!(first, "https://old.example");

        let stale = web_app_url_cached(&cache.scope(), || async { Ok("https://new.example".to_string()) })
            .await
            .unwrap();
        assert_eq!(stale, "https://old.example");

        let scope = cache.scope();
        invalidate_web_app_url(&scope);
        let fresh = web_app_url_cached(&scope, || async { Ok("https://new.example".to_string()) })
            .await
            .unwrap();
        assert_eq!(fresh, "https://new.example");
    }

    #[tokio::test]
    async fn durable_copy_survives_shared_eviction() {
        let durable: Arc<dyn KvStore> = Arc::new(Database::open_in_memory().unwrap());
        let first = Arc::new(CacheManager::new(Arc::new(MemoryStore::new()), Some(durable.clone())));
        web_app_url_cached(&first.scope(), || async { Ok("https://old.example".to_string()) })
            .await
            .unwrap();

        // A new shared tier, as after a restart, still sees the durable copy.
        let restarted = Arc::new(CacheManager::new(Arc::new(MemoryStore::new()), Some(durable)));
        let url = web_app_url_cached(&restarted.scope(), || async { Ok("https://new.example".to_string()) })
            .await
            .unwrap();
        assert_eq!(url, "https://old.example");
    }
}
