use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};

use answerboard_cache::MemoryStore;
use answerboard_db::Database;

/// Background task that drops expired cache entries from both tiers.
pub async fn run_cleanup_loop(db: Arc<Database>, shared: Arc<MemoryStore>, interval_secs: u64) {
    let mut interval = tokio::time::interval(Duration::from_secs(interval_secs));

    loop {
        interval.tick().await;

        match shared.purge_expired() {
            Ok(count) if count > 0 => info!(category = "cache", "Cleanup: dropped {} expired shared entries", count),
            Ok(_) => {}
            Err(e) => warn!(category = "cache", "Cleanup error (shared tier): {}", e),
        }

        let db = db.clone();
        let now = chrono::Utc::now().timestamp();
        match tokio::task::spawn_blocking(move || db.purge_expired_properties(now)).await {
            Ok(Ok(count)) if count > 0 => info!(category = "cache", "Cleanup: dropped {} expired durable entries", count),
            Ok(Ok(_)) => {}
            Ok(Err(e)) => warn!(category = "cache", "Cleanup error (durable tier): {}", e),
            Err(e) => warn!("spawn_blocking join error: {}", e),
        }
    }
}
