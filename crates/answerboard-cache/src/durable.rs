use std::time::Duration;

use anyhow::Result;
use answerboard_db::Database;

use crate::store::KvStore;

/// The `properties` table doubles as the durable cache tier.
impl KvStore for Database {
    fn get(&self, key: &str) -> Result<Option<String>> {
        self.get_property(key, chrono::Utc::now().timestamp())
    }

    fn put(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<()> {
        let expires_at = ttl.map(|ttl| chrono::Utc::now().timestamp() + ttl.as_secs() as i64);
        self.set_property(key, value, expires_at)
    }

    fn remove(&self, key: &str) -> Result<()> {
        self.delete_property(key)?;
        Ok(())
    }

    fn keys_with_prefix(&self, prefix: &str, limit: usize) -> Result<Vec<String>> {
        self.property_keys(prefix, limit)
    }
}
