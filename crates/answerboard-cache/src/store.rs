use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use anyhow::Result;

/// String key-value store with optional per-entry expiry.
pub trait KvStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>>;

    /// `ttl = None` keeps the entry until it is removed.
    fn put(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<()>;

    fn remove(&self, key: &str) -> Result<()>;

    /// Live keys starting with `prefix`, at most `limit` of them.
    fn keys_with_prefix(&self, prefix: &str, limit: usize) -> Result<Vec<String>>;
}

struct Entry {
    value: String,
    expires_at: Option<Instant>,
}

impl Entry {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at.is_none_or(|at| at > now)
    }
}

/// Process-wide TTL store shared by every request.
#[derive(Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, Entry>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drops expired entries. Returns how many were removed.
    pub fn purge_expired(&self) -> Result<usize> {
        let mut entries = self.lock()?;
        let now = Instant::now();
        let before = entries.len();
        entries.retain(|_, entry| entry.is_live(now));
        Ok(before - entries.len())
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, HashMap<String, Entry>>> {
        self.entries
            .lock()
            .map_err(|e| anyhow::anyhow!("Cache lock poisoned: {}", e))
    }
}

impl KvStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        let mut entries = self.lock()?;
        let now = Instant::now();
        match entries.get(key) {
            Some(entry) if entry.is_live(now) => Ok(Some(entry.value.clone())),
            Some(_) => {
                entries.remove(key);
                Ok(None)
            }
            None => Ok(None),
        }
    }

    fn put(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<()> {
        let expires_at = ttl.map(|ttl| Instant::now() + ttl);
        self.lock()?.insert(
            key.to_string(),
            Entry {
                value: value.to_string(),
                expires_at,
            },
        );
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        self.lock()?.remove(key);
        Ok(())
    }

    fn keys_with_prefix(&self, prefix: &str, limit: usize) -> Result<Vec<String>> {
        let entries = self.lock()?;
        let now = Instant::now();
        let mut keys: Vec<String> = entries
            .iter()
            .filter(|(key, entry)| key.starts_with(prefix) && entry.is_live(now))
            .map(|(key, _)| key.clone())
            .collect();
        keys.sort();
        keys.truncate(limit);
        Ok(keys)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn expired_entries_are_invisible() {
        let store = MemoryStore::new();
        store.put("short", "1", Some(Duration::ZERO)).unwrap();
        store.put("long", "2", Some(Duration::from_secs(60))).unwrap();
        store.put("forever", "3", None).unwrap();

        assert_eq!(store.get("short").unwrap(), None);
        assert_eq!(store.get("long").unwrap().as_deref(), Some("2"));
        assert_eq!(store.get("forever").unwrap().as_deref(), Some("3"));
    }

    #[test]
    fn prefix_listing_is_sorted_and_bounded() {
        let store = MemoryStore::new();
        for key in ["hdr_b", "hdr_a", "hdr_c", "user_1"] {
            store.put(key, "x", None).unwrap();
        }

        assert_eq!(
            store.keys_with_prefix("hdr_", 2).unwrap(),
            vec!["hdr_a".to_string(), "hdr_b".to_string()]
        );
    }

    #[test]
    fn purge_counts_removed_entries() {
        let store = MemoryStore::new();
        store.put("a", "1", Some(Duration::ZERO)).unwrap();
        store.put("b", "1", None).unwrap();
        assert_eq!(store.purge_expired().unwrap(), 1);
    }
}
