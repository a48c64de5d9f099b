use std::collections::{BTreeSet, HashMap};
use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use crate::keys::RelatedKeys;
use crate::store::{KvStore, MemoryStore};

/// Upper bound on keys removed per prefix during related-key invalidation.
const INVALIDATION_MAX_KEYS: usize = 500;

const DEFAULT_TTL: Duration = Duration::from_secs(300);

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CacheOptions {
    /// `None` keeps the entry until it is removed explicitly.
    pub ttl: Option<Duration>,
    /// Also write to (and read from) the durable tier.
    pub durable: bool,
    /// Use the per-request memo.
    pub memo: bool,
}

impl Default for CacheOptions {
    fn default() -> Self {
        Self {
            ttl: Some(DEFAULT_TTL),
            durable: false,
            memo: true,
        }
    }
}

impl CacheOptions {
    pub fn ttl(ttl: Duration) -> Self {
        Self {
            ttl: Some(ttl),
            ..Self::default()
        }
    }

    pub fn forever() -> Self {
        Self {
            ttl: None,
            ..Self::default()
        }
    }

    pub fn durable(mut self) -> Self {
        self.durable = true;
        self
    }

    pub fn without_memo(mut self) -> Self {
        self.memo = false;
        self
    }
}

/// Shared and durable tiers. One per process.
pub struct CacheManager {
    shared: Arc<dyn KvStore>,
    durable: Option<Arc<dyn KvStore>>,
}

impl CacheManager {
    pub fn new(shared: Arc<dyn KvStore>, durable: Option<Arc<dyn KvStore>>) -> Self {
        Self { shared, durable }
    }

    /// Shared tier only, no durable fallback.
    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryStore::new()), None)
    }

    /// Starts a per-request scope with its own memo.
    pub fn scope(self: &Arc<Self>) -> CacheScope {
        CacheScope {
            manager: Arc::clone(self),
            memo: Mutex::new(HashMap::new()),
        }
    }

    pub fn lookup<T: DeserializeOwned>(&self, key: &str, options: CacheOptions) -> Option<T> {
        if let Some(raw) = read_tier(self.shared.as_ref(), key) {
            debug!(key, tier = "shared", "cache hit");
            return self.decode(key, &raw);
        }

        if !options.durable {
            return None;
        }
        let durable = self.durable.as_ref()?;
        let raw = read_tier(durable.as_ref(), key)?;
        debug!(key, tier = "durable", "cache hit");

        if let Err(e) = self.shared.put(key, &raw, options.ttl) {
            warn!(category = "cache", key, "Shared cache back-fill failed: {}", e);
        }
        self.decode(key, &raw)
    }

    pub fn store<T: Serialize>(&self, key: &str, value: &T, options: CacheOptions) {
        let raw = match serde_json::to_string(value) {
            Ok(raw) => raw,
            Err(e) => {
                warn!(category = "cache", key, "Cache value not serializable: {}", e);
                return;
            }
        };

        if let Err(e) = self.shared.put(key, &raw, options.ttl) {
            warn!(category = "cache", key, "Shared cache write failed: {}", e);
        }
        if options.durable {
            if let Some(durable) = &self.durable {
                if let Err(e) = durable.put(key, &raw, options.ttl) {
                    warn!(category = "cache", key, "Durable cache write failed: {}", e);
                }
            }
        }
    }

    /// Read-through lookup without a request memo.
    pub async fn get_or_compute<T, E, F, Fut>(
        &self,
        key: &str,
        options: CacheOptions,
        compute: F,
    ) -> Result<T, E>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        if let Some(value) = self.lookup(key, options) {
            return Ok(value);
        }
        let value = compute().await?;
        self.store(key, &value, options);
        Ok(value)
    }

    pub fn remove(&self, key: &str) {
        for tier in self.tiers() {
            if let Err(e) = tier.remove(key) {
                warn!(category = "cache", key, "Cache remove failed: {}", e);
            }
        }
    }

    /// Removes up to `max_keys` keys starting with `prefix` from every tier.
    /// Returns the number of distinct keys removed.
    pub fn clear_by_pattern(&self, prefix: &str, max_keys: usize) -> usize {
        let mut removed = BTreeSet::new();
        for tier in self.tiers() {
            let keys = match tier.keys_with_prefix(prefix, max_keys) {
                Ok(keys) => keys,
                Err(e) => {
                    warn!(category = "cache", prefix, "Cache key listing failed: {}", e);
                    continue;
                }
            };
            for key in keys {
                match tier.remove(&key) {
                    Ok(()) => {
                        removed.insert(key);
                    }
                    Err(e) => warn!(category = "cache", key, "Cache remove failed: {}", e),
                }
            }
        }
        debug!(prefix, removed = removed.len(), "cleared cache keys by prefix");
        removed.len()
    }

    /// Drops every key derived from the given identities, in every tier.
    /// Returns the number of keys touched.
    pub fn invalidate_related(&self, related: &RelatedKeys) -> usize {
        let exact = related.exact_keys();
        for key in &exact {
            self.remove(key);
        }

        let mut touched = exact.len();
        for prefix in related.prefixes() {
            touched += self.clear_by_pattern(&prefix, INVALIDATION_MAX_KEYS);
        }

        debug!(
            user_id = ?related.user_id,
            spreadsheets = ?related.spreadsheet_ids,
            touched,
            "invalidated related cache keys"
        );
        touched
    }

    fn tiers(&self) -> impl Iterator<Item = &Arc<dyn KvStore>> {
        std::iter::once(&self.shared).chain(self.durable.iter())
    }

    fn decode<T: DeserializeOwned>(&self, key: &str, raw: &str) -> Option<T> {
        match serde_json::from_str(raw) {
            Ok(value) => Some(value),
            Err(e) => {
                warn!(category = "cache", key, "Dropping undecodable cache entry: {}", e);
                self.remove(key);
                None
            }
        }
    }
}

fn read_tier(tier: &dyn KvStore, key: &str) -> Option<String> {
    match tier.get(key) {
        Ok(value) => value,
        Err(e) => {
            warn!(category = "cache", key, "Cache read failed: {}", e);
            None
        }
    }
}

/// Per-request view of the cache. The memo lives exactly as long as the scope.
pub struct CacheScope {
    manager: Arc<CacheManager>,
    memo: Mutex<HashMap<String, serde_json::Value>>,
}

impl CacheScope {
    pub fn manager(&self) -> &Arc<CacheManager> {
        &self.manager
    }

    pub async fn get_or_compute<T, E, F, Fut>(
        &self,
        key: &str,
        options: CacheOptions,
        compute: F,
    ) -> Result<T, E>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        if options.memo {
            if let Some(value) = self.memo_get(key) {
                return Ok(value);
            }
        }

        let value = self.manager.get_or_compute(key, options, compute).await?;
        if options.memo {
            self.memo_put(key, &value);
        }
        Ok(value)
    }

    pub fn store<T: Serialize>(&self, key: &str, value: &T, options: CacheOptions) {
        self.manager.store(key, value, options);
        if options.memo {
            self.memo_put(key, value);
        }
    }

    pub fn lookup<T: DeserializeOwned + Serialize>(
        &self,
        key: &str,
        options: CacheOptions,
    ) -> Option<T> {
        if options.memo {
            if let Some(value) = self.memo_get(key) {
                return Some(value);
            }
        }
        let value: T = self.manager.lookup(key, options)?;
        if options.memo {
            self.memo_put(key, &value);
        }
        Some(value)
    }

    pub fn remove(&self, key: &str) {
        self.with_memo(|memo| {
            memo.remove(key);
        });
        self.manager.remove(key);
    }

    pub fn clear_by_pattern(&self, prefix: &str, max_keys: usize) -> usize {
        self.with_memo(|memo| memo.retain(|key, _| !key.starts_with(prefix)));
        self.manager.clear_by_pattern(prefix, max_keys)
    }

    pub fn invalidate_related(&self, related: &RelatedKeys) -> usize {
        let exact = related.exact_keys();
        let prefixes = related.prefixes();
        self.with_memo(|memo| {
            memo.retain(|key, _| {
                !exact.contains(key) && !prefixes.iter().any(|prefix| key.starts_with(prefix))
            })
        });
        self.manager.invalidate_related(related)
    }

    fn memo_get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let value = self
            .memo
            .lock()
            .ok()
            .and_then(|memo| memo.get(key).cloned())?;
        serde_json::from_value(value).ok()
    }

    fn memo_put<T: Serialize>(&self, key: &str, value: &T) {
        if let Ok(value) = serde_json::to_value(value) {
            self.with_memo(|memo| {
                memo.insert(key.to_string(), value);
            });
        }
    }

    fn with_memo(&self, f: impl FnOnce(&mut HashMap<String, serde_json::Value>)) {
        match self.memo.lock() {
            Ok(mut memo) => f(&mut memo),
            Err(e) => warn!(category = "cache", "Request memo poisoned: {}", e),
        }
    }
}
