//! Tiered cache for the answer board.
//!
//! Lookups go through three tiers, cheapest first:
//!
//! 1. a per-request memo ([`CacheScope`]), dropped when the request ends;
//! 2. a shared TTL store for the whole process ([`MemoryStore`]);
//! 3. an optional durable store (the `properties` table) for entries that
//!    must survive restarts and evictions.
//!
//! Writes that change user identity, spreadsheet binding or published config
//! must call [`CacheManager::invalidate_related`] so every derived key goes.

pub mod durable;
pub mod keys;
pub mod manager;
pub mod store;

pub use keys::RelatedKeys;
pub use manager::{CacheManager, CacheOptions, CacheScope};
pub use store::{KvStore, MemoryStore};
