//! Response cache.
//!
//! Generated insights are memoized under a deterministic fingerprint of the
//! request. Entries carry their own expiry and are only served while live.

pub mod memory;
pub mod postgres;

pub use memory::MemoryCacheStore;
pub use postgres::PgCacheStore;

use async_trait::async_trait;
use sha2::{Digest, Sha256};
use std::time::Duration;

use crate::models::ModelPreference;
use crate::{Error, Result};

/// Lifetime of a cached response unless configured otherwise.
pub const DEFAULT_TTL: Duration = Duration::from_secs(24 * 60 * 60);

const KEY_PREFIX: &str = "insights_";

/// Key/value store with per-entry expiry.
#[async_trait]
pub trait CacheStore: Send + Sync {
    /// Returns `Ok(None)` for missing and expired entries alike.
    async fn get(&self, key: &str) -> Result<Option<String>>;

    /// Insert or replace `key`, live for `ttl` from now.
    async fn put(&self, key: &str, value: &str, ttl: Duration) -> Result<()>;

    /// Remove every entry, returning how many were removed.
    async fn clear_all(&self) -> Result<u64>;

    /// Remove only expired entries, returning how many were removed.
    async fn purge_expired(&self) -> Result<u64>;
}

/// Cache key for a query.
///
/// Every component is length-prefixed before hashing so that moving bytes
/// between fields can never produce the same digest.
/// Absolute expiry for an entry written now.
pub(crate) fn expiry_after(ttl: Duration) -> Result<chrono::DateTime<chrono::Utc>> {
    let now = chrono::Utc::now();
    chrono::Duration::from_std(ttl)
        .ok()
        .and_then(|ttl| now.checked_add_signed(ttl))
        .ok_or_else(|| Error::CacheUnavailable(format!("ttl out of range: {:?}", ttl)))
}

pub fn fingerprint(query: &str, start_date: &str, end_date: &str, model: ModelPreference) -> String {
    let mut hasher = Sha256::new();
    for part in [query, start_date, end_date, model.as_str()] {
        hasher.update((part.len() as u64).to_be_bytes());
        hasher.update(part.as_bytes());
    }
    format!("{}{}", KEY_PREFIX, hex::encode(hasher.finalize()))
}
