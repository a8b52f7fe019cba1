//! Cache Layer
//!
//! Derived, non-authoritative views of the ledger: balances, bounded history
//! lists, contacts and profiles, stored in Redis ([`RedisCache`]) or in
//! process ([`MemoryCache`]). Everything here can be rebuilt from
//! [`crate::ledger::LedgerStore`], so every cache failure degrades to a ledger
//! read or a no-op and is never surfaced to end users.
//!
//! # Serialization contract
//!
//! Values are always JSON-encoded on write and JSON-decoded on read
//! ([`get_json`] / [`set_json`]). A value that fails to decode is treated as a
//! miss.
//!
//! # Key naming
//!
//! | Key | Value |
//! |-----|-------|
//! | `balance:{user}` | `Balance` |
//! | `onRampHistory:{user}` | list of `HistoryEntry`, newest first |
//! | `p2pHistory:{user}` | list of `HistoryEntry`, newest first |
//! | `contacts:{user}` | `Vec<Contact>` |
//! | `user:profile:{user}` | `UserProfile` |

pub mod balance;
pub mod contacts;
pub mod history;
pub mod memory;
pub mod profile;
pub mod redis_store;

pub use balance::BalanceCache;
pub use contacts::ContactsCache;
pub use history::{Direction, HistoryCache, HistoryEntry, HistoryKind};
pub use memory::MemoryCache;
pub use profile::ProfileCache;
pub use redis_store::RedisCache;

use async_trait::async_trait;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

use crate::config::{CacheBackend, CacheConfig};

/// Cache errors. Never crosses the engine boundary.
#[derive(Error, Debug)]
pub enum CacheError {
    #[error("Cache backend unavailable: {0}")]
    Unavailable(String),

    #[error("Wrong value type at key {0}")]
    WrongType(String),

    #[error("Cache codec error: {0}")]
    Codec(#[from] serde_json::Error),
}

/// Key-value store with bounded lists and per-key TTL
///
/// List semantics follow LPUSH/LRANGE/LTRIM: index 0 is the front (newest).
#[async_trait]
pub trait CacheStore: Send + Sync {
    /// Backend name for logging
    fn name(&self) -> &'static str;

    async fn get(&self, key: &str) -> Result<Option<String>, CacheError>;

    async fn set(&self, key: &str, value: String, ttl: Option<Duration>) -> Result<(), CacheError>;

    /// Returns whether the key existed
    async fn delete(&self, key: &str) -> Result<bool, CacheError>;

    /// Up to `count` list items starting at `start`. Missing key reads as empty.
    async fn list_range(
        &self,
        key: &str,
        start: usize,
        count: usize,
    ) -> Result<Vec<String>, CacheError>;

    /// Push one item to the front and trim to `max_len`.
    ///
    /// Creates the list if absent. The key's TTL is left untouched.
    async fn list_push_front(
        &self,
        key: &str,
        value: String,
        max_len: usize,
    ) -> Result<(), CacheError>;

    /// Atomically replace the list with `items` (already newest first),
    /// trimmed to `max_len`, with a fresh TTL.
    async fn list_replace(
        &self,
        key: &str,
        items: Vec<String>,
        max_len: usize,
        ttl: Option<Duration>,
    ) -> Result<(), CacheError>;

    /// Delete every key starting with `prefix`, returns the number removed
    async fn delete_prefix(&self, prefix: &str) -> Result<usize, CacheError>;
}

/// Open the configured backend
pub async fn open(config: &CacheConfig) -> Result<Arc<dyn CacheStore>, CacheError> {
    match config.backend {
        CacheBackend::Redis => {
            let url = config.redis_url.as_deref().ok_or_else(|| {
                CacheError::Unavailable("redis_url is not configured and REDIS_URL is not set".into())
            })?;
            Ok(Arc::new(RedisCache::connect(url).await?))
        }
        CacheBackend::Memory => Ok(Arc::new(MemoryCache::with_capacity(config.memory_capacity))),
    }
}

/// Read and decode a JSON value
pub async fn get_json<T: DeserializeOwned>(
    cache: &dyn CacheStore,
    key: &str,
) -> Result<Option<T>, CacheError> {
    match cache.get(key).await? {
        Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
        None => Ok(None),
    }
}

/// Encode and write a JSON value
pub async fn set_json<T: Serialize + Sync>(
    cache: &dyn CacheStore,
    key: &str,
    value: &T,
    ttl: Option<Duration>,
) -> Result<(), CacheError> {
    let raw = serde_json::to_string(value)?;
    cache.set(key, raw, ttl).await
}

/// Cache key builders
pub mod keys {
    pub const BALANCE_PREFIX: &str = "balance:";
    pub const ON_RAMP_HISTORY_PREFIX: &str = "onRampHistory:";
    pub const P2P_HISTORY_PREFIX: &str = "p2pHistory:";
    pub const CONTACTS_PREFIX: &str = "contacts:";
    pub const PROFILE_PREFIX: &str = "user:profile:";

    /// Every prefix owned by this crate
    pub const ALL_PREFIXES: [&str; 5] = [
        ON_RAMP_HISTORY_PREFIX,
        P2P_HISTORY_PREFIX,
        BALANCE_PREFIX,
        PROFILE_PREFIX,
        CONTACTS_PREFIX,
    ];

    pub fn balance(user_id: &str) -> String {
        format!("{BALANCE_PREFIX}{user_id}")
    }

    pub fn on_ramp_history(user_id: &str) -> String {
        format!("{ON_RAMP_HISTORY_PREFIX}{user_id}")
    }

    pub fn p2p_history(user_id: &str) -> String {
        format!("{P2P_HISTORY_PREFIX}{user_id}")
    }

    pub fn contacts(user_id: &str) -> String {
        format!("{CONTACTS_PREFIX}{user_id}")
    }

    pub fn profile(user_id: &str) -> String {
        format!("{PROFILE_PREFIX}{user_id}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Balance;

    #[test]
    fn test_key_naming() {
        assert_eq!(keys::balance("u1"), "balance:u1");
        assert_eq!(keys::on_ramp_history("u1"), "onRampHistory:u1");
        assert_eq!(keys::p2p_history("u1"), "p2pHistory:u1");
        assert_eq!(keys::contacts("u1"), "contacts:u1");
        assert_eq!(keys::profile("u1"), "user:profile:u1");
    }

    #[tokio::test]
    async fn test_json_contract() {
        let cache = MemoryCache::new();
        let balance = Balance::new(1_500, 20);

        set_json(&cache, "balance:u1", &balance, None).await.unwrap();
        let raw = cache.get("balance:u1").await.unwrap().unwrap();
        assert_eq!(raw, r#"{"amount":1500,"locked":20}"#);

        let decoded: Option<Balance> = get_json(&cache, "balance:u1").await.unwrap();
        assert_eq!(decoded, Some(balance));
    }

    #[tokio::test]
    async fn test_open_selects_backend() {
        let memory = open(&CacheConfig::default()).await.unwrap();
        assert_eq!(memory.name(), "memory");

        let config = CacheConfig {
            backend: CacheBackend::Redis,
            redis_url: None,
            ..Default::default()
        };
        assert!(matches!(
            open(&config).await,
            Err(CacheError::Unavailable(_))
        ));
    }

    #[tokio::test]
    async fn test_undecodable_value_is_codec_error() {
        let cache = MemoryCache::new();
        cache
            .set("balance:u1", "not json".to_string(), None)
            .await
            .unwrap();

        let decoded: Result<Option<Balance>, _> = get_json(&cache, "balance:u1").await;
        assert!(matches!(decoded, Err(CacheError::Codec(_))));
    }
}
