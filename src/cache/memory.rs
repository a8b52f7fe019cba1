//! In-process cache backend.
//!
//! Stores string values and bounded lists in a size-bounded
//! `cached::stores::ExpiringValueCache`; each entry carries its own deadline
//! and expired entries read as absent. Can be switched offline to exercise
//! the fail-open paths.

use async_trait::async_trait;
use cached::Cached;
use cached::stores::{CanExpire, ExpiringValueCache};
use std::collections::{BTreeSet, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};

use super::{CacheError, CacheStore};

/// Default upper bound on live keys; least recently used keys go first
pub const DEFAULT_CAPACITY: usize = 100_000;

#[derive(Debug, Clone)]
enum CacheValue {
    Str(String),
    List(VecDeque<String>),
}

#[derive(Debug, Clone)]
struct CacheEntry {
    value: CacheValue,
    expires_at: Option<Instant>,
}

impl CacheEntry {
    fn new(value: CacheValue, ttl: Option<Duration>) -> Self {
        Self {
            value,
            expires_at: ttl.map(|t| Instant::now() + t),
        }
    }
}

impl CanExpire for CacheEntry {
    fn is_expired(&self) -> bool {
        self.expires_at.is_some_and(|at| Instant::now() >= at)
    }
}

struct Store {
    entries: ExpiringValueCache<String, CacheEntry>,
    /// Keys ever written and not yet removed, for prefix deletes
    keys: BTreeSet<String>,
}

impl Store {
    fn live(&mut self, key: &str) -> Option<CacheEntry> {
        let key = key.to_string();
        match self.entries.cache_get(&key) {
            Some(entry) => Some(entry.clone()),
            None => {
                self.keys.remove(&key);
                None
            }
        }
    }

    fn insert(&mut self, key: &str, entry: CacheEntry) {
        self.keys.insert(key.to_string());
        self.entries.cache_set(key.to_string(), entry);
    }

    /// Returns whether a live entry was removed
    fn remove(&mut self, key: &str) -> bool {
        let key = key.to_string();
        self.keys.remove(&key);
        self.entries
            .cache_remove(&key)
            .is_some_and(|e| !e.is_expired())
    }
}

/// Thread-safe TTL cache.
pub struct MemoryCache {
    store: Mutex<Store>,
    offline: AtomicBool,
}

impl MemoryCache {
    /// Create a new empty cache.
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            store: Mutex::new(Store {
                entries: ExpiringValueCache::with_size(capacity.max(1)),
                keys: BTreeSet::new(),
            }),
            offline: AtomicBool::new(false),
        }
    }

    /// Simulate an unreachable backend: every call fails with `Unavailable`.
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    /// Get the number of live keys.
    pub fn len(&self) -> usize {
        let mut store = self.lock();
        let keys: Vec<String> = store.keys.iter().cloned().collect();
        keys.iter().filter(|k| store.live(k).is_some()).count()
    }

    /// Check if the cache holds no live keys.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether a live key exists
    pub fn contains(&self, key: &str) -> bool {
        self.lock().live(key).is_some()
    }

    fn lock(&self) -> MutexGuard<'_, Store> {
        // Every operation leaves the store consistent before it can panic
        self.store.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn check_online(&self) -> Result<(), CacheError> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(CacheError::Unavailable("memory cache offline".into()));
        }
        Ok(())
    }
}

impl Default for MemoryCache {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CacheStore for MemoryCache {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        self.check_online()?;
        match self.lock().live(key) {
            None => Ok(None),
            Some(CacheEntry {
                value: CacheValue::Str(s),
                ..
            }) => Ok(Some(s)),
            Some(_) => Err(CacheError::WrongType(key.to_string())),
        }
    }

    async fn set(&self, key: &str, value: String, ttl: Option<Duration>) -> Result<(), CacheError> {
        self.check_online()?;
        self.lock()
            .insert(key, CacheEntry::new(CacheValue::Str(value), ttl));
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<bool, CacheError> {
        self.check_online()?;
        Ok(self.lock().remove(key))
    }

    async fn list_range(
        &self,
        key: &str,
        start: usize,
        count: usize,
    ) -> Result<Vec<String>, CacheError> {
        self.check_online()?;
        match self.lock().live(key) {
            None => Ok(Vec::new()),
            Some(CacheEntry {
                value: CacheValue::List(items),
                ..
            }) => Ok(items.into_iter().skip(start).take(count).collect()),
            Some(_) => Err(CacheError::WrongType(key.to_string())),
        }
    }

    async fn list_push_front(
        &self,
        key: &str,
        value: String,
        max_len: usize,
    ) -> Result<(), CacheError> {
        self.check_online()?;
        let mut store = self.lock();
        let mut entry = store
            .live(key)
            .unwrap_or_else(|| CacheEntry::new(CacheValue::List(VecDeque::new()), None));

        match &mut entry.value {
            CacheValue::List(items) => {
                items.push_front(value);
                items.truncate(max_len);
            }
            CacheValue::Str(_) => return Err(CacheError::WrongType(key.to_string())),
        }
        // Deadline travels with the entry, so the TTL is kept
        store.insert(key, entry);
        Ok(())
    }

    async fn list_replace(
        &self,
        key: &str,
        items: Vec<String>,
        max_len: usize,
        ttl: Option<Duration>,
    ) -> Result<(), CacheError> {
        self.check_online()?;
        let list: VecDeque<String> = items.into_iter().take(max_len).collect();
        self.lock()
            .insert(key, CacheEntry::new(CacheValue::List(list), ttl));
        Ok(())
    }

    async fn delete_prefix(&self, prefix: &str) -> Result<usize, CacheError> {
        self.check_online()?;
        let mut store = self.lock();
        let keys: Vec<String> = store
            .keys
            .range(prefix.to_string()..)
            .take_while(|k| k.starts_with(prefix))
            .cloned()
            .collect();

        Ok(keys.iter().filter(|k| store.remove(k)).count())
    }
}
