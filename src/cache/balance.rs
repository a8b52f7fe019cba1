//! Balance Cache Manager
//!
//! Read-through cache of one account's balance with invalidate-on-write.
//!
//! - Hit: return the cached snapshot
//! - Miss: one ledger read per key (concurrent misses wait on a per-key gate),
//!   populate with TTL, return
//! - Cache backend down: read the ledger directly (fail-open on cache,
//!   fail-closed on ledger)
//!
//! Every invalidation bumps a per-key generation. A populate whose ledger
//! read started before the bump removes what it wrote, so a snapshot taken
//! mid-transaction never outlives the post-commit invalidation.

use dashmap::DashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use super::{CacheError, CacheStore, get_json, keys, set_json};
use crate::core_types::UserId;
use crate::error::WalletError;
use crate::ledger::LedgerStore;
use crate::models::Balance;

/// Default balance snapshot TTL
pub const BALANCE_TTL: Duration = Duration::from_secs(300);

#[derive(Clone)]
pub struct BalanceCache {
    ledger: Arc<dyn LedgerStore>,
    cache: Arc<dyn CacheStore>,
    ttl: Duration,
    inflight: Arc<DashMap<UserId, Arc<tokio::sync::Mutex<()>>>>,
    generations: Arc<DashMap<UserId, u64>>,
}

impl BalanceCache {
    pub fn new(ledger: Arc<dyn LedgerStore>, cache: Arc<dyn CacheStore>, ttl: Duration) -> Self {
        Self {
            ledger,
            cache,
            ttl,
            inflight: Arc::new(DashMap::new()),
            generations: Arc::new(DashMap::new()),
        }
    }

    /// Current balance of `user_id`.
    ///
    /// A never-provisioned account reads as zero and is not cached.
    pub async fn get_balance(&self, user_id: &str) -> Result<Balance, WalletError> {
        match self.read_cached(user_id).await {
            Ok(Some(balance)) => return Ok(balance),
            Ok(None) => {}
            Err(e) => {
                warn!(user_id = %user_id, error = %e, "Balance cache unavailable, reading ledger");
                return self.read_ledger(user_id).await;
            }
        }

        let gate = self
            .inflight
            .entry(user_id.to_string())
            .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
            .clone();
        let guard = gate.lock().await;

        // Another task may have populated while we waited
        let result = match self.read_cached(user_id).await {
            Ok(Some(balance)) => Ok(balance),
            _ => self.populate(user_id).await,
        };

        drop(guard);
        // Map entry + our clone: nobody else is waiting on this gate
        self.inflight
            .remove_if(user_id, |_, g| Arc::strong_count(g) <= 2);

        result
    }

    /// Drop the cached snapshot. Call only after the ledger commit.
    pub async fn invalidate_balance(&self, user_id: &str) {
        *self.generations.entry(user_id.to_string()).or_insert(0) += 1;

        let key = keys::balance(user_id);
        debug!(key = %key, "Invalidating balance");
        if let Err(e) = self.cache.delete(&key).await {
            warn!(user_id = %user_id, error = %e, "Failed to invalidate cached balance");
        }
    }

    /// Invalidate, then overwrite with a fresh ledger read
    pub async fn refresh_balance(&self, user_id: &str) -> Result<Balance, WalletError> {
        self.invalidate_balance(user_id).await;
        self.populate(user_id).await
    }

    /// Overwrite with a fresh ledger read in a background task, without
    /// consulting the cached value. Failures are logged only.
    pub fn spawn_refresh(&self, user_id: &str) {
        let this = self.clone();
        let user_id = user_id.to_string();
        tokio::spawn(async move {
            if let Err(e) = this.populate(&user_id).await {
                warn!(user_id = %user_id, error = %e, "Background balance refresh failed");
            }
        });
    }

    async fn read_cached(&self, user_id: &str) -> Result<Option<Balance>, CacheError> {
        let key = keys::balance(user_id);
        match get_json::<Balance>(self.cache.as_ref(), &key).await {
            Err(CacheError::Codec(e)) => {
                warn!(key = %key, error = %e, "Undecodable cached balance, treating as miss");
                Ok(None)
            }
            other => other,
        }
    }

    async fn read_ledger(&self, user_id: &str) -> Result<Balance, WalletError> {
        Ok(self.ledger.balance(user_id).await?.unwrap_or_default())
    }

    fn generation(&self, user_id: &str) -> u64 {
        self.generations.get(user_id).map_or(0, |g| *g)
    }

    /// Read the ledger and write the snapshot, unless an invalidation
    /// happened since the read started.
    async fn populate(&self, user_id: &str) -> Result<Balance, WalletError> {
        let started = self.generation(user_id);
        let Some(balance) = self.ledger.balance(user_id).await? else {
            return Ok(Balance::default());
        };

        let key = keys::balance(user_id);
        if self.generation(user_id) != started {
            debug!(key = %key, "Balance invalidated during ledger read, not caching");
            return Ok(balance);
        }
        if let Err(e) = set_json(self.cache.as_ref(), &key, &balance, Some(self.ttl)).await {
            warn!(key = %key, error = %e, "Failed to populate balance cache");
            return Ok(balance);
        }

        // Invalidated between the check and the write
        if self.generation(user_id) != started
            && let Err(e) = self.cache.delete(&key).await
        {
            warn!(key = %key, error = %e, "Failed to drop superseded balance snapshot");
        }
        Ok(balance)
    }
}
