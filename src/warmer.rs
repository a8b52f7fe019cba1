//! Cache Warmer
//!
//! Batch job that populates every cached view for every account. Safe to run
//! at any time, including alongside live traffic: each step is a full
//! rebuild from the ledger, so re-running converges to the same state.

use futures::StreamExt;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info};

use crate::cache::{BalanceCache, CacheStore, ContactsCache, HistoryCache, HistoryKind, ProfileCache};
use crate::error::WalletError;
use crate::ledger::LedgerStore;

/// Configuration for the cache warmer
#[derive(Debug, Clone)]
pub struct WarmerConfig {
    /// Pause between scheduled runs
    pub interval: Duration,
    /// Accounts warmed in parallel
    pub concurrency: usize,
}

impl Default for WarmerConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(900),
            concurrency: 8,
        }
    }
}

/// Outcome of one [`CacheWarmer::warm_all`] pass
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WarmReport {
    pub accounts: usize,
    pub failed: usize,
}

pub struct CacheWarmer {
    ledger: Arc<dyn LedgerStore>,
    cache: Arc<dyn CacheStore>,
    balances: BalanceCache,
    history: HistoryCache,
    contacts: ContactsCache,
    profiles: ProfileCache,
    config: WarmerConfig,
}

impl CacheWarmer {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        ledger: Arc<dyn LedgerStore>,
        cache: Arc<dyn CacheStore>,
        balances: BalanceCache,
        history: HistoryCache,
        contacts: ContactsCache,
        profiles: ProfileCache,
        config: WarmerConfig,
    ) -> Self {
        Self {
            ledger,
            cache,
            balances,
            history,
            contacts,
            profiles,
            config,
        }
    }

    /// Run the warmer loop. Never returns.
    ///
    /// Sleeps first: a startup warm, if wanted, is a separate `warm_all` call.
    pub async fn run(&self) {
        info!(
            interval_secs = self.config.interval.as_secs(),
            concurrency = self.config.concurrency,
            "Starting cache warmer"
        );

        loop {
            tokio::time::sleep(self.config.interval).await;

            if let Err(e) = self.warm_all().await {
                error!(error = %e, "Scheduled cache warm failed");
            }
        }
    }

    /// Warm every account once. Per-account failures are logged and counted.
    pub async fn warm_all(&self) -> Result<WarmReport, WalletError> {
        let started = Instant::now();
        let user_ids = self.ledger.user_ids().await?;
        info!(
            accounts = user_ids.len(),
            backend = self.cache.name(),
            "Warming cache"
        );

        let mut report = WarmReport::default();
        let mut results = futures::stream::iter(user_ids)
            .map(|user_id| async move {
                let result = self.warm_account(&user_id).await;
                (user_id, result)
            })
            .buffer_unordered(self.config.concurrency.max(1));

        while let Some((user_id, result)) = results.next().await {
            report.accounts += 1;
            if let Err(e) = result {
                report.failed += 1;
                error!(user_id = %user_id, error = %e, "Failed to warm account");
            }
        }

        info!(
            accounts = report.accounts,
            failed = report.failed,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Cache warm complete"
        );
        Ok(report)
    }

    /// Populate balance, both histories, contacts and profile for one account
    pub async fn warm_account(&self, user_id: &str) -> Result<(), WalletError> {
        let (balance, on_ramp, p2p, contacts, profile) = tokio::join!(
            self.balances.refresh_balance(user_id),
            self.history.warm_history(user_id, HistoryKind::OnRamp),
            self.history.warm_history(user_id, HistoryKind::P2p),
            self.contacts.warm_contacts(user_id),
            self.profiles.warm_profile(user_id),
        );

        debug!(
            user_id = %user_id,
            on_ramp = ?on_ramp.as_ref().ok(),
            p2p = ?p2p.as_ref().ok(),
            "Account warmed"
        );

        balance?;
        on_ramp?;
        p2p?;
        contacts?;
        profile?;
        Ok(())
    }

    /// Delete every key under `prefixes`, returns the number removed
    pub async fn clear(&self, prefixes: &[&str]) -> Result<usize, WalletError> {
        let mut removed = 0;
        for prefix in prefixes {
            let n = self.cache.delete_prefix(prefix).await?;
            if n > 0 {
                info!(prefix = %prefix, keys = n, "Cleared cache keys");
            } else {
                debug!(prefix = %prefix, "No cache keys under prefix");
            }
            removed += n;
        }
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::balance::BALANCE_TTL;
    use crate::cache::contacts::CONTACTS_TTL;
    use crate::cache::history::{HISTORY_TTL, MAX_HISTORY};
    use crate::cache::keys;
    use crate::cache::profile::PROFILE_TTL;
    use crate::cache::MemoryCache;
    use crate::core_types::{Amount, UserId};
    use crate::ledger::{LedgerError, MemoryLedger};
    use crate::models::{
        Balance, Contact, OnRampTransaction, TransferRecord, TransferView, UserProfile, UserSummary,
    };
    use async_trait::async_trait;

    /// Delegates to a memory ledger but fails every history read for one user
    struct FlakyLedger {
        inner: MemoryLedger,
        broken: UserId,
    }

    impl FlakyLedger {
        fn check(&self, user_id: &str) -> Result<(), LedgerError> {
            if user_id == self.broken {
                return Err(LedgerError::Unavailable("injected".into()));
            }
            Ok(())
        }
    }

    #[async_trait]
    impl LedgerStore for FlakyLedger {
        fn name(&self) -> &'static str {
            "flaky"
        }
        async fn balance(&self, user_id: &str) -> Result<Option<Balance>, LedgerError> {
            self.inner.balance(user_id).await
        }
        async fn user(&self, user_id: &str) -> Result<Option<UserSummary>, LedgerError> {
            self.inner.user(user_id).await
        }
        async fn user_by_phone(&self, phone: &str) -> Result<Option<UserSummary>, LedgerError> {
            self.inner.user_by_phone(phone).await
        }
        async fn user_ids(&self) -> Result<Vec<UserId>, LedgerError> {
            self.inner.user_ids().await
        }
        async fn execute_transfer(
            &self,
            from: &str,
            to: &str,
            amount: Amount,
        ) -> Result<TransferRecord, LedgerError> {
            self.inner.execute_transfer(from, to, amount).await
        }
        async fn insert_on_ramp(&self, txn: &OnRampTransaction) -> Result<(), LedgerError> {
            self.inner.insert_on_ramp(txn).await
        }
        async fn on_ramp_by_token(
            &self,
            token: &str,
        ) -> Result<Option<OnRampTransaction>, LedgerError> {
            self.inner.on_ramp_by_token(token).await
        }
        async fn confirm_on_ramp(&self, token: &str) -> Result<OnRampTransaction, LedgerError> {
            self.inner.confirm_on_ramp(token).await
        }
        async fn fail_on_ramp(&self, token: &str) -> Result<OnRampTransaction, LedgerError> {
            self.inner.fail_on_ramp(token).await
        }
        async fn on_ramp_history(
            &self,
            user_id: &str,
            limit: usize,
        ) -> Result<Vec<OnRampTransaction>, LedgerError> {
            self.check(user_id)?;
            self.inner.on_ramp_history(user_id, limit).await
        }
        async fn transfer_history(
            &self,
            user_id: &str,
            limit: usize,
        ) -> Result<Vec<TransferView>, LedgerError> {
            self.check(user_id)?;
            self.inner.transfer_history(user_id, limit).await
        }
        async fn contacts(&self, user_id: &str) -> Result<Vec<Contact>, LedgerError> {
            self.inner.contacts(user_id).await
        }
        async fn profile(&self, user_id: &str) -> Result<Option<UserProfile>, LedgerError> {
            self.inner.profile(user_id).await
        }
    }

    fn warmer(ledger: Arc<dyn LedgerStore>, cache: Arc<MemoryCache>) -> CacheWarmer {
        CacheWarmer::new(
            ledger.clone(),
            cache.clone(),
            BalanceCache::new(ledger.clone(), cache.clone(), BALANCE_TTL),
            HistoryCache::new(ledger.clone(), cache.clone(), HISTORY_TTL, MAX_HISTORY),
            ContactsCache::new(ledger.clone(), cache.clone(), CONTACTS_TTL),
            ProfileCache::new(ledger, cache, PROFILE_TTL),
            WarmerConfig {
                interval: Duration::from_millis(10),
                concurrency: 2,
            },
        )
    }

    fn seeded() -> MemoryLedger {
        let ledger = MemoryLedger::new();
        ledger.add_user("a", Some("Anu"), Some("9000000001"), 5_000);
        ledger.add_user("b", Some("Bala"), Some("9000000002"), 5_000);
        ledger.add_user("c", None, None, 0);
        ledger
    }

    #[tokio::test]
    async fn test_warm_all_populates_every_view() {
        let ledger = Arc::new(seeded());
        ledger.execute_transfer("a", "b", 700).await.unwrap();
        let cache = Arc::new(MemoryCache::new());
        let warmer = warmer(ledger.clone(), cache.clone());

        let report = warmer.warm_all().await.unwrap();
        assert_eq!(
            report,
            WarmReport {
                accounts: 3,
                failed: 0
            }
        );

        for user in ["a", "b", "c"] {
            assert!(cache.contains(&keys::balance(user)));
            assert!(cache.contains(&keys::contacts(user)));
            assert!(cache.contains(&keys::profile(user)));
        }
        assert!(cache.contains("p2pHistory:a"));
        assert!(cache.contains("p2pHistory:b"));
        // No activity, no list
        assert!(!cache.contains("p2pHistory:c"));
        assert!(!cache.contains("onRampHistory:a"));

        // Served from cache from now on
        let reads = ledger.balance_reads();
        warmer.balances.get_balance("a").await.unwrap();
        assert_eq!(ledger.balance_reads(), reads);
    }

    #[tokio::test]
    async fn test_warm_is_idempotent() {
        let ledger = Arc::new(seeded());
        ledger.execute_transfer("a", "b", 1).await.unwrap();
        let cache = Arc::new(MemoryCache::new());
        let warmer = warmer(ledger, cache.clone());

        warmer.warm_all().await.unwrap();
        let keys_after_first = cache.len();
        warmer.warm_all().await.unwrap();

        assert_eq!(cache.len(), keys_after_first);
        assert_eq!(cache.list_range("p2pHistory:a", 0, 100).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_account_failure_does_not_abort_others() {
        let ledger = Arc::new(FlakyLedger {
            inner: seeded(),
            broken: "b".into(),
        });
        let cache = Arc::new(MemoryCache::new());
        let warmer = warmer(ledger, cache.clone());

        let report = warmer.warm_all().await.unwrap();
        assert_eq!(report.accounts, 3);
        assert_eq!(report.failed, 1);
        assert!(cache.contains(&keys::balance("a")));
        assert!(cache.contains(&keys::balance("c")));
    }

    #[tokio::test]
    async fn test_ledger_down_fails_the_pass() {
        let ledger = Arc::new(seeded());
        ledger.set_unavailable(true);
        let warmer = warmer(ledger, Arc::new(MemoryCache::new()));

        assert!(warmer.warm_all().await.unwrap_err().is_retryable());
    }

    #[tokio::test]
    async fn test_clear_by_prefix() {
        let ledger = Arc::new(seeded());
        let cache = Arc::new(MemoryCache::new());
        cache.set("unrelated", "1".into(), None).await.unwrap();
        let warmer = warmer(ledger, cache.clone());
        warmer.warm_all().await.unwrap();

        let removed = warmer.clear(&keys::ALL_PREFIXES).await.unwrap();
        assert_eq!(removed, 9);
        assert_eq!(cache.len(), 1);
        assert!(cache.contains("unrelated"));
    }

    #[tokio::test]
    async fn test_scheduled_run_rewarms() {
        let ledger = Arc::new(seeded());
        let cache = Arc::new(MemoryCache::new());
        let warmer = Arc::new(warmer(ledger, cache.clone()));

        let runner = warmer.clone();
        let handle = tokio::spawn(async move { runner.run().await });

        for _ in 0..100 {
            if cache.contains(&keys::balance("a")) {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        handle.abort();
        assert!(cache.contains(&keys::balance("a")));
    }
}
