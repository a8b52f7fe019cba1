//! Shared wallet state
//!
//! Wires one ledger and one cache backend into every manager and engine.
//! Cloning is cheap; hand a clone to each request handler.

use std::sync::Arc;

use crate::cache::{BalanceCache, CacheStore, ContactsCache, HistoryCache, ProfileCache};
use crate::config::CacheConfig;
use crate::identity::LedgerRecipientResolver;
use crate::ledger::LedgerStore;
use crate::onramp::OnRampEngine;
use crate::transfer::TransferEngine;
use crate::warmer::{CacheWarmer, WarmerConfig};

#[derive(Clone)]
pub struct Wallet {
    pub ledger: Arc<dyn LedgerStore>,
    pub cache: Arc<dyn CacheStore>,
    pub balances: BalanceCache,
    pub history: HistoryCache,
    pub contacts: ContactsCache,
    pub profiles: ProfileCache,
    pub transfers: Arc<TransferEngine>,
    pub onramp: Arc<OnRampEngine>,
    pub warmer: Arc<CacheWarmer>,
}

impl Wallet {
    pub fn new(
        ledger: Arc<dyn LedgerStore>,
        cache: Arc<dyn CacheStore>,
        cache_config: &CacheConfig,
        warmer_config: WarmerConfig,
    ) -> Self {
        let balances = BalanceCache::new(ledger.clone(), cache.clone(), cache_config.balance_ttl());
        let history = HistoryCache::new(
            ledger.clone(),
            cache.clone(),
            cache_config.history_ttl(),
            cache_config.history_max_len,
        );
        let contacts =
            ContactsCache::new(ledger.clone(), cache.clone(), cache_config.contacts_ttl());
        let profiles = ProfileCache::new(ledger.clone(), cache.clone(), cache_config.profile_ttl());

        let transfers = Arc::new(TransferEngine::new(
            ledger.clone(),
            Arc::new(LedgerRecipientResolver::new(ledger.clone())),
            balances.clone(),
            history.clone(),
        ));
        let onramp = Arc::new(OnRampEngine::new(
            ledger.clone(),
            balances.clone(),
            history.clone(),
        ));
        let warmer = Arc::new(CacheWarmer::new(
            ledger.clone(),
            cache.clone(),
            balances.clone(),
            history.clone(),
            contacts.clone(),
            profiles.clone(),
            warmer_config,
        ));

        Self {
            ledger,
            cache,
            balances,
            history,
            contacts,
            profiles,
            transfers,
            onramp,
            warmer,
        }
    }
}
