//! Top-up (on-ramp) Engine
//!
//! A top-up is created `Processing` with a one-time token, then settled by a
//! bank confirmation callback keyed on that token. Callbacks may arrive more
//! than once: the ledger's conditional `Processing -> Success` update makes
//! the credit happen exactly once, later deliveries get `AlreadyProcessed`.

use chrono::Utc;
use std::sync::Arc;
use tracing::{info, warn};

use crate::cache::{BalanceCache, HistoryCache, HistoryEntry};
use crate::core_types::{Amount, Token, new_record_id, new_token};
use crate::error::{OpResponse, WalletError};
use crate::identity::Session;
use crate::ledger::LedgerStore;
use crate::models::{OnRampTransaction, TxStatus};

pub struct OnRampEngine {
    ledger: Arc<dyn LedgerStore>,
    balances: BalanceCache,
    history: HistoryCache,
}

impl OnRampEngine {
    pub fn new(ledger: Arc<dyn LedgerStore>, balances: BalanceCache, history: HistoryCache) -> Self {
        Self {
            ledger,
            balances,
            history,
        }
    }

    /// Record a pending top-up and return its confirmation token
    pub async fn initiate(
        &self,
        session: &Session,
        amount: Amount,
        provider: &str,
    ) -> Result<Token, WalletError> {
        let user_id = session.require()?;
        if amount <= 0 {
            return Err(WalletError::InvalidAmount);
        }
        let provider = provider.trim();
        if provider.is_empty() {
            return Err(WalletError::InvalidRequest("Provider is required".into()));
        }

        let txn = OnRampTransaction {
            id: new_record_id(),
            user_id: user_id.to_string(),
            amount,
            provider: provider.to_string(),
            token: new_token(),
            status: TxStatus::Processing,
            timestamp: Utc::now(),
        };
        self.ledger.insert_on_ramp(&txn).await?;

        info!(
            user_id = %txn.user_id,
            amount,
            provider = %txn.provider,
            "On-ramp initiated"
        );
        Ok(txn.token)
    }

    /// Settle a top-up and credit the balance, exactly once per token
    pub async fn confirm(&self, token: &str) -> Result<OnRampTransaction, WalletError> {
        let token = validate_token(token)?;

        let txn = match self.ledger.confirm_on_ramp(token).await {
            Ok(txn) => txn,
            Err(e) => {
                let err = WalletError::from(e);
                warn!(token = %token, error = %err, "On-ramp confirmation rejected");
                return Err(err);
            }
        };

        info!(
            user_id = %txn.user_id,
            amount = txn.amount,
            txn_id = %txn.id,
            "On-ramp captured"
        );

        let entry = HistoryEntry::from_on_ramp(&txn);
        tokio::join!(
            self.balances.invalidate_balance(&txn.user_id),
            self.history.add_history(&txn.user_id, &entry),
        );
        self.balances.spawn_refresh(&txn.user_id);

        Ok(txn)
    }

    /// Mark a top-up as declined by the bank. No money moves.
    pub async fn fail(&self, token: &str) -> Result<OnRampTransaction, WalletError> {
        let token = validate_token(token)?;
        let txn = self.ledger.fail_on_ramp(token).await?;

        info!(user_id = %txn.user_id, txn_id = %txn.id, "On-ramp failed");
        Ok(txn)
    }

    /// [`confirm`](Self::confirm) flattened for the webhook layer
    pub async fn confirm_response(&self, token: &str) -> OpResponse {
        match self.confirm(token).await {
            Ok(_) => OpResponse::ok("Captured"),
            Err(e) => OpResponse::failed(&e),
        }
    }
}

fn validate_token(token: &str) -> Result<&str, WalletError> {
    let token = token.trim();
    if token.is_empty() {
        return Err(WalletError::InvalidRequest("Token is required".into()));
    }
    Ok(token)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::balance::BALANCE_TTL;
    use crate::cache::history::{HISTORY_TTL, MAX_HISTORY};
    use crate::cache::{HistoryKind, MemoryCache};
    use crate::ledger::MemoryLedger;

    fn setup() -> (Arc<MemoryLedger>, BalanceCache, HistoryCache, Arc<OnRampEngine>) {
        let ledger = Arc::new(MemoryLedger::new());
        ledger.add_user("u", Some("Usha"), None, 0);
        let cache = Arc::new(MemoryCache::new());
        let balances = BalanceCache::new(ledger.clone(), cache.clone(), BALANCE_TTL);
        let history = HistoryCache::new(ledger.clone(), cache, HISTORY_TTL, MAX_HISTORY);
        let engine = Arc::new(OnRampEngine::new(
            ledger.clone(),
            balances.clone(),
            history.clone(),
        ));
        (ledger, balances, history, engine)
    }

    #[tokio::test]
    async fn test_initiate_confirm_duplicate() {
        let (ledger, balances, _history, engine) = setup();
        let session = Session::authenticated("u");

        let token = engine.initiate(&session, 100_000, "HDFC").await.unwrap();
        assert_eq!(token.len(), 32);
        let pending = ledger.on_ramp_by_token(&token).await.unwrap().unwrap();
        assert_eq!(pending.status, TxStatus::Processing);
        assert_eq!(balances.get_balance("u").await.unwrap().amount, 0);

        let txn = engine.confirm(&token).await.unwrap();
        assert_eq!(txn.status, TxStatus::Success);
        assert_eq!(balances.get_balance("u").await.unwrap().amount, 100_000);

        let err = engine.confirm(&token).await.unwrap_err();
        assert_eq!(err, WalletError::AlreadyProcessed);
        assert_eq!(balances.get_balance("u").await.unwrap().amount, 100_000);
    }

    #[tokio::test]
    async fn test_confirm_appends_credit_history() {
        let (_ledger, _balances, history, engine) = setup();
        let token = engine
            .initiate(&Session::authenticated("u"), 500, "Axis Bank")
            .await
            .unwrap();
        engine.confirm(&token).await.unwrap();

        let entries = history
            .get_history("u", HistoryKind::OnRamp, 10)
            .await
            .unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].status, TxStatus::Success);
        assert_eq!(entries[0].provider.as_deref(), Some("Axis Bank"));
    }

    #[tokio::test]
    async fn test_initiate_validation() {
        let (_ledger, _balances, _history, engine) = setup();
        let session = Session::authenticated("u");

        assert_eq!(
            engine.initiate(&session, 0, "HDFC").await.unwrap_err(),
            WalletError::InvalidAmount
        );
        assert!(matches!(
            engine.initiate(&session, 10, "  ").await.unwrap_err(),
            WalletError::InvalidRequest(_)
        ));
        assert_eq!(
            engine
                .initiate(&Session::anonymous(), 10, "HDFC")
                .await
                .unwrap_err(),
            WalletError::Unauthenticated
        );
        assert!(matches!(
            engine
                .initiate(&Session::authenticated("ghost"), 10, "HDFC")
                .await
                .unwrap_err(),
            WalletError::AccountNotFound(_)
        ));
    }

    #[tokio::test]
    async fn test_unknown_and_empty_token() {
        let (_ledger, _balances, _history, engine) = setup();
        assert_eq!(
            engine.confirm("no-such-token").await.unwrap_err(),
            WalletError::InvalidToken
        );
        assert!(matches!(
            engine.confirm("").await.unwrap_err(),
            WalletError::InvalidRequest(_)
        ));
    }

    #[tokio::test]
    async fn test_failed_top_up_never_credits() {
        let (_ledger, balances, _history, engine) = setup();
        let token = engine
            .initiate(&Session::authenticated("u"), 700, "HDFC")
            .await
            .unwrap();

        let txn = engine.fail(&token).await.unwrap();
        assert_eq!(txn.status, TxStatus::Failure);
        assert_eq!(
            engine.confirm(&token).await.unwrap_err(),
            WalletError::AlreadyProcessed
        );
        assert_eq!(balances.get_balance("u").await.unwrap().amount, 0);
    }

    #[tokio::test]
    async fn test_confirm_response_messages() {
        let (_ledger, _balances, _history, engine) = setup();
        let token = engine
            .initiate(&Session::authenticated("u"), 10, "HDFC")
            .await
            .unwrap();

        let first = engine.confirm_response(&token).await;
        assert!(first.success);
        assert_eq!(first.message, "Captured");

        let second = engine.confirm_response(&token).await;
        assert!(!second.success);
        assert_eq!(second.message, "Transaction already processed");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_confirms_credit_once() {
        let (ledger, _balances, _history, engine) = setup();
        let token = engine
            .initiate(&Session::authenticated("u"), 2_000, "HDFC")
            .await
            .unwrap();

        let mut handles = Vec::new();
        for _ in 0..10 {
            let engine = engine.clone();
            let token = token.clone();
            handles.push(tokio::spawn(async move { engine.confirm(&token).await }));
        }

        let mut captured = 0;
        for h in handles {
            match h.await.unwrap() {
                Ok(_) => captured += 1,
                Err(e) => assert_eq!(e, WalletError::AlreadyProcessed),
            }
        }

        assert_eq!(captured, 1);
        assert_eq!(ledger.balance("u").await.unwrap().unwrap().amount, 2_000);
    }
}
