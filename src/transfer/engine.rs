//! Transfer Engine

use std::sync::Arc;
use tracing::{info, warn};

use crate::cache::{BalanceCache, HistoryCache, HistoryEntry};
use crate::core_types::Amount;
use crate::error::{OpResponse, WalletError};
use crate::identity::{RecipientResolver, Session};
use crate::ledger::LedgerStore;
use crate::models::{TransferRecord, TransferView};

pub struct TransferEngine {
    ledger: Arc<dyn LedgerStore>,
    resolver: Arc<dyn RecipientResolver>,
    balances: BalanceCache,
    history: HistoryCache,
}

impl TransferEngine {
    pub fn new(
        ledger: Arc<dyn LedgerStore>,
        resolver: Arc<dyn RecipientResolver>,
        balances: BalanceCache,
        history: HistoryCache,
    ) -> Self {
        Self {
            ledger,
            resolver,
            balances,
            history,
        }
    }

    /// Move `amount` from the session user to `recipient` (phone or id).
    pub async fn transfer(
        &self,
        session: &Session,
        recipient: &str,
        amount: Amount,
    ) -> Result<TransferRecord, WalletError> {
        let from_id = session.require()?;
        if amount <= 0 {
            return Err(WalletError::InvalidAmount);
        }

        let to_user = self
            .resolver
            .resolve(recipient)
            .await?
            .ok_or(WalletError::RecipientNotFound)?;
        let from_user = self
            .ledger
            .user(from_id)
            .await?
            .ok_or_else(|| WalletError::AccountNotFound(from_id.to_string()))?;

        if from_user.id == to_user.id {
            return Err(WalletError::SelfTransferNotAllowed);
        }

        let record = match self
            .ledger
            .execute_transfer(&from_user.id, &to_user.id, amount)
            .await
        {
            Ok(record) => record,
            Err(e) => {
                let err = WalletError::from(e);
                warn!(
                    from = %from_user.id,
                    to = %to_user.id,
                    amount,
                    error = %err,
                    "Transfer rejected"
                );
                return Err(err);
            }
        };

        info!(
            transfer_id = %record.id,
            from = %record.from_user_id,
            to = %record.to_user_id,
            amount,
            "Transfer committed"
        );

        let view = TransferView {
            record: record.clone(),
            from_user,
            to_user,
        };
        self.after_commit(&view).await;

        Ok(record)
    }

    /// [`transfer`](Self::transfer) flattened for the web layer
    pub async fn transfer_response(
        &self,
        session: &Session,
        recipient: &str,
        amount: Amount,
    ) -> OpResponse {
        match self.transfer(session, recipient, amount).await {
            Ok(record) => OpResponse {
                transfer_id: Some(record.id),
                ..OpResponse::ok("Transfer successful")
            },
            Err(e) => OpResponse::failed(&e),
        }
    }

    /// Cache upkeep for a committed transfer. Never fails.
    ///
    /// Invalidations are awaited so the caller's next read sees the new
    /// balances; repopulation runs in the background.
    async fn after_commit(&self, view: &TransferView) {
        let from = view.record.from_user_id.as_str();
        let to = view.record.to_user_id.as_str();
        let debit = HistoryEntry::from_transfer(view, from);
        let credit = HistoryEntry::from_transfer(view, to);

        tokio::join!(
            self.balances.invalidate_balance(from),
            self.balances.invalidate_balance(to),
            self.history.add_history(from, &debit),
            self.history.add_history(to, &credit),
        );

        self.balances.spawn_refresh(from);
        self.balances.spawn_refresh(to);
    }
}
