//! Ledger Store
//!
//! The durable, transactional source of truth for balances, transfer records
//! and on-ramp transactions. Every cache in [`crate::cache`] is rebuilt from here.
//!
//! # Safety Invariants
//!
//! 1. **Atomic transfer**: debit, credit and the transfer record commit together or not at all
//! 2. **Lock-then-check**: the sender balance is checked under a row lock, never before it
//! 3. **No negative balance**: a transfer larger than the locked balance is rejected
//! 4. **Single confirmation**: `Processing -> Success` is a conditional update, so concurrent
//!    confirmations of one token credit exactly once

pub mod memory;
pub mod postgres;

pub use memory::MemoryLedger;
pub use postgres::PgLedger;

use async_trait::async_trait;
use thiserror::Error;

use crate::core_types::{Amount, UserId};
use crate::models::{
    Balance, Contact, OnRampTransaction, TransferRecord, TransferView, UserProfile, UserSummary,
};

/// Ledger store errors
#[derive(Error, Debug)]
pub enum LedgerError {
    #[error("Account not found: {0}")]
    AccountNotFound(UserId),

    #[error("Insufficient balance")]
    InsufficientBalance,

    #[error("Sender and recipient are the same account")]
    SelfTransfer,

    #[error("Invalid transaction token")]
    InvalidToken,

    #[error("Transaction already processed")]
    AlreadyProcessed,

    #[error("Ledger store unavailable: {0}")]
    Unavailable(String),

    #[error("Corrupt ledger row: {0}")]
    Corrupt(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Durable ledger operations
///
/// Mutating methods run inside a single store transaction each. A returned
/// error means nothing was persisted.
#[async_trait]
pub trait LedgerStore: Send + Sync {
    /// Store name for logging
    fn name(&self) -> &'static str;

    /// Current balance row, `None` if the account was never provisioned
    async fn balance(&self, user_id: &str) -> Result<Option<Balance>, LedgerError>;

    async fn user(&self, user_id: &str) -> Result<Option<UserSummary>, LedgerError>;

    async fn user_by_phone(&self, phone: &str) -> Result<Option<UserSummary>, LedgerError>;

    /// Every user id, ordered
    async fn user_ids(&self) -> Result<Vec<UserId>, LedgerError>;

    /// Move `amount` from `from` to `to` atomically and record the transfer.
    ///
    /// # Errors
    /// - `SelfTransfer` if `from == to`, before touching any row
    /// - `AccountNotFound` if either balance row is missing
    /// - `InsufficientBalance` if the locked sender balance is below `amount`
    async fn execute_transfer(
        &self,
        from: &str,
        to: &str,
        amount: Amount,
    ) -> Result<TransferRecord, LedgerError>;

    /// Persist a new `Processing` on-ramp transaction
    async fn insert_on_ramp(&self, txn: &OnRampTransaction) -> Result<(), LedgerError>;

    async fn on_ramp_by_token(&self, token: &str)
    -> Result<Option<OnRampTransaction>, LedgerError>;

    /// `Processing -> Success` and credit the balance, in one transaction.
    ///
    /// # Errors
    /// - `InvalidToken` if no transaction carries `token`
    /// - `AlreadyProcessed` if it already left `Processing`
    async fn confirm_on_ramp(&self, token: &str) -> Result<OnRampTransaction, LedgerError>;

    /// `Processing -> Failure`, balance untouched
    async fn fail_on_ramp(&self, token: &str) -> Result<OnRampTransaction, LedgerError>;

    /// Newest-first on-ramp transactions of a user
    async fn on_ramp_history(
        &self,
        user_id: &str,
        limit: usize,
    ) -> Result<Vec<OnRampTransaction>, LedgerError>;

    /// Newest-first transfers sent or received by a user
    async fn transfer_history(
        &self,
        user_id: &str,
        limit: usize,
    ) -> Result<Vec<TransferView>, LedgerError>;

    /// Every user except `user_id`, name ascending
    async fn contacts(&self, user_id: &str) -> Result<Vec<Contact>, LedgerError>;

    async fn profile(&self, user_id: &str) -> Result<Option<UserProfile>, LedgerError>;
}
