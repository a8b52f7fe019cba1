//! Wallet Error Types
//!
//! Errors returned across the engine boundary. Each variant maps to a stable
//! error code and an HTTP status suggestion for the (excluded) web layer.

use serde::Serialize;
use thiserror::Error;

use crate::cache::CacheError;
use crate::core_types::UserId;
use crate::ledger::LedgerError;

/// Wallet error types
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum WalletError {
    // === Validation Errors ===
    #[error("User not authenticated")]
    Unauthenticated,

    #[error("Amount must be greater than zero")]
    InvalidAmount,

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    // === Account Errors ===
    #[error("Account not found: {0}")]
    AccountNotFound(UserId),

    #[error("Recipient not found")]
    RecipientNotFound,

    #[error("You can't send money to yourself")]
    SelfTransferNotAllowed,

    #[error("Insufficient balance")]
    InsufficientBalance,

    // === Top-up Errors ===
    #[error("Invalid transaction token")]
    InvalidToken,

    #[error("Transaction already processed")]
    AlreadyProcessed,

    // === System Errors ===
    #[error("Ledger store unavailable: {0}")]
    TransientStoreFailure(String),

    #[error("Cache unavailable: {0}")]
    CacheUnavailable(String),
}

impl WalletError {
    /// Get the error code for API responses
    pub fn code(&self) -> &'static str {
        match self {
            WalletError::Unauthenticated => "UNAUTHENTICATED",
            WalletError::InvalidAmount => "INVALID_AMOUNT",
            WalletError::InvalidRequest(_) => "INVALID_REQUEST",
            WalletError::AccountNotFound(_) => "ACCOUNT_NOT_FOUND",
            WalletError::RecipientNotFound => "RECIPIENT_NOT_FOUND",
            WalletError::SelfTransferNotAllowed => "SELF_TRANSFER_NOT_ALLOWED",
            WalletError::InsufficientBalance => "INSUFFICIENT_BALANCE",
            WalletError::InvalidToken => "INVALID_TOKEN",
            WalletError::AlreadyProcessed => "ALREADY_PROCESSED",
            WalletError::TransientStoreFailure(_) => "TRANSIENT_STORE_FAILURE",
            WalletError::CacheUnavailable(_) => "CACHE_UNAVAILABLE",
        }
    }

    /// Get HTTP status code suggestion
    pub fn http_status(&self) -> u16 {
        match self {
            WalletError::Unauthenticated => 401,
            WalletError::InvalidAmount | WalletError::InvalidRequest(_) => 400,
            WalletError::AccountNotFound(_) | WalletError::RecipientNotFound => 404,
            WalletError::SelfTransferNotAllowed
            | WalletError::InsufficientBalance
            | WalletError::InvalidToken => 422,
            // Duplicate webhook delivery is benign
            WalletError::AlreadyProcessed => 200,
            WalletError::TransientStoreFailure(_) | WalletError::CacheUnavailable(_) => 503,
        }
    }

    /// Whether the caller may retry the whole operation from scratch
    pub fn is_retryable(&self) -> bool {
        matches!(self, WalletError::TransientStoreFailure(_))
    }

    /// Message shown to end users. Internal details are never leaked.
    pub fn user_message(&self) -> String {
        match self {
            WalletError::TransientStoreFailure(_) | WalletError::CacheUnavailable(_) => {
                "An unexpected error occurred during the transaction.".to_string()
            }
            other => other.to_string(),
        }
    }
}

impl From<LedgerError> for WalletError {
    fn from(e: LedgerError) -> Self {
        match e {
            LedgerError::AccountNotFound(user_id) => WalletError::AccountNotFound(user_id),
            LedgerError::InsufficientBalance => WalletError::InsufficientBalance,
            LedgerError::SelfTransfer => WalletError::SelfTransferNotAllowed,
            LedgerError::InvalidToken => WalletError::InvalidToken,
            LedgerError::AlreadyProcessed => WalletError::AlreadyProcessed,
            other => WalletError::TransientStoreFailure(other.to_string()),
        }
    }
}

impl From<CacheError> for WalletError {
    fn from(e: CacheError) -> Self {
        WalletError::CacheUnavailable(e.to_string())
    }
}

/// Flat response handed to the excluded web / webhook layer
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OpResponse {
    pub success: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transfer_id: Option<String>,
}

impl OpResponse {
    pub fn ok(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
            transfer_id: None,
        }
    }

    pub fn failed(err: &WalletError) -> Self {
        Self {
            success: false,
            message: err.user_message(),
            transfer_id: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        assert_eq!(
            WalletError::SelfTransferNotAllowed.code(),
            "SELF_TRANSFER_NOT_ALLOWED"
        );
        assert_eq!(
            WalletError::InsufficientBalance.code(),
            "INSUFFICIENT_BALANCE"
        );
        assert_eq!(WalletError::AlreadyProcessed.code(), "ALREADY_PROCESSED");
    }

    #[test]
    fn test_http_status() {
        assert_eq!(WalletError::Unauthenticated.http_status(), 401);
        assert_eq!(WalletError::InvalidAmount.http_status(), 400);
        assert_eq!(WalletError::RecipientNotFound.http_status(), 404);
        assert_eq!(WalletError::InsufficientBalance.http_status(), 422);
        assert_eq!(WalletError::AlreadyProcessed.http_status(), 200);
        assert_eq!(
            WalletError::TransientStoreFailure("down".into()).http_status(),
            503
        );
    }

    #[test]
    fn test_ledger_error_mapping() {
        assert_eq!(
            WalletError::from(LedgerError::InsufficientBalance),
            WalletError::InsufficientBalance
        );
        assert_eq!(
            WalletError::from(LedgerError::AlreadyProcessed),
            WalletError::AlreadyProcessed
        );
        assert_eq!(
            WalletError::from(LedgerError::SelfTransfer),
            WalletError::SelfTransferNotAllowed
        );
        let transient = WalletError::from(LedgerError::Unavailable("lock timeout".into()));
        assert!(transient.is_retryable());
        assert!(!WalletError::InsufficientBalance.is_retryable());
    }

    #[test]
    fn test_user_message_hides_internals() {
        let err = WalletError::TransientStoreFailure("connection refused 10.0.0.3".into());
        assert!(!err.user_message().contains("10.0.0.3"));
        assert_eq!(
            WalletError::AlreadyProcessed.user_message(),
            "Transaction already processed"
        );
    }
}
