//! Identity context and recipient resolution
//!
//! Sessions and phone lookups belong to the web layer. The engines only see
//! an explicit [`Session`] per call and a [`RecipientResolver`] handle.

use async_trait::async_trait;
use std::sync::Arc;

use crate::core_types::UserId;
use crate::error::WalletError;
use crate::ledger::LedgerStore;
use crate::models::UserSummary;

/// Authenticated caller as supplied by the session layer
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Session {
    pub user_id: Option<UserId>,
}

impl Session {
    pub fn authenticated(user_id: impl Into<UserId>) -> Self {
        Self {
            user_id: Some(user_id.into()),
        }
    }

    pub fn anonymous() -> Self {
        Self::default()
    }

    /// The caller's id, or `Unauthenticated`
    pub fn require(&self) -> Result<&str, WalletError> {
        match self.user_id.as_deref() {
            Some(id) if !id.is_empty() => Ok(id),
            _ => Err(WalletError::Unauthenticated),
        }
    }
}

/// Maps a phone number or user id to an account
#[async_trait]
pub trait RecipientResolver: Send + Sync {
    /// `Ok(None)` when nobody matches
    async fn resolve(&self, identifier: &str) -> Result<Option<UserSummary>, WalletError>;
}

/// Resolver backed by the ledger's user table: phone first, then id
pub struct LedgerRecipientResolver {
    ledger: Arc<dyn LedgerStore>,
}

impl LedgerRecipientResolver {
    pub fn new(ledger: Arc<dyn LedgerStore>) -> Self {
        Self { ledger }
    }
}

#[async_trait]
impl RecipientResolver for LedgerRecipientResolver {
    async fn resolve(&self, identifier: &str) -> Result<Option<UserSummary>, WalletError> {
        let identifier = identifier.trim();
        if identifier.is_empty() {
            return Ok(None);
        }
        if let Some(user) = self.ledger.user_by_phone(identifier).await? {
            return Ok(Some(user));
        }
        Ok(self.ledger.user(identifier).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::MemoryLedger;

    #[test]
    fn test_session_require() {
        assert_eq!(Session::authenticated("u1").require(), Ok("u1"));
        assert_eq!(
            Session::anonymous().require(),
            Err(WalletError::Unauthenticated)
        );
        assert_eq!(
            Session::authenticated("").require(),
            Err(WalletError::Unauthenticated)
        );
    }

    #[tokio::test]
    async fn test_resolve_phone_then_id() {
        let ledger = Arc::new(MemoryLedger::new());
        ledger.add_user("u1", Some("Ravi"), Some("9000000001"), 0);
        ledger.add_user("u2", None, None, 0);
        let resolver = LedgerRecipientResolver::new(ledger);

        let by_phone = resolver.resolve("9000000001").await.unwrap().unwrap();
        assert_eq!(by_phone.id, "u1");

        let by_id = resolver.resolve(" u2 ").await.unwrap().unwrap();
        assert_eq!(by_id.id, "u2");

        assert!(resolver.resolve("nobody").await.unwrap().is_none());
        assert!(resolver.resolve("").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_resolve_store_down_is_transient() {
        let ledger = Arc::new(MemoryLedger::new());
        ledger.set_unavailable(true);
        let resolver = LedgerRecipientResolver::new(ledger);

        let err = resolver.resolve("9000000001").await.unwrap_err();
        assert!(err.is_retryable());
    }
}
