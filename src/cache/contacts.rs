//! Contacts cache (`contacts:{id}`)
//!
//! Every other user, named first in name order. Contacts are non-critical:
//! reads never fail, a ledger outage yields an empty list.

use std::sync::Arc;
use std::time::Duration;
use tracing::{error, warn};

use super::{CacheError, CacheStore, get_json, keys, set_json};
use crate::error::WalletError;
use crate::ledger::LedgerStore;
use crate::models::Contact;

pub const CONTACTS_TTL: Duration = Duration::from_secs(600);

#[derive(Clone)]
pub struct ContactsCache {
    ledger: Arc<dyn LedgerStore>,
    cache: Arc<dyn CacheStore>,
    ttl: Duration,
}

impl ContactsCache {
    pub fn new(ledger: Arc<dyn LedgerStore>, cache: Arc<dyn CacheStore>, ttl: Duration) -> Self {
        Self { ledger, cache, ttl }
    }

    pub async fn get_contacts(&self, user_id: &str) -> Vec<Contact> {
        let key = keys::contacts(user_id);
        let cache_up = match get_json::<Vec<Contact>>(self.cache.as_ref(), &key).await {
            Ok(Some(contacts)) => return contacts,
            Ok(None) | Err(CacheError::Codec(_)) => true,
            Err(e) => {
                warn!(key = %key, error = %e, "Contacts cache unavailable, reading ledger");
                false
            }
        };

        let result = if cache_up {
            self.warm_contacts(user_id).await
        } else {
            self.ledger.contacts(user_id).await.map_err(WalletError::from)
        };

        result.unwrap_or_else(|e| {
            error!(user_id = %user_id, error = %e, "Failed to load contacts");
            Vec::new()
        })
    }

    /// Load from the ledger and overwrite the cached list. Empty lists are
    /// not cached.
    pub async fn warm_contacts(&self, user_id: &str) -> Result<Vec<Contact>, WalletError> {
        let contacts = self.ledger.contacts(user_id).await?;
        if contacts.is_empty() {
            return Ok(contacts);
        }

        let key = keys::contacts(user_id);
        if let Err(e) = set_json(self.cache.as_ref(), &key, &contacts, Some(self.ttl)).await {
            warn!(key = %key, error = %e, "Failed to cache contacts");
        }
        Ok(contacts)
    }

    pub async fn invalidate_contacts(&self, user_id: &str) {
        let key = keys::contacts(user_id);
        if let Err(e) = self.cache.delete(&key).await {
            warn!(key = %key, error = %e, "Failed to invalidate contacts");
        }
    }
}
