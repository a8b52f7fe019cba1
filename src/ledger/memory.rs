//! In-process ledger store
//!
//! Holds the whole ledger behind one mutex, so every mutation is trivially
//! atomic and serialized. Used by tests and local runs without PostgreSQL.
//! Counts balance reads and can simulate an outage.

use async_trait::async_trait;
use chrono::Utc;
use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use super::{LedgerError, LedgerStore};
use crate::core_types::{Amount, Token, UserId, new_record_id};
use crate::models::{
    Balance, Contact, OnRampTransaction, TransferRecord, TransferView, TxStatus, UserProfile,
    UserSummary,
};

#[derive(Debug, Clone)]
struct UserRow {
    profile: UserProfile,
}

#[derive(Debug, Default)]
struct LedgerState {
    users: BTreeMap<UserId, UserRow>,
    balances: HashMap<UserId, Balance>,
    transfers: Vec<TransferRecord>,
    on_ramps: Vec<OnRampTransaction>,
    on_ramp_by_token: HashMap<Token, usize>,
}

impl LedgerState {
    fn summary(&self, user_id: &str) -> Option<UserSummary> {
        self.users.get(user_id).map(|u| UserSummary {
            id: user_id.to_string(),
            name: u.profile.name.clone(),
            phone: u.profile.phone.clone(),
        })
    }

    fn transition_on_ramp(
        &mut self,
        token: &str,
        to: TxStatus,
    ) -> Result<&mut OnRampTransaction, LedgerError> {
        let idx = *self
            .on_ramp_by_token
            .get(token)
            .ok_or(LedgerError::InvalidToken)?;
        let txn = &mut self.on_ramps[idx];
        if txn.status != TxStatus::Processing {
            return Err(LedgerError::AlreadyProcessed);
        }
        txn.status = to;
        Ok(txn)
    }
}

/// Ledger store kept in memory
#[derive(Default)]
pub struct MemoryLedger {
    state: Mutex<LedgerState>,
    balance_reads: AtomicUsize,
    unavailable: AtomicBool,
}

impl MemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Provision a user with a starting balance
    pub fn add_user(&self, user_id: &str, name: Option<&str>, phone: Option<&str>, amount: Amount) {
        let profile = UserProfile {
            name: name.map(str::to_string),
            phone: phone.map(str::to_string),
            ..Default::default()
        };
        self.add_user_with_profile(user_id, profile, amount);
    }

    pub fn add_user_with_profile(&self, user_id: &str, profile: UserProfile, amount: Amount) {
        let mut state = self.lock();
        state
            .users
            .insert(user_id.to_string(), UserRow { profile });
        state
            .balances
            .insert(user_id.to_string(), Balance::new(amount, 0));
    }

    /// Number of `balance()` calls served so far
    pub fn balance_reads(&self) -> usize {
        self.balance_reads.load(Ordering::SeqCst)
    }

    /// Make every call fail with `Unavailable` while set
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    pub fn transfer_count(&self) -> usize {
        self.lock().transfers.len()
    }

    /// Sum of all spendable balances
    pub fn total_amount(&self) -> Amount {
        self.lock().balances.values().map(|b| b.amount).sum()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, LedgerState> {
        // A panic while holding the lock cannot leave a half-applied
        // mutation: every mutation validates before writing.
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn check_available(&self) -> Result<(), LedgerError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(LedgerError::Unavailable("memory ledger offline".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl LedgerStore for MemoryLedger {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn balance(&self, user_id: &str) -> Result<Option<Balance>, LedgerError> {
        self.check_available()?;
        self.balance_reads.fetch_add(1, Ordering::SeqCst);
        Ok(self.lock().balances.get(user_id).copied())
    }

    async fn user(&self, user_id: &str) -> Result<Option<UserSummary>, LedgerError> {
        self.check_available()?;
        Ok(self.lock().summary(user_id))
    }

    async fn user_by_phone(&self, phone: &str) -> Result<Option<UserSummary>, LedgerError> {
        self.check_available()?;
        let state = self.lock();
        let found = state
            .users
            .iter()
            .find(|(_, u)| u.profile.phone.as_deref() == Some(phone))
            .map(|(id, _)| id.clone());
        Ok(found.and_then(|id| state.summary(&id)))
    }

    async fn user_ids(&self) -> Result<Vec<UserId>, LedgerError> {
        self.check_available()?;
        Ok(self.lock().users.keys().cloned().collect())
    }

    async fn execute_transfer(
        &self,
        from: &str,
        to: &str,
        amount: Amount,
    ) -> Result<TransferRecord, LedgerError> {
        self.check_available()?;
        if from == to {
            return Err(LedgerError::SelfTransfer);
        }
        let mut state = self.lock();

        let sender = *state
            .balances
            .get(from)
            .ok_or_else(|| LedgerError::AccountNotFound(from.to_string()))?;
        let recipient = *state
            .balances
            .get(to)
            .ok_or_else(|| LedgerError::AccountNotFound(to.to_string()))?;

        if sender.amount < amount {
            return Err(LedgerError::InsufficientBalance);
        }
        let credited = recipient
            .amount
            .checked_add(amount)
            .ok_or_else(|| LedgerError::Corrupt(format!("balance overflow for {to}")))?;

        // Validated: apply both legs
        if let Some(b) = state.balances.get_mut(from) {
            b.amount -= amount;
        }
        if let Some(b) = state.balances.get_mut(to) {
            b.amount = credited;
        }

        let record = TransferRecord {
            id: new_record_id(),
            from_user_id: from.to_string(),
            to_user_id: to.to_string(),
            amount,
            timestamp: Utc::now(),
            status: TxStatus::Success,
        };
        state.transfers.push(record.clone());
        Ok(record)
    }

    async fn insert_on_ramp(&self, txn: &OnRampTransaction) -> Result<(), LedgerError> {
        self.check_available()?;
        let mut state = self.lock();
        if !state.users.contains_key(&txn.user_id) {
            return Err(LedgerError::AccountNotFound(txn.user_id.clone()));
        }
        if state.on_ramp_by_token.contains_key(&txn.token) {
            return Err(LedgerError::Corrupt(format!(
                "duplicate on-ramp token {}",
                txn.token
            )));
        }
        let idx = state.on_ramps.len();
        state.on_ramps.push(txn.clone());
        state.on_ramp_by_token.insert(txn.token.clone(), idx);
        Ok(())
    }

    async fn on_ramp_by_token(
        &self,
        token: &str,
    ) -> Result<Option<OnRampTransaction>, LedgerError> {
        self.check_available()?;
        let state = self.lock();
        Ok(state
            .on_ramp_by_token
            .get(token)
            .map(|&idx| state.on_ramps[idx].clone()))
    }

    async fn confirm_on_ramp(&self, token: &str) -> Result<OnRampTransaction, LedgerError> {
        self.check_available()?;
        let mut state = self.lock();

        let (user_id, amount) = {
            let idx = *state
                .on_ramp_by_token
                .get(token)
                .ok_or(LedgerError::InvalidToken)?;
            let txn = &state.on_ramps[idx];
            if txn.status != TxStatus::Processing {
                return Err(LedgerError::AlreadyProcessed);
            }
            (txn.user_id.clone(), txn.amount)
        };

        let balance = state
            .balances
            .get_mut(&user_id)
            .ok_or_else(|| LedgerError::AccountNotFound(user_id.clone()))?;
        balance.amount = balance
            .amount
            .checked_add(amount)
            .ok_or_else(|| LedgerError::Corrupt(format!("balance overflow for {user_id}")))?;

        let txn = state.transition_on_ramp(token, TxStatus::Success)?;
        Ok(txn.clone())
    }

    async fn fail_on_ramp(&self, token: &str) -> Result<OnRampTransaction, LedgerError> {
        self.check_available()?;
        let mut state = self.lock();
        let txn = state.transition_on_ramp(token, TxStatus::Failure)?;
        Ok(txn.clone())
    }

    async fn on_ramp_history(
        &self,
        user_id: &str,
        limit: usize,
    ) -> Result<Vec<OnRampTransaction>, LedgerError> {
        self.check_available()?;
        let state = self.lock();
        let mut txns: Vec<OnRampTransaction> = state
            .on_ramps
            .iter()
            .rev()
            .filter(|t| t.user_id == user_id)
            .cloned()
            .collect();
        // Stable: equal timestamps keep newest-inserted first
        txns.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        txns.truncate(limit);
        Ok(txns)
    }

    async fn transfer_history(
        &self,
        user_id: &str,
        limit: usize,
    ) -> Result<Vec<TransferView>, LedgerError> {
        self.check_available()?;
        let state = self.lock();
        let mut records: Vec<&TransferRecord> = state
            .transfers
            .iter()
            .rev()
            .filter(|t| t.from_user_id == user_id || t.to_user_id == user_id)
            .collect();
        records.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        records.truncate(limit);

        records
            .into_iter()
            .map(|r| -> Result<TransferView, LedgerError> {
                let from_user = state
                    .summary(&r.from_user_id)
                    .ok_or_else(|| LedgerError::AccountNotFound(r.from_user_id.clone()))?;
                let to_user = state
                    .summary(&r.to_user_id)
                    .ok_or_else(|| LedgerError::AccountNotFound(r.to_user_id.clone()))?;
                Ok(TransferView {
                    record: r.clone(),
                    from_user,
                    to_user,
                })
            })
            .collect()
    }

    async fn contacts(&self, user_id: &str) -> Result<Vec<Contact>, LedgerError> {
        self.check_available()?;
        let state = self.lock();
        let mut contacts: Vec<Contact> = state
            .users
            .iter()
            .filter(|(id, _)| id.as_str() != user_id)
            .map(|(id, u)| Contact {
                id: id.clone(),
                name: u.profile.name.clone(),
                phone: u.profile.phone.clone(),
                email: u.profile.email.clone(),
                image: u.profile.image.clone(),
            })
            .collect();
        // Named first, alphabetically; unnamed last
        contacts.sort_by(|a, b| match (&a.name, &b.name) {
            (Some(x), Some(y)) => x.cmp(y),
            (Some(_), None) => std::cmp::Ordering::Less,
            (None, Some(_)) => std::cmp::Ordering::Greater,
            (None, None) => a.id.cmp(&b.id),
        });
        Ok(contacts)
    }

    async fn profile(&self, user_id: &str) -> Result<Option<UserProfile>, LedgerError> {
        self.check_available()?;
        Ok(self.lock().users.get(user_id).map(|u| u.profile.clone()))
    }
}
