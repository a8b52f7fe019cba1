//! History Cache Manager
//!
//! Bounded, newest-first lists of recent activity per account, one list per
//! [`HistoryKind`]. A miss is warmed on demand from the ledger: the caller
//! gets the freshly computed slice immediately while the list is written back
//! in a background task. New transactions are pushed to the front after commit.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use super::{CacheStore, keys};
use crate::core_types::{Amount, RecordId, UserId};
use crate::error::WalletError;
use crate::ledger::LedgerStore;
use crate::models::{OnRampTransaction, TransferView, TxStatus, UserSummary};

/// Default TTL of a wholesale-written history list
pub const HISTORY_TTL: Duration = Duration::from_secs(3600);

/// Default list bound
pub const MAX_HISTORY: usize = 50;

/// History stream
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HistoryKind {
    /// Bank top-ups
    OnRamp,
    /// Peer-to-peer transfers, both directions
    P2p,
}

impl HistoryKind {
    pub const ALL: [HistoryKind; 2] = [HistoryKind::OnRamp, HistoryKind::P2p];

    pub fn cache_key(&self, user_id: &str) -> String {
        match self {
            HistoryKind::OnRamp => keys::on_ramp_history(user_id),
            HistoryKind::P2p => keys::p2p_history(user_id),
        }
    }
}

impl fmt::Display for HistoryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HistoryKind::OnRamp => write!(f, "on_ramp"),
            HistoryKind::P2p => write!(f, "p2p"),
        }
    }
}

/// Money direction from the list owner's point of view
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Direction {
    Credit,
    Debit,
}

/// The other side of a peer transfer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Counterparty {
    pub id: UserId,
    pub name: String,
}

impl From<&UserSummary> for Counterparty {
    fn from(user: &UserSummary) -> Self {
        Self {
            id: user.id.clone(),
            name: user.display_name(),
        }
    }
}

/// One cached activity line
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub id: RecordId,
    pub kind: HistoryKind,
    #[serde(rename = "type")]
    pub direction: Direction,
    /// Always positive; see [`HistoryEntry::signed_amount`]
    pub amount: Amount,
    pub status: TxStatus,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub counterparty: Option<Counterparty>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider: Option<String>,
}

impl HistoryEntry {
    pub fn from_on_ramp(txn: &OnRampTransaction) -> Self {
        Self {
            id: txn.id.clone(),
            kind: HistoryKind::OnRamp,
            direction: Direction::Credit,
            amount: txn.amount,
            status: txn.status,
            timestamp: txn.timestamp,
            counterparty: None,
            provider: Some(txn.provider.clone()),
        }
    }

    /// Entry for `owner`: a debit if they sent it, a credit otherwise
    pub fn from_transfer(view: &TransferView, owner: &str) -> Self {
        let (direction, other) = if view.record.from_user_id == owner {
            (Direction::Debit, &view.to_user)
        } else {
            (Direction::Credit, &view.from_user)
        };

        Self {
            id: view.record.id.clone(),
            kind: HistoryKind::P2p,
            direction,
            amount: view.record.amount,
            status: view.record.status,
            timestamp: view.record.timestamp,
            counterparty: Some(other.into()),
            provider: None,
        }
    }

    /// Negative for debits
    pub fn signed_amount(&self) -> Amount {
        match self.direction {
            Direction::Credit => self.amount,
            Direction::Debit => -self.amount,
        }
    }
}

#[derive(Clone)]
pub struct HistoryCache {
    ledger: Arc<dyn LedgerStore>,
    cache: Arc<dyn CacheStore>,
    ttl: Duration,
    max_len: usize,
}

impl HistoryCache {
    pub fn new(
        ledger: Arc<dyn LedgerStore>,
        cache: Arc<dyn CacheStore>,
        ttl: Duration,
        max_len: usize,
    ) -> Self {
        Self {
            ledger,
            cache,
            ttl,
            max_len: max_len.max(1),
        }
    }

    pub fn max_len(&self) -> usize {
        self.max_len
    }

    /// First `limit` entries of `kind`, newest first
    pub async fn get_history(
        &self,
        user_id: &str,
        kind: HistoryKind,
        limit: usize,
    ) -> Result<Vec<HistoryEntry>, WalletError> {
        if limit == 0 {
            return Ok(Vec::new());
        }

        let key = kind.cache_key(user_id);
        match self.cache.list_range(&key, 0, limit).await {
            Ok(items) if !items.is_empty() => {
                let entries = decode_entries(&key, items);
                if !entries.is_empty() {
                    return Ok(entries);
                }
            }
            Ok(_) => {}
            Err(e) => {
                warn!(key = %key, error = %e, "History cache unavailable, reading ledger");
                return self.load(user_id, kind, limit).await;
            }
        }

        // Miss: warm on demand, write back without waiting
        let mut entries = self.load(user_id, kind, self.max_len.max(limit)).await?;
        debug!(key = %key, count = entries.len(), "History cache miss, warming on demand");
        self.spawn_write_back(key, &entries);

        entries.truncate(limit);
        Ok(entries)
    }

    /// Both kinds merged, newest first
    pub async fn recent_activity(
        &self,
        user_id: &str,
        limit: usize,
    ) -> Result<Vec<HistoryEntry>, WalletError> {
        let (on_ramp, p2p) = futures::try_join!(
            self.get_history(user_id, HistoryKind::OnRamp, limit),
            self.get_history(user_id, HistoryKind::P2p, limit),
        )?;

        let mut merged: Vec<HistoryEntry> = on_ramp.into_iter().chain(p2p).collect();
        merged.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        merged.truncate(limit);
        Ok(merged)
    }

    /// Push one committed transaction to the front of its list.
    ///
    /// Creates a one-element list when the key is absent; a later miss on a
    /// fully expired list rebuilds it from the ledger.
    pub async fn add_history(&self, user_id: &str, entry: &HistoryEntry) {
        let key = entry.kind.cache_key(user_id);
        let raw = match serde_json::to_string(entry) {
            Ok(raw) => raw,
            Err(e) => {
                warn!(key = %key, error = %e, "Failed to encode history entry");
                return;
            }
        };

        if let Err(e) = self.cache.list_push_front(&key, raw, self.max_len).await {
            warn!(key = %key, error = %e, "Failed to append history entry");
        }
    }

    /// Rebuild the whole list from the ledger and wait for the write.
    ///
    /// Returns the number of cached entries.
    pub async fn warm_history(
        &self,
        user_id: &str,
        kind: HistoryKind,
    ) -> Result<usize, WalletError> {
        let key = kind.cache_key(user_id);
        let entries = self.load(user_id, kind, self.max_len).await?;

        if entries.is_empty() {
            self.cache.delete(&key).await?;
            return Ok(0);
        }

        let count = entries.len();
        self.cache
            .list_replace(&key, encode_entries(&entries), self.max_len, Some(self.ttl))
            .await?;
        Ok(count)
    }

    async fn load(
        &self,
        user_id: &str,
        kind: HistoryKind,
        limit: usize,
    ) -> Result<Vec<HistoryEntry>, WalletError> {
        let entries = match kind {
            HistoryKind::OnRamp => self
                .ledger
                .on_ramp_history(user_id, limit)
                .await?
                .iter()
                .map(HistoryEntry::from_on_ramp)
                .collect(),
            HistoryKind::P2p => self
                .ledger
                .transfer_history(user_id, limit)
                .await?
                .iter()
                .map(|view| HistoryEntry::from_transfer(view, user_id))
                .collect(),
        };
        Ok(entries)
    }

    fn spawn_write_back(&self, key: String, entries: &[HistoryEntry]) {
        if entries.is_empty() {
            return;
        }
        let cache = self.cache.clone();
        let items = encode_entries(entries);
        let max_len = self.max_len;
        let ttl = self.ttl;

        tokio::spawn(async move {
            if let Err(e) = cache.list_replace(&key, items, max_len, Some(ttl)).await {
                warn!(key = %key, error = %e, "Background history write-back failed");
            }
        });
    }
}

fn encode_entries(entries: &[HistoryEntry]) -> Vec<String> {
    entries
        .iter()
        .filter_map(|e| serde_json::to_string(e).ok())
        .collect()
}

fn decode_entries(key: &str, items: Vec<String>) -> Vec<HistoryEntry> {
    items
        .into_iter()
        .filter_map(|raw| match serde_json::from_str(&raw) {
            Ok(entry) => Some(entry),
            Err(e) => {
                warn!(key = %key, error = %e, "Skipping undecodable history entry");
                None
            }
        })
        .collect()
}
