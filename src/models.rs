//! Ledger data model
//!
//! Durable records owned by the ledger store. Cached projections of these
//! live in [`crate::cache`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::core_types::{Amount, RecordId, Token, UserId};

/// Account balance snapshot
///
/// `amount` is spendable, `locked` is reserved. Both are minor units.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Balance {
    pub amount: Amount,
    pub locked: Amount,
}

impl Balance {
    pub fn new(amount: Amount, locked: Amount) -> Self {
        Self { amount, locked }
    }

    pub fn total(&self) -> Amount {
        self.amount + self.locked
    }
}

/// Minimal user identity used for transfers and history entries
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserSummary {
    pub id: UserId,
    pub name: Option<String>,
    pub phone: Option<String>,
}

impl UserSummary {
    /// Name shown to the counterparty, falls back to `User {id}`
    pub fn display_name(&self) -> String {
        match &self.name {
            Some(name) if !name.is_empty() => name.clone(),
            _ => format!("User {}", self.id),
        }
    }
}

/// Immutable peer-to-peer transfer record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferRecord {
    pub id: RecordId,
    pub from_user_id: UserId,
    pub to_user_id: UserId,
    pub amount: Amount,
    pub timestamp: DateTime<Utc>,
    pub status: TxStatus,
}

/// Transfer record joined with both parties' display data
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferView {
    pub record: TransferRecord,
    pub from_user: UserSummary,
    pub to_user: UserSummary,
}

/// Transaction status shared by on-ramp transactions and transfer records
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TxStatus {
    Processing,
    Success,
    Failure,
}

impl TxStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TxStatus::Processing => "Processing",
            TxStatus::Success => "Success",
            TxStatus::Failure => "Failure",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, TxStatus::Processing)
    }
}

impl fmt::Display for TxStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TxStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Processing" => Ok(TxStatus::Processing),
            "Success" => Ok(TxStatus::Success),
            "Failure" => Ok(TxStatus::Failure),
            _ => Err(format!("Invalid transaction status: {}", s)),
        }
    }
}

/// Top-up (on-ramp) transaction
///
/// Created `Processing`, moves to `Success` or `Failure` exactly once.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OnRampTransaction {
    pub id: RecordId,
    pub user_id: UserId,
    pub amount: Amount,
    pub provider: String,
    pub token: Token,
    pub status: TxStatus,
    pub timestamp: DateTime<Utc>,
}

/// Another user as shown in the contact list
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Contact {
    pub id: UserId,
    pub name: Option<String>,
    pub phone: Option<String>,
    pub email: Option<String>,
    pub image: Option<String>,
}

/// Editable profile fields of a user
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    pub name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub image: Option<String>,
}

/// Partial profile update, `None` leaves a field untouched
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProfilePatch {
    pub name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub image: Option<String>,
}

impl UserProfile {
    pub fn apply(&mut self, patch: ProfilePatch) {
        if patch.name.is_some() {
            self.name = patch.name;
        }
        if patch.email.is_some() {
            self.email = patch.email;
        }
        if patch.phone.is_some() {
            self.phone = patch.phone;
        }
        if patch.image.is_some() {
            self.image = patch.image;
        }
    }
}
