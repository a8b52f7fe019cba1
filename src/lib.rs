//! Okane - Digital Wallet Core
//!
//! Balances, bank top-ups and peer-to-peer transfers over a transactional
//! ledger, with a read-through cache kept coherent by post-commit
//! invalidation.
//!
//! # Modules
//!
//! - [`core_types`] - Id and amount aliases
//! - [`models`] - Ledger records (balances, transfers, top-ups, profiles)
//! - [`error`] - `WalletError` returned at the engine boundary
//! - [`ledger`] - `LedgerStore` trait, PostgreSQL and in-memory stores
//! - [`cache`] - `CacheStore` trait and the balance/history/contacts/profile managers
//! - [`identity`] - Session context and recipient resolution
//! - [`transfer`] - Transfer Engine
//! - [`onramp`] - Top-up Engine
//! - [`warmer`] - Cache Warmer
//! - [`wallet`] - Everything above wired to one ledger and one cache
//! - [`db`] - PostgreSQL pool and schema
//! - [`config`] / [`logging`] - Service configuration and tracing setup

// Core types - must be first!
pub mod core_types;

pub mod models;
pub mod error;

// Storage
pub mod cache;
pub mod db;
pub mod ledger;

// Engines
pub mod identity;
pub mod onramp;
pub mod transfer;
pub mod wallet;
pub mod warmer;

// Service plumbing
pub mod config;
pub mod logging;

// Convenient re-exports at crate root
pub use cache::{
    BalanceCache, CacheStore, ContactsCache, HistoryCache, HistoryEntry, HistoryKind,
    MemoryCache, ProfileCache,
};
pub use core_types::{Amount, RecordId, Token, UserId};
pub use error::{OpResponse, WalletError};
pub use identity::{LedgerRecipientResolver, RecipientResolver, Session};
pub use ledger::{LedgerError, LedgerStore, MemoryLedger, PgLedger};
pub use models::{Balance, OnRampTransaction, TransferRecord, TxStatus};
pub use onramp::OnRampEngine;
pub use transfer::TransferEngine;
pub use wallet::Wallet;
pub use warmer::{CacheWarmer, WarmReport, WarmerConfig};
