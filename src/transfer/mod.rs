//! Peer-to-peer transfers
//!
//! # Flow
//!
//! ```text
//! resolve sender + recipient (read-only)
//!   -> ledger transaction: lock both balance rows, check, debit, credit, record
//!   -> commit
//!   -> invalidate both balances + append both histories (concurrently)
//!   -> background balance refresh for both
//! ```
//!
//! Everything before commit fails with no side effects. Everything after
//! commit is best-effort and only logged.

pub mod engine;

pub use engine::TransferEngine;
