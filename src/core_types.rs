//! Core types used throughout the wallet
//!
//! These are fundamental type aliases used by all modules.
//! They provide semantic meaning and enable future type evolution.

/// User ID - globally unique, immutable after assignment.
///
/// # Usage:
/// - Primary key for users and their balance row
/// - Embedded in every cache key (`balance:{user_id}`, ...)
pub type UserId = String;

/// Amount in minor currency units (paisa / cents).
///
/// # Constraints:
/// - Balances are never negative
/// - Transfer and top-up amounts are strictly positive
///
/// Signed so it maps 1:1 onto PostgreSQL `BIGINT`.
pub type Amount = i64;

/// Transfer / on-ramp record id (ULID, lexicographically time-ordered)
pub type RecordId = String;

/// One-time idempotency token of an on-ramp transaction
pub type Token = String;

/// Generate a new record id
pub fn new_record_id() -> RecordId {
    ulid::Ulid::new().to_string()
}

/// Generate a new on-ramp token
pub fn new_token() -> Token {
    uuid::Uuid::new_v4().simple().to_string()
}
