//! PostgreSQL schema for the wallet ledger
//!
//! Users and their balance rows are provisioned by the signup flow; this crate
//! only creates the tables so a fresh database is usable.

use sqlx::PgPool;

pub const CREATE_USERS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS users (
    id     TEXT PRIMARY KEY,
    name   TEXT,
    email  TEXT UNIQUE,
    phone  TEXT UNIQUE,
    image  TEXT
)
"#;

pub const CREATE_BALANCES_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS balances (
    user_id  TEXT PRIMARY KEY REFERENCES users(id),
    amount   BIGINT NOT NULL CHECK (amount >= 0),
    locked   BIGINT NOT NULL DEFAULT 0 CHECK (locked >= 0)
)
"#;

pub const CREATE_P2P_TRANSFERS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS p2p_transfers (
    id            TEXT PRIMARY KEY,
    from_user_id  TEXT NOT NULL REFERENCES users(id),
    to_user_id    TEXT NOT NULL REFERENCES users(id),
    amount        BIGINT NOT NULL CHECK (amount > 0),
    status        TEXT NOT NULL DEFAULT 'Success',
    timestamp     TIMESTAMPTZ NOT NULL DEFAULT NOW()
)
"#;

pub const CREATE_ON_RAMP_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS on_ramp_transactions (
    id         TEXT PRIMARY KEY,
    user_id    TEXT NOT NULL REFERENCES users(id),
    amount     BIGINT NOT NULL CHECK (amount > 0),
    provider   TEXT NOT NULL,
    token      TEXT NOT NULL UNIQUE,
    status     TEXT NOT NULL CHECK (status IN ('Processing', 'Success', 'Failure')),
    timestamp  TIMESTAMPTZ NOT NULL DEFAULT NOW()
)
"#;

const CREATE_INDEXES: [&str; 3] = [
    "CREATE INDEX IF NOT EXISTS idx_p2p_from ON p2p_transfers (from_user_id, timestamp DESC)",
    "CREATE INDEX IF NOT EXISTS idx_p2p_to ON p2p_transfers (to_user_id, timestamp DESC)",
    "CREATE INDEX IF NOT EXISTS idx_on_ramp_user ON on_ramp_transactions (user_id, timestamp DESC)",
];

/// Initialize the wallet schema
pub async fn init_schema(pool: &PgPool) -> Result<(), sqlx::Error> {
    tracing::info!("Initializing wallet schema...");

    for ddl in [
        CREATE_USERS_TABLE,
        CREATE_BALANCES_TABLE,
        CREATE_P2P_TRANSFERS_TABLE,
        CREATE_ON_RAMP_TABLE,
    ] {
        sqlx::query(ddl).execute(pool).await?;
    }

    for ddl in CREATE_INDEXES {
        sqlx::query(ddl).execute(pool).await?;
    }

    tracing::info!("Wallet schema initialized successfully");
    Ok(())
}
