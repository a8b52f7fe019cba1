//! PostgreSQL ledger store
//!
//! Every mutation is a single sqlx transaction. Returning early with an error
//! drops the transaction, which rolls it back.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Postgres, Row, Transaction};
use std::str::FromStr;
use std::time::Duration;

use super::{LedgerError, LedgerStore};
use crate::core_types::{Amount, UserId, new_record_id};
use crate::models::{
    Balance, Contact, OnRampTransaction, TransferRecord, TransferView, TxStatus, UserProfile,
    UserSummary,
};

const ON_RAMP_COLUMNS: &str = "id, user_id, amount, provider, token, status, timestamp";

/// Ledger store backed by PostgreSQL
pub struct PgLedger {
    pool: PgPool,
    lock_timeout: Duration,
}

impl PgLedger {
    pub fn new(pool: PgPool) -> Self {
        Self::with_lock_timeout(pool, Duration::from_secs(5))
    }

    /// Row locks wait at most `lock_timeout` before the transaction aborts
    pub fn with_lock_timeout(pool: PgPool, lock_timeout: Duration) -> Self {
        Self { pool, lock_timeout }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    async fn begin(&self) -> Result<Transaction<'static, Postgres>, LedgerError> {
        let mut tx = self.pool.begin().await?;
        // SET does not accept bind parameters
        let stmt = format!(
            "SET LOCAL lock_timeout = '{}ms'",
            self.lock_timeout.as_millis()
        );
        sqlx::query(&stmt).execute(&mut *tx).await?;
        Ok(tx)
    }

    async fn classify_missed_update(
        tx: &mut Transaction<'static, Postgres>,
        token: &str,
    ) -> LedgerError {
        let existing = sqlx::query("SELECT status FROM on_ramp_transactions WHERE token = $1")
            .bind(token)
            .fetch_optional(&mut **tx)
            .await;

        match existing {
            Ok(Some(_)) => LedgerError::AlreadyProcessed,
            Ok(None) => LedgerError::InvalidToken,
            Err(e) => LedgerError::Database(e),
        }
    }
}

fn parse_status(raw: &str) -> Result<TxStatus, LedgerError> {
    TxStatus::from_str(raw).map_err(LedgerError::Corrupt)
}

fn on_ramp_from_row(row: &PgRow) -> Result<OnRampTransaction, LedgerError> {
    let status: String = row.try_get("status")?;
    Ok(OnRampTransaction {
        id: row.try_get("id")?,
        user_id: row.try_get("user_id")?,
        amount: row.try_get("amount")?,
        provider: row.try_get("provider")?,
        token: row.try_get("token")?,
        status: parse_status(&status)?,
        timestamp: row.try_get("timestamp")?,
    })
}

fn transfer_view_from_row(row: &PgRow) -> Result<TransferView, LedgerError> {
    let status: String = row.try_get("status")?;
    let from_user_id: UserId = row.try_get("from_user_id")?;
    let to_user_id: UserId = row.try_get("to_user_id")?;

    Ok(TransferView {
        from_user: UserSummary {
            id: from_user_id.clone(),
            name: row.try_get("from_name")?,
            phone: row.try_get("from_phone")?,
        },
        to_user: UserSummary {
            id: to_user_id.clone(),
            name: row.try_get("to_name")?,
            phone: row.try_get("to_phone")?,
        },
        record: TransferRecord {
            id: row.try_get("id")?,
            from_user_id,
            to_user_id,
            amount: row.try_get("amount")?,
            timestamp: row.try_get("timestamp")?,
            status: parse_status(&status)?,
        },
    })
}

fn user_from_row(row: &PgRow) -> Result<UserSummary, LedgerError> {
    Ok(UserSummary {
        id: row.try_get("id")?,
        name: row.try_get("name")?,
        phone: row.try_get("phone")?,
    })
}

#[async_trait]
impl LedgerStore for PgLedger {
    fn name(&self) -> &'static str {
        "postgres"
    }

    async fn balance(&self, user_id: &str) -> Result<Option<Balance>, LedgerError> {
        let row = sqlx::query("SELECT amount, locked FROM balances WHERE user_id = $1")
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await?;

        row.map(|r| -> Result<Balance, LedgerError> {
            Ok(Balance::new(r.try_get("amount")?, r.try_get("locked")?))
        })
        .transpose()
    }

    async fn user(&self, user_id: &str) -> Result<Option<UserSummary>, LedgerError> {
        let row = sqlx::query("SELECT id, name, phone FROM users WHERE id = $1")
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(user_from_row).transpose()
    }

    async fn user_by_phone(&self, phone: &str) -> Result<Option<UserSummary>, LedgerError> {
        let row = sqlx::query("SELECT id, name, phone FROM users WHERE phone = $1")
            .bind(phone)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(user_from_row).transpose()
    }

    async fn user_ids(&self) -> Result<Vec<UserId>, LedgerError> {
        let ids = sqlx::query_scalar::<_, String>("SELECT id FROM users ORDER BY id")
            .fetch_all(&self.pool)
            .await?;
        Ok(ids)
    }

    async fn execute_transfer(
        &self,
        from: &str,
        to: &str,
        amount: Amount,
    ) -> Result<TransferRecord, LedgerError> {
        if from == to {
            return Err(LedgerError::SelfTransfer);
        }
        let mut tx = self.begin().await?;

        // Lock both rows in key order: contains the sender lock and cannot
        // deadlock against a concurrent transfer in the opposite direction.
        let rows = sqlx::query(
            "SELECT user_id, amount FROM balances
             WHERE user_id = $1 OR user_id = $2
             ORDER BY user_id
             FOR UPDATE",
        )
        .bind(from)
        .bind(to)
        .fetch_all(&mut *tx)
        .await?;

        let mut available = None;
        let mut recipient_exists = false;
        for row in &rows {
            let id: String = row.try_get("user_id")?;
            if id == from {
                available = Some(row.try_get::<i64, _>("amount")?);
            }
            if id == to {
                recipient_exists = true;
            }
        }

        let available = available.ok_or_else(|| LedgerError::AccountNotFound(from.to_string()))?;
        if !recipient_exists {
            return Err(LedgerError::AccountNotFound(to.to_string()));
        }
        if available < amount {
            return Err(LedgerError::InsufficientBalance);
        }

        sqlx::query("UPDATE balances SET amount = amount - $1 WHERE user_id = $2")
            .bind(amount)
            .bind(from)
            .execute(&mut *tx)
            .await?;

        sqlx::query("UPDATE balances SET amount = amount + $1 WHERE user_id = $2")
            .bind(amount)
            .bind(to)
            .execute(&mut *tx)
            .await?;

        let id = new_record_id();
        let timestamp: DateTime<Utc> = sqlx::query_scalar(
            "INSERT INTO p2p_transfers (id, from_user_id, to_user_id, amount, status, timestamp)
             VALUES ($1, $2, $3, $4, 'Success', NOW())
             RETURNING timestamp",
        )
        .bind(&id)
        .bind(from)
        .bind(to)
        .bind(amount)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;

        Ok(TransferRecord {
            id,
            from_user_id: from.to_string(),
            to_user_id: to.to_string(),
            amount,
            timestamp,
            status: TxStatus::Success,
        })
    }

    async fn insert_on_ramp(&self, txn: &OnRampTransaction) -> Result<(), LedgerError> {
        sqlx::query(
            "INSERT INTO on_ramp_transactions (id, user_id, amount, provider, token, status, timestamp)
             VALUES ($1, $2, $3, $4, $5, $6, $7)",
        )
        .bind(&txn.id)
        .bind(&txn.user_id)
        .bind(txn.amount)
        .bind(&txn.provider)
        .bind(&txn.token)
        .bind(txn.status.as_str())
        .bind(txn.timestamp)
        .execute(&self.pool)
        .await
        .map_err(|e| match e {
            sqlx::Error::Database(ref db) if db.is_foreign_key_violation() => {
                LedgerError::AccountNotFound(txn.user_id.clone())
            }
            other => LedgerError::Database(other),
        })?;
        Ok(())
    }

    async fn on_ramp_by_token(
        &self,
        token: &str,
    ) -> Result<Option<OnRampTransaction>, LedgerError> {
        let stmt = format!("SELECT {ON_RAMP_COLUMNS} FROM on_ramp_transactions WHERE token = $1");
        let row = sqlx::query(&stmt)
            .bind(token)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(on_ramp_from_row).transpose()
    }

    async fn confirm_on_ramp(&self, token: &str) -> Result<OnRampTransaction, LedgerError> {
        let mut tx = self.begin().await?;

        // Conditional update is the idempotence guard: a concurrent confirm
        // blocks on the row and then matches zero rows.
        let stmt = format!(
            "UPDATE on_ramp_transactions SET status = 'Success'
             WHERE token = $1 AND status = 'Processing'
             RETURNING {ON_RAMP_COLUMNS}"
        );
        let row = sqlx::query(&stmt)
            .bind(token)
            .fetch_optional(&mut *tx)
            .await?;

        let txn = match row {
            Some(row) => on_ramp_from_row(&row)?,
            None => return Err(Self::classify_missed_update(&mut tx, token).await),
        };

        let credited = sqlx::query("UPDATE balances SET amount = amount + $1 WHERE user_id = $2")
            .bind(txn.amount)
            .bind(&txn.user_id)
            .execute(&mut *tx)
            .await?
            .rows_affected();

        if credited != 1 {
            return Err(LedgerError::AccountNotFound(txn.user_id));
        }

        tx.commit().await?;
        Ok(txn)
    }

    async fn fail_on_ramp(&self, token: &str) -> Result<OnRampTransaction, LedgerError> {
        let mut tx = self.begin().await?;

        let stmt = format!(
            "UPDATE on_ramp_transactions SET status = 'Failure'
             WHERE token = $1 AND status = 'Processing'
             RETURNING {ON_RAMP_COLUMNS}"
        );
        let row = sqlx::query(&stmt)
            .bind(token)
            .fetch_optional(&mut *tx)
            .await?;

        let txn = match row {
            Some(row) => on_ramp_from_row(&row)?,
            None => return Err(Self::classify_missed_update(&mut tx, token).await),
        };

        tx.commit().await?;
        Ok(txn)
    }

    async fn on_ramp_history(
        &self,
        user_id: &str,
        limit: usize,
    ) -> Result<Vec<OnRampTransaction>, LedgerError> {
        let stmt = format!(
            "SELECT {ON_RAMP_COLUMNS} FROM on_ramp_transactions
             WHERE user_id = $1
             ORDER BY timestamp DESC, id DESC
             LIMIT $2"
        );
        let rows = sqlx::query(&stmt)
            .bind(user_id)
            .bind(limit as i64)
            .fetch_all(&self.pool)
            .await?;

        rows.iter().map(on_ramp_from_row).collect()
    }

    async fn transfer_history(
        &self,
        user_id: &str,
        limit: usize,
    ) -> Result<Vec<TransferView>, LedgerError> {
        let rows = sqlx::query(
            r#"
            SELECT t.id, t.from_user_id, t.to_user_id, t.amount, t.status, t.timestamp,
                   fu.name AS from_name, fu.phone AS from_phone,
                   tu.name AS to_name, tu.phone AS to_phone
            FROM p2p_transfers t
            JOIN users fu ON fu.id = t.from_user_id
            JOIN users tu ON tu.id = t.to_user_id
            WHERE t.from_user_id = $1 OR t.to_user_id = $1
            ORDER BY t.timestamp DESC, t.id DESC
            LIMIT $2
            "#,
        )
        .bind(user_id)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(transfer_view_from_row).collect()
    }

    async fn contacts(&self, user_id: &str) -> Result<Vec<Contact>, LedgerError> {
        let rows = sqlx::query(
            "SELECT id, name, phone, email, image FROM users
             WHERE id <> $1
             ORDER BY name ASC NULLS LAST, id",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|r| -> Result<Contact, LedgerError> {
                Ok(Contact {
                    id: r.try_get("id")?,
                    name: r.try_get("name")?,
                    phone: r.try_get("phone")?,
                    email: r.try_get("email")?,
                    image: r.try_get("image")?,
                })
            })
            .collect()
    }

    async fn profile(&self, user_id: &str) -> Result<Option<UserProfile>, LedgerError> {
        let row = sqlx::query("SELECT name, email, phone, image FROM users WHERE id = $1")
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await?;

        row.map(|r| -> Result<UserProfile, LedgerError> {
            Ok(UserProfile {
                name: r.try_get("name")?,
                email: r.try_get("email")?,
                phone: r.try_get("phone")?,
                image: r.try_get("image")?,
            })
        })
        .transpose()
    }
}
