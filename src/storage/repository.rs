use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqliteRow};
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

use crate::domain::{
    Account, Balances, Currency, Transaction, TransactionId, TransactionKind,
};

use super::MIGRATION_001_INITIAL;

const TRANSACTION_COLUMNS: &str = "id, sequence, kind, description, amount_cents, currency, usdt_used, delta_stable, delta_fiat, timestamp";

/// A transaction waiting to be written, together with the balances it was
/// computed from.
#[derive(Debug, Clone)]
pub struct PendingEntry {
    pub user_id: String,
    /// Balances read before computing the transaction
    pub expected: Balances,
    pub transaction: Transaction,
}

/// Outcome of [`Repository::commit`].
#[derive(Debug)]
pub enum CommitOutcome {
    /// Every entry was written; transactions carry their assigned sequence.
    Committed(Vec<Transaction>),
    /// This account's balances no longer match what was read. Nothing was written.
    Stale(String),
    /// A uniqueness rule rejected this account's transaction, such as a second
    /// referral bonus. Nothing was written.
    Duplicate {
        user_id: String,
        kind: TransactionKind,
    },
}

/// Repository for persisting and querying accounts and their transactions.
pub struct Repository {
    pool: SqlitePool,
}

impl Repository {
    /// Create a new repository with the given SQLite connection pool.
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Connect to a SQLite database at the given URL.
    /// Writers wait up to `busy_timeout` for a locked database before failing.
    pub async fn connect(database_url: &str, busy_timeout: Duration) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(database_url)
            .context("Invalid database URL")?
            .busy_timeout(busy_timeout)
            .foreign_keys(true);
        let pool = SqlitePool::connect_with(options)
            .await
            .context("Failed to connect to database")?;
        Ok(Self::new(pool))
    }

    /// Run database migrations.
    pub async fn migrate(&self) -> Result<()> {
        sqlx::query(MIGRATION_001_INITIAL)
            .execute(&self.pool)
            .await
            .context("Failed to run migration 001")?;
        Ok(())
    }

    /// Initialize a new database (connect + migrate).
    pub async fn init(database_url: &str, busy_timeout: Duration) -> Result<Self> {
        let repo = Self::connect(database_url, busy_timeout).await?;
        repo.migrate().await?;
        Ok(repo)
    }

    // ========================
    // Account operations
    // ========================

    /// Save a new account and its existing history in one transaction.
    pub async fn create_account(&self, account: &Account, history: &[Transaction]) -> Result<()> {
        let mut tx = self.pool.begin().await.context("Failed to begin transaction")?;

        sqlx::query(
            r#"
            INSERT INTO accounts (user_id, opening_stable, opening_fiat, stable_cents, fiat_cents, created_at)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&account.user_id)
        .bind(account.opening.stable)
        .bind(account.opening.fiat)
        .bind(account.balances.stable)
        .bind(account.balances.fiat)
        .bind(account.created_at.to_rfc3339())
        .execute(&mut *tx)
        .await
        .context("Failed to save account")?;

        for txn in history {
            Self::insert_transaction(&mut tx, &account.user_id, txn).await?;
        }

        tx.commit().await.context("Failed to commit account")?;
        Ok(())
    }

    /// Every account's user id, in creation order.
    pub async fn list_user_ids(&self) -> Result<Vec<String>> {
        let rows = sqlx::query("SELECT user_id FROM accounts ORDER BY created_at, user_id")
            .fetch_all(&self.pool)
            .await
            .context("Failed to list accounts")?;

        Ok(rows.iter().map(|row| row.get("user_id")).collect())
    }

    /// Get an account by user id.
    pub async fn get_account(&self, user_id: &str) -> Result<Option<Account>> {
        let row = sqlx::query(
            r#"
            SELECT user_id, opening_stable, opening_fiat, stable_cents, fiat_cents, created_at
            FROM accounts
            WHERE user_id = ?
            "#,
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await
        .context("Failed to fetch account")?;

        match row {
            Some(row) => Ok(Some(Self::row_to_account(&row)?)),
            None => Ok(None),
        }
    }

    fn row_to_account(row: &SqliteRow) -> Result<Account> {
        let created_at_str: String = row.get("created_at");

        Ok(Account {
            user_id: row.get("user_id"),
            opening: Balances::new(row.get("opening_stable"), row.get("opening_fiat")),
            balances: Balances::new(row.get("stable_cents"), row.get("fiat_cents")),
            created_at: DateTime::parse_from_rfc3339(&created_at_str)
                .context("Invalid created_at timestamp")?
                .with_timezone(&Utc),
        })
    }

    // ========================
    // Ledger writes
    // ========================

    /// Apply every entry atomically: compare-and-swap each account's balances
    /// against `expected`, then append its transaction with the next sequence.
    pub async fn commit(&self, entries: &[PendingEntry]) -> Result<CommitOutcome> {
        let mut tx = self.pool.begin().await.context("Failed to begin transaction")?;
        let mut committed = Vec::with_capacity(entries.len());

        for entry in entries {
            let next = entry
                .expected
                .checked_add(entry.transaction.delta)
                .context("Balance overflow")?;

            let updated = sqlx::query(
                r#"
                UPDATE accounts
                SET stable_cents = ?, fiat_cents = ?
                WHERE user_id = ? AND stable_cents = ? AND fiat_cents = ?
                "#,
            )
            .bind(next.stable)
            .bind(next.fiat)
            .bind(&entry.user_id)
            .bind(entry.expected.stable)
            .bind(entry.expected.fiat)
            .execute(&mut *tx)
            .await
            .context("Failed to update balances")?;

            if updated.rows_affected() == 0 {
                tx.rollback().await.context("Failed to roll back")?;
                return Ok(CommitOutcome::Stale(entry.user_id.clone()));
            }

            let mut txn = entry.transaction.clone();
            txn.sequence = Self::next_sequence(&mut tx, &entry.user_id).await?;
            if let Err(err) = Self::insert_transaction(&mut tx, &entry.user_id, &txn).await {
                if !is_unique_violation(&err) {
                    return Err(err);
                }
                tx.rollback().await.context("Failed to roll back")?;
                return Ok(CommitOutcome::Duplicate {
                    user_id: entry.user_id.clone(),
                    kind: txn.kind,
                });
            }
            committed.push(txn);
        }

        tx.commit().await.context("Failed to commit transaction")?;
        Ok(CommitOutcome::Committed(committed))
    }

    async fn next_sequence(
        tx: &mut sqlx::Transaction<'_, sqlx::Sqlite>,
        user_id: &str,
    ) -> Result<i64> {
        let row = sqlx::query(
            "SELECT COALESCE(MAX(sequence), 0) + 1 AS next FROM transactions WHERE user_id = ?",
        )
        .bind(user_id)
        .fetch_one(&mut **tx)
        .await
        .context("Failed to get next sequence number")?;

        Ok(row.get("next"))
    }

    async fn insert_transaction(
        tx: &mut sqlx::Transaction<'_, sqlx::Sqlite>,
        user_id: &str,
        txn: &Transaction,
    ) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO transactions (id, user_id, sequence, kind, description, amount_cents, currency, usdt_used, delta_stable, delta_fiat, timestamp)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(txn.id.to_string())
        .bind(user_id)
        .bind(txn.sequence)
        .bind(txn.kind.as_str())
        .bind(&txn.description)
        .bind(txn.amount_cents)
        .bind(txn.currency.as_str())
        .bind(txn.usdt_used)
        .bind(txn.delta.stable)
        .bind(txn.delta.fiat)
        .bind(txn.timestamp.to_rfc3339())
        .execute(&mut **tx)
        .await
        .context("Failed to save transaction")?;
        Ok(())
    }

    // ========================
    // Transaction queries
    // ========================

    /// List an account's transactions, newest first.
    pub async fn list_transactions(
        &self,
        user_id: &str,
        limit: Option<usize>,
    ) -> Result<Vec<Transaction>> {
        let mut query = format!(
            "SELECT {} FROM transactions WHERE user_id = ? ORDER BY sequence DESC",
            TRANSACTION_COLUMNS
        );
        if let Some(lim) = limit {
            query.push_str(&format!(" LIMIT {}", lim));
        }

        let rows = sqlx::query(&query)
            .bind(user_id)
            .fetch_all(&self.pool)
            .await
            .context("Failed to list transactions")?;

        rows.iter().map(Self::row_to_transaction).collect()
    }

    /// Full history in the order it was applied, for replay and integrity checks.
    pub async fn load_history(&self, user_id: &str) -> Result<Vec<Transaction>> {
        let query = format!(
            "SELECT {} FROM transactions WHERE user_id = ? ORDER BY sequence",
            TRANSACTION_COLUMNS
        );
        let rows = sqlx::query(&query)
            .bind(user_id)
            .fetch_all(&self.pool)
            .await
            .context("Failed to load history")?;

        rows.iter().map(Self::row_to_transaction).collect()
    }

    /// Get one of an account's transactions by id.
    pub async fn get_transaction(
        &self,
        user_id: &str,
        id: TransactionId,
    ) -> Result<Option<Transaction>> {
        let query = format!(
            "SELECT {} FROM transactions WHERE user_id = ? AND id = ?",
            TRANSACTION_COLUMNS
        );
        let row = sqlx::query(&query)
            .bind(user_id)
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await
            .context("Failed to fetch transaction")?;

        match row {
            Some(row) => Ok(Some(Self::row_to_transaction(&row)?)),
            None => Ok(None),
        }
    }

    /// Whether the account has any transaction of this kind.
    pub async fn has_transaction_kind(&self, user_id: &str, kind: TransactionKind) -> Result<bool> {
        let row = sqlx::query(
            "SELECT EXISTS(SELECT 1 FROM transactions WHERE user_id = ? AND kind = ?) AS found",
        )
        .bind(user_id)
        .bind(kind.as_str())
        .fetch_one(&self.pool)
        .await
        .context("Failed to query transactions")?;

        Ok(row.get::<i64, _>("found") != 0)
    }

    fn row_to_transaction(row: &SqliteRow) -> Result<Transaction> {
        let id_str: String = row.get("id");
        let kind_str: String = row.get("kind");
        let currency_str: String = row.get("currency");
        let timestamp_str: String = row.get("timestamp");

        Ok(Transaction {
            id: Uuid::parse_str(&id_str).context("Invalid transaction ID")?,
            sequence: row.get("sequence"),
            kind: TransactionKind::from_str(&kind_str)
                .ok_or_else(|| anyhow::anyhow!("Invalid transaction kind: {}", kind_str))?,
            description: row.get("description"),
            amount_cents: row.get("amount_cents"),
            currency: Currency::from_str(&currency_str)
                .ok_or_else(|| anyhow::anyhow!("Invalid currency: {}", currency_str))?,
            usdt_used: row.get("usdt_used"),
            delta: Balances::new(row.get("delta_stable"), row.get("delta_fiat")),
            timestamp: DateTime::parse_from_rfc3339(&timestamp_str)
                .context("Invalid timestamp")?
                .with_timezone(&Utc),
        })
    }
}

fn is_unique_violation(err: &anyhow::Error) -> bool {
    matches!(
        err.downcast_ref::<sqlx::Error>(),
        Some(sqlx::Error::Database(db_err)) if db_err.is_unique_violation()
    )
}
