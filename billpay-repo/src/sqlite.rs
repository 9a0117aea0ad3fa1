//! SQLite repository adapter.

use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{SqliteConnection, SqlitePool};
use tracing::{debug, info, warn};

use billpay_types::{
    Account, AccountId, Amount, ApiKey, BalanceEffect, DomainError, LedgerRepository, NewAccount,
    Recorded, RepoError, SpendingSummary, Transaction, TransactionId, TransactionKind,
    TransactionUpdate,
};

use crate::security::{generate_api_key, hash_api_key};
use crate::types::{
    ACCOUNT_COLUMNS, API_KEY_COLUMNS, SqliteAccount, SqliteApiKey, SqliteTransaction,
    TRANSACTION_COLUMNS, check_update, format_ts, is_unique_violation, map_sqlx_error,
};

// ─────────────────────────────────────────────────────────────────────────────
// SQLite Repository
// ─────────────────────────────────────────────────────────────────────────────

/// SQLite repository implementation.
pub struct SqliteRepo {
    pool: SqlitePool,
}

/// Executes SQL statements from a migration file, splitting by semicolons.
async fn execute_migration(pool: &SqlitePool, sql: &str, name: &str) -> anyhow::Result<()> {
    for statement in sql.split(';') {
        let stmt = statement.trim();
        if !stmt.is_empty() {
            sqlx::query(stmt)
                .execute(pool)
                .await
                .map_err(|e| anyhow::anyhow!("Migration {} failed: {}", name, e))?;
        }
    }
    Ok(())
}

/// Runs all database migrations.
async fn run_migrations(pool: &SqlitePool) -> anyhow::Result<()> {
    execute_migration(
        pool,
        include_str!("../migrations/0001_create_ledger.sql"),
        "0001",
    )
    .await?;

    execute_migration(
        pool,
        include_str!("../migrations/0002_create_api_keys.sql"),
        "0002",
    )
    .await?;

    Ok(())
}

impl SqliteRepo {
    /// Creates a new SQLite repository with automatic migration.
    ///
    /// In-memory databases live and die with a connection, so they get a
    /// single connection that is never recycled.
    pub async fn new(database_url: &str) -> anyhow::Result<Self> {
        // Ensure on-disk SQLite target directory exists (no-op for in-memory).
        if let Some(path) = database_url.strip_prefix("sqlite://") {
            let path = path.split('?').next().unwrap_or(path);
            if path != ":memory:" {
                let p = std::path::Path::new(path);
                if let Some(parent) = p.parent().filter(|p| !p.as_os_str().is_empty()) {
                    tokio::fs::create_dir_all(parent).await?;
                }
            }
        }

        let in_memory = database_url.contains(":memory:") || database_url.contains("mode=memory");
        let options = SqliteConnectOptions::from_str(database_url)?
            .create_if_missing(true)
            .foreign_keys(true)
            .busy_timeout(Duration::from_secs(5));

        let pool = if in_memory {
            SqlitePoolOptions::new()
                .max_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
                .connect_with(options)
                .await?
        } else {
            SqlitePoolOptions::new()
                .max_connections(5)
                .connect_with(options)
                .await?
        };

        run_migrations(&pool).await?;
        info!(in_memory, "sqlite ledger ready");
        Ok(Self { pool })
    }

    /// Returns a reference to the connection pool.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    async fn fetch_transaction(
        conn: &mut SqliteConnection,
        column: &str,
        value: &str,
    ) -> Result<Option<Transaction>, RepoError> {
        let sql = format!("SELECT {TRANSACTION_COLUMNS} FROM transactions WHERE {column} = ?");
        let row: Option<SqliteTransaction> = sqlx::query_as(&sql)
            .bind(value)
            .fetch_optional(&mut *conn)
            .await
            .map_err(|e| RepoError::Database(e.to_string()))?;

        row.map(SqliteTransaction::into_domain).transpose()
    }

    async fn balance_of(
        conn: &mut SqliteConnection,
        id: AccountId,
    ) -> Result<Option<Amount>, RepoError> {
        let row: Option<(i64,)> = sqlx::query_as("SELECT balance FROM accounts WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&mut *conn)
            .await
            .map_err(|e| RepoError::Database(e.to_string()))?;

        row.map(|(b,)| Amount::from_minor(b).map_err(RepoError::Domain))
            .transpose()
    }

    /// Debits only if the balance covers the amount.
    async fn guarded_debit(
        conn: &mut SqliteConnection,
        id: AccountId,
        amount: Amount,
    ) -> Result<Amount, RepoError> {
        let row: Option<(i64,)> = sqlx::query_as(
            r#"UPDATE accounts SET balance = balance - ?, updated_at = ?
               WHERE id = ? AND balance >= ?
               RETURNING balance"#,
        )
        .bind(amount.to_minor())
        .bind(format_ts(Utc::now()))
        .bind(id.to_string())
        .bind(amount.to_minor())
        .fetch_optional(&mut *conn)
        .await
        .map_err(|e| RepoError::Database(e.to_string()))?;

        match row {
            Some((balance,)) => Amount::from_minor(balance).map_err(RepoError::Domain),
            None => match Self::balance_of(conn, id).await? {
                Some(available) => Err(RepoError::Domain(DomainError::InsufficientFunds {
                    available,
                    requested: amount,
                })),
                None => Err(RepoError::NotFound),
            },
        }
    }

    async fn apply_credit(
        conn: &mut SqliteConnection,
        id: AccountId,
        amount: Amount,
    ) -> Result<Amount, RepoError> {
        let row: Option<(i64,)> = sqlx::query_as(
            r#"UPDATE accounts SET balance = balance + ?, updated_at = ?
               WHERE id = ? AND balance <= ?
               RETURNING balance"#,
        )
        .bind(amount.to_minor())
        .bind(format_ts(Utc::now()))
        .bind(id.to_string())
        .bind(i64::MAX - amount.to_minor())
        .fetch_optional(&mut *conn)
        .await
        .map_err(|e| RepoError::Database(e.to_string()))?;

        match row {
            Some((balance,)) => Amount::from_minor(balance).map_err(RepoError::Domain),
            None => match Self::balance_of(conn, id).await? {
                Some(_) => Err(RepoError::Domain(DomainError::InvalidAmount(
                    "credit would exceed the maximum balance".into(),
                ))),
                None => Err(RepoError::NotFound),
            },
        }
    }

    /// Status write and balance effect; runs inside the caller's transaction.
    async fn settle(
        conn: &mut SqliteConnection,
        id: TransactionId,
        update: &TransactionUpdate,
    ) -> Result<Transaction, RepoError> {
        let id_str = id.to_string();
        let response = update.provider_response.as_ref().map(|v| v.to_string());

        let owner: Option<(String,)> = sqlx::query_as(
            r#"UPDATE transactions
               SET status = ?,
                   provider_response = COALESCE(?, provider_response),
                   provider_reference = COALESCE(?, provider_reference),
                   provider_request_id = COALESCE(?, provider_request_id),
                   updated_at = ?
               WHERE id = ? AND status = 'pending'
               RETURNING account_id"#,
        )
        .bind(update.status.as_str())
        .bind(response)
        .bind(&update.provider_reference)
        .bind(&update.provider_request_id)
        .bind(format_ts(Utc::now()))
        .bind(&id_str)
        .fetch_optional(&mut *conn)
        .await
        .map_err(|e| RepoError::Database(e.to_string()))?;

        let Some((owner,)) = owner else {
            return match Self::fetch_transaction(conn, "id", &id_str).await? {
                Some(current) => Err(RepoError::Domain(DomainError::InvalidTransition {
                    from: current.status,
                    to: update.status,
                })),
                None => Err(RepoError::NotFound),
            };
        };
        let account_id = AccountId::from_uuid(crate::types::parse_uuid(&owner)?);

        match update.balance_effect {
            BalanceEffect::None => {}
            BalanceEffect::Debit(amount) => {
                Self::guarded_debit(conn, account_id, amount).await?;
            }
            BalanceEffect::Credit(amount) => {
                Self::apply_credit(conn, account_id, amount).await?;
            }
        }

        Self::fetch_transaction(conn, "id", &id_str)
            .await?
            .ok_or(RepoError::NotFound)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Repository implementation
// ─────────────────────────────────────────────────────────────────────────────

#[async_trait]
impl LedgerRepository for SqliteRepo {
    async fn create_account(&self, req: NewAccount) -> Result<Account, RepoError> {
        let account = Account::new(req)?;

        sqlx::query(
            r#"INSERT INTO accounts (id, name, email, phone, balance, pin_hash, created_at, updated_at)
               VALUES (?, ?, ?, ?, 0, NULL, ?, ?)"#,
        )
        .bind(account.id.to_string())
        .bind(&account.name)
        .bind(&account.email)
        .bind(&account.phone)
        .bind(format_ts(account.created_at))
        .bind(format_ts(account.updated_at))
        .execute(&self.pool)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                RepoError::Conflict(format!("Email already registered: {}", account.email))
            } else {
                map_sqlx_error(e)
            }
        })?;

        self.get_account(account.id).await?.ok_or(RepoError::NotFound)
    }

    async fn get_account(&self, id: AccountId) -> Result<Option<Account>, RepoError> {
        let sql = format!("SELECT {ACCOUNT_COLUMNS} FROM accounts WHERE id = ?");
        let row: Option<SqliteAccount> = sqlx::query_as(&sql)
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| RepoError::Database(e.to_string()))?;

        row.map(SqliteAccount::into_domain).transpose()
    }

    async fn set_pin(&self, id: AccountId, pin_hash: &str) -> Result<Account, RepoError> {
        let result = sqlx::query(
            r#"UPDATE accounts SET pin_hash = ?, updated_at = ?
               WHERE id = ? AND pin_hash IS NULL"#,
        )
        .bind(pin_hash)
        .bind(format_ts(Utc::now()))
        .bind(id.to_string())
        .execute(&self.pool)
        .await
        .map_err(|e| RepoError::Database(e.to_string()))?;

        let account = self.get_account(id).await?.ok_or(RepoError::NotFound)?;
        if result.rows_affected() == 0 {
            return Err(RepoError::Conflict("PIN already set".into()));
        }
        Ok(account)
    }

    async fn get_balance(&self, id: AccountId) -> Result<Amount, RepoError> {
        let mut conn = self
            .pool
            .acquire()
            .await
            .map_err(|e| RepoError::Database(e.to_string()))?;
        Self::balance_of(&mut conn, id)
            .await?
            .ok_or(RepoError::NotFound)
    }

    async fn debit(&self, id: AccountId, amount: Amount) -> Result<Amount, RepoError> {
        let mut conn = self
            .pool
            .acquire()
            .await
            .map_err(|e| RepoError::Database(e.to_string()))?;
        Self::guarded_debit(&mut conn, id, amount).await
    }

    async fn credit(&self, id: AccountId, amount: Amount) -> Result<Amount, RepoError> {
        let mut conn = self
            .pool
            .acquire()
            .await
            .map_err(|e| RepoError::Database(e.to_string()))?;
        Self::apply_credit(&mut conn, id, amount).await
    }

    async fn create_transaction(&self, tx: Transaction) -> Result<Recorded, RepoError> {
        let response = tx.provider_response.as_ref().map(|v| v.to_string());

        let inserted = sqlx::query(
            r#"INSERT INTO transactions (id, account_id, kind, service_id, amount, recipient_phone,
                   recipient_email, request_id, idempotency_key, provider_request_id,
                   provider_reference, status, provider_response, created_at, updated_at)
               VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"#,
        )
        .bind(tx.id.to_string())
        .bind(tx.account_id.to_string())
        .bind(tx.kind.as_str())
        .bind(&tx.service_id)
        .bind(tx.amount.to_minor())
        .bind(&tx.recipient_phone)
        .bind(&tx.recipient_email)
        .bind(&tx.request_id)
        .bind(&tx.idempotency_key)
        .bind(&tx.provider_request_id)
        .bind(&tx.provider_reference)
        .bind(tx.status.as_str())
        .bind(response)
        .bind(format_ts(tx.created_at))
        .bind(format_ts(tx.updated_at))
        .execute(&self.pool)
        .await;

        match inserted {
            Ok(_) => self
                .get_transaction(tx.id)
                .await?
                .map(Recorded::Created)
                .ok_or(RepoError::NotFound),
            Err(e) if is_unique_violation(&e) => {
                let existing = match self.find_by_request_id(&tx.request_id).await? {
                    Some(found) => Some(found),
                    None => match tx.idempotency_key.as_deref() {
                        Some(key) => self.find_by_idempotency_key(key).await?,
                        None => None,
                    },
                };
                debug!(request_id = %tx.request_id, found = existing.is_some(), "duplicate transaction insert");
                existing
                    .map(Recorded::Existing)
                    .ok_or_else(|| RepoError::Conflict(e.to_string()))
            }
            Err(e) => Err(map_sqlx_error(e)),
        }
    }

    async fn update_transaction_status(
        &self,
        id: TransactionId,
        update: TransactionUpdate,
    ) -> Result<Transaction, RepoError> {
        check_update(&update)?;

        let mut db_tx = self
            .pool
            .begin()
            .await
            .map_err(|e| RepoError::Transaction(e.to_string()))?;

        match Self::settle(&mut db_tx, id, &update).await {
            Ok(tx) => {
                db_tx
                    .commit()
                    .await
                    .map_err(|e| RepoError::Transaction(e.to_string()))?;
                Ok(tx)
            }
            Err(err) => {
                warn!(transaction_id = %id, status = %update.status, error = %err, "settlement rolled back");
                db_tx
                    .rollback()
                    .await
                    .map_err(|e| RepoError::Transaction(e.to_string()))?;
                Err(err)
            }
        }
    }

    async fn find_by_request_id(
        &self,
        request_id: &str,
    ) -> Result<Option<Transaction>, RepoError> {
        let mut conn = self
            .pool
            .acquire()
            .await
            .map_err(|e| RepoError::Database(e.to_string()))?;
        Self::fetch_transaction(&mut conn, "request_id", request_id).await
    }

    async fn find_by_idempotency_key(&self, key: &str) -> Result<Option<Transaction>, RepoError> {
        let mut conn = self
            .pool
            .acquire()
            .await
            .map_err(|e| RepoError::Database(e.to_string()))?;
        Self::fetch_transaction(&mut conn, "idempotency_key", key).await
    }

    async fn get_transaction(&self, id: TransactionId) -> Result<Option<Transaction>, RepoError> {
        let mut conn = self
            .pool
            .acquire()
            .await
            .map_err(|e| RepoError::Database(e.to_string()))?;
        Self::fetch_transaction(&mut conn, "id", &id.to_string()).await
    }

    async fn list_transactions_for_account(
        &self,
        account_id: AccountId,
        limit: Option<u32>,
    ) -> Result<Vec<Transaction>, RepoError> {
        let sql = format!(
            "SELECT {TRANSACTION_COLUMNS} FROM transactions WHERE account_id = ? \
             ORDER BY created_at DESC, rowid DESC LIMIT ?"
        );
        let rows: Vec<SqliteTransaction> = sqlx::query_as(&sql)
            .bind(account_id.to_string())
            .bind(limit.map(i64::from).unwrap_or(-1))
            .fetch_all(&self.pool)
            .await
            .map_err(|e| RepoError::Database(e.to_string()))?;

        rows.into_iter().map(SqliteTransaction::into_domain).collect()
    }

    async fn spending_summary(
        &self,
        account_id: AccountId,
        since: DateTime<Utc>,
    ) -> Result<SpendingSummary, RepoError> {
        let (since_minor, all_minor): (i64, i64) = sqlx::query_as(
            r#"SELECT
                   COALESCE(SUM(CASE WHEN created_at >= ? THEN amount ELSE 0 END), 0),
                   COALESCE(SUM(amount), 0)
               FROM transactions
               WHERE account_id = ? AND status = 'successful' AND kind != ?"#,
        )
        .bind(format_ts(since))
        .bind(account_id.to_string())
        .bind(TransactionKind::WalletFunding.as_str())
        .fetch_one(&self.pool)
        .await
        .map_err(|e| RepoError::Database(e.to_string()))?;

        Ok(SpendingSummary {
            since: Amount::from_minor(since_minor)?,
            all_time: Amount::from_minor(all_minor)?,
        })
    }

    async fn create_api_key(
        &self,
        account_id: AccountId,
        name: &str,
    ) -> Result<(ApiKey, String), RepoError> {
        let raw_key = generate_api_key();
        let api_key = ApiKey::new(name.to_string(), hash_api_key(&raw_key), account_id);

        sqlx::query(
            r#"INSERT INTO api_keys (id, name, key_hash, account_id, is_active, created_at)
               VALUES (?, ?, ?, ?, 1, ?)"#,
        )
        .bind(api_key.id.to_string())
        .bind(&api_key.name)
        .bind(&api_key.key_hash)
        .bind(account_id.to_string())
        .bind(format_ts(api_key.created_at))
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        Ok((api_key, raw_key))
    }

    async fn verify_api_key_hash(&self, key_hash: &str) -> Result<Option<ApiKey>, RepoError> {
        let sql = format!(
            "UPDATE api_keys SET last_used_at = ? WHERE key_hash = ? AND is_active = 1 \
             RETURNING {API_KEY_COLUMNS}"
        );
        let row: Option<SqliteApiKey> = sqlx::query_as(&sql)
            .bind(format_ts(Utc::now()))
            .bind(key_hash)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| RepoError::Database(e.to_string()))?;

        row.map(SqliteApiKey::into_domain).transpose()
    }
}
