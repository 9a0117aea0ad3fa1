//! PostgreSQL repository adapter.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgConnection, PgPool};
use tracing::{debug, info, warn};
use uuid::Uuid;

use billpay_types::{
    Account, AccountId, Amount, ApiKey, BalanceEffect, DomainError, LedgerRepository, NewAccount,
    Recorded, RepoError, SpendingSummary, Transaction, TransactionId, TransactionKind,
    TransactionUpdate,
};

use crate::security::{generate_api_key, hash_api_key};
use crate::types::{
    ACCOUNT_COLUMNS, API_KEY_COLUMNS, DbAccount, DbApiKey, DbTransaction, TRANSACTION_COLUMNS,
    check_update, is_unique_violation, map_sqlx_error,
};

// ─────────────────────────────────────────────────────────────────────────────
// PostgreSQL Repository
// ─────────────────────────────────────────────────────────────────────────────

/// PostgreSQL repository with row-level locking.
pub struct PostgresRepo {
    pool: PgPool,
}

/// Executes SQL statements from a migration file, splitting by semicolons.
async fn execute_migration(pool: &PgPool, sql: &str, name: &str) -> Result<(), anyhow::Error> {
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
async fn run_migrations(pool: &PgPool) -> Result<(), anyhow::Error> {
    execute_migration(
        pool,
        include_str!("../migrations/0001_create_ledger_pg.sql"),
        "0001",
    )
    .await?;

    execute_migration(
        pool,
        include_str!("../migrations/0002_create_api_keys_pg.sql"),
        "0002",
    )
    .await?;

    Ok(())
}

impl PostgresRepo {
    /// Creates a new PostgreSQL repository with automatic migration.
    pub async fn new(database_url: &str) -> anyhow::Result<Self> {
        let pool = PgPool::connect(database_url).await?;
        run_migrations(&pool).await?;
        info!("postgres ledger ready");
        Ok(Self { pool })
    }

    /// Returns a reference to the connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    async fn fetch_transaction(
        conn: &mut PgConnection,
        id: Uuid,
    ) -> Result<Option<Transaction>, RepoError> {
        let sql = format!("SELECT {TRANSACTION_COLUMNS} FROM transactions WHERE id = $1");
        let row: Option<DbTransaction> = sqlx::query_as(&sql)
            .bind(id)
            .fetch_optional(&mut *conn)
            .await
            .map_err(|e| RepoError::Database(e.to_string()))?;

        row.map(DbTransaction::into_domain).transpose()
    }

    async fn find_by_column(
        &self,
        column: &str,
        value: &str,
    ) -> Result<Option<Transaction>, RepoError> {
        let sql = format!("SELECT {TRANSACTION_COLUMNS} FROM transactions WHERE {column} = $1");
        let row: Option<DbTransaction> = sqlx::query_as(&sql)
            .bind(value)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| RepoError::Database(e.to_string()))?;

        row.map(DbTransaction::into_domain).transpose()
    }

    async fn balance_of(conn: &mut PgConnection, id: AccountId) -> Result<Option<Amount>, RepoError> {
        let row: Option<(i64,)> = sqlx::query_as("SELECT balance FROM accounts WHERE id = $1")
            .bind(id.as_uuid())
            .fetch_optional(&mut *conn)
            .await
            .map_err(|e| RepoError::Database(e.to_string()))?;

        row.map(|(b,)| Amount::from_minor(b).map_err(RepoError::Domain))
            .transpose()
    }

    /// Locks the account row and debits only if the balance covers the amount.
    async fn guarded_debit(
        conn: &mut PgConnection,
        id: AccountId,
        amount: Amount,
    ) -> Result<Amount, RepoError> {
        let current: Option<(i64,)> =
            sqlx::query_as("SELECT balance FROM accounts WHERE id = $1 FOR UPDATE")
                .bind(id.as_uuid())
                .fetch_optional(&mut *conn)
                .await
                .map_err(|e| RepoError::Database(e.to_string()))?;

        let (balance,) = current.ok_or(RepoError::NotFound)?;
        if balance < amount.to_minor() {
            return Err(RepoError::Domain(DomainError::InsufficientFunds {
                available: Amount::from_minor(balance)?,
                requested: amount,
            }));
        }

        let (updated,): (i64,) = sqlx::query_as(
            r#"UPDATE accounts SET balance = balance - $1, updated_at = $2
               WHERE id = $3
               RETURNING balance"#,
        )
        .bind(amount.to_minor())
        .bind(Utc::now())
        .bind(id.as_uuid())
        .fetch_one(&mut *conn)
        .await
        .map_err(|e| RepoError::Database(e.to_string()))?;

        Ok(Amount::from_minor(updated)?)
    }

    async fn apply_credit(
        conn: &mut PgConnection,
        id: AccountId,
        amount: Amount,
    ) -> Result<Amount, RepoError> {
        let row: Option<(i64,)> = sqlx::query_as(
            r#"UPDATE accounts SET balance = balance + $1, updated_at = $2
               WHERE id = $3 AND balance <= $4
               RETURNING balance"#,
        )
        .bind(amount.to_minor())
        .bind(Utc::now())
        .bind(id.as_uuid())
        .bind(i64::MAX - amount.to_minor())
        .fetch_optional(&mut *conn)
        .await
        .map_err(|e| RepoError::Database(e.to_string()))?;

        match row {
            Some((balance,)) => Ok(Amount::from_minor(balance)?),
            None => match Self::balance_of(conn, id).await? {
                Some(_) => Err(RepoError::Domain(DomainError::InvalidAmount(
                    "credit would exceed the maximum balance".into(),
                ))),
                None => Err(RepoError::NotFound),
            },
        }
    }

    async fn settle(
        conn: &mut PgConnection,
        id: TransactionId,
        update: &TransactionUpdate,
    ) -> Result<Transaction, RepoError> {
        let owner: Option<(Uuid,)> = sqlx::query_as(
            r#"UPDATE transactions
               SET status = $1,
                   provider_response = COALESCE($2, provider_response),
                   provider_reference = COALESCE($3, provider_reference),
                   provider_request_id = COALESCE($4, provider_request_id),
                   updated_at = $5
               WHERE id = $6 AND status = 'pending'
               RETURNING account_id"#,
        )
        .bind(update.status.as_str())
        .bind(update.provider_response.clone())
        .bind(&update.provider_reference)
        .bind(&update.provider_request_id)
        .bind(Utc::now())
        .bind(id.as_uuid())
        .fetch_optional(&mut *conn)
        .await
        .map_err(|e| RepoError::Database(e.to_string()))?;

        let Some((owner,)) = owner else {
            return match Self::fetch_transaction(conn, *id.as_uuid()).await? {
                Some(current) => Err(RepoError::Domain(DomainError::InvalidTransition {
                    from: current.status,
                    to: update.status,
                })),
                None => Err(RepoError::NotFound),
            };
        };
        let account_id = AccountId::from_uuid(owner);

        match update.balance_effect {
            BalanceEffect::None => {}
            BalanceEffect::Debit(amount) => {
                Self::guarded_debit(conn, account_id, amount).await?;
            }
            BalanceEffect::Credit(amount) => {
                Self::apply_credit(conn, account_id, amount).await?;
            }
        }

        Self::fetch_transaction(conn, *id.as_uuid())
            .await?
            .ok_or(RepoError::NotFound)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Repository implementation
// ─────────────────────────────────────────────────────────────────────────────

#[async_trait]
impl LedgerRepository for PostgresRepo {
    async fn create_account(&self, req: NewAccount) -> Result<Account, RepoError> {
        let account = Account::new(req)?;

        sqlx::query(
            r#"INSERT INTO accounts (id, name, email, phone, balance, pin_hash, created_at, updated_at)
               VALUES ($1, $2, $3, $4, 0, NULL, $5, $6)"#,
        )
        .bind(account.id.as_uuid())
        .bind(&account.name)
        .bind(&account.email)
        .bind(&account.phone)
        .bind(account.created_at)
        .bind(account.updated_at)
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
        let sql = format!("SELECT {ACCOUNT_COLUMNS} FROM accounts WHERE id = $1");
        let row: Option<DbAccount> = sqlx::query_as(&sql)
            .bind(id.as_uuid())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| RepoError::Database(e.to_string()))?;

        row.map(DbAccount::into_domain).transpose()
    }

    async fn set_pin(&self, id: AccountId, pin_hash: &str) -> Result<Account, RepoError> {
        let result = sqlx::query(
            r#"UPDATE accounts SET pin_hash = $1, updated_at = $2
               WHERE id = $3 AND pin_hash IS NULL"#,
        )
        .bind(pin_hash)
        .bind(Utc::now())
        .bind(id.as_uuid())
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
        let row: Option<(i64,)> = sqlx::query_as("SELECT balance FROM accounts WHERE id = $1")
            .bind(id.as_uuid())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| RepoError::Database(e.to_string()))?;

        let (balance,) = row.ok_or(RepoError::NotFound)?;
        Ok(Amount::from_minor(balance)?)
    }

    async fn debit(&self, id: AccountId, amount: Amount) -> Result<Amount, RepoError> {
        let mut db_tx = self
            .pool
            .begin()
            .await
            .map_err(|e| RepoError::Transaction(e.to_string()))?;
        let balance = Self::guarded_debit(&mut db_tx, id, amount).await?;
        db_tx
            .commit()
            .await
            .map_err(|e| RepoError::Transaction(e.to_string()))?;
        Ok(balance)
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
        let inserted = sqlx::query(
            r#"INSERT INTO transactions (id, account_id, kind, service_id, amount, recipient_phone,
                   recipient_email, request_id, idempotency_key, provider_request_id,
                   provider_reference, status, provider_response, created_at, updated_at)
               VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15)"#,
        )
        .bind(tx.id.as_uuid())
        .bind(tx.account_id.as_uuid())
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
        .bind(tx.provider_response.clone())
        .bind(tx.created_at)
        .bind(tx.updated_at)
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

        // Dropping the transaction on error rolls it back.
        let tx = Self::settle(&mut db_tx, id, &update).await.inspect_err(|err| {
            warn!(transaction_id = %id, status = %update.status, error = %err, "settlement rolled back");
        })?;

        db_tx
            .commit()
            .await
            .map_err(|e| RepoError::Transaction(e.to_string()))?;
        Ok(tx)
    }

    async fn find_by_request_id(
        &self,
        request_id: &str,
    ) -> Result<Option<Transaction>, RepoError> {
        self.find_by_column("request_id", request_id).await
    }

    async fn find_by_idempotency_key(&self, key: &str) -> Result<Option<Transaction>, RepoError> {
        self.find_by_column("idempotency_key", key).await
    }

    async fn get_transaction(&self, id: TransactionId) -> Result<Option<Transaction>, RepoError> {
        let mut conn = self
            .pool
            .acquire()
            .await
            .map_err(|e| RepoError::Database(e.to_string()))?;
        Self::fetch_transaction(&mut conn, *id.as_uuid()).await
    }

    async fn list_transactions_for_account(
        &self,
        account_id: AccountId,
        limit: Option<u32>,
    ) -> Result<Vec<Transaction>, RepoError> {
        let sql = format!(
            "SELECT {TRANSACTION_COLUMNS} FROM transactions WHERE account_id = $1 \
             ORDER BY created_at DESC LIMIT $2"
        );
        let rows: Vec<DbTransaction> = sqlx::query_as(&sql)
            .bind(account_id.as_uuid())
            .bind(limit.map(i64::from))
            .fetch_all(&self.pool)
            .await
            .map_err(|e| RepoError::Database(e.to_string()))?;

        rows.into_iter().map(DbTransaction::into_domain).collect()
    }

    async fn spending_summary(
        &self,
        account_id: AccountId,
        since: DateTime<Utc>,
    ) -> Result<SpendingSummary, RepoError> {
        let (since_minor, all_minor): (i64, i64) = sqlx::query_as(
            r#"SELECT
                   COALESCE(SUM(CASE WHEN created_at >= $1 THEN amount ELSE 0 END), 0)::BIGINT,
                   COALESCE(SUM(amount), 0)::BIGINT
               FROM transactions
               WHERE account_id = $2 AND status = 'successful' AND kind <> $3"#,
        )
        .bind(since)
        .bind(account_id.as_uuid())
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
               VALUES ($1, $2, $3, $4, TRUE, $5)"#,
        )
        .bind(api_key.id.as_uuid())
        .bind(&api_key.name)
        .bind(&api_key.key_hash)
        .bind(account_id.as_uuid())
        .bind(api_key.created_at)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        Ok((api_key, raw_key))
    }

    async fn verify_api_key_hash(&self, key_hash: &str) -> Result<Option<ApiKey>, RepoError> {
        let sql = format!(
            "UPDATE api_keys SET last_used_at = NOW() WHERE key_hash = $1 AND is_active = TRUE \
             RETURNING {API_KEY_COLUMNS}"
        );
        let row: Option<DbApiKey> = sqlx::query_as(&sql)
            .bind(key_hash)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| RepoError::Database(e.to_string()))?;

        Ok(row.map(DbApiKey::into_domain))
    }
}
