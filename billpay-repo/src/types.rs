//! Database row types and their conversion into domain types.
//!
//! `Db*` rows decode natively on PostgreSQL. SQLite stores ids, timestamps and
//! JSON as text, so its `Sqlite*` rows are parsed into the same `Db*` shape
//! before conversion.

use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::Value;
use sqlx::FromRow;
use uuid::Uuid;

use billpay_types::{
    Account, AccountId, Amount, ApiKey, ApiKeyId, BalanceEffect, DomainError, RepoError,
    Transaction, TransactionId, TransactionStatus, TransactionUpdate,
};

// ─────────────────────────────────────────────────────────────────────────────
// Database row structs (derive FromRow for automatic mapping)
// ─────────────────────────────────────────────────────────────────────────────

/// Account row from database.
#[derive(FromRow)]
pub struct DbAccount {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub phone: Option<String>,
    pub balance: i64,
    pub pin_hash: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Transaction row from database.
#[derive(FromRow)]
pub struct DbTransaction {
    pub id: Uuid,
    pub account_id: Uuid,
    pub kind: String,
    pub service_id: String,
    pub amount: i64,
    pub recipient_phone: Option<String>,
    pub recipient_email: Option<String>,
    pub request_id: String,
    pub idempotency_key: Option<String>,
    pub provider_request_id: Option<String>,
    pub provider_reference: Option<String>,
    pub status: String,
    pub provider_response: Option<Value>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// API key row from database.
#[derive(FromRow)]
pub struct DbApiKey {
    pub id: Uuid,
    pub name: String,
    pub key_hash: String,
    pub account_id: Uuid,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub last_used_at: Option<DateTime<Utc>>,
}

pub const ACCOUNT_COLUMNS: &str =
    "id, name, email, phone, balance, pin_hash, created_at, updated_at";

pub const TRANSACTION_COLUMNS: &str = "id, account_id, kind, service_id, amount, \
     recipient_phone, recipient_email, request_id, idempotency_key, provider_request_id, \
     provider_reference, status, provider_response, created_at, updated_at";

pub const API_KEY_COLUMNS: &str =
    "id, name, key_hash, account_id, is_active, created_at, last_used_at";

// ─────────────────────────────────────────────────────────────────────────────
// Parsing helpers
// ─────────────────────────────────────────────────────────────────────────────

fn db_err(e: impl std::fmt::Display) -> RepoError {
    RepoError::Database(e.to_string())
}

/// Maps a sqlx error, turning unique violations into `Conflict`.
pub fn map_sqlx_error(e: sqlx::Error) -> RepoError {
    if is_unique_violation(&e) {
        return RepoError::Conflict(e.to_string());
    }
    RepoError::Database(e.to_string())
}

pub fn is_unique_violation(e: &sqlx::Error) -> bool {
    matches!(e, sqlx::Error::Database(db) if db.is_unique_violation())
}

/// Formats a timestamp the way SQLite rows store it (sortable as text).
pub fn format_ts(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub fn parse_ts(s: &str) -> Result<DateTime<Utc>, RepoError> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(db_err)
}

pub fn parse_uuid(s: &str) -> Result<Uuid, RepoError> {
    Uuid::parse_str(s).map_err(db_err)
}

/// Whether `update` is a legal write for a row that is still pending.
pub fn check_update(update: &TransactionUpdate) -> Result<(), RepoError> {
    let pending = TransactionStatus::Pending;
    let refresh = update.status == pending && update.balance_effect == BalanceEffect::None;
    if refresh || pending.can_transition_to(update.status) {
        Ok(())
    } else {
        Err(RepoError::Domain(DomainError::InvalidTransition {
            from: pending,
            to: update.status,
        }))
    }
}

fn amount(minor: i64) -> Result<Amount, RepoError> {
    Amount::from_minor(minor).map_err(RepoError::Domain)
}

// ─────────────────────────────────────────────────────────────────────────────
// Domain conversion
// ─────────────────────────────────────────────────────────────────────────────

impl DbAccount {
    /// Convert database row to domain Account.
    pub fn into_domain(self) -> Result<Account, RepoError> {
        Ok(Account {
            id: AccountId::from_uuid(self.id),
            name: self.name,
            email: self.email,
            phone: self.phone,
            balance: amount(self.balance)?,
            has_pin: self.pin_hash.is_some(),
            pin_hash: self.pin_hash,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

impl DbTransaction {
    /// Convert database row to domain Transaction.
    pub fn into_domain(self) -> Result<Transaction, RepoError> {
        Ok(Transaction {
            id: TransactionId::from_uuid(self.id),
            account_id: AccountId::from_uuid(self.account_id),
            kind: self.kind.parse().map_err(RepoError::Domain)?,
            service_id: self.service_id,
            amount: amount(self.amount)?,
            recipient_phone: self.recipient_phone,
            recipient_email: self.recipient_email,
            request_id: self.request_id,
            idempotency_key: self.idempotency_key,
            provider_request_id: self.provider_request_id,
            provider_reference: self.provider_reference,
            status: self.status.parse().map_err(RepoError::Domain)?,
            provider_response: self.provider_response,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

impl DbApiKey {
    /// Convert database row to domain ApiKey.
    pub fn into_domain(self) -> ApiKey {
        ApiKey {
            id: ApiKeyId::from_uuid(self.id),
            name: self.name,
            key_hash: self.key_hash,
            account_id: AccountId::from_uuid(self.account_id),
            is_active: self.is_active,
            created_at: self.created_at,
            last_used_at: self.last_used_at,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// SQLite text rows
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(feature = "sqlite")]
#[derive(FromRow)]
pub struct SqliteAccount {
    pub id: String,
    pub name: String,
    pub email: String,
    pub phone: Option<String>,
    pub balance: i64,
    pub pin_hash: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

#[cfg(feature = "sqlite")]
impl SqliteAccount {
    pub fn into_domain(self) -> Result<Account, RepoError> {
        DbAccount {
            id: parse_uuid(&self.id)?,
            name: self.name,
            email: self.email,
            phone: self.phone,
            balance: self.balance,
            pin_hash: self.pin_hash,
            created_at: parse_ts(&self.created_at)?,
            updated_at: parse_ts(&self.updated_at)?,
        }
        .into_domain()
    }
}

#[cfg(feature = "sqlite")]
#[derive(FromRow)]
pub struct SqliteTransaction {
    pub id: String,
    pub account_id: String,
    pub kind: String,
    pub service_id: String,
    pub amount: i64,
    pub recipient_phone: Option<String>,
    pub recipient_email: Option<String>,
    pub request_id: String,
    pub idempotency_key: Option<String>,
    pub provider_request_id: Option<String>,
    pub provider_reference: Option<String>,
    pub status: String,
    pub provider_response: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

#[cfg(feature = "sqlite")]
impl SqliteTransaction {
    pub fn into_domain(self) -> Result<Transaction, RepoError> {
        let provider_response = self
            .provider_response
            .map(|raw| serde_json::from_str::<Value>(&raw))
            .transpose()
            .map_err(db_err)?;

        DbTransaction {
            id: parse_uuid(&self.id)?,
            account_id: parse_uuid(&self.account_id)?,
            kind: self.kind,
            service_id: self.service_id,
            amount: self.amount,
            recipient_phone: self.recipient_phone,
            recipient_email: self.recipient_email,
            request_id: self.request_id,
            idempotency_key: self.idempotency_key,
            provider_request_id: self.provider_request_id,
            provider_reference: self.provider_reference,
            status: self.status,
            provider_response,
            created_at: parse_ts(&self.created_at)?,
            updated_at: parse_ts(&self.updated_at)?,
        }
        .into_domain()
    }
}

#[cfg(feature = "sqlite")]
#[derive(FromRow)]
pub struct SqliteApiKey {
    pub id: String,
    pub name: String,
    pub key_hash: String,
    pub account_id: String,
    pub is_active: i64,
    pub created_at: String,
    pub last_used_at: Option<String>,
}

#[cfg(feature = "sqlite")]
impl SqliteApiKey {
    pub fn into_domain(self) -> Result<ApiKey, RepoError> {
        let last_used_at = self.last_used_at.as_deref().map(parse_ts).transpose()?;
        Ok(DbApiKey {
            id: parse_uuid(&self.id)?,
            name: self.name,
            key_hash: self.key_hash,
            account_id: parse_uuid(&self.account_id)?,
            is_active: self.is_active != 0,
            created_at: parse_ts(&self.created_at)?,
            last_used_at,
        }
        .into_domain())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timestamps_sort_as_text() {
        let earlier = format_ts("2026-03-01T00:00:00Z".parse().unwrap());
        let later = format_ts("2026-03-01T00:00:00.000001Z".parse().unwrap());
        assert!(earlier < later);
        assert_eq!(earlier, "2026-03-01T00:00:00.000000Z");
        assert_eq!(parse_ts(&later).unwrap(), "2026-03-01T00:00:00.000001Z".parse::<DateTime<Utc>>().unwrap());
    }

    #[test]
    fn test_check_update_allows_settlement_and_refresh() {
        assert!(check_update(&TransactionUpdate::new(TransactionStatus::Failed)).is_ok());
        assert!(check_update(&TransactionUpdate::new(TransactionStatus::Pending)).is_ok());

        let pending_debit = TransactionUpdate::new(TransactionStatus::Pending)
            .effect(BalanceEffect::Debit(Amount::from_minor(100).unwrap()));
        assert!(matches!(
            check_update(&pending_debit),
            Err(RepoError::Domain(DomainError::InvalidTransition { .. }))
        ));
    }
}
