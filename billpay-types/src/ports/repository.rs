//! Ledger repository port.
//!
//! This is the primary port in our hexagonal architecture.
//! Adapters (Postgres, SQLite, in-memory mocks) implement this trait.

use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::domain::{
    Account, AccountId, Amount, ApiKey, NewAccount, Transaction, TransactionId, TransactionStatus,
};
use crate::error::RepoError;

/// Result of recording a transaction under a unique request id or idempotency key.
#[derive(Debug, Clone)]
pub enum Recorded {
    /// A new row was inserted.
    Created(Transaction),
    /// A row with the same request id or idempotency key already existed.
    Existing(Transaction),
}

impl Recorded {
    pub fn transaction(&self) -> &Transaction {
        match self {
            Recorded::Created(tx) | Recorded::Existing(tx) => tx,
        }
    }

    pub fn into_transaction(self) -> Transaction {
        match self {
            Recorded::Created(tx) | Recorded::Existing(tx) => tx,
        }
    }

    pub fn is_created(&self) -> bool {
        matches!(self, Recorded::Created(_))
    }
}

/// Balance change applied together with a status transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BalanceEffect {
    None,
    Debit(Amount),
    Credit(Amount),
}

/// A settlement write: the new status plus everything learned from upstream.
#[derive(Debug, Clone)]
pub struct TransactionUpdate {
    pub status: TransactionStatus,
    pub provider_response: Option<Value>,
    pub provider_reference: Option<String>,
    pub provider_request_id: Option<String>,
    pub balance_effect: BalanceEffect,
}

impl TransactionUpdate {
    pub fn new(status: TransactionStatus) -> Self {
        Self {
            status,
            provider_response: None,
            provider_reference: None,
            provider_request_id: None,
            balance_effect: BalanceEffect::None,
        }
    }

    pub fn response(mut self, response: Value) -> Self {
        self.provider_response = Some(response);
        self
    }

    pub fn reference(mut self, reference: Option<String>) -> Self {
        self.provider_reference = reference;
        self
    }

    pub fn request_id(mut self, request_id: impl Into<String>) -> Self {
        self.provider_request_id = Some(request_id.into());
        self
    }

    pub fn effect(mut self, effect: BalanceEffect) -> Self {
        self.balance_effect = effect;
        self
    }
}

/// Sums of successful purchases (wallet funding excluded).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SpendingSummary {
    pub since: Amount,
    pub all_time: Amount,
}

/// The ledger port for wallet and transaction operations.
///
/// Operations that touch balances MUST be atomic.
/// Implementations use database transactions to ensure consistency.
#[async_trait::async_trait]
pub trait LedgerRepository: Send + Sync + 'static {
    // ─────────────────────────────────────────────────────────────────────────────
    // Account Operations
    // ─────────────────────────────────────────────────────────────────────────────

    /// Creates a new account with zero balance.
    async fn create_account(&self, req: NewAccount) -> Result<Account, RepoError>;

    /// Gets an account by ID.
    async fn get_account(&self, id: AccountId) -> Result<Option<Account>, RepoError>;

    /// Stores the PIN hash. Fails with `Conflict` if a PIN is already set.
    async fn set_pin(&self, id: AccountId, pin_hash: &str) -> Result<Account, RepoError>;

    /// Current ledger balance.
    async fn get_balance(&self, id: AccountId) -> Result<Amount, RepoError>;

    /// Guarded debit; `InsufficientFunds` if the balance would go negative.
    async fn debit(&self, id: AccountId, amount: Amount) -> Result<Amount, RepoError>;

    /// Credits the account and returns the new balance.
    async fn credit(&self, id: AccountId, amount: Amount) -> Result<Amount, RepoError>;

    // ─────────────────────────────────────────────────────────────────────────────
    // Transaction Operations (settlement MUST be atomic)
    // ─────────────────────────────────────────────────────────────────────────────

    /// Inserts a pending transaction, or returns the one already stored under
    /// the same request id or idempotency key.
    async fn create_transaction(&self, tx: Transaction) -> Result<Recorded, RepoError>;

    /// Moves a pending transaction to its terminal state and applies the
    /// balance effect in one database transaction.
    async fn update_transaction_status(
        &self,
        id: TransactionId,
        update: TransactionUpdate,
    ) -> Result<Transaction, RepoError>;

    // ─────────────────────────────────────────────────────────────────────────────
    // Idempotency & History
    // ─────────────────────────────────────────────────────────────────────────────

    async fn find_by_request_id(&self, request_id: &str)
    -> Result<Option<Transaction>, RepoError>;

    async fn find_by_idempotency_key(&self, key: &str) -> Result<Option<Transaction>, RepoError>;

    async fn get_transaction(&self, id: TransactionId) -> Result<Option<Transaction>, RepoError>;

    /// Lists transactions for an account, newest first.
    async fn list_transactions_for_account(
        &self,
        account_id: AccountId,
        limit: Option<u32>,
    ) -> Result<Vec<Transaction>, RepoError>;

    /// Sums successful purchases created at or after `since`, and overall.
    async fn spending_summary(
        &self,
        account_id: AccountId,
        since: DateTime<Utc>,
    ) -> Result<SpendingSummary, RepoError>;

    // ─────────────────────────────────────────────────────────────────────────────
    // API Keys
    // ─────────────────────────────────────────────────────────────────────────────

    /// Issues a key for the account and returns it with the raw secret.
    async fn create_api_key(
        &self,
        account_id: AccountId,
        name: &str,
    ) -> Result<(ApiKey, String), RepoError>;

    /// Looks up an active key by the hash of its secret and touches `last_used_at`.
    async fn verify_api_key_hash(&self, key_hash: &str) -> Result<Option<ApiKey>, RepoError>;
}
