//! Transaction domain model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::account::AccountId;
use super::amount::Amount;
use crate::error::DomainError;

/// Unique identifier for a Transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TransactionId(Uuid);

impl TransactionId {
    /// Creates a new random TransactionId.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Creates a TransactionId from an existing UUID.
    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Returns the underlying UUID.
    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }

    /// Returns the UUID value.
    pub fn into_uuid(self) -> Uuid {
        self.0
    }
}

impl Default for TransactionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for TransactionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for TransactionId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

/// What a transaction paid for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionKind {
    Airtime,
    Data,
    Electricity,
    Exam,
    Cable,
    /// Purchase whose caller did not name a category
    Purchase,
    /// Credit from a payment channel into the wallet
    WalletFunding,
}

impl TransactionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionKind::Airtime => "airtime",
            TransactionKind::Data => "data",
            TransactionKind::Electricity => "electricity",
            TransactionKind::Exam => "exam",
            TransactionKind::Cable => "cable",
            TransactionKind::Purchase => "purchase",
            TransactionKind::WalletFunding => "wallet_funding",
        }
    }
}

impl std::fmt::Display for TransactionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for TransactionKind {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "airtime" => Ok(TransactionKind::Airtime),
            "data" => Ok(TransactionKind::Data),
            "electricity" => Ok(TransactionKind::Electricity),
            "exam" => Ok(TransactionKind::Exam),
            "cable" | "tv" => Ok(TransactionKind::Cable),
            "purchase" => Ok(TransactionKind::Purchase),
            "wallet_funding" => Ok(TransactionKind::WalletFunding),
            other => Err(DomainError::ValidationError(format!(
                "Unknown transaction type: {other}"
            ))),
        }
    }
}

/// Settlement state of a transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionStatus {
    Pending,
    Successful,
    Failed,
}

impl TransactionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionStatus::Pending => "pending",
            TransactionStatus::Successful => "successful",
            TransactionStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, TransactionStatus::Pending)
    }

    /// Only `pending` may move, and only to a terminal state.
    pub fn can_transition_to(&self, next: TransactionStatus) -> bool {
        matches!(self, TransactionStatus::Pending) && next.is_terminal()
    }
}

impl std::fmt::Display for TransactionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for TransactionStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(TransactionStatus::Pending),
            "successful" => Ok(TransactionStatus::Successful),
            "failed" => Ok(TransactionStatus::Failed),
            other => Err(DomainError::ValidationError(format!(
                "Unknown transaction status: {other}"
            ))),
        }
    }
}

/// A recorded wallet transaction.
///
/// Rows are created `pending` and settle exactly once. Terminal rows are
/// never modified or deleted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    pub id: TransactionId,
    pub account_id: AccountId,
    pub kind: TransactionKind,
    pub service_id: String,
    pub amount: Amount,
    pub recipient_phone: Option<String>,
    pub recipient_email: Option<String>,
    /// Internal ledger id, globally unique
    pub request_id: String,
    /// Caller-supplied replay token for purchases
    pub idempotency_key: Option<String>,
    /// Request id the provider finally accepted (may carry a retry suffix)
    pub provider_request_id: Option<String>,
    pub provider_reference: Option<String>,
    pub status: TransactionStatus,
    /// Provider payload stored verbatim, plus our annotations
    pub provider_response: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Fields of a purchase known before the provider is called.
#[derive(Debug, Clone)]
pub struct PurchaseDraft {
    pub kind: TransactionKind,
    pub service_id: String,
    pub amount: Amount,
    pub recipient_phone: String,
    pub recipient_email: String,
    pub idempotency_key: String,
}

impl Transaction {
    /// Creates the pending row reserved before a provider purchase.
    pub fn pending_purchase(account_id: AccountId, request_id: String, draft: PurchaseDraft) -> Self {
        let now = Utc::now();
        Self {
            id: TransactionId::new(),
            account_id,
            kind: draft.kind,
            service_id: draft.service_id,
            amount: draft.amount,
            recipient_phone: Some(draft.recipient_phone),
            recipient_email: Some(draft.recipient_email),
            request_id,
            idempotency_key: Some(draft.idempotency_key),
            provider_request_id: None,
            provider_reference: None,
            status: TransactionStatus::Pending,
            provider_response: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Creates the pending row for a wallet funding attempt.
    pub fn pending_funding(
        account_id: AccountId,
        amount: Amount,
        reference: String,
        email: Option<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: TransactionId::new(),
            account_id,
            kind: TransactionKind::WalletFunding,
            service_id: "wallet".to_string(),
            amount,
            recipient_phone: None,
            recipient_email: email,
            request_id: reference,
            idempotency_key: None,
            provider_request_id: None,
            provider_reference: None,
            status: TransactionStatus::Pending,
            provider_response: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// The request id to use when asking the provider about this transaction.
    pub fn upstream_request_id(&self) -> &str {
        self.provider_request_id
            .as_deref()
            .or(self.idempotency_key.as_deref())
            .unwrap_or(&self.request_id)
    }

    pub fn is_owned_by(&self, account_id: AccountId) -> bool {
        self.account_id == account_id
    }
}
