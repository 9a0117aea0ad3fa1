//! Data Transfer Objects (DTOs) for requests and responses.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::domain::{Account, Amount, Transaction, TransactionStatus};
use crate::error::DomainError;

// ─────────────────────────────────────────────────────────────────────────────
// Amounts on the wire
// ─────────────────────────────────────────────────────────────────────────────

/// An amount as a caller sent it: a decimal string or a JSON number.
///
/// Parsed into an [`Amount`] by the service so that malformed values surface
/// as validation errors rather than body rejections.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RawAmount {
    Text(String),
    Number(serde_json::Number),
}

impl RawAmount {
    /// Parses a strictly positive amount with at most two decimal places.
    pub fn to_positive_amount(&self) -> Result<Amount, DomainError> {
        match self {
            RawAmount::Text(s) => Amount::parse_positive(s),
            RawAmount::Number(n) => Amount::parse_positive(&n.to_string()),
        }
    }
}

impl From<&str> for RawAmount {
    fn from(value: &str) -> Self {
        RawAmount::Text(value.to_string())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Account DTOs
// ─────────────────────────────────────────────────────────────────────────────

/// Response after registering: the account and its API key (shown only once).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisterResponse {
    pub account: Account,
    pub api_key: String,
    pub message: String,
}

/// Request to set the transaction PIN.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SetPinRequest {
    #[serde(default)]
    pub pin: String,
    #[serde(default)]
    pub pin_confirm: String,
}

/// Where a reported balance came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BalanceSource {
    Upstream,
    Ledger,
}

/// Balance read with graceful degradation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BalanceView {
    pub balance: Amount,
    pub source: BalanceSource,
}

// ─────────────────────────────────────────────────────────────────────────────
// Purchase DTOs
// ─────────────────────────────────────────────────────────────────────────────

/// Request to buy a service through the billing provider.
///
/// Every field defaults so missing values are reported by validation.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PurchaseRequest {
    #[serde(default)]
    pub service_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub variation_code: Option<String>,
    #[serde(default)]
    pub amount: Option<RawAmount>,
    #[serde(default)]
    pub phone: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub pin: String,
    /// Category label (`airtime`, `data`, ...); defaults to `purchase`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transaction_type: Option<String>,
    #[serde(default)]
    pub auto_retry: bool,
    /// Caller's idempotency key; a fresh one is generated when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
    /// Service-specific fields such as a meter or candidate number
    #[serde(default)]
    pub extra_params: BTreeMap<String, Value>,
}

/// Result of a purchase: the persisted transaction and the stored provider response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PurchaseOutcome {
    pub transaction: Transaction,
    pub response: Value,
    /// Set when this outcome was replayed from an earlier request
    #[serde(skip)]
    pub replayed: bool,
}

/// Result of a status requery.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransactionStatusResponse {
    pub transaction: Transaction,
    /// Raw requery payload from the provider
    pub status: Value,
}

/// Query parameters for listing transactions.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TransactionQuery {
    #[serde(default)]
    pub limit: Option<u32>,
}

// ─────────────────────────────────────────────────────────────────────────────
// Wallet funding DTOs
// ─────────────────────────────────────────────────────────────────────────────

/// Request to fund the wallet through a payment channel.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FundWalletRequest {
    #[serde(default)]
    pub amount: Option<RawAmount>,
    #[serde(default)]
    pub method: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reference: Option<String>,
}

/// Outcome of a funding attempt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FundingResult {
    pub success: bool,
    pub message: String,
    pub transaction: Transaction,
    pub updated_balance: Amount,
}

/// Status of a funding attempt looked up by reference.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentStatusResponse {
    pub reference: String,
    pub status: TransactionStatus,
    pub transaction: Transaction,
}

// ─────────────────────────────────────────────────────────────────────────────
// Dashboard
// ─────────────────────────────────────────────────────────────────────────────

/// Per-account rollup shown on the dashboard.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DashboardStats {
    pub balance: Amount,
    pub balance_source: BalanceSource,
    pub this_month_spent: Amount,
    pub total_spent: Amount,
    pub recent_transactions: Vec<Transaction>,
}
