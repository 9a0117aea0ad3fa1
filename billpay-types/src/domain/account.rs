//! Account domain model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::amount::Amount;
use crate::error::DomainError;

/// Unique identifier for an Account.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AccountId(Uuid);

impl AccountId {
    /// Creates a new random AccountId.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Creates an AccountId from an existing UUID.
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

impl Default for AccountId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for AccountId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for AccountId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

/// Input for registering a wallet account.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewAccount {
    pub name: String,
    pub email: String,
    #[serde(default)]
    pub phone: Option<String>,
}

impl NewAccount {
    /// Validates the registration fields.
    pub fn validate(&self) -> Result<(), DomainError> {
        if self.name.trim().is_empty() {
            return Err(DomainError::ValidationError(
                "Account name cannot be empty".into(),
            ));
        }
        let email = self.email.trim();
        if email.is_empty() || !email.contains('@') {
            return Err(DomainError::ValidationError(
                "A valid email address is required".into(),
            ));
        }
        Ok(())
    }
}

/// A wallet account.
///
/// The balance is only ever changed by the ledger store; everything else here
/// is read by the settlement engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Account {
    pub id: AccountId,
    pub name: String,
    pub email: String,
    pub phone: Option<String>,
    pub balance: Amount,
    /// SHA-256 of the PIN, never serialized.
    #[serde(skip)]
    pub pin_hash: Option<String>,
    pub has_pin: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Account {
    /// Creates a new account with zero balance and no PIN.
    pub fn new(req: NewAccount) -> Result<Self, DomainError> {
        req.validate()?;
        let now = Utc::now();
        Ok(Self {
            id: AccountId::new(),
            name: req.name.trim().to_string(),
            email: req.email.trim().to_lowercase(),
            phone: req.phone.filter(|p| !p.trim().is_empty()),
            balance: Amount::zero(),
            pin_hash: None,
            has_pin: false,
            created_at: now,
            updated_at: now,
        })
    }

    /// Credits (adds) money to the account.
    pub fn credit(&mut self, amount: Amount) -> Result<(), DomainError> {
        self.balance = self.balance.checked_add(amount)?;
        Ok(())
    }

    /// Debits (subtracts) money from the account.
    pub fn debit(&mut self, amount: Amount) -> Result<(), DomainError> {
        self.balance = self.balance.checked_sub(amount)?;
        Ok(())
    }

    /// Checks if the account has sufficient funds for a debit.
    pub fn has_sufficient_funds(&self, amount: &Amount) -> bool {
        self.balance >= *amount
    }
}

/// Validates a PIN and its confirmation: 4 to 6 ASCII digits, both equal.
pub fn validate_pin(pin: &str, confirm: &str) -> Result<(), DomainError> {
    if pin != confirm {
        return Err(DomainError::ValidationError("PIN fields didn't match".into()));
    }
    if !(4..=6).contains(&pin.len()) || !pin.bytes().all(|b| b.is_ascii_digit()) {
        return Err(DomainError::ValidationError(
            "PIN must be 4 to 6 digits".into(),
        ));
    }
    Ok(())
}
