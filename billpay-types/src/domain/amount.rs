//! Exact fixed-point monetary amount.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::DomainError;

/// Number of decimal places carried by every amount.
pub const SCALE: u32 = 2;

/// A non-negative monetary amount with exactly two decimal places.
///
/// Held as a `Decimal` in memory and as integer minor units (kobo) in storage,
/// so no value ever passes through binary floating point.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "Decimal", into = "Decimal")]
pub struct Amount(Decimal);

impl Amount {
    /// Creates an amount, rejecting negatives and sub-minor-unit precision.
    pub fn new(value: Decimal) -> Result<Self, DomainError> {
        if value.is_sign_negative() && !value.is_zero() {
            return Err(DomainError::InvalidAmount(format!(
                "amount cannot be negative: {value}"
            )));
        }
        let normalized = value.normalize();
        if normalized.scale() > SCALE {
            return Err(DomainError::InvalidAmount(format!(
                "amount has more than {SCALE} decimal places: {value}"
            )));
        }
        let mut scaled = normalized;
        scaled.rescale(SCALE);
        // Storage holds minor units in an i64.
        if i64::try_from(scaled.mantissa()).is_err() {
            return Err(DomainError::InvalidAmount(format!(
                "amount exceeds the supported maximum: {value}"
            )));
        }
        Ok(Self(scaled))
    }

    /// Creates an amount that must be strictly greater than zero.
    pub fn positive(value: Decimal) -> Result<Self, DomainError> {
        let amount = Self::new(value)?;
        if amount.is_zero() {
            return Err(DomainError::InvalidAmount(
                "amount must be greater than zero".into(),
            ));
        }
        Ok(amount)
    }

    /// Parses a decimal string such as `"500"` or `"1500.50"`.
    pub fn parse(input: &str) -> Result<Self, DomainError> {
        let trimmed = input.trim();
        let value = Decimal::from_str(trimmed)
            .map_err(|_| DomainError::InvalidAmount(format!("not a decimal: {trimmed:?}")))?;
        Self::new(value)
    }

    /// Parses a decimal string that must be strictly positive.
    pub fn parse_positive(input: &str) -> Result<Self, DomainError> {
        let amount = Self::parse(input)?;
        Self::positive(amount.0)
    }

    pub fn zero() -> Self {
        Self(Decimal::new(0, SCALE))
    }

    /// Builds an amount from integer minor units (e.g. 50_000 → 500.00).
    pub fn from_minor(minor: i64) -> Result<Self, DomainError> {
        Self::new(Decimal::new(minor, SCALE))
    }

    /// Returns the amount in integer minor units.
    pub fn to_minor(&self) -> i64 {
        // `new` only admits mantissas that fit, so the fallback is unreachable.
        i64::try_from(self.0.mantissa()).unwrap_or_default()
    }

    /// Largest representable amount: `i64::MAX` minor units.
    pub fn max() -> Self {
        Self(Decimal::new(i64::MAX, SCALE))
    }

    pub fn as_decimal(&self) -> Decimal {
        self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }

    pub fn checked_add(&self, other: Amount) -> Result<Amount, DomainError> {
        self.0
            .checked_add(other.0)
            .ok_or_else(|| DomainError::InvalidAmount("amount overflow".into()))
            .and_then(Amount::new)
    }

    /// Subtracts `other`, failing with `InsufficientFunds` instead of going negative.
    pub fn checked_sub(&self, other: Amount) -> Result<Amount, DomainError> {
        if *self < other {
            return Err(DomainError::InsufficientFunds {
                available: *self,
                requested: other,
            });
        }
        Amount::new(self.0 - other.0)
    }
}

impl Default for Amount {
    fn default() -> Self {
        Self::zero()
    }
}

impl TryFrom<Decimal> for Amount {
    type Error = DomainError;

    fn try_from(value: Decimal) -> Result<Self, Self::Error> {
        Amount::new(value)
    }
}

impl From<Amount> for Decimal {
    fn from(amount: Amount) -> Self {
        amount.0
    }
}

impl FromStr for Amount {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Amount::parse(s)
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
