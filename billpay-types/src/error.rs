//! Error types for the wallet service.

use crate::domain::{AccountId, Amount, TransactionStatus};

/// Domain-level errors (business rule violations).
#[derive(Debug, thiserror::Error)]
pub enum DomainError {
    #[error("Invalid amount: {0}")]
    InvalidAmount(String),

    #[error("Insufficient funds: available {available}, requested {requested}")]
    InsufficientFunds { available: Amount, requested: Amount },

    #[error("Invalid PIN")]
    InvalidPin,

    #[error("Account not found: {0}")]
    AccountNotFound(AccountId),

    #[error("Invalid status transition: {from} -> {to}")]
    InvalidTransition {
        from: TransactionStatus,
        to: TransactionStatus,
    },

    #[error("Validation error: {0}")]
    ValidationError(String),
}

/// Repository-level errors (data access failures).
#[derive(Debug, thiserror::Error)]
pub enum RepoError {
    #[error(transparent)]
    Domain(#[from] DomainError),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Transaction error: {0}")]
    Transaction(String),

    #[error("Entity not found")]
    NotFound,

    #[error("Conflict: {0}")]
    Conflict(String),
}

/// Application-level errors (for HTTP responses).
///
/// Maps cleanly to HTTP status codes.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("{0}")]
    BadRequest(String),

    #[error("Invalid PIN")]
    InvalidPin,

    #[error("Insufficient balance: available {available}, requested {requested}")]
    InsufficientFunds { available: Amount, requested: Amount },

    #[error("{0}")]
    Unauthorized(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Billing provider unavailable: {0}")]
    UpstreamUnavailable(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// Stable machine-readable code sent alongside the message.
    pub fn error_code(&self) -> &'static str {
        match self {
            AppError::BadRequest(_) => "VALIDATION_ERROR",
            AppError::InvalidPin => "INVALID_PIN",
            AppError::InsufficientFunds { .. } => "INSUFFICIENT_FUNDS",
            AppError::Unauthorized(_) => "UNAUTHORIZED",
            AppError::NotFound(_) => "NOT_FOUND",
            AppError::Conflict(_) => "CONFLICT",
            AppError::UpstreamUnavailable(_) => "UPSTREAM_UNAVAILABLE",
            AppError::Internal(_) => "INTERNAL_ERROR",
        }
    }
}

impl From<DomainError> for AppError {
    fn from(err: DomainError) -> Self {
        match err {
            DomainError::InsufficientFunds {
                available,
                requested,
            } => AppError::InsufficientFunds {
                available,
                requested,
            },
            DomainError::InvalidPin => AppError::InvalidPin,
            DomainError::AccountNotFound(id) => {
                AppError::NotFound(format!("Account not found: {}", id))
            }
            DomainError::InvalidTransition { .. } => AppError::Conflict(err.to_string()),
            DomainError::InvalidAmount(msg) | DomainError::ValidationError(msg) => {
                AppError::BadRequest(msg)
            }
        }
    }
}

impl From<RepoError> for AppError {
    fn from(err: RepoError) -> Self {
        match err {
            RepoError::Domain(e) => e.into(),
            RepoError::NotFound => AppError::NotFound("Resource not found".into()),
            RepoError::Database(e) => AppError::Internal(e),
            RepoError::Transaction(e) => AppError::Internal(e),
            RepoError::Conflict(e) => AppError::Conflict(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_repo_errors_map_to_app_errors() {
        let insufficient = RepoError::Domain(DomainError::InsufficientFunds {
            available: Amount::parse("1000").unwrap(),
            requested: Amount::parse("1500").unwrap(),
        });
        let app: AppError = insufficient.into();
        assert_eq!(app.error_code(), "INSUFFICIENT_FUNDS");

        let app: AppError = RepoError::Conflict("PIN already set".into()).into();
        assert_eq!(app.error_code(), "CONFLICT");

        let app: AppError = RepoError::Domain(DomainError::InvalidAmount("x".into())).into();
        assert_eq!(app.error_code(), "VALIDATION_ERROR");

        let app: AppError = RepoError::Database("boom".into()).into();
        assert_eq!(app.error_code(), "INTERNAL_ERROR");
    }

    #[test]
    fn test_insufficient_funds_message_carries_amounts() {
        let err = AppError::InsufficientFunds {
            available: Amount::parse("1000").unwrap(),
            requested: Amount::parse("1500").unwrap(),
        };
        assert_eq!(
            err.to_string(),
            "Insufficient balance: available 1000.00, requested 1500.00"
        );
    }
}
