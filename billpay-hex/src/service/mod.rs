//! Wallet Application Service
//!
//! Orchestrates domain operations through the ledger, provider and channel ports.
//! Contains NO infrastructure logic - pure business orchestration.
//!
//! - `settlement` - purchases and status requery
//! - `funding` - wallet funding through a payment channel
//! - `dashboard` - per-account rollups
//! - `locks` - per-account serialization

mod dashboard;
mod funding;
mod locks;
mod settlement;

use tracing::{instrument, warn};

use billpay_repo::security::hash_pin;
use billpay_types::{
    Account, AccountId, AppError, BalanceSource, BalanceView, BillingProvider, Catalog,
    LedgerRepository, NewAccount, PaymentChannel, ProviderError, RegisterResponse, SetPinRequest,
    Transaction, validate_pin,
};

pub use dashboard::month_start;
pub use funding::SimulatedChannel;
pub use locks::AccountLocks;

/// Application service for wallet operations.
///
/// Generic over its three ports - the adapters are injected at compile time.
/// This enables:
/// - Swapping repositories or providers without code changes
/// - Testing with an in-memory ledger and a scripted provider
/// - Compile-time checks for port implementation
pub struct WalletService<R, P, C>
where
    R: LedgerRepository,
    P: BillingProvider,
    C: PaymentChannel,
{
    repo: R,
    provider: P,
    channel: C,
    locks: AccountLocks,
}

impl<R, P, C> WalletService<R, P, C>
where
    R: LedgerRepository,
    P: BillingProvider,
    C: PaymentChannel,
{
    /// Creates a new wallet service from its adapters.
    pub fn new(repo: R, provider: P, channel: C) -> Self {
        Self {
            repo,
            provider,
            channel,
            locks: AccountLocks::new(),
        }
    }

    /// Returns a reference to the underlying repository.
    pub fn repo(&self) -> &R {
        &self.repo
    }

    /// Returns a reference to the billing provider.
    pub fn provider(&self) -> &P {
        &self.provider
    }

    // ─────────────────────────────────────────────────────────────────────────────
    // Account Operations
    // ─────────────────────────────────────────────────────────────────────────────

    /// Creates an account and issues its API key.
    #[instrument(skip(self, req), fields(email = %req.email))]
    pub async fn register(&self, req: NewAccount) -> Result<RegisterResponse, AppError> {
        req.validate()?;

        let account = self.repo.create_account(req).await?;
        let (_, api_key) = self.repo.create_api_key(account.id, "default").await?;

        Ok(RegisterResponse {
            account,
            api_key,
            message: "Account created. Store this API key securely, it will not be shown again."
                .to_string(),
        })
    }

    /// Gets an account by ID.
    pub async fn get_account(&self, id: AccountId) -> Result<Account, AppError> {
        self.repo
            .get_account(id)
            .await
            .map_err(Into::into)
            .and_then(|opt| opt.ok_or_else(|| AppError::NotFound(format!("Account {}", id))))
    }

    /// Sets the transaction PIN. A PIN can be set once.
    #[instrument(skip(self, req))]
    pub async fn set_pin(&self, id: AccountId, req: SetPinRequest) -> Result<Account, AppError> {
        validate_pin(&req.pin, &req.pin_confirm)?;
        self.repo
            .set_pin(id, &hash_pin(id, &req.pin))
            .await
            .map_err(Into::into)
    }

    /// Balance from the provider, or from the ledger when the provider is unreachable.
    #[instrument(skip(self))]
    pub async fn balance(&self, account_id: AccountId) -> Result<BalanceView, AppError> {
        match self.provider.balance().await {
            Ok(balance) => Ok(BalanceView {
                balance,
                source: BalanceSource::Upstream,
            }),
            Err(e) => {
                warn!(error = %e, "provider balance unavailable, using ledger balance");
                Ok(BalanceView {
                    balance: self.repo.get_balance(account_id).await?,
                    source: BalanceSource::Ledger,
                })
            }
        }
    }

    // ─────────────────────────────────────────────────────────────────────────────
    // Catalog
    // ─────────────────────────────────────────────────────────────────────────────

    /// Lists services for a service type.
    #[instrument(skip(self))]
    pub async fn catalog(&self, service_type: &str) -> Result<Catalog, AppError> {
        let service_type = service_type.trim().to_ascii_lowercase();
        if service_type.is_empty() {
            return Err(AppError::BadRequest("service_type is required".into()));
        }
        Ok(self.provider.catalog(&service_type).await)
    }

    /// Raw variations payload for a service.
    #[instrument(skip(self))]
    pub async fn variations(&self, service_id: &str) -> Result<serde_json::Value, AppError> {
        let service_id = service_id.trim();
        if service_id.is_empty() {
            return Err(AppError::BadRequest("service_id is required".into()));
        }
        self.provider
            .variations(service_id)
            .await
            .map(|response| response.into_value())
            .map_err(upstream_error)
    }

    // ─────────────────────────────────────────────────────────────────────────────
    // Transaction History
    // ─────────────────────────────────────────────────────────────────────────────

    /// Lists an account's transactions, newest first.
    pub async fn list_transactions(
        &self,
        account_id: AccountId,
        limit: Option<u32>,
    ) -> Result<Vec<Transaction>, AppError> {
        self.repo
            .list_transactions_for_account(account_id, limit)
            .await
            .map_err(Into::into)
    }
}

/// Maps a failed provider read to the error shown to callers.
fn upstream_error(err: ProviderError) -> AppError {
    match err {
        ProviderError::Rejected(msg) => AppError::BadRequest(msg),
        ProviderError::Unauthorized => {
            AppError::UpstreamUnavailable("billing provider rejected our credentials".into())
        }
        other => AppError::UpstreamUnavailable(other.to_string()),
    }
}
