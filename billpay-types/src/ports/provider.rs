//! Billing provider port.
//!
//! Implementations can be HTTP clients, scripted test doubles, etc.

use crate::domain::{Amount, Catalog, ProviderResponse, ProviderResult, PurchaseOrder};

/// Error type for provider reads that callers may degrade around.
#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    #[error("Service unavailable: {0}")]
    ServiceUnavailable(String),

    #[error("Invalid API credentials")]
    Unauthorized,

    #[error("Unexpected response: {0}")]
    InvalidResponse(String),

    #[error("Provider rejected request: {0}")]
    Rejected(String),
}

/// Port trait for the upstream billing provider.
///
/// `purchase` and `verify_status` never fail: transport problems are folded
/// into a classified [`ProviderResult`] so the caller can persist them.
#[async_trait::async_trait]
pub trait BillingProvider: Send + Sync + 'static {
    /// Our float balance with the provider.
    async fn balance(&self) -> Result<Amount, ProviderError>;

    /// Services for a type, falling back to the built-in list.
    async fn catalog(&self, service_type: &str) -> Catalog;

    /// Raw variations payload for a service.
    async fn variations(&self, service_id: &str) -> Result<ProviderResponse, ProviderError>;

    /// Submits a purchase, retrying transient failures when asked to.
    async fn purchase(&self, order: PurchaseOrder) -> ProviderResult;

    /// Re-queries the status of an earlier request.
    async fn verify_status(&self, request_id: &str) -> ProviderResult;
}
