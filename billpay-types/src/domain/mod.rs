//! Domain models for the wallet and bill-payment service.

pub mod account;
pub mod amount;
pub mod api_key;
pub mod provider;
pub mod transaction;

pub use account::{Account, AccountId, NewAccount, validate_pin};
pub use amount::Amount;
pub use api_key::{ApiKey, ApiKeyId};
pub use provider::{
    Catalog, ProviderOutcome, ProviderResponse, ProviderResult, PurchaseOrder, ServiceListing,
    Variation,
};
pub use transaction::{
    PurchaseDraft, Transaction, TransactionId, TransactionKind, TransactionStatus,
};
