//! Port traits (interfaces for adapters).
//!
//! These are the contracts that adapters must implement.
//! The application layer depends on these traits, not concrete implementations.

mod channel;
mod provider;
mod repository;

pub use channel::{ChannelDecision, PaymentChannel};
pub use provider::{BillingProvider, ProviderError};
pub use repository::{
    BalanceEffect, LedgerRepository, Recorded, SpendingSummary, TransactionUpdate,
};
