//! Payment channel port used to fund wallets.

use crate::domain::{AccountId, Amount};

/// Whether a channel accepted a funding attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelDecision {
    Approved,
    Declined(String),
}

/// A way of moving money into a wallet (bank transfer, card, ...).
#[async_trait::async_trait]
pub trait PaymentChannel: Send + Sync + 'static {
    async fn authorize(
        &self,
        account_id: AccountId,
        amount: Amount,
        method: &str,
        reference: &str,
    ) -> ChannelDecision;
}
