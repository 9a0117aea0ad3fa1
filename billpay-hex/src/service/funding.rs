//! Wallet funding through a payment channel.

use serde_json::json;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use billpay_types::{
    AccountId, Amount, AppError, BalanceEffect, BillingProvider, ChannelDecision,
    FundWalletRequest, FundingResult, LedgerRepository, PaymentChannel, PaymentStatusResponse,
    Recorded, Transaction, TransactionKind, TransactionStatus, TransactionUpdate,
};

use super::WalletService;

const FUNDED: &str = "Wallet funded successfully";
const BANK_TRANSFER: &str = "bank_transfer";

/// Channel that approves bank transfers and declines everything else.
#[derive(Debug, Clone, Copy, Default)]
pub struct SimulatedChannel;

#[async_trait::async_trait]
impl PaymentChannel for SimulatedChannel {
    async fn authorize(
        &self,
        _account_id: AccountId,
        _amount: Amount,
        method: &str,
        _reference: &str,
    ) -> ChannelDecision {
        if method == BANK_TRANSFER {
            ChannelDecision::Approved
        } else {
            ChannelDecision::Declined("Payment failed. Please try bank transfer instead.".into())
        }
    }
}

impl<R, P, C> WalletService<R, P, C>
where
    R: LedgerRepository,
    P: BillingProvider,
    C: PaymentChannel,
{
    /// Credits the wallet if the payment channel approves.
    ///
    /// A repeated `reference` replays the first attempt and never credits twice.
    #[instrument(skip(self, req), fields(method = %req.method))]
    pub async fn fund_wallet(
        &self,
        account_id: AccountId,
        req: FundWalletRequest,
    ) -> Result<FundingResult, AppError> {
        let amount = req
            .amount
            .as_ref()
            .ok_or_else(|| AppError::BadRequest("amount is required".into()))?
            .to_positive_amount()?;
        let method = req.method.trim().to_string();
        if method.is_empty() {
            return Err(AppError::BadRequest("method is required".into()));
        }
        let reference = req
            .reference
            .as_deref()
            .map(str::trim)
            .filter(|r| !r.is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| Uuid::new_v4().to_string());

        let _guard = self.locks.acquire(account_id).await;
        let account = self.get_account(account_id).await?;

        let pending =
            Transaction::pending_funding(account_id, amount, reference.clone(), Some(account.email));
        let tx = match self.repo.create_transaction(pending).await? {
            Recorded::Created(tx) => tx,
            Recorded::Existing(existing) => return self.replay_funding(account_id, existing).await,
        };

        let update = match self
            .channel
            .authorize(account_id, amount, &method, &reference)
            .await
        {
            ChannelDecision::Approved => TransactionUpdate::new(TransactionStatus::Successful)
                .response(json!({
                    "payment_method": method,
                    "transaction_reference": reference,
                }))
                .effect(BalanceEffect::Credit(amount)),
            ChannelDecision::Declined(reason) => {
                warn!(reference = %reference, reason = %reason, "funding declined");
                TransactionUpdate::new(TransactionStatus::Failed).response(json!({
                    "payment_method": method,
                    "transaction_reference": reference,
                    "error": reason,
                }))
            }
        };

        let settled = self.repo.update_transaction_status(tx.id, update).await?;
        let updated_balance = self.repo.get_balance(account_id).await?;
        info!(reference = %settled.request_id, status = %settled.status, %updated_balance, "funding settled");

        Ok(FundingResult {
            success: settled.status == TransactionStatus::Successful,
            message: funding_message(&settled),
            transaction: settled,
            updated_balance,
        })
    }

    async fn replay_funding(
        &self,
        account_id: AccountId,
        existing: Transaction,
    ) -> Result<FundingResult, AppError> {
        if !existing.is_owned_by(account_id) || existing.kind != TransactionKind::WalletFunding {
            return Err(AppError::Conflict("reference has already been used".into()));
        }
        info!(reference = %existing.request_id, "replaying stored funding");
        Ok(FundingResult {
            success: existing.status == TransactionStatus::Successful,
            message: funding_message(&existing),
            updated_balance: self.repo.get_balance(account_id).await?,
            transaction: existing,
        })
    }

    /// Looks up a funding attempt by its reference.
    #[instrument(skip(self))]
    pub async fn payment_status(
        &self,
        account_id: AccountId,
        reference: &str,
    ) -> Result<PaymentStatusResponse, AppError> {
        let tx = self
            .repo
            .find_by_request_id(reference)
            .await?
            .filter(|tx| tx.is_owned_by(account_id) && tx.kind == TransactionKind::WalletFunding)
            .ok_or_else(|| AppError::NotFound("Payment not found".into()))?;

        Ok(PaymentStatusResponse {
            reference: tx.request_id.clone(),
            status: tx.status,
            transaction: tx,
        })
    }
}

fn funding_message(tx: &Transaction) -> String {
    match tx.status {
        TransactionStatus::Successful => FUNDED.to_string(),
        TransactionStatus::Pending => "Payment is still being processed".to_string(),
        TransactionStatus::Failed => tx
            .provider_response
            .as_ref()
            .and_then(|r| r.get("error"))
            .and_then(|e| e.as_str())
            .unwrap_or("Payment failed")
            .to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_simulated_channel_only_approves_bank_transfer() {
        let channel = SimulatedChannel;
        let amount = Amount::parse("200").unwrap();

        let approved = channel
            .authorize(AccountId::new(), amount, "bank_transfer", "ref")
            .await;
        let declined = channel.authorize(AccountId::new(), amount, "card", "ref").await;

        assert_eq!(approved, ChannelDecision::Approved);
        assert_eq!(
            declined,
            ChannelDecision::Declined("Payment failed. Please try bank transfer instead.".into())
        );
    }
}
