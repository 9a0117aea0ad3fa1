//! Dashboard rollups.

use chrono::{DateTime, Datelike, TimeZone, Utc};
use tracing::instrument;

use billpay_types::{
    AccountId, AppError, BillingProvider, DashboardStats, LedgerRepository, PaymentChannel,
};

use super::WalletService;

const RECENT_TRANSACTIONS: u32 = 5;

/// Midnight UTC on the first day of `now`'s month.
pub fn month_start(now: DateTime<Utc>) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(now.year(), now.month(), 1, 0, 0, 0)
        .single()
        .unwrap_or(now)
}

impl<R, P, C> WalletService<R, P, C>
where
    R: LedgerRepository,
    P: BillingProvider,
    C: PaymentChannel,
{
    /// Balance, spending totals and the latest transactions for one account.
    #[instrument(skip(self))]
    pub async fn dashboard(&self, account_id: AccountId) -> Result<DashboardStats, AppError> {
        let balance = self.balance(account_id).await?;
        let spending = self
            .repo
            .spending_summary(account_id, month_start(Utc::now()))
            .await?;
        let recent_transactions = self
            .repo
            .list_transactions_for_account(account_id, Some(RECENT_TRANSACTIONS))
            .await?;

        Ok(DashboardStats {
            balance: balance.balance,
            balance_source: balance.source,
            this_month_spent: spending.since,
            total_spent: spending.all_time,
            recent_transactions,
        })
    }
}
