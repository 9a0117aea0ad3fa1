//! Purchase settlement.
//!
//! A purchase is validated, reserved as a `pending` row, sent upstream and then
//! settled exactly once. The debit is applied in the same database transaction
//! as the status change, so a row is `successful` if and only if the wallet
//! was charged.

use std::collections::BTreeMap;

use serde_json::Value;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

use billpay_repo::security::verify_pin;
use billpay_types::{
    AccountId, AppError, BalanceEffect, BillingProvider, DomainError, LedgerRepository,
    PaymentChannel, ProviderOutcome, ProviderResponse, ProviderResult, PurchaseDraft,
    PurchaseOrder, PurchaseOutcome, PurchaseRequest, Recorded, RepoError, Transaction,
    TransactionKind, TransactionStatus, TransactionStatusResponse, TransactionUpdate,
};

use super::WalletService;

/// A purchase that passed validation.
struct ValidPurchase {
    draft: PurchaseDraft,
    variation_code: Option<String>,
    auto_retry: bool,
    extra_params: BTreeMap<String, String>,
}

/// Which call produced a provider result.
#[derive(Clone, Copy, PartialEq, Eq)]
enum Phase {
    Purchase,
    Requery,
}

impl Phase {
    /// Status a pending row moves to, or `None` to leave it untouched.
    fn resolve(self, outcome: ProviderOutcome) -> Option<TransactionStatus> {
        match (self, outcome) {
            (_, ProviderOutcome::Success) => Some(TransactionStatus::Successful),
            (Phase::Purchase, ProviderOutcome::Indeterminate) => Some(TransactionStatus::Pending),
            (Phase::Purchase, _) => Some(TransactionStatus::Failed),
            // Only `016` and `014` are definite on requery. Unknown codes may
            // mean the order is still processing upstream.
            (
                Phase::Requery,
                ProviderOutcome::TransientFailure | ProviderOutcome::InsufficientProviderFunds,
            ) => Some(TransactionStatus::Failed),
            (Phase::Requery, _) => None,
        }
    }
}

/// Mints the internal ledger id for a purchase.
pub(crate) fn internal_request_id() -> String {
    format!("REQ-{}", Uuid::new_v4().simple().to_string().to_uppercase())
}

/// Adds caller-facing guidance for a non-successful outcome.
fn annotate_guidance(response: &mut ProviderResponse, outcome: ProviderOutcome) {
    if response.get("error_type").is_none() {
        if let Some(error_type) = outcome.error_type() {
            response.annotate("error_type", error_type);
            response.annotate("retry_recommended", outcome.retry_recommended());
        }
    }

    let (message, action) = match outcome {
        ProviderOutcome::Success => return,
        ProviderOutcome::TransientFailure => (
            "Transaction failed on the provider side. This could be due to network issues, \
             invalid recipient number, or the service being temporarily unavailable.",
            "Please try again after a few minutes or contact support if the issue persists.",
        ),
        ProviderOutcome::InsufficientProviderFunds => (
            "Insufficient funds in the billing provider account.",
            "Please contact support to top up the billing provider account.",
        ),
        ProviderOutcome::DuplicateRequest => (
            "This appears to be a duplicate transaction request.",
            "Please check if the previous transaction was successful before trying again.",
        ),
        ProviderOutcome::Indeterminate => (
            "The billing provider did not answer in time. The outcome of this transaction is not yet known.",
            "Please check the transaction status before trying again.",
        ),
        ProviderOutcome::Rejected | ProviderOutcome::Unavailable => (
            "An error occurred while processing your transaction.",
            "Please try again or contact support for assistance.",
        ),
    };
    response.annotate("error_message", message);
    response.annotate("suggested_action", action);
}

/// Flattens extra parameters to strings; nulls are dropped.
fn stringify_extras(extras: &BTreeMap<String, Value>) -> BTreeMap<String, String> {
    extras
        .iter()
        .filter_map(|(key, value)| {
            let text = match value {
                Value::Null => return None,
                Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            Some((key.clone(), text))
        })
        .collect()
}

fn outcome_of(tx: Transaction, replayed: bool) -> PurchaseOutcome {
    PurchaseOutcome {
        response: tx.provider_response.clone().unwrap_or(Value::Null),
        transaction: tx,
        replayed,
    }
}

impl<R, P, C> WalletService<R, P, C>
where
    R: LedgerRepository,
    P: BillingProvider,
    C: PaymentChannel,
{
    // ─────────────────────────────────────────────────────────────────────────────
    // Purchase
    // ─────────────────────────────────────────────────────────────────────────────

    /// Buys a service for the calling account.
    ///
    /// Replaying a `request_id` returns the stored result without calling the
    /// provider or touching the balance again.
    #[instrument(skip(self, req), fields(service_id = %req.service_id))]
    pub async fn purchase(
        &self,
        account_id: AccountId,
        req: PurchaseRequest,
    ) -> Result<PurchaseOutcome, AppError> {
        let valid = self.validate_purchase(account_id, &req).await?;
        let key = valid.draft.idempotency_key.clone();

        let _guard = self.locks.acquire(account_id).await;

        if let Some(existing) = self.repo.find_by_idempotency_key(&key).await? {
            return Self::replay(account_id, existing);
        }

        let available = self.repo.get_balance(account_id).await?;
        if valid.draft.amount > available {
            return Err(AppError::InsufficientFunds {
                available,
                requested: valid.draft.amount,
            });
        }

        let pending = Transaction::pending_purchase(
            account_id,
            internal_request_id(),
            valid.draft.clone(),
        );
        let tx = match self.repo.create_transaction(pending).await? {
            Recorded::Created(tx) => tx,
            Recorded::Existing(existing) => return Self::replay(account_id, existing),
        };
        info!(request_id = %tx.request_id, idempotency_key = %key, amount = %tx.amount, "purchase reserved");

        let order = PurchaseOrder {
            service_id: valid.draft.service_id,
            variation_code: valid.variation_code,
            amount: valid.draft.amount,
            phone: valid.draft.recipient_phone,
            email: valid.draft.recipient_email,
            request_id: key,
            auto_retry: valid.auto_retry,
            extra_params: valid.extra_params,
        };
        let result = self.provider.purchase(order).await;

        let settled = self.settle(&tx, result, Phase::Purchase).await?;
        Ok(outcome_of(settled, false))
    }

    /// Checks required fields, then the PIN, then amount and type.
    async fn validate_purchase(
        &self,
        account_id: AccountId,
        req: &PurchaseRequest,
    ) -> Result<ValidPurchase, AppError> {
        let missing: Vec<&str> = [
            ("service_id", req.service_id.trim().is_empty()),
            ("amount", req.amount.is_none()),
            ("phone", req.phone.trim().is_empty()),
            ("email", req.email.trim().is_empty()),
            ("pin", req.pin.is_empty()),
        ]
        .into_iter()
        .filter_map(|(name, absent)| absent.then_some(name))
        .collect();
        if !missing.is_empty() {
            return Err(AppError::BadRequest(format!(
                "Missing required fields: {}",
                missing.join(", ")
            )));
        }

        let account = self.get_account(account_id).await?;
        let pin_ok = account
            .pin_hash
            .as_deref()
            .is_some_and(|hash| verify_pin(account_id, &req.pin, hash));
        if !pin_ok {
            return Err(DomainError::InvalidPin.into());
        }

        let amount = match &req.amount {
            Some(raw) => raw.to_positive_amount()?,
            None => return Err(AppError::BadRequest("amount is required".into())),
        };

        let kind = match req.transaction_type.as_deref().map(str::trim) {
            None | Some("") => TransactionKind::Purchase,
            Some(label) => label.parse::<TransactionKind>()?,
        };
        if kind == TransactionKind::WalletFunding {
            return Err(AppError::BadRequest(
                "wallet_funding is not a purchase type".into(),
            ));
        }

        let idempotency_key = req
            .request_id
            .as_deref()
            .map(str::trim)
            .filter(|k| !k.is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| Uuid::new_v4().to_string());

        Ok(ValidPurchase {
            draft: PurchaseDraft {
                kind,
                service_id: req.service_id.trim().to_string(),
                amount,
                recipient_phone: req.phone.trim().to_string(),
                recipient_email: req.email.trim().to_string(),
                idempotency_key,
            },
            variation_code: req
                .variation_code
                .as_deref()
                .map(str::trim)
                .filter(|c| !c.is_empty())
                .map(str::to_string),
            auto_retry: req.auto_retry,
            extra_params: stringify_extras(&req.extra_params),
        })
    }

    fn replay(account_id: AccountId, existing: Transaction) -> Result<PurchaseOutcome, AppError> {
        if !existing.is_owned_by(account_id) || existing.kind == TransactionKind::WalletFunding {
            return Err(AppError::Conflict(
                "request_id has already been used".into(),
            ));
        }
        info!(request_id = %existing.request_id, status = %existing.status, "replaying stored purchase");
        Ok(outcome_of(existing, true))
    }

    // ─────────────────────────────────────────────────────────────────────────────
    // Status requery
    // ─────────────────────────────────────────────────────────────────────────────

    /// Asks the provider about a purchase and settles it if it was still pending.
    ///
    /// `request_id` may be the internal `REQ-` id or the caller's idempotency key.
    #[instrument(skip(self))]
    pub async fn transaction_status(
        &self,
        account_id: AccountId,
        request_id: &str,
    ) -> Result<TransactionStatusResponse, AppError> {
        let _guard = self.locks.acquire(account_id).await;

        let found = match self.repo.find_by_request_id(request_id).await? {
            Some(tx) => Some(tx),
            None => self.repo.find_by_idempotency_key(request_id).await?,
        };
        let tx = found
            .filter(|tx| tx.is_owned_by(account_id) && tx.kind != TransactionKind::WalletFunding)
            .ok_or_else(|| AppError::NotFound("Transaction not found".into()))?;

        let result = self.provider.verify_status(tx.upstream_request_id()).await;
        let status = result.response.as_value();

        let transaction = if tx.status == TransactionStatus::Pending {
            self.settle(&tx, result, Phase::Requery).await?
        } else {
            tx
        };

        Ok(TransactionStatusResponse {
            transaction,
            status,
        })
    }

    // ─────────────────────────────────────────────────────────────────────────────
    // Settlement
    // ─────────────────────────────────────────────────────────────────────────────

    /// Writes the provider's verdict onto a pending row.
    async fn settle(
        &self,
        tx: &Transaction,
        result: ProviderResult,
        phase: Phase,
    ) -> Result<Transaction, AppError> {
        let ProviderResult {
            outcome,
            mut response,
            request_id,
            attempts,
        } = result;

        let Some(status) = phase.resolve(outcome) else {
            info!(request_id = %tx.request_id, ?outcome, "requery inconclusive, leaving pending");
            return Ok(tx.clone());
        };

        if status == TransactionStatus::Successful {
            let update = TransactionUpdate::new(status)
                .response(response.as_value())
                .reference(response.provider_reference())
                .request_id(request_id.clone())
                .effect(BalanceEffect::Debit(tx.amount));

            return match self.repo.update_transaction_status(tx.id, update).await {
                Ok(settled) => {
                    info!(request_id = %tx.request_id, upstream_request_id = %request_id, attempts, "purchase settled");
                    Ok(settled)
                }
                Err(RepoError::Domain(DomainError::InsufficientFunds {
                    available,
                    requested,
                })) => {
                    error!(
                        request_id = %tx.request_id,
                        %available,
                        %requested,
                        "provider accepted purchase but wallet debit failed"
                    );
                    response.annotate(
                        "settlement_error",
                        "Wallet balance no longer covers this purchase.",
                    );
                    response.annotate(
                        "error_message",
                        "The purchase could not be charged to your wallet.",
                    );
                    response.annotate(
                        "suggested_action",
                        "Please contact support with this transaction's request id.",
                    );
                    let update = TransactionUpdate::new(TransactionStatus::Failed)
                        .response(response.into_value())
                        .request_id(request_id);
                    Ok(self.repo.update_transaction_status(tx.id, update).await?)
                }
                Err(e) => Err(e.into()),
            };
        }

        annotate_guidance(&mut response, outcome);
        if status == TransactionStatus::Pending {
            warn!(request_id = %tx.request_id, "provider outcome unknown, transaction left pending");
        } else {
            warn!(request_id = %tx.request_id, ?outcome, code = ?response.code(), attempts, "purchase failed");
        }

        let update = TransactionUpdate::new(status)
            .response(response.into_value())
            .request_id(request_id);
        Ok(self.repo.update_transaction_status(tx.id, update).await?)
    }
}
