//! HTTP request handlers.

use std::sync::Arc;

use axum::{
    Extension, Json,
    extract::{Path, Query, State, rejection::JsonRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;

use billpay_types::{
    AccountId, AppError, BillingProvider, FundWalletRequest, LedgerRepository, NewAccount,
    PaymentChannel, PurchaseRequest, SetPinRequest, TransactionQuery,
};

use crate::WalletService;

/// Application state shared across handlers.
pub struct AppState<R, P, C>
where
    R: LedgerRepository,
    P: BillingProvider,
    C: PaymentChannel,
{
    pub service: WalletService<R, P, C>,
}

/// The authenticated account, inserted by the auth middleware.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Caller {
    pub account_id: AccountId,
}

/// Wrapper to implement IntoResponse for AppError (orphan rule workaround).
pub struct ApiError(pub AppError);

impl From<AppError> for ApiError {
    fn from(err: AppError) -> Self {
        ApiError(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            AppError::BadRequest(_) | AppError::InvalidPin => StatusCode::BAD_REQUEST,
            AppError::InsufficientFunds { .. } => StatusCode::PAYMENT_REQUIRED,
            AppError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::UpstreamUnavailable(_) => StatusCode::BAD_GATEWAY,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        // Internal details stay in the logs.
        let message = match &self.0 {
            AppError::Internal(detail) => {
                tracing::error!(error = %detail, "request failed");
                "Internal server error".to_string()
            }
            other => other.to_string(),
        };

        let body = json!({
            "error": message,
            "code": status.as_u16(),
            "error_code": self.0.error_code(),
        });

        (status, Json(body)).into_response()
    }
}

/// Unwraps a JSON body, reporting malformed input as a validation error.
fn body<T>(payload: Result<Json<T>, JsonRejection>) -> Result<T, ApiError> {
    payload
        .map(|Json(value)| value)
        .map_err(|rejection| AppError::BadRequest(rejection.body_text()).into())
}

/// Health check endpoint.
pub async fn health() -> impl IntoResponse {
    Json(json!({ "status": "healthy" }))
}

// ─────────────────────────────────────────────────────────────────────────────
// Accounts
// ─────────────────────────────────────────────────────────────────────────────

/// Register an account. Returns its API key once.
#[tracing::instrument(skip(state, payload))]
pub async fn register<R, P, C>(
    State(state): State<Arc<AppState<R, P, C>>>,
    payload: Result<Json<NewAccount>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError>
where
    R: LedgerRepository,
    P: BillingProvider,
    C: PaymentChannel,
{
    let registered = state.service.register(body(payload)?).await?;
    Ok((StatusCode::CREATED, Json(registered)))
}

/// Set the transaction PIN.
#[tracing::instrument(skip(state, caller, payload), fields(account_id = %caller.account_id))]
pub async fn set_pin<R, P, C>(
    State(state): State<Arc<AppState<R, P, C>>>,
    Extension(caller): Extension<Caller>,
    payload: Result<Json<SetPinRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError>
where
    R: LedgerRepository,
    P: BillingProvider,
    C: PaymentChannel,
{
    let account = state
        .service
        .set_pin(caller.account_id, body(payload)?)
        .await?;
    Ok(Json(json!({
        "message": "PIN set successfully",
        "account": account,
    })))
}

/// Wallet balance, degraded to the ledger when the provider is down.
#[tracing::instrument(skip(state, caller), fields(account_id = %caller.account_id))]
pub async fn balance<R, P, C>(
    State(state): State<Arc<AppState<R, P, C>>>,
    Extension(caller): Extension<Caller>,
) -> Result<impl IntoResponse, ApiError>
where
    R: LedgerRepository,
    P: BillingProvider,
    C: PaymentChannel,
{
    Ok(Json(state.service.balance(caller.account_id).await?))
}

// ─────────────────────────────────────────────────────────────────────────────
// Catalog
// ─────────────────────────────────────────────────────────────────────────────

#[tracing::instrument(skip(state))]
pub async fn services<R, P, C>(
    State(state): State<Arc<AppState<R, P, C>>>,
    Path(service_type): Path<String>,
) -> Result<impl IntoResponse, ApiError>
where
    R: LedgerRepository,
    P: BillingProvider,
    C: PaymentChannel,
{
    Ok(Json(state.service.catalog(&service_type).await?))
}

#[tracing::instrument(skip(state))]
pub async fn variations<R, P, C>(
    State(state): State<Arc<AppState<R, P, C>>>,
    Path(service_id): Path<String>,
) -> Result<impl IntoResponse, ApiError>
where
    R: LedgerRepository,
    P: BillingProvider,
    C: PaymentChannel,
{
    Ok(Json(state.service.variations(&service_id).await?))
}

// ─────────────────────────────────────────────────────────────────────────────
// Purchases
// ─────────────────────────────────────────────────────────────────────────────

/// Buy a service. Replays return the stored result unchanged.
#[tracing::instrument(skip(state, caller, payload), fields(account_id = %caller.account_id))]
pub async fn purchase<R, P, C>(
    State(state): State<Arc<AppState<R, P, C>>>,
    Extension(caller): Extension<Caller>,
    payload: Result<Json<PurchaseRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError>
where
    R: LedgerRepository,
    P: BillingProvider,
    C: PaymentChannel,
{
    let outcome = state
        .service
        .purchase(caller.account_id, body(payload)?)
        .await?;
    Ok(Json(outcome))
}

/// List the caller's transactions, newest first.
#[tracing::instrument(skip(state, caller), fields(account_id = %caller.account_id))]
pub async fn list_transactions<R, P, C>(
    State(state): State<Arc<AppState<R, P, C>>>,
    Extension(caller): Extension<Caller>,
    Query(query): Query<TransactionQuery>,
) -> Result<impl IntoResponse, ApiError>
where
    R: LedgerRepository,
    P: BillingProvider,
    C: PaymentChannel,
{
    let transactions = state
        .service
        .list_transactions(caller.account_id, query.limit)
        .await?;
    Ok(Json(transactions))
}

/// Requery a purchase upstream.
#[tracing::instrument(skip(state, caller), fields(account_id = %caller.account_id))]
pub async fn transaction_status<R, P, C>(
    State(state): State<Arc<AppState<R, P, C>>>,
    Extension(caller): Extension<Caller>,
    Path(request_id): Path<String>,
) -> Result<impl IntoResponse, ApiError>
where
    R: LedgerRepository,
    P: BillingProvider,
    C: PaymentChannel,
{
    let status = state
        .service
        .transaction_status(caller.account_id, &request_id)
        .await?;
    Ok(Json(status))
}

#[tracing::instrument(skip(state, caller), fields(account_id = %caller.account_id))]
pub async fn dashboard<R, P, C>(
    State(state): State<Arc<AppState<R, P, C>>>,
    Extension(caller): Extension<Caller>,
) -> Result<impl IntoResponse, ApiError>
where
    R: LedgerRepository,
    P: BillingProvider,
    C: PaymentChannel,
{
    Ok(Json(state.service.dashboard(caller.account_id).await?))
}

// ─────────────────────────────────────────────────────────────────────────────
// Wallet funding
// ─────────────────────────────────────────────────────────────────────────────

#[tracing::instrument(skip(state, caller, payload), fields(account_id = %caller.account_id))]
pub async fn fund_wallet<R, P, C>(
    State(state): State<Arc<AppState<R, P, C>>>,
    Extension(caller): Extension<Caller>,
    payload: Result<Json<FundWalletRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError>
where
    R: LedgerRepository,
    P: BillingProvider,
    C: PaymentChannel,
{
    let result = state
        .service
        .fund_wallet(caller.account_id, body(payload)?)
        .await?;
    Ok(Json(result))
}

#[tracing::instrument(skip(state, caller), fields(account_id = %caller.account_id))]
pub async fn payment_status<R, P, C>(
    State(state): State<Arc<AppState<R, P, C>>>,
    Extension(caller): Extension<Caller>,
    Path(reference): Path<String>,
) -> Result<impl IntoResponse, ApiError>
where
    R: LedgerRepository,
    P: BillingProvider,
    C: PaymentChannel,
{
    let status = state
        .service
        .payment_status(caller.account_id, &reference)
        .await?;
    Ok(Json(status))
}
