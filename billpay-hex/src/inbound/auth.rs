//! Authentication middleware for API key validation.

use std::sync::Arc;

use axum::{
    Json,
    body::Body,
    extract::State,
    http::{Method, Request, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};

use billpay_types::{BillingProvider, LedgerRepository, PaymentChannel};

use super::handlers::{AppState, Caller};

/// Extracts the API key from the Authorization header.
/// Expected format: "Bearer <api_key>" or just "<api_key>"
fn extract_api_key(auth_header: Option<&str>) -> Option<&str> {
    let header = auth_header?;
    Some(header.strip_prefix("Bearer ").unwrap_or(header).trim())
}

/// Authentication middleware that resolves an API key to its account.
///
/// On success the owning account is attached to the request as a [`Caller`]
/// extension. `/health` and `POST /api/register` are open.
pub async fn auth_middleware<R, P, C>(
    State(state): State<Arc<AppState<R, P, C>>>,
    mut request: Request<Body>,
    next: Next,
) -> Response
where
    R: LedgerRepository,
    P: BillingProvider,
    C: PaymentChannel,
{
    let path = request.uri().path();
    if path == "/health" || (path == "/api/register" && request.method() == Method::POST) {
        return next.run(request).await;
    }

    let auth_header = request
        .headers()
        .get("Authorization")
        .and_then(|v| v.to_str().ok());

    let api_key = match extract_api_key(auth_header) {
        Some(key) if !key.is_empty() => key,
        _ => {
            return unauthorized_response("Missing or invalid Authorization header");
        }
    };

    let key_hash = billpay_repo::security::hash_api_key(api_key);

    match state.service.repo().verify_api_key_hash(&key_hash).await {
        Ok(Some(key)) => {
            request.extensions_mut().insert(Caller {
                account_id: key.account_id,
            });
            next.run(request).await
        }
        Ok(None) => unauthorized_response("Invalid API key"),
        Err(e) => {
            tracing::error!("API key verification failed: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(serde_json::json!({
                    "error": "Internal server error",
                    "code": 500,
                    "error_code": "INTERNAL_ERROR"
                })),
            )
                .into_response()
        }
    }
}

fn unauthorized_response(message: &str) -> Response {
    (
        StatusCode::UNAUTHORIZED,
        Json(serde_json::json!({
            "error": message,
            "code": 401,
            "error_code": "UNAUTHORIZED"
        })),
    )
        .into_response()
}
