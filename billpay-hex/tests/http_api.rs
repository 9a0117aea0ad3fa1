//! End-to-end tests of the HTTP surface over SQLite and a mocked billing provider.
//!
//! This test requires the `sqlite` feature flag.

#![cfg(feature = "sqlite")]

use std::time::Duration;

use axum::{
    Router,
    body::Body,
    http::{Method, Request, StatusCode},
};
use http_body_util::BodyExt;
use serde_json::{Value, json};
use tower::ServiceExt;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use billpay_hex::{
    WalletService,
    inbound::HttpServer,
    service::SimulatedChannel,
};
use billpay_provider::{HttpBillingProvider, ProviderConfig, RetryPolicy};
use billpay_repo::SqliteRepo;

async fn app(upstream: &MockServer) -> Router {
    let repo = SqliteRepo::new("sqlite::memory:").await.unwrap();
    let config = ProviderConfig::new(upstream.uri())
        .with_credentials("test-api-key", "pk_test", "sk_test")
        .with_timeout(Duration::from_millis(500))
        .with_retry(RetryPolicy::with_base_delay(Duration::from_millis(5)));
    let provider = HttpBillingProvider::new(config).unwrap();
    let service = WalletService::new(repo, provider, SimulatedChannel);
    HttpServer::new(service).router()
}

async fn call(
    app: &Router,
    method: Method,
    uri: &str,
    api_key: Option<&str>,
    body: Option<Value>,
) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(key) = api_key {
        builder = builder.header("Authorization", format!("Bearer {}", key));
    }
    let request = match body {
        Some(body) => builder
            .header("Content-Type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let json = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, json)
}

/// Registers, sets PIN 1234 and funds the wallet. Returns the API key.
async fn funded_customer(app: &Router, email: &str, amount: &str) -> String {
    let (status, body) = call(
        app,
        Method::POST,
        "/api/register",
        None,
        Some(json!({ "name": "Ada", "email": email })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    let api_key = body["api_key"].as_str().unwrap().to_string();
    assert!(api_key.starts_with("sk_"));

    let (status, _) = call(
        app,
        Method::POST,
        "/api/pin",
        Some(&api_key),
        Some(json!({ "pin": "1234", "pin_confirm": "1234" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = call(
        app,
        Method::POST,
        "/api/wallet/fund",
        Some(&api_key),
        Some(json!({ "amount": amount, "method": "bank_transfer" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);

    api_key
}

fn airtime(amount: &str, request_id: &str) -> Value {
    json!({
        "service_id": "mtn",
        "amount": amount,
        "phone": "08011111111",
        "email": "ada@example.com",
        "pin": "1234",
        "transaction_type": "airtime",
        "request_id": request_id,
    })
}

async fn mount_pay(upstream: &MockServer, body: Value) {
    Mock::given(method("POST"))
        .and(path("/pay"))
        .respond_with(ResponseTemplate::new(200).set_body_json(body))
        .mount(upstream)
        .await;
}

#[tokio::test]
async fn test_health_is_open() {
    let upstream = MockServer::start().await;
    let app = app(&upstream).await;

    let (status, body) = call(&app, Method::GET, "/health", None, None).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
}

#[tokio::test]
async fn test_missing_or_unknown_key_is_rejected() {
    let upstream = MockServer::start().await;
    let app = app(&upstream).await;

    let (status, body) = call(&app, Method::GET, "/api/transactions", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error_code"], "UNAUTHORIZED");

    let (status, _) = call(&app, Method::GET, "/api/transactions", Some("sk_nope"), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_purchase_debits_and_replays() {
    let upstream = MockServer::start().await;
    mount_pay(
        &upstream,
        json!({ "code": "000", "data": { "reference_id": "VT-1" } }),
    )
    .await;
    let app = app(&upstream).await;
    let key = funded_customer(&app, "ada@example.com", "1000").await;

    let (status, first) = call(
        &app,
        Method::POST,
        "/api/purchase",
        Some(&key),
        Some(airtime("500", "order-1")),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(first["transaction"]["status"], "successful");
    assert_eq!(first["transaction"]["provider_reference"], "VT-1");

    let (status, replay) = call(
        &app,
        Method::POST,
        "/api/purchase",
        Some(&key),
        Some(airtime("500", "order-1")),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(replay, first);
    assert_eq!(upstream.received_requests().await.unwrap().len(), 1);

    let (_, transactions) = call(&app, Method::GET, "/api/transactions", Some(&key), None).await;
    let rows = transactions.as_array().unwrap();
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0]["kind"], "airtime");
}

#[tokio::test]
async fn test_insufficient_balance_is_payment_required() {
    let upstream = MockServer::start().await;
    let app = app(&upstream).await;
    let key = funded_customer(&app, "ada@example.com", "100").await;

    let (status, body) = call(
        &app,
        Method::POST,
        "/api/purchase",
        Some(&key),
        Some(airtime("500", "order-1")),
    )
    .await;

    assert_eq!(status, StatusCode::PAYMENT_REQUIRED);
    assert_eq!(body["error_code"], "INSUFFICIENT_FUNDS");
    assert!(upstream.received_requests().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_wrong_pin_and_malformed_body() {
    let upstream = MockServer::start().await;
    let app = app(&upstream).await;
    let key = funded_customer(&app, "ada@example.com", "1000").await;

    let mut request = airtime("500", "order-1");
    request["pin"] = json!("9999");
    let (status, body) = call(&app, Method::POST, "/api/purchase", Some(&key), Some(request)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error_code"], "INVALID_PIN");

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method(Method::POST)
                .uri("/api/purchase")
                .header("Authorization", format!("Bearer {}", key))
                .header("Content-Type", "application/json")
                .body(Body::from("{not json"))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_failed_purchase_leaves_balance() {
    let upstream = MockServer::start().await;
    mount_pay(
        &upstream,
        json!({ "code": "014", "response_description": "LOW WALLET BALANCE" }),
    )
    .await;
    let app = app(&upstream).await;
    let key = funded_customer(&app, "ada@example.com", "1000").await;

    let (status, body) = call(
        &app,
        Method::POST,
        "/api/purchase",
        Some(&key),
        Some(airtime("500", "order-1")),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["transaction"]["status"], "failed");

    // Upstream balance endpoint is not mounted, so the ledger answers.
    let (status, balance) = call(&app, Method::GET, "/api/balance", Some(&key), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(balance["balance"], "1000.00");
    assert_eq!(balance["source"], "ledger");
}

#[tokio::test]
async fn test_transactions_are_private() {
    let upstream = MockServer::start().await;
    mount_pay(&upstream, json!({ "code": "000" })).await;
    let app = app(&upstream).await;
    let ada = funded_customer(&app, "ada@example.com", "1000").await;
    let bob = funded_customer(&app, "bob@example.com", "1000").await;

    let (_, outcome) = call(
        &app,
        Method::POST,
        "/api/purchase",
        Some(&ada),
        Some(airtime("200", "order-1")),
    )
    .await;
    let request_id = outcome["transaction"]["request_id"].as_str().unwrap();

    let (status, _) = call(
        &app,
        Method::GET,
        &format!("/api/transactions/{}/status", request_id),
        Some(&bob),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, body) = call(
        &app,
        Method::POST,
        "/api/purchase",
        Some(&bob),
        Some(airtime("200", "order-1")),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error_code"], "CONFLICT");
}

#[tokio::test]
async fn test_funding_status_and_dashboard() {
    let upstream = MockServer::start().await;
    let app = app(&upstream).await;
    let key = funded_customer(&app, "ada@example.com", "250").await;

    let (status, declined) = call(
        &app,
        Method::POST,
        "/api/wallet/fund",
        Some(&key),
        Some(json!({ "amount": "100", "method": "card", "reference": "card-1" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(declined["success"], false);
    assert_eq!(declined["updated_balance"], "250.00");

    let (status, payment) = call(
        &app,
        Method::GET,
        "/api/wallet/payments/card-1",
        Some(&key),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(payment["status"], "failed");

    let (status, dashboard) = call(&app, Method::GET, "/api/dashboard", Some(&key), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(dashboard["balance"], "250.00");
    assert_eq!(dashboard["total_spent"], "0.00");
    assert_eq!(dashboard["recent_transactions"].as_array().unwrap().len(), 2);
}
