//! HTTP contract tests for the billing provider client.

use std::collections::BTreeMap;
use std::time::Duration;

use serde_json::{Value, json};
use wiremock::matchers::{body_partial_json, header, header_exists, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use billpay_provider::{HttpBillingProvider, ProviderConfig, RetryPolicy};
use billpay_types::{Amount, BillingProvider, ProviderError, ProviderOutcome, PurchaseOrder};

fn provider(server: &MockServer) -> HttpBillingProvider {
    let config = ProviderConfig::new(server.uri())
        .with_credentials("test-api-key", "pk_test", "sk_test")
        .with_timeout(Duration::from_millis(500))
        .with_retry(RetryPolicy::with_base_delay(Duration::from_millis(5)));
    HttpBillingProvider::new(config).unwrap()
}

fn order(request_id: &str, auto_retry: bool) -> PurchaseOrder {
    PurchaseOrder {
        service_id: "mtn".to_string(),
        variation_code: None,
        amount: Amount::parse("500").unwrap(),
        phone: "08011111111".to_string(),
        email: "ada@example.com".to_string(),
        request_id: request_id.to_string(),
        auto_retry,
        extra_params: BTreeMap::new(),
    }
}

async fn pay_requests(server: &MockServer) -> Vec<Value> {
    server
        .received_requests()
        .await
        .unwrap_or_default()
        .iter()
        .filter(|r| r.url.path() == "/pay")
        .map(|r| serde_json::from_slice(&r.body).unwrap())
        .collect()
}

#[tokio::test]
async fn test_purchase_success_uses_write_credentials() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/pay"))
        .and(header("api-key", "test-api-key"))
        .and(header("secret-key", "sk_test"))
        .and(body_partial_json(json!({
            "serviceID": "mtn",
            "amount": "500.00",
            "request_id": "key-1"
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "code": "000",
            "data": { "reference_id": "VT-REF-1" }
        })))
        .expect(1)
        .mount(&server)
        .await;

    let result = provider(&server).purchase(order("key-1", false)).await;

    assert_eq!(result.outcome, ProviderOutcome::Success);
    assert_eq!(result.attempts, 1);
    assert_eq!(result.request_id, "key-1");
    assert_eq!(result.response.provider_reference().as_deref(), Some("VT-REF-1"));
}

#[tokio::test]
async fn test_transient_failure_retries_with_distinct_request_ids() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/pay"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "code": "016",
            "response_description": "TRANSACTION FAILED"
        })))
        .expect(3)
        .mount(&server)
        .await;

    let result = provider(&server).purchase(order("key-2", true)).await;

    assert_eq!(result.outcome, ProviderOutcome::TransientFailure);
    assert_eq!(result.attempts, 3);
    assert_eq!(result.request_id, "key-2-retry-2");

    let ids: Vec<_> = pay_requests(&server)
        .await
        .into_iter()
        .map(|body| body["request_id"].as_str().unwrap().to_string())
        .collect();
    assert_eq!(ids, ["key-2", "key-2-retry-1", "key-2-retry-2"]);

    let annotated = result.response.as_value();
    assert_eq!(annotated["provider_error_code"], "016");
    assert_eq!(annotated["error_type"], "TRANSACTION_FAILED");
    assert_eq!(annotated["retry_recommended"], true);
    assert!(annotated["possible_causes"].as_array().unwrap().len() >= 3);
}

#[tokio::test]
async fn test_transient_failure_without_auto_retry_is_single_attempt() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/pay"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "code": "016" })))
        .expect(1)
        .mount(&server)
        .await;

    let result = provider(&server).purchase(order("key-3", false)).await;

    assert_eq!(result.outcome, ProviderOutcome::TransientFailure);
    assert_eq!(result.attempts, 1);
}

#[tokio::test]
async fn test_retry_stops_once_provider_succeeds() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/pay"))
        .and(body_partial_json(json!({ "request_id": "key-4" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "code": "016" })))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/pay"))
        .and(body_partial_json(json!({ "request_id": "key-4-retry-1" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "code": "000",
            "content": { "transactions": { "status": "delivered", "transactionId": "T-77" } }
        })))
        .mount(&server)
        .await;

    let result = provider(&server).purchase(order("key-4", true)).await;

    assert_eq!(result.outcome, ProviderOutcome::Success);
    assert_eq!(result.attempts, 2);
    assert_eq!(result.request_id, "key-4-retry-1");
    assert!(result.response.get("error_type").is_none());
}

#[tokio::test]
async fn test_insufficient_provider_funds_is_not_retried() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/pay"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "code": "014" })))
        .expect(1)
        .mount(&server)
        .await;

    let result = provider(&server).purchase(order("key-5", true)).await;

    assert_eq!(result.outcome, ProviderOutcome::InsufficientProviderFunds);
    let annotated = result.response.as_value();
    assert_eq!(annotated["error_type"], "INSUFFICIENT_FUNDS");
    assert_eq!(annotated["retry_recommended"], false);
}

#[tokio::test]
async fn test_duplicate_request_annotation() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/pay"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "code": "009" })))
        .mount(&server)
        .await;

    let result = provider(&server).purchase(order("key-6", true)).await;

    assert_eq!(result.outcome, ProviderOutcome::DuplicateRequest);
    assert_eq!(result.attempts, 1);
    assert_eq!(result.response.as_value()["error_type"], "DUPLICATE_REQUEST");
    assert_eq!(result.response.as_value()["retry_recommended"], true);
}

#[tokio::test]
async fn test_http_failures_become_sentinel_responses() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/pay"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;

    let result = provider(&server).purchase(order("key-7", false)).await;
    assert_eq!(result.outcome, ProviderOutcome::Unavailable);
    assert_eq!(result.response.code(), Some("error"));
    assert!(
        result
            .response
            .description
            .as_deref()
            .unwrap()
            .starts_with("Invalid billing provider API credentials")
    );

    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/pay"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let result = provider(&server).purchase(order("key-8", true)).await;
    assert_eq!(result.outcome, ProviderOutcome::Unavailable);
    assert_eq!(result.attempts, 1);
    assert_eq!(
        result.response.description.as_deref(),
        Some("Billing provider API error: 503")
    );
}

#[tokio::test]
async fn test_malformed_body_keeps_raw_text() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/pay"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>oops</html>"))
        .mount(&server)
        .await;

    let result = provider(&server).purchase(order("key-9", false)).await;

    assert_eq!(result.outcome, ProviderOutcome::Unavailable);
    assert_eq!(result.response.as_value()["raw_response"], "<html>oops</html>");
}

#[tokio::test]
async fn test_timeout_is_indeterminate() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/pay"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({ "code": "000" }))
                .set_delay(Duration::from_secs(2)),
        )
        .mount(&server)
        .await;

    let result = provider(&server).purchase(order("key-10", true)).await;

    assert_eq!(result.outcome, ProviderOutcome::Indeterminate);
    assert_eq!(result.attempts, 1);
    assert_eq!(result.response.code(), Some("error"));
}

#[tokio::test]
async fn test_exam_purchase_emits_billers_code_aliases() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/pay"))
        .and(body_partial_json(json!({
            "serviceID": "jamb",
            "variation_code": "utme",
            "billersCode": "0123456789",
            "billerscode": "0123456789",
            "billers_code": "0123456789"
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "code": "000" })))
        .expect(1)
        .mount(&server)
        .await;

    let mut exam = order("key-11", false);
    exam.service_id = "jamb".to_string();
    exam.variation_code = Some("utme".to_string());
    exam.extra_params
        .insert("billers_code".to_string(), "0123456789".to_string());

    let result = provider(&server).purchase(exam).await;
    assert_eq!(result.outcome, ProviderOutcome::Success);
}

#[tokio::test]
async fn test_catalog_falls_back_to_builtin_list() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/airtime"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let catalog = provider(&server).catalog("airtime").await;

    assert!(catalog.degraded);
    assert_eq!(catalog.services.len(), 4);
    assert_eq!(catalog.services[0].id, "mtn");
}

#[tokio::test]
async fn test_catalog_uses_upstream_listing() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/data"))
        .and(header("public-key", "pk_test"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "code": "000",
            "content": [
                { "serviceID": "glo-data", "name": "Glo Data", "description": "Glo bundles" }
            ]
        })))
        .mount(&server)
        .await;

    let catalog = provider(&server).catalog("data").await;

    assert!(!catalog.degraded);
    assert_eq!(catalog.services.len(), 1);
    assert_eq!(catalog.services[0].id, "glo-data");
}

#[tokio::test]
async fn test_balance_reads_with_public_key() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/balance"))
        .and(header_exists("public-key"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "code": "1",
            "contents": { "balance": "5234.10" }
        })))
        .mount(&server)
        .await;

    let balance = provider(&server).balance().await.unwrap();
    assert_eq!(balance, Amount::parse("5234.10").unwrap());
}

#[tokio::test]
async fn test_balance_unauthorized_is_an_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/balance"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;

    let err = provider(&server).balance().await.unwrap_err();
    assert!(matches!(err, ProviderError::Unauthorized));
}

#[tokio::test]
async fn test_requery_uses_shared_success_predicate() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/requery"))
        .and(query_param("request_id", "key-12-retry-1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "code": "000",
            "content": { "transactions": { "status": "delivered" } }
        })))
        .mount(&server)
        .await;

    let result = provider(&server).verify_status("key-12-retry-1").await;

    assert_eq!(result.outcome, ProviderOutcome::Success);
    assert_eq!(result.request_id, "key-12-retry-1");
}

#[tokio::test]
async fn test_variations_passes_service_id() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/service-variations"))
        .and(query_param("serviceID", "mtn-data"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "response_description": "000",
            "content": { "varations": [] }
        })))
        .mount(&server)
        .await;

    let response = provider(&server).variations("mtn-data").await.unwrap();
    assert!(response.content.is_some());
}
