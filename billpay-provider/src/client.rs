use reqwest::{Client, StatusCode};
use serde_json::{Value, json};
use tracing::{debug, info, instrument, warn};

use billpay_types::domain::provider::codes;
use billpay_types::{
    Amount, BillingProvider, Catalog, ProviderError, ProviderOutcome, ProviderResponse,
    ProviderResult, PurchaseOrder, ServiceListing,
};

use crate::aliases::expand_extra_params;
use crate::catalog::builtin_services;
use crate::config::ProviderConfig;
use crate::retry::retry_request_id;

/// Failure to construct the HTTP client.
#[derive(Debug, thiserror::Error)]
#[error("failed to build billing provider client: {0}")]
pub struct ProviderBuildError(#[from] reqwest::Error);

/// Why a call did not yield a usable JSON payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FailureKind {
    Timeout,
    Connect,
    Unauthorized,
    Status,
    Malformed,
}

/// A failed call, with the sentinel payload to persist in its place.
#[derive(Debug)]
struct CallFailure {
    kind: FailureKind,
    response: ProviderResponse,
}

impl CallFailure {
    fn outcome(&self) -> ProviderOutcome {
        match self.kind {
            FailureKind::Timeout => ProviderOutcome::Indeterminate,
            _ => ProviderOutcome::Unavailable,
        }
    }

    fn description(&self) -> String {
        self.response
            .description
            .clone()
            .unwrap_or_else(|| "billing provider error".to_string())
    }

    fn into_error(self) -> ProviderError {
        match self.kind {
            FailureKind::Unauthorized => ProviderError::Unauthorized,
            FailureKind::Malformed => ProviderError::InvalidResponse(self.description()),
            _ => ProviderError::ServiceUnavailable(self.description()),
        }
    }
}

#[derive(Clone, Copy)]
enum Credential {
    Read,
    Write,
}

/// Billing provider adapter over HTTP.
#[derive(Clone)]
pub struct HttpBillingProvider {
    client: Client,
    config: ProviderConfig,
}

impl HttpBillingProvider {
    pub fn new(config: ProviderConfig) -> Result<Self, ProviderBuildError> {
        let client = Client::builder().timeout(config.timeout).build()?;
        Ok(Self { client, config })
    }

    fn authorize(&self, req: reqwest::RequestBuilder, credential: Credential) -> reqwest::RequestBuilder {
        let req = req
            .header("api-key", &self.config.api_key)
            .header("Accept", "application/json");
        match credential {
            Credential::Read => req.header("public-key", &self.config.public_key),
            Credential::Write => req.header("secret-key", &self.config.secret_key),
        }
    }

    async fn get(&self, endpoint: &str, query: &[(&str, &str)]) -> Result<ProviderResponse, CallFailure> {
        let req = self.client.get(self.config.url(endpoint)).query(query);
        self.send(self.authorize(req, Credential::Read), endpoint).await
    }

    async fn post(&self, endpoint: &str, body: &Value) -> Result<ProviderResponse, CallFailure> {
        let req = self.client.post(self.config.url(endpoint)).json(body);
        self.send(self.authorize(req, Credential::Write), endpoint).await
    }

    async fn send(
        &self,
        req: reqwest::RequestBuilder,
        endpoint: &str,
    ) -> Result<ProviderResponse, CallFailure> {
        let resp = req.send().await.map_err(|e| {
            let kind = if e.is_timeout() {
                FailureKind::Timeout
            } else {
                FailureKind::Connect
            };
            warn!(endpoint, error = %e, timeout = e.is_timeout(), "billing provider request failed");
            CallFailure {
                kind,
                response: ProviderResponse::transport_error(e.to_string()),
            }
        })?;

        let status = resp.status();
        debug!(endpoint, status = status.as_u16(), "billing provider responded");

        if status == StatusCode::UNAUTHORIZED {
            warn!(endpoint, "billing provider rejected our credentials");
            return Err(CallFailure {
                kind: FailureKind::Unauthorized,
                response: ProviderResponse::transport_error(
                    "Invalid billing provider API credentials. Please check your API keys.",
                ),
            });
        }
        if !status.is_success() {
            return Err(CallFailure {
                kind: FailureKind::Status,
                response: ProviderResponse::transport_error(format!(
                    "Billing provider API error: {}",
                    status.as_u16()
                )),
            });
        }

        let body = resp.text().await.map_err(|e| {
            let kind = if e.is_timeout() {
                FailureKind::Timeout
            } else {
                FailureKind::Connect
            };
            CallFailure {
                kind,
                response: ProviderResponse::transport_error(e.to_string()),
            }
        })?;

        match serde_json::from_str::<Value>(&body) {
            Ok(value) => Ok(ProviderResponse::from_value(value)),
            Err(e) => {
                warn!(endpoint, error = %e, "billing provider returned invalid JSON");
                Err(CallFailure {
                    kind: FailureKind::Malformed,
                    response: ProviderResponse::malformed(body),
                })
            }
        }
    }

    fn purchase_body(order: &PurchaseOrder, request_id: &str) -> Value {
        let mut body = json!({
            "serviceID": order.service_id,
            "amount": order.amount.to_string(),
            "phone": order.phone,
            "email": order.email,
            "request_id": request_id,
        });
        if let Some(map) = body.as_object_mut() {
            if let Some(code) = order.variation_code.as_deref().filter(|c| !c.is_empty()) {
                map.insert("variation_code".into(), Value::String(code.to_string()));
            }
            map.extend(expand_extra_params(&order.service_id, &order.extra_params));
        }
        body
    }

    fn classify(result: Result<ProviderResponse, CallFailure>) -> (ProviderOutcome, ProviderResponse) {
        match result {
            Ok(response) => (response.classify(), response),
            Err(failure) => (failure.outcome(), failure.response),
        }
    }
}

/// Adds the failure context callers use to decide what to do next.
fn annotate_failure(response: &mut ProviderResponse, outcome: ProviderOutcome) {
    let code = match outcome {
        ProviderOutcome::TransientFailure => {
            response.annotate(
                "possible_causes",
                json!([
                    "Network connectivity issues with the mobile operator",
                    "Invalid recipient number",
                    "Service temporarily unavailable",
                    "Transaction limits reached"
                ]),
            );
            codes::TRANSACTION_FAILED
        }
        ProviderOutcome::InsufficientProviderFunds => {
            codes::INSUFFICIENT_FUNDS
        }
        ProviderOutcome::DuplicateRequest => {
            codes::DUPLICATE_REQUEST
        }
        _ => return,
    };
    response.annotate("provider_error_code", code);
    if let Some(error_type) = outcome.error_type() {
        response.annotate("error_type", error_type);
    }
    response.annotate("retry_recommended", outcome.retry_recommended());
}

#[async_trait::async_trait]
impl BillingProvider for HttpBillingProvider {
    #[instrument(skip(self))]
    async fn balance(&self) -> Result<Amount, ProviderError> {
        let response = self.get("balance", &[]).await.map_err(CallFailure::into_error)?;
        response.balance().ok_or_else(|| {
            ProviderError::InvalidResponse(
                response
                    .description
                    .clone()
                    .unwrap_or_else(|| "balance missing from response".to_string()),
            )
        })
    }

    #[instrument(skip(self))]
    async fn catalog(&self, service_type: &str) -> Catalog {
        let listed = match self.get(service_type, &[]).await {
            Ok(response) if response.code() != Some(codes::TRANSPORT_ERROR) => response
                .content
                .clone()
                .and_then(|content| serde_json::from_value::<Vec<ServiceListing>>(content).ok()),
            Ok(_) => None,
            Err(failure) => {
                warn!(service_type, error = %failure.description(), "catalog unavailable");
                None
            }
        };

        match listed {
            Some(services) => Catalog {
                service_type: service_type.to_string(),
                services,
                degraded: false,
            },
            None => {
                info!(service_type, "serving built-in catalog");
                Catalog {
                    service_type: service_type.to_string(),
                    services: builtin_services(service_type),
                    degraded: true,
                }
            }
        }
    }

    #[instrument(skip(self))]
    async fn variations(&self, service_id: &str) -> Result<ProviderResponse, ProviderError> {
        let response = self
            .get("service-variations", &[("serviceID", service_id)])
            .await
            .map_err(CallFailure::into_error)?;
        match response.code() {
            Some(codes::TRANSPORT_ERROR) => Err(ProviderError::ServiceUnavailable(
                response.description.clone().unwrap_or_default(),
            )),
            _ => Ok(response),
        }
    }

    #[instrument(skip(self, order), fields(service_id = %order.service_id, request_id = %order.request_id, auto_retry = order.auto_retry))]
    async fn purchase(&self, order: PurchaseOrder) -> ProviderResult {
        let max_retries = if order.auto_retry {
            self.config.retry.max_retries
        } else {
            0
        };
        let mut attempt = 0;

        loop {
            let request_id = retry_request_id(&order.request_id, attempt);
            let body = Self::purchase_body(&order, &request_id);
            let (outcome, mut response) = Self::classify(self.post("pay", &body).await);

            if outcome == ProviderOutcome::TransientFailure && attempt < max_retries {
                attempt += 1;
                let delay = self.config.retry.delay(attempt);
                warn!(
                    attempt,
                    max_retries,
                    delay_ms = delay.as_millis() as u64,
                    "transient purchase failure, retrying"
                );
                tokio::time::sleep(delay).await;
                continue;
            }

            if outcome.is_success() {
                info!(request_id = %request_id, attempts = attempt + 1, "purchase accepted");
            } else {
                warn!(request_id = %request_id, ?outcome, code = ?response.code(), "purchase not accepted");
                annotate_failure(&mut response, outcome);
            }

            return ProviderResult {
                outcome,
                response,
                request_id,
                attempts: attempt + 1,
            };
        }
    }

    #[instrument(skip(self))]
    async fn verify_status(&self, request_id: &str) -> ProviderResult {
        let (outcome, response) =
            Self::classify(self.get("requery", &[("request_id", request_id)]).await);
        debug!(?outcome, "requery classified");
        ProviderResult {
            outcome,
            response,
            request_id: request_id.to_string(),
            attempts: 1,
        }
    }
}
