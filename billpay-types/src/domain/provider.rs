//! Billing provider payloads and outcome classification.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::amount::Amount;

/// Response codes the provider uses.
pub mod codes {
    /// Codes that mean the purchase went through.
    pub const SUCCESS: [&str; 3] = ["success", "000", "01"];
    /// Transaction failed upstream; safe to retry with a new request id.
    pub const TRANSACTION_FAILED: &str = "016";
    /// The provider float cannot cover the purchase.
    pub const INSUFFICIENT_FUNDS: &str = "014";
    /// The provider has already seen this request id.
    pub const DUPLICATE_REQUEST: &str = "009";
    /// Sentinel for transport, HTTP and decode failures.
    pub const TRANSPORT_ERROR: &str = "error";
    /// Nested delivery status that also signals success.
    pub const DELIVERED: &str = "delivered";
}

/// A provider payload. Known fields are extracted, the raw object is kept.
///
/// The typed fields are read from whatever shape came back; the full JSON
/// object is kept so unknown shapes survive for audit.
#[derive(Debug, Clone, PartialEq)]
pub struct ProviderResponse {
    pub code: Option<String>,
    pub description: Option<String>,
    pub data: Option<Value>,
    pub content: Option<Value>,
    raw: Map<String, Value>,
}

impl ProviderResponse {
    /// Decodes any JSON value. Non-objects are wrapped under `raw_response`.
    pub fn from_value(value: Value) -> Self {
        let raw = match value {
            Value::Object(map) => map,
            other => {
                let mut map = Map::new();
                map.insert("raw_response".into(), other);
                map
            }
        };

        let code = raw.get("code").and_then(scalar_to_string);
        let description = raw
            .get("response_description")
            .and_then(scalar_to_string);
        let data = raw.get("data").filter(|v| !v.is_null()).cloned();
        let content = raw.get("content").filter(|v| !v.is_null()).cloned();

        Self {
            code,
            description,
            data,
            content,
            raw,
        }
    }

    /// Builds the sentinel payload used for transport-level failures.
    pub fn transport_error(description: impl Into<String>) -> Self {
        Self::from_value(serde_json::json!({
            "code": codes::TRANSPORT_ERROR,
            "response_description": description.into(),
            "data": {},
        }))
    }

    /// Builds a sentinel payload that keeps an unparseable body.
    pub fn malformed(body: impl Into<String>) -> Self {
        Self::from_value(serde_json::json!({
            "code": codes::TRANSPORT_ERROR,
            "response_description": "Invalid JSON response from billing provider",
            "raw_response": body.into(),
        }))
    }

    pub fn code(&self) -> Option<&str> {
        self.code.as_deref()
    }

    /// `content.transactions.status`, when present.
    pub fn delivery_status(&self) -> Option<&str> {
        self.content
            .as_ref()?
            .get("transactions")?
            .get("status")?
            .as_str()
    }

    /// The success predicate shared by purchase settlement and status requery.
    pub fn is_success(&self) -> bool {
        self.code().is_some_and(|c| codes::SUCCESS.contains(&c))
            || self.delivery_status() == Some(codes::DELIVERED)
    }

    pub fn classify(&self) -> ProviderOutcome {
        if self.is_success() {
            return ProviderOutcome::Success;
        }
        match self.code() {
            Some(codes::TRANSACTION_FAILED) => ProviderOutcome::TransientFailure,
            Some(codes::INSUFFICIENT_FUNDS) => ProviderOutcome::InsufficientProviderFunds,
            Some(codes::DUPLICATE_REQUEST) => ProviderOutcome::DuplicateRequest,
            Some(codes::TRANSPORT_ERROR) => ProviderOutcome::Unavailable,
            _ => ProviderOutcome::Rejected,
        }
    }

    /// Extracts the provider's reference from whichever shape is present.
    pub fn provider_reference(&self) -> Option<String> {
        let from_data = self
            .data
            .as_ref()
            .and_then(|d| d.get("reference_id"))
            .and_then(scalar_to_string);
        let from_content = || {
            self.content
                .as_ref()
                .and_then(|c| c.get("transactions"))
                .and_then(|t| t.get("transactionId"))
                .and_then(scalar_to_string)
        };
        let from_root = || self.raw.get("requestId").and_then(scalar_to_string);

        from_data.or_else(from_content).or_else(from_root)
    }

    /// Reads `data.balance` or `contents.balance` as an amount.
    pub fn balance(&self) -> Option<Amount> {
        let value = self
            .data
            .as_ref()
            .and_then(|d| d.get("balance"))
            .or_else(|| self.raw.get("contents").and_then(|c| c.get("balance")))?;
        let text = scalar_to_string(value)?;
        Amount::parse(&text).ok()
    }

    /// Adds an annotation to the stored payload.
    pub fn annotate(&mut self, key: &str, value: impl Into<Value>) {
        self.raw.insert(key.to_string(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.raw.get(key)
    }

    pub fn as_value(&self) -> Value {
        Value::Object(self.raw.clone())
    }

    pub fn into_value(self) -> Value {
        Value::Object(self.raw)
    }
}

impl Serialize for ProviderResponse {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.raw.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for ProviderResponse {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Value::deserialize(deserializer).map(ProviderResponse::from_value)
    }
}

fn scalar_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// How the engine should treat a provider response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderOutcome {
    Success,
    /// `016`: retryable with a fresh request id
    TransientFailure,
    /// `014`: provider float exhausted; needs an operator
    InsufficientProviderFunds,
    /// `009`: provider already saw the request id
    DuplicateRequest,
    /// Any other provider code
    Rejected,
    /// Transport, HTTP or decode failure; the provider did not process the request
    Unavailable,
    /// Timed out; the provider may or may not have processed the request
    Indeterminate,
}

impl ProviderOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, ProviderOutcome::Success)
    }

    /// Stable error type annotated into stored responses.
    pub fn error_type(&self) -> Option<&'static str> {
        match self {
            ProviderOutcome::Success => None,
            ProviderOutcome::TransientFailure => Some("TRANSACTION_FAILED"),
            ProviderOutcome::InsufficientProviderFunds => Some("INSUFFICIENT_FUNDS"),
            ProviderOutcome::DuplicateRequest => Some("DUPLICATE_REQUEST"),
            ProviderOutcome::Rejected => Some("UNKNOWN_ERROR"),
            ProviderOutcome::Unavailable => Some("UPSTREAM_UNAVAILABLE"),
            ProviderOutcome::Indeterminate => Some("UPSTREAM_TIMEOUT"),
        }
    }

    pub fn retry_recommended(&self) -> bool {
        matches!(
            self,
            ProviderOutcome::TransientFailure
                | ProviderOutcome::DuplicateRequest
                | ProviderOutcome::Unavailable
        )
    }
}

/// The classified result of a purchase or requery call.
#[derive(Debug, Clone)]
pub struct ProviderResult {
    pub outcome: ProviderOutcome,
    pub response: ProviderResponse,
    /// Request id sent on the final attempt
    pub request_id: String,
    /// Number of upstream calls made
    pub attempts: u32,
}

/// A purchase to submit upstream.
#[derive(Debug, Clone)]
pub struct PurchaseOrder {
    pub service_id: String,
    pub variation_code: Option<String>,
    pub amount: Amount,
    pub phone: String,
    pub email: String,
    pub request_id: String,
    pub auto_retry: bool,
    /// Service-specific fields keyed by whatever spelling the caller used
    pub extra_params: BTreeMap<String, String>,
}

/// A priced variation of a service (e.g. a data bundle).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Variation {
    pub variation_code: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub amount: Option<Amount>,
}

/// A purchasable service as listed in a catalog.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceListing {
    #[serde(alias = "serviceID")]
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub variations: Vec<Variation>,
}

/// Services for one service type, flagged when served from the built-in list.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Catalog {
    pub service_type: String,
    pub services: Vec<ServiceListing>,
    pub degraded: bool,
}
