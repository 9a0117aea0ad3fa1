//! Billing provider client.
//!
//! Speaks the VTPass-style HTTP API: `balance`, `{service_type}`,
//! `service-variations`, `pay` and `requery`. Every purchase and requery
//! comes back as a classified [`ProviderResult`](billpay_types::ProviderResult);
//! transport problems never surface as errors on those paths.
//!
//! # Example
//! ```no_run
//! use billpay_provider::{HttpBillingProvider, ProviderConfig};
//! use billpay_types::BillingProvider;
//!
//! # async fn demo() -> Result<(), Box<dyn std::error::Error>> {
//! let config = ProviderConfig::new("https://sandbox.vtpass.com/api")
//!     .with_credentials("api-key", "pk_test", "sk_test");
//! let provider = HttpBillingProvider::new(config)?;
//! let catalog = provider.catalog("airtime").await;
//! println!("{} services (degraded: {})", catalog.services.len(), catalog.degraded);
//! # Ok(())
//! # }
//! ```

mod aliases;
mod catalog;
mod client;
mod config;
mod retry;

pub use aliases::expand_extra_params;
pub use catalog::builtin_services;
pub use client::{HttpBillingProvider, ProviderBuildError};
pub use config::ProviderConfig;
pub use retry::{RetryPolicy, retry_request_id};
