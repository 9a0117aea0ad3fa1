//! Configuration loading from environment.

use std::env;
use std::str::FromStr;
use std::time::Duration;

use anyhow::Context;

/// Application configuration.
pub struct Config {
    pub port: u16,
    pub database_url: String,
    pub provider: ProviderSettings,
    pub rate_limit_per_minute: u32,
    /// OTLP collector; tracing export is off when unset
    pub otlp_endpoint: Option<String>,
}

/// Billing provider connection settings.
pub struct ProviderSettings {
    pub base_url: String,
    pub api_key: String,
    pub public_key: String,
    pub secret_key: String,
    pub timeout: Duration,
    pub retry_base: Duration,
}

impl Config {
    /// Loads configuration from environment variables.
    pub fn from_env() -> anyhow::Result<Self> {
        let port = parse_or("PORT", 3000)?;

        let database_url = env::var("DATABASE_URL")
            .map_err(|_| anyhow::anyhow!("DATABASE_URL environment variable is required"))?;

        let base_url = env::var("PROVIDER_BASE_URL")
            .map_err(|_| anyhow::anyhow!("PROVIDER_BASE_URL environment variable is required"))?;

        let provider = ProviderSettings {
            base_url,
            api_key: env::var("PROVIDER_API_KEY").unwrap_or_default(),
            public_key: env::var("PROVIDER_PUBLIC_KEY").unwrap_or_default(),
            secret_key: env::var("PROVIDER_SECRET_KEY").unwrap_or_default(),
            timeout: Duration::from_secs(parse_or("PROVIDER_TIMEOUT_SECS", 30)?),
            retry_base: Duration::from_millis(parse_or("PROVIDER_RETRY_BASE_MS", 1000)?),
        };

        Ok(Self {
            port,
            database_url,
            provider,
            rate_limit_per_minute: parse_or("RATE_LIMIT_PER_MINUTE", 100)?,
            otlp_endpoint: env::var("OTEL_EXPORTER_OTLP_ENDPOINT")
                .ok()
                .filter(|v| !v.trim().is_empty()),
        })
    }
}

fn parse_or<T>(name: &str, default: T) -> anyhow::Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .with_context(|| format!("{} is not valid: {:?}", name, raw)),
        Err(_) => Ok(default),
    }
}
