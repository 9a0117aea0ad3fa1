use std::time::Duration;

use crate::retry::RetryPolicy;

/// Connection settings for the billing provider.
#[derive(Clone)]
pub struct ProviderConfig {
    pub base_url: String,
    pub api_key: String,
    /// Sent on reads
    pub public_key: String,
    /// Sent on writes
    pub secret_key: String,
    pub timeout: Duration,
    pub retry: RetryPolicy,
}

impl ProviderConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: String::new(),
            public_key: String::new(),
            secret_key: String::new(),
            timeout: Duration::from_secs(30),
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_credentials(
        mut self,
        api_key: impl Into<String>,
        public_key: impl Into<String>,
        secret_key: impl Into<String>,
    ) -> Self {
        self.api_key = api_key.into();
        self.public_key = public_key.into();
        self.secret_key = secret_key.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub(crate) fn url(&self, endpoint: &str) -> String {
        format!("{}/{}", self.base_url, endpoint.trim_start_matches('/'))
    }
}

// Keys stay out of logs.
impl std::fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("base_url", &self.base_url)
            .field("timeout", &self.timeout)
            .field("retry", &self.retry)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_url_joining() {
        let config = ProviderConfig::new("https://sandbox.example.com/api/");
        assert_eq!(config.url("pay"), "https://sandbox.example.com/api/pay");
        assert_eq!(config.url("/requery"), "https://sandbox.example.com/api/requery");
    }

    #[test]
    fn test_debug_hides_keys() {
        let config = ProviderConfig::new("http://x").with_credentials("k", "pk_live", "sk_live");
        let rendered = format!("{config:?}");
        assert!(!rendered.contains("sk_live"));
        assert!(!rendered.contains("pk_live"));
    }
}
