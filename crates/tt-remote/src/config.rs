//! Remote client configuration

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// HTTP client configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteConfig {
    /// Base URL of the remote authority
    pub base_url: String,
    /// Per-request timeout in milliseconds
    pub timeout_ms: u64,
    /// User agent sent with every request
    pub user_agent: String,
}

impl RemoteConfig {
    /// Create configuration for a base URL
    #[inline]
    #[must_use]
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            ..Self::default()
        }
    }

    /// With request timeout
    #[inline]
    #[must_use]
    pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = timeout_ms;
        self
    }

    /// With user agent
    #[inline]
    #[must_use]
    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    /// Request timeout
    #[inline]
    #[must_use]
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:3000".to_string(),
            timeout_ms: 2_000,
            user_agent: format!("tt-remote/{}", crate::VERSION),
        }
    }
}

/// Retry policy for deferred jobs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Attempts before a job is abandoned (including the first)
    pub max_attempts: u32,
    /// Delay before the first retry, doubled on every further attempt
    pub base_delay_ms: u64,
    /// Upper bound on the delay between attempts
    pub max_delay_ms: u64,
}

impl RetryPolicy {
    /// With max attempts
    #[inline]
    #[must_use]
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    /// With base delay
    #[inline]
    #[must_use]
    pub fn with_base_delay_ms(mut self, base_delay_ms: u64) -> Self {
        self.base_delay_ms = base_delay_ms;
        self
    }

    /// Delay before retrying after `attempt` failed attempts
    #[must_use]
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(16);
        let delay = self.base_delay_ms.saturating_mul(1 << exponent);
        Duration::from_millis(delay.min(self.max_delay_ms))
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay_ms: 1_000,
            max_delay_ms: 60_000,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_builder() {
        let config = RemoteConfig::new("https://tt.example.com")
            .with_timeout_ms(500)
            .with_user_agent("test");
        assert_eq!(config.base_url, "https://tt.example.com");
        assert_eq!(config.timeout(), Duration::from_millis(500));
        assert_eq!(config.user_agent, "test");
    }

    #[test]
    fn config_deserializes() {
        let json = r#"{"base_url":"http://tt","timeout_ms":100,"user_agent":"ua"}"#;
        let config: RemoteConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.timeout_ms, 100);
    }

    #[test]
    fn retry_delay_doubles_and_caps() {
        let policy = RetryPolicy::default().with_base_delay_ms(100);
        assert_eq!(policy.delay_for(1), Duration::from_millis(100));
        assert_eq!(policy.delay_for(2), Duration::from_millis(200));
        assert_eq!(policy.delay_for(4), Duration::from_millis(800));
        assert_eq!(policy.delay_for(40), Duration::from_millis(60_000));
    }
}
