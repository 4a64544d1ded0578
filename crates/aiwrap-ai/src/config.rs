//! Provider configuration.
//!
//! [`ProviderConfig`] is deserialized from the `[provider]` table of the
//! application config file; every field has a default except the API key,
//! which is checked when a provider is constructed.

use std::collections::BTreeMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{AiError, Result};

/// Default OpenAI API base URL.
pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

/// Model used when a request does not name one.
pub const DEFAULT_MODEL: &str = "gpt-3.5-turbo";

const DEFAULT_TIMEOUT_SECS: u64 = 30;
const DEFAULT_MAX_RETRIES: u32 = 3;
const DEFAULT_BACKOFF_MS: u64 = 1000;
const DEFAULT_STREAM_BUFFER: usize = 100;

/// Connection settings for one provider instance.
#[derive(Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderConfig {
    /// Bearer token sent with every request.
    pub api_key: String,
    /// API root, without a trailing slash (e.g. `https://api.openai.com/v1`).
    pub base_url: String,
    /// Whole-request timeout in seconds, including reading the body.
    pub timeout_secs: u64,
    /// Additional attempts after the first one fails. `0` disables retries.
    pub max_retries: u32,
    /// Linear backoff unit: the wait before attempt `n + 1` is
    /// `(n + 1) * backoff_ms`.
    pub backoff_ms: u64,
    /// Model applied when a request leaves `model` empty.
    pub default_model: String,
    /// Capacity of the channel that carries stream chunks.
    pub stream_buffer: usize,
    /// Extra top-level fields merged into every chat request body.
    pub extra_params: BTreeMap<String, Value>,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            base_url: DEFAULT_BASE_URL.to_owned(),
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            max_retries: DEFAULT_MAX_RETRIES,
            backoff_ms: DEFAULT_BACKOFF_MS,
            default_model: DEFAULT_MODEL.to_owned(),
            stream_buffer: DEFAULT_STREAM_BUFFER,
            extra_params: BTreeMap::new(),
        }
    }
}

impl ProviderConfig {
    /// Create a configuration with the given key and defaults elsewhere.
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            ..Self::default()
        }
    }

    /// Point the provider at a different API root.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Set the retry bound.
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Set the linear backoff unit.
    pub fn with_backoff(mut self, unit: Duration) -> Self {
        self.backoff_ms = u64::try_from(unit.as_millis()).unwrap_or(u64::MAX);
        self
    }

    /// Request timeout as a [`Duration`].
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Backoff unit as a [`Duration`].
    pub fn backoff_unit(&self) -> Duration {
        Duration::from_millis(self.backoff_ms)
    }

    /// Check the settings a provider cannot work without.
    pub fn validate(&self, provider: &str) -> Result<()> {
        if self.api_key.is_empty() {
            return Err(AiError::MissingApiKey {
                provider: provider.to_owned(),
            });
        }
        if self.base_url.is_empty() {
            return Err(AiError::Config {
                reason: "base_url must not be empty".into(),
            });
        }
        if self.stream_buffer == 0 {
            return Err(AiError::Config {
                reason: "stream_buffer must be at least 1".into(),
            });
        }
        Ok(())
    }
}

impl std::fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("api_key", &if self.api_key.is_empty() { "" } else { "***" })
            .field("base_url", &self.base_url)
            .field("timeout_secs", &self.timeout_secs)
            .field("max_retries", &self.max_retries)
            .field("backoff_ms", &self.backoff_ms)
            .field("default_model", &self.default_model)
            .field("stream_buffer", &self.stream_buffer)
            .field("extra_params", &self.extra_params)
            .finish()
    }
}
