//! HTTP transport for the vendor API.
//!
//! [`Transport`] owns the `reqwest` client and the connection settings of a
//! single provider. It attaches authentication, retries network failures and
//! server errors with a linear backoff, and turns error statuses into typed
//! [`AiError`] values. Successful responses are returned with the body still
//! unread so streaming callers can consume it incrementally.

use std::time::Duration;

use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, HeaderValue, USER_AGENT};
use reqwest::{Method, Response};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use crate::config::ProviderConfig;
use crate::error::{AiError, ProviderError, Result};

/// `User-Agent` sent with every request.
const USER_AGENT_VALUE: &str = concat!("aiwrap/", env!("CARGO_PKG_VERSION"));

// ---------------------------------------------------------------------------
// Transport
// ---------------------------------------------------------------------------

/// Authenticated, retrying HTTP executor bound to one API root.
#[derive(Clone)]
pub struct Transport {
    http: reqwest::Client,
    api_key: String,
    base_url: String,
    max_retries: u32,
    backoff_unit: Duration,
}

impl Transport {
    /// Build a transport from provider settings.
    pub fn new(config: &ProviderConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(config.timeout())
            .build()
            .map_err(|e| AiError::Config {
                reason: format!("failed to build HTTP client: {e}"),
            })?;

        Ok(Self {
            http,
            api_key: config.api_key.clone(),
            base_url: config.base_url.trim_end_matches('/').to_owned(),
            max_retries: config.max_retries,
            backoff_unit: config.backoff_unit(),
        })
    }

    /// The API root requests are sent to.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Execute a request against `path` (relative to the API root).
    ///
    /// The body, if any, is serialized once up front. The call is attempted
    /// up to `max_retries + 1` times; only transport failures and 5xx
    /// responses are retried. A response below 400 is returned as-is and the
    /// caller owns its body.
    ///
    /// # Errors
    ///
    /// - [`AiError::Encoding`] if the body cannot be serialized.
    /// - [`AiError::Provider`] / [`AiError::Http`] for a 4xx response.
    /// - [`AiError::RequestFailed`] once every attempt has failed.
    /// - [`AiError::Cancelled`] if `cancel` fires first.
    pub async fn execute<T>(
        &self,
        method: Method,
        path: &str,
        body: Option<&T>,
        cancel: &CancellationToken,
    ) -> Result<Response>
    where
        T: Serialize + ?Sized,
    {
        let payload = body
            .map(|b| serde_json::to_vec(b))
            .transpose()
            .map_err(|e| AiError::Encoding {
                reason: e.to_string(),
            })?;

        let url = format!("{}{}", self.base_url, path);
        let attempts = self.max_retries.saturating_add(1);
        let mut last_error = None;

        for attempt in 0..attempts {
            if attempt > 0 {
                let delay = backoff_delay(self.backoff_unit, attempt - 1);
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => return Err(AiError::Cancelled),
                    _ = tokio::time::sleep(delay) => {}
                }
            }

            tracing::debug!(%method, url = %url, attempt, "sending request");

            let request = self.build_request(method.clone(), &url, payload.as_deref())?;
            let outcome = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(AiError::Cancelled),
                outcome = request.send() => outcome,
            };

            let err = match outcome {
                Ok(resp) if resp.status().is_server_error() => error_from_response(resp).await,
                Ok(resp) if resp.status().as_u16() >= 400 => {
                    return Err(error_from_response(resp).await);
                }
                Ok(resp) => {
                    if attempt > 0 {
                        tracing::debug!(url = %url, attempt, "request succeeded after retry");
                    }
                    return Ok(resp);
                }
                Err(e) => AiError::from(e),
            };

            if attempt + 1 < attempts {
                let delay = backoff_delay(self.backoff_unit, attempt);
                tracing::warn!(
                    url = %url,
                    attempt,
                    delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                    error = %err,
                    "retrying after failed attempt"
                );
            }
            last_error = Some(err);
        }

        let last_error = last_error.unwrap_or(AiError::Transport {
            reason: "no attempt was made".into(),
        });
        tracing::warn!(url = %url, attempts, error = %last_error, "request failed");

        Err(AiError::RequestFailed {
            attempts,
            last_error: Box::new(last_error),
        })
    }

    fn build_request(
        &self,
        method: Method,
        url: &str,
        payload: Option<&[u8]>,
    ) -> Result<reqwest::RequestBuilder> {
        let auth = HeaderValue::from_str(&format!("Bearer {}", self.api_key)).map_err(|e| {
            AiError::Config {
                reason: format!("invalid authorization header: {e}"),
            }
        })?;

        let mut request = self
            .http
            .request(method, url)
            .header(AUTHORIZATION, auth)
            .header(CONTENT_TYPE, HeaderValue::from_static("application/json"))
            .header(USER_AGENT, HeaderValue::from_static(USER_AGENT_VALUE));

        if let Some(bytes) = payload {
            request = request.body(bytes.to_vec());
        }

        Ok(request)
    }
}

impl std::fmt::Debug for Transport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Transport")
            .field("base_url", &self.base_url)
            .field("max_retries", &self.max_retries)
            .field("backoff_unit", &self.backoff_unit)
            .finish_non_exhaustive()
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Wait between attempt `attempt` (0-indexed) and the next one.
pub fn backoff_delay(unit: Duration, attempt: u32) -> Duration {
    unit.saturating_mul(attempt.saturating_add(1))
}

/// Vendor error envelope: `{"error": {"message", "type", "code"}}`.
#[derive(Deserialize)]
struct ErrorEnvelope {
    error: WireError,
}

#[derive(Deserialize)]
struct WireError {
    #[serde(default)]
    message: Option<String>,
    #[serde(default, rename = "type")]
    error_type: Option<String>,
    #[serde(default)]
    code: Option<Value>,
}

/// Read the body of an error response and classify it.
async fn error_from_response(resp: Response) -> AiError {
    let status = resp.status().as_u16();
    let body = match resp.text().await {
        Ok(text) => text,
        Err(e) => {
            tracing::debug!(status, error = %e, "failed to read error body");
            String::new()
        }
    };
    classify_error_body(status, body)
}

/// Decode a vendor error envelope, falling back to the raw status and body.
pub(crate) fn classify_error_body(status: u16, body: String) -> AiError {
    match serde_json::from_str::<ErrorEnvelope>(&body) {
        Ok(envelope) => {
            let code = match envelope.error.code {
                Some(Value::String(s)) => s,
                Some(Value::Null) | None => String::new(),
                Some(other) => other.to_string(),
            };
            AiError::Provider(ProviderError {
                code,
                message: envelope.error.message.unwrap_or_default(),
                error_type: envelope.error.error_type.unwrap_or_default(),
            })
        }
        Err(_) => AiError::Http { status, body },
    }
}
