//! Error types for the provider layer.
//!
//! Every public API in this crate surfaces failures through [`AiError`].
//! The type is `Clone` because errors also travel inside
//! [`StreamChunk`](crate::llm::types::StreamChunk) values, where the
//! consumer owns them after delivery.

use serde::{Deserialize, Serialize};

/// A failure reported by the vendor itself, decoded from the
/// `{"error": {"message", "type", "code"}}` envelope.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize, thiserror::Error)]
#[error("{message}")]
pub struct ProviderError {
    /// Vendor error code (e.g. `"invalid_api_key"`). Empty when absent.
    pub code: String,
    /// Human-readable message from the vendor.
    pub message: String,
    /// Vendor error category (e.g. `"invalid_request_error"`).
    pub error_type: String,
}

/// Unified error type for the provider layer.
#[derive(Debug, Clone, thiserror::Error)]
pub enum AiError {
    // -- Request errors ------------------------------------------------------
    /// The request body could not be serialized. Never retried.
    #[error("failed to encode request body: {reason}")]
    Encoding { reason: String },

    /// The HTTP call itself failed (connection refused, reset, timeout).
    #[error("transport error: {reason}")]
    Transport { reason: String },

    /// The vendor answered with an error status and a body that is not a
    /// vendor error envelope.
    #[error("api error: {status} {body}")]
    Http { status: u16, body: String },

    /// The vendor answered with a decodable error envelope.
    #[error("provider error: {0}")]
    Provider(#[from] ProviderError),

    /// Every attempt failed; `last_error` is the failure of the final one.
    #[error("request failed after {attempts} attempts: {last_error}")]
    RequestFailed {
        attempts: u32,
        last_error: Box<AiError>,
    },

    /// The caller's cancellation token fired while a request was in flight.
    #[error("request cancelled")]
    Cancelled,

    // -- Response errors -----------------------------------------------------
    /// A response body or stream frame was not valid vendor JSON.
    #[error("failed to decode response: {reason}")]
    Decode { reason: String },

    /// The response stream ended or failed before a terminal frame.
    #[error("stream read error: {reason}")]
    StreamRead { reason: String },

    // -- Registry errors -----------------------------------------------------
    /// No provider is registered under the requested name.
    #[error("provider '{name}' not found")]
    NotFound { name: String },

    // -- Configuration errors ------------------------------------------------
    /// The provider was constructed without an API key.
    #[error("missing api key for provider: {provider}")]
    MissingApiKey { provider: String },

    /// Any other invalid configuration.
    #[error("config error: {reason}")]
    Config { reason: String },
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, AiError>;

impl From<reqwest::Error> for AiError {
    fn from(err: reqwest::Error) -> Self {
        Self::Transport {
            reason: err.to_string(),
        }
    }
}

impl AiError {
    /// Returns the vendor error detail if this error (or the last attempt it
    /// wraps) came from a vendor error envelope.
    pub fn provider_error(&self) -> Option<&ProviderError> {
        match self {
            Self::Provider(err) => Some(err),
            Self::RequestFailed { last_error, .. } => last_error.provider_error(),
            _ => None,
        }
    }
}
