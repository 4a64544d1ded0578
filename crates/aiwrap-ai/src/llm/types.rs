//! Core types for chat completion.
//!
//! These types are vendor-neutral; the [`super::openai`] module translates
//! them to and from the OpenAI wire format.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::AiError;

// ---------------------------------------------------------------------------
// Messages
// ---------------------------------------------------------------------------

/// The role of a participant in a conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Instructions that shape model behavior.
    System,
    /// Input from the human user.
    User,
    /// Output from the model.
    Assistant,
}

impl Role {
    /// The lowercase wire name of the role.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::System => "system",
            Self::User => "user",
            Self::Assistant => "assistant",
        }
    }
}

/// A single message in a conversation history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    /// Who produced this message.
    pub role: Role,
    /// The textual content of the message.
    #[serde(default)]
    pub content: String,
}

impl Message {
    /// Create a system message.
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    /// Create a user message.
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    /// Create an assistant message.
    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

// ---------------------------------------------------------------------------
// Chat request / response
// ---------------------------------------------------------------------------

/// A chat completion request.
#[derive(Debug, Clone, Default)]
pub struct ChatRequest {
    /// The conversation, in order.
    pub messages: Vec<Message>,

    /// The model identifier. Empty means "use the provider's default".
    pub model: String,

    /// Maximum tokens the model may generate.
    pub max_tokens: Option<u32>,

    /// Sampling temperature.
    pub temperature: Option<f32>,

    /// Whether the caller intends to stream. Providers force this flag to
    /// match the method that was called.
    pub stream: bool,
}

impl ChatRequest {
    /// Create a request for the given conversation with provider defaults.
    pub fn new(messages: Vec<Message>) -> Self {
        Self {
            messages,
            ..Self::default()
        }
    }

    /// Set the model identifier.
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// Set the maximum number of generated tokens.
    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    /// Set the sampling temperature.
    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }
}

/// Token usage reported by the vendor.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Usage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

/// The result of a non-streaming chat call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatResponse {
    /// Vendor response id.
    pub id: String,
    /// The model that answered.
    pub model: String,
    /// Text of the first choice.
    pub content: String,
    /// Token counters.
    pub usage: Usage,
    /// When the vendor created the response.
    pub created: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Streaming
// ---------------------------------------------------------------------------

/// One element of a streamed chat response.
///
/// A stream is a run of content chunks closed by exactly one terminal chunk:
/// either `done == true` or `error.is_some()`, never both. Use the
/// constructors rather than building the struct by hand so that holds.
#[derive(Debug, Clone)]
pub struct StreamChunk {
    /// Vendor response id (the last one seen for terminal chunks).
    pub id: String,
    /// Incremental text. Empty for terminal chunks.
    pub content: String,
    /// Whether this chunk completes the stream.
    pub done: bool,
    /// Set when the stream failed; always terminal.
    pub error: Option<AiError>,
}

impl StreamChunk {
    /// A content fragment, optionally marking completion.
    pub fn delta(id: impl Into<String>, content: impl Into<String>, done: bool) -> Self {
        Self {
            id: id.into(),
            content: content.into(),
            done,
            error: None,
        }
    }

    /// The terminal success chunk.
    pub fn finished(id: impl Into<String>) -> Self {
        Self::delta(id, String::new(), true)
    }

    /// The terminal failure chunk.
    pub fn failed(id: impl Into<String>, error: AiError) -> Self {
        Self {
            id: id.into(),
            content: String::new(),
            done: false,
            error: Some(error),
        }
    }

    /// Returns `true` if no chunk may follow this one.
    pub fn is_terminal(&self) -> bool {
        self.done || self.error.is_some()
    }
}
