//! OpenAI-compatible chat client library.
//!
//! Provides a vendor-neutral chat API on top of the OpenAI Chat Completions
//! endpoint, with retrying transport, incremental SSE streaming and a named
//! provider registry.
//!
//! ## Architecture
//!
//! ```text
//! ┌───────────┐     ┌──────────────┐     ┌───────────┐
//! │ AiService │────>│ dyn Provider │────>│ Transport │──> HTTP
//! │ (registry)│     │ (OpenAI)     │     │ (retries) │
//! └─────┬─────┘     └──────┬───────┘     └───────────┘
//!       │                  │
//!       │           ┌──────┴──────┐
//!       └──<────────│ SSE decoder │  bounded channel of StreamChunk
//!                   └─────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`llm`] -- Wire types, transport, streaming decoder and providers.
//! - [`service`] -- Named provider registry with logged call wrappers.
//! - [`consumer`] -- Helpers for draining a chunk stream.
//! - [`config`] -- Provider settings.
//! - [`error`] -- Error types.

pub mod config;
pub mod consumer;
pub mod error;
pub mod llm;
pub mod service;

// Re-export the most commonly used types at the crate root.
pub use config::{DEFAULT_BASE_URL, DEFAULT_MODEL, ProviderConfig};
pub use consumer::collect_stream;
pub use error::{AiError, ProviderError, Result};
pub use llm::{
    ChatRequest, ChatResponse, ChunkStream, Message, OpenAiProvider, Provider, Role, StreamChunk,
    Usage,
};
pub use service::AiService;
pub use tokio_util::sync::CancellationToken;
