//! Vendor integration layer.
//!
//! - [`types`] -- Vendor-neutral request, response and chunk types.
//! - [`transport`] -- Authenticated HTTP with retry and linear backoff.
//! - [`streaming`] -- SSE decoder feeding a bounded, cancellable channel.
//! - [`provider`] -- The [`Provider`] trait every backend implements.
//! - [`openai`] -- The OpenAI Chat Completions backend.

pub mod openai;
pub mod provider;
pub mod streaming;
pub mod transport;
pub mod types;

pub use openai::OpenAiProvider;
pub use provider::Provider;
pub use streaming::{ChunkStream, SseDecoder};
pub use transport::Transport;
pub use types::{ChatRequest, ChatResponse, Message, Role, StreamChunk, Usage};
