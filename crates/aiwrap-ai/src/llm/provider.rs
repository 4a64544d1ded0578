//! The provider abstraction.
//!
//! A [`Provider`] is one vendor backend. The service layer only ever sees
//! `Arc<dyn Provider>`, so adding a vendor means implementing this trait.

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::error::Result;
use crate::llm::streaming::ChunkStream;
use crate::llm::types::{ChatRequest, ChatResponse};

/// A chat-completion backend.
#[async_trait]
pub trait Provider: Send + Sync {
    /// Short, stable identifier (e.g. `"openai"`).
    fn name(&self) -> &str;

    /// Send a request and wait for the complete response.
    ///
    /// Dropping the returned future abandons the call.
    async fn chat(&self, request: &ChatRequest) -> Result<ChatResponse>;

    /// Send a request and stream the response.
    ///
    /// Errors before the response headers arrive are returned directly; once
    /// the stream is open, failures arrive as the terminal chunk. Cancelling
    /// `cancel` closes the stream without a terminal chunk.
    async fn chat_stream(
        &self,
        request: &ChatRequest,
        cancel: CancellationToken,
    ) -> Result<ChunkStream>;

    /// Model identifiers the vendor offers, in vendor order.
    async fn list_models(&self) -> Result<Vec<String>>;
}
