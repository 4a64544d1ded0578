//! Provider registry and the logging service layer.
//!
//! [`AiService`] maps names to [`Provider`] instances and wraps every call
//! with structured logging. The logging is purely observational: results and
//! errors pass through unchanged.
//!
//! The registry is backed by [`DashMap`], so lookups can run concurrently
//! with registration. The service is cheaply cloneable (`Arc`-backed) and is
//! passed explicitly to whoever needs it.
//!
//! # Example
//!
//! ```rust,no_run
//! # use std::sync::Arc;
//! # use aiwrap_ai::{AiService, OpenAiProvider, ProviderConfig};
//! # async fn demo() -> aiwrap_ai::Result<()> {
//! let service = AiService::new();
//! let provider = OpenAiProvider::new(ProviderConfig::new("sk-..."))?;
//! service.register("openai", Arc::new(provider));
//!
//! let reply = service.simple_chat("openai", "gpt-4o-mini", "Hello").await?;
//! println!("{reply}");
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;
use std::time::Instant;

use dashmap::DashMap;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::error::{AiError, Result};
use crate::llm::provider::Provider;
use crate::llm::streaming::ChunkStream;
use crate::llm::types::{ChatRequest, ChatResponse, Message, StreamChunk};

/// Prompt sent by [`AiService::health_check`].
const HEALTH_CHECK_PROMPT: &str = "Hello";

/// Token limit for the health check request.
const HEALTH_CHECK_MAX_TOKENS: u32 = 10;

// ---------------------------------------------------------------------------
// Registry
// ---------------------------------------------------------------------------

/// Named collection of providers with logged call wrappers.
#[derive(Clone, Default)]
pub struct AiService {
    providers: Arc<DashMap<String, Arc<dyn Provider>>>,
}

impl AiService {
    /// Create an empty service.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a provider under `name`.
    ///
    /// If a provider with the same name already exists, it is replaced.
    pub fn register(&self, name: impl Into<String>, provider: Arc<dyn Provider>) {
        let name = name.into();
        let backend = provider.name().to_owned();

        if self.providers.insert(name.clone(), provider).is_some() {
            tracing::warn!(provider = %name, backend = %backend, "provider replaced");
        } else {
            tracing::info!(provider = %name, backend = %backend, "provider registered");
        }
    }

    /// Remove a provider. Returns it if it was registered.
    pub fn unregister(&self, name: &str) -> Option<Arc<dyn Provider>> {
        let removed = self.providers.remove(name).map(|(_, p)| p);
        if removed.is_some() {
            tracing::info!(provider = %name, "provider unregistered");
        }
        removed
    }

    /// Look up a provider by name.
    pub fn get(&self, name: &str) -> Result<Arc<dyn Provider>> {
        self.providers
            .get(name)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or_else(|| AiError::NotFound {
                name: name.to_owned(),
            })
    }

    /// Names of all registered providers, sorted ascending.
    pub fn list(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .providers
            .iter()
            .map(|entry| entry.key().clone())
            .collect();
        names.sort();
        names
    }

    /// Number of registered providers.
    pub fn len(&self) -> usize {
        self.providers.len()
    }

    /// Returns `true` if no provider is registered.
    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }

    // -- Wrapped calls -------------------------------------------------------

    /// Send a chat request through the named provider.
    pub async fn chat(&self, name: &str, request: &ChatRequest) -> Result<ChatResponse> {
        let provider = self.get(name)?;

        tracing::info!(
            provider = %name,
            model = %request.model,
            messages = request.messages.len(),
            "chat request started"
        );
        let started = Instant::now();

        let result = provider.chat(request).await;
        let elapsed_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);

        match &result {
            Ok(resp) => tracing::info!(
                provider = %name,
                model = %resp.model,
                elapsed_ms,
                total_tokens = resp.usage.total_tokens,
                "chat request completed"
            ),
            Err(e) => tracing::warn!(provider = %name, elapsed_ms, error = %e, "chat request failed"),
        }

        result
    }

    /// Open a streamed chat through the named provider.
    ///
    /// Chunks are forwarded through a new channel of the same capacity so
    /// the call can be logged when the stream ends. Cancelling `cancel` or
    /// dropping the returned stream stops both the forwarder and the
    /// provider's decoder.
    pub async fn chat_stream(
        &self,
        name: &str,
        request: &ChatRequest,
        cancel: CancellationToken,
    ) -> Result<ChunkStream> {
        let provider = self.get(name)?;

        tracing::info!(
            provider = %name,
            model = %request.model,
            messages = request.messages.len(),
            "chat stream started"
        );
        let started = Instant::now();

        let inner = match provider.chat_stream(request, cancel.clone()).await {
            Ok(stream) => stream,
            Err(e) => {
                tracing::warn!(provider = %name, error = %e, "chat stream failed to open");
                return Err(e);
            }
        };

        let (tx, outer) = ChunkStream::channel(inner.capacity());
        tokio::spawn(forward(name.to_owned(), inner, tx, cancel, started));
        Ok(outer)
    }

    // -- Convenience calls ---------------------------------------------------

    /// Ask a single question and return the answer text.
    pub async fn simple_chat(&self, name: &str, model: &str, text: &str) -> Result<String> {
        self.chat_with_history(name, model, vec![Message::user(text)])
            .await
    }

    /// Send a full conversation and return the answer text.
    pub async fn chat_with_history(
        &self,
        name: &str,
        model: &str,
        messages: Vec<Message>,
    ) -> Result<String> {
        let request = ChatRequest::new(messages).with_model(model);
        self.chat(name, &request).await.map(|resp| resp.content)
    }

    /// List the models offered by the named provider.
    pub async fn provider_models(&self, name: &str) -> Result<Vec<String>> {
        let provider = self.get(name)?;
        let models = provider.list_models().await?;
        tracing::debug!(provider = %name, count = models.len(), "models listed");
        Ok(models)
    }

    /// Verify the named provider answers a minimal chat request.
    pub async fn health_check(&self, name: &str) -> Result<()> {
        let request = ChatRequest::new(vec![Message::user(HEALTH_CHECK_PROMPT)])
            .with_max_tokens(HEALTH_CHECK_MAX_TOKENS);
        self.chat(name, &request).await.map(|_| ())
    }
}

impl std::fmt::Debug for AiService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AiService")
            .field("providers", &self.list())
            .finish()
    }
}

/// Relay chunks from a provider stream and log how it ended.
async fn forward(
    name: String,
    mut inner: ChunkStream,
    tx: mpsc::Sender<StreamChunk>,
    cancel: CancellationToken,
    started: Instant,
) {
    let mut content_chunks = 0usize;

    loop {
        let chunk = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                tracing::info!(provider = %name, content_chunks, "chat stream cancelled");
                return;
            }
            _ = tx.closed() => {
                tracing::debug!(provider = %name, content_chunks, "chat stream consumer gone");
                return;
            }
            chunk = inner.recv() => chunk,
        };

        let Some(chunk) = chunk else {
            tracing::info!(provider = %name, content_chunks, "chat stream closed");
            return;
        };

        if !chunk.content.is_empty() {
            content_chunks += 1;
        }

        let outcome = match (&chunk.error, chunk.done) {
            (Some(e), _) => Some(Err(e.to_string())),
            (None, true) => Some(Ok(())),
            (None, false) => None,
        };

        let sent = tokio::select! {
            biased;
            _ = cancel.cancelled() => false,
            sent = tx.send(chunk) => sent.is_ok(),
        };
        if !sent {
            tracing::debug!(provider = %name, content_chunks, "chat stream consumer gone");
            return;
        }

        match outcome {
            Some(Ok(())) => {
                tracing::info!(
                    provider = %name,
                    elapsed_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
                    content_chunks,
                    "chat stream completed"
                );
                return;
            }
            Some(Err(error)) => {
                tracing::warn!(provider = %name, content_chunks, error = %error, "chat stream failed");
                return;
            }
            None => {}
        }
    }
}
