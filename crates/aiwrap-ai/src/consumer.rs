//! Helpers for callers that consume a [`ChunkStream`].

use crate::error::{AiError, Result};
use crate::llm::streaming::ChunkStream;

/// Drain a stream, calling `on_delta` for every non-empty content fragment.
///
/// Returns the accumulated text once the stream reports completion, or the
/// error carried by a failure chunk. A stream that closes without a terminal
/// chunk (it was cancelled) yields [`AiError::StreamRead`].
pub async fn collect_stream<F>(mut stream: ChunkStream, mut on_delta: F) -> Result<String>
where
    F: FnMut(&str),
{
    let mut text = String::new();

    while let Some(chunk) = stream.recv().await {
        if let Some(err) = chunk.error {
            return Err(err);
        }
        if !chunk.content.is_empty() {
            on_delta(&chunk.content);
            text.push_str(&chunk.content);
        }
        if chunk.done {
            return Ok(text);
        }
    }

    Err(AiError::StreamRead {
        reason: "stream closed before completion".into(),
    })
}
