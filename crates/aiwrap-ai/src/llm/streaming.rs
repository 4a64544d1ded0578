//! SSE stream decoder for the OpenAI Chat Completions API.
//!
//! The vendor streams `data:` lines in standard SSE format, each carrying a
//! JSON object with a `choices[0].delta`, and terminates the stream with a
//! `data: [DONE]` sentinel:
//!
//! ```text
//! data: {"id":"chatcmpl-1","choices":[{"delta":{"content":"Hel"},"finish_reason":null}]}
//!
//! data: {"id":"chatcmpl-1","choices":[{"delta":{"content":"lo"},"finish_reason":null}]}
//!
//! data: [DONE]
//! ```
//!
//! Decoding happens in two layers:
//!
//! - [`SseDecoder`] is the per-line state machine. It is synchronous and
//!   holds only the last seen response id and whether a terminal chunk has
//!   been produced.
//! - [`decode`] spawns a task that reads the body, splits it into lines,
//!   feeds the state machine and delivers chunks through a bounded channel
//!   wrapped in a [`ChunkStream`].

use std::pin::{Pin, pin};
use std::task::{Context, Poll};

use futures::{Stream, StreamExt};
use serde::Deserialize;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::error::AiError;
use crate::llm::types::StreamChunk;

/// The payload that marks the end of an SSE stream.
const DONE_SENTINEL: &str = "[DONE]";

/// Prefix of SSE data lines.
const DATA_PREFIX: &str = "data: ";

/// Longest line the decoder buffers before giving up on the stream.
pub const MAX_LINE_BYTES: usize = 64 * 1024;

// ---------------------------------------------------------------------------
// Wire format
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct WireStreamChunk {
    #[serde(default)]
    id: String,
    #[serde(default)]
    choices: Vec<WireStreamChoice>,
}

#[derive(Debug, Deserialize)]
struct WireStreamChoice {
    #[serde(default)]
    delta: WireDelta,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct WireDelta {
    #[serde(default)]
    content: Option<String>,
}

// ---------------------------------------------------------------------------
// Line state machine
// ---------------------------------------------------------------------------

/// Per-line SSE state machine.
///
/// Feed it one line at a time (without the line terminator). Once it has
/// returned a terminal chunk every further line is ignored.
#[derive(Debug, Default)]
pub struct SseDecoder {
    last_id: String,
    finished: bool,
}

impl SseDecoder {
    /// Create a decoder with no history.
    pub fn new() -> Self {
        Self::default()
    }

    /// The id of the most recent successfully decoded frame.
    pub fn last_id(&self) -> &str {
        &self.last_id
    }

    /// Returns `true` once a terminal chunk has been produced.
    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Decode one line.
    ///
    /// Returns `None` for blank lines, comments, non-data SSE fields and
    /// frames without choices.
    pub fn feed_line(&mut self, line: &str) -> Option<StreamChunk> {
        if self.finished {
            return None;
        }

        if line.is_empty() || line.starts_with(':') {
            return None;
        }

        // `event:`, `id:` and `retry:` fields carry nothing we use.
        let payload = line.strip_prefix(DATA_PREFIX)?;

        if payload == DONE_SENTINEL {
            return Some(self.finish(StreamChunk::finished(self.last_id.clone())));
        }

        let frame: WireStreamChunk = match serde_json::from_str(payload) {
            Ok(frame) => frame,
            Err(e) => {
                let err = AiError::Decode {
                    reason: format!("failed to parse stream response: {e}"),
                };
                return Some(self.finish(StreamChunk::failed(self.last_id.clone(), err)));
            }
        };

        self.last_id = frame.id;

        let choice = frame.choices.into_iter().next()?;
        let content = choice.delta.content.unwrap_or_default();
        let done = choice.finish_reason.is_some();
        let chunk = StreamChunk::delta(self.last_id.clone(), content, done);

        Some(if done { self.finish(chunk) } else { chunk })
    }

    /// Decode one raw line, stripping the LF / CRLF terminator.
    pub fn feed_bytes(&mut self, line: &[u8]) -> Option<StreamChunk> {
        let line = line.strip_suffix(b"\n").unwrap_or(line);
        let line = line.strip_suffix(b"\r").unwrap_or(line);

        match std::str::from_utf8(line) {
            Ok(text) => self.feed_line(text),
            Err(e) if !self.finished => {
                let err = AiError::Decode {
                    reason: format!("invalid UTF-8 in stream: {e}"),
                };
                Some(self.finish(StreamChunk::failed(self.last_id.clone(), err)))
            }
            Err(_) => None,
        }
    }

    /// The chunk to emit when the body ends before a terminal frame.
    pub fn premature_end(&mut self, reason: impl Into<String>) -> Option<StreamChunk> {
        if self.finished {
            return None;
        }
        let err = AiError::StreamRead {
            reason: reason.into(),
        };
        Some(self.finish(StreamChunk::failed(self.last_id.clone(), err)))
    }

    fn finish(&mut self, chunk: StreamChunk) -> StreamChunk {
        self.finished = true;
        chunk
    }
}

// ---------------------------------------------------------------------------
// Chunk stream
// ---------------------------------------------------------------------------

/// The receiving end of a streamed chat response.
///
/// Yields chunks in frame order and ends after the terminal chunk (or
/// immediately after cancellation). Dropping it stops the producer.
#[derive(Debug)]
pub struct ChunkStream {
    rx: mpsc::Receiver<StreamChunk>,
    capacity: usize,
}

impl ChunkStream {
    /// Create a bounded channel whose receiving end is a [`ChunkStream`].
    pub fn channel(capacity: usize) -> (mpsc::Sender<StreamChunk>, Self) {
        let capacity = capacity.max(1);
        let (tx, rx) = mpsc::channel(capacity);
        (tx, Self { rx, capacity })
    }

    /// Maximum number of undelivered chunks the channel holds.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Receive the next chunk, or `None` once the stream is closed.
    pub async fn recv(&mut self) -> Option<StreamChunk> {
        self.rx.recv().await
    }
}

impl Stream for ChunkStream {
    type Item = StreamChunk;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.rx.poll_recv(cx)
    }
}

// ---------------------------------------------------------------------------
// Decoder task
// ---------------------------------------------------------------------------

/// Decode an SSE response body on a background task.
///
/// `capacity` bounds the number of undelivered chunks; the task waits for
/// the consumer when the channel is full. When `cancel` fires or the
/// [`ChunkStream`] is dropped the task stops reading, drops the body and
/// closes the channel without a terminal chunk.
pub fn decode<S, B, E>(body: S, cancel: CancellationToken, capacity: usize) -> ChunkStream
where
    S: Stream<Item = Result<B, E>> + Send + 'static,
    B: AsRef<[u8]> + Send + 'static,
    E: std::fmt::Display + Send + 'static,
{
    let (tx, stream) = ChunkStream::channel(capacity);
    tokio::spawn(pump(body, tx, cancel));
    stream
}

async fn pump<S, B, E>(body: S, tx: mpsc::Sender<StreamChunk>, cancel: CancellationToken)
where
    S: Stream<Item = Result<B, E>>,
    B: AsRef<[u8]>,
    E: std::fmt::Display,
{
    let mut body = pin!(body);
    let mut decoder = SseDecoder::new();
    let mut buffer: Vec<u8> = Vec::new();
    let mut scanned = 0usize;
    let mut delivered = 0usize;

    loop {
        let next = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                tracing::debug!(delivered, "stream cancelled");
                return;
            }
            _ = tx.closed() => {
                tracing::debug!(delivered, "stream consumer dropped");
                return;
            }
            next = body.next() => next,
        };

        match next {
            Some(Ok(bytes)) => {
                buffer.extend_from_slice(bytes.as_ref());

                // Bytes before `scanned` are known to hold no newline.
                while let Some(offset) = buffer[scanned..].iter().position(|b| *b == b'\n') {
                    let line: Vec<u8> = buffer.drain(..=scanned + offset).collect();
                    scanned = 0;
                    let Some(chunk) = decoder.feed_bytes(&line) else {
                        continue;
                    };
                    let terminal = chunk.is_terminal();
                    if !deliver(&tx, &cancel, chunk).await {
                        return;
                    }
                    delivered += 1;
                    if terminal {
                        tracing::debug!(delivered, "stream finished");
                        return;
                    }
                }
                scanned = buffer.len();

                if buffer.len() > MAX_LINE_BYTES {
                    tracing::warn!(
                        buffered = buffer.len(),
                        delivered,
                        "stream line exceeds limit"
                    );
                    let reason = format!("stream line too long (over {MAX_LINE_BYTES} bytes)");
                    if let Some(chunk) = decoder.premature_end(reason) {
                        deliver(&tx, &cancel, chunk).await;
                    }
                    return;
                }
            }
            Some(Err(e)) => {
                tracing::warn!(error = %e, delivered, "stream read failed");
                if let Some(chunk) = decoder.premature_end(format!("stream scanning error: {e}")) {
                    deliver(&tx, &cancel, chunk).await;
                }
                return;
            }
            None => break,
        }
    }

    // A last line without a trailing newline still counts.
    if !buffer.is_empty()
        && let Some(chunk) = decoder.feed_bytes(&buffer)
    {
        let terminal = chunk.is_terminal();
        if !deliver(&tx, &cancel, chunk).await || terminal {
            return;
        }
    }

    tracing::warn!(delivered, "stream closed before a terminal frame");
    if let Some(chunk) = decoder.premature_end("stream closed before a terminal frame") {
        deliver(&tx, &cancel, chunk).await;
    }
}

/// Send one chunk, waiting for capacity. Returns `false` if the consumer is
/// gone or the call was cancelled.
async fn deliver(
    tx: &mpsc::Sender<StreamChunk>,
    cancel: &CancellationToken,
    chunk: StreamChunk,
) -> bool {
    tracing::trace!(id = %chunk.id, done = chunk.done, "stream chunk");
    tokio::select! {
        biased;
        _ = cancel.cancelled() => false,
        sent = tx.send(chunk) => sent.is_ok(),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::time::Duration;

    use super::*;

    const HI_FRAME: &str =
        r#"data: {"id":"x","choices":[{"delta":{"content":"Hi"},"finish_reason":null}]}"#;

    fn body_of(parts: &[&str]) -> impl Stream<Item = Result<Vec<u8>, std::io::Error>> + use<> {
        let parts: Vec<Result<Vec<u8>, std::io::Error>> =
            parts.iter().map(|p| Ok(p.as_bytes().to_vec())).collect();
        futures::stream::iter(parts)
    }

    async fn collect(mut stream: ChunkStream) -> Vec<StreamChunk> {
        let mut out = Vec::new();
        while let Some(chunk) = stream.recv().await {
            out.push(chunk);
        }
        out
    }

    fn summary(chunks: &[StreamChunk]) -> Vec<(String, String, bool, bool)> {
        chunks
            .iter()
            .map(|c| (c.id.clone(), c.content.clone(), c.done, c.error.is_some()))
            .collect()
    }

    // -- Line state machine ---------------------------------------------------

    #[test]
    fn blank_comment_and_field_lines_skipped() {
        let mut dec = SseDecoder::new();
        assert!(dec.feed_line("").is_none());
        assert!(dec.feed_line(": keepalive").is_none());
        assert!(dec.feed_line("event: message").is_none());
        assert!(dec.feed_line("retry: 1000").is_none());
        assert!(!dec.is_finished());
    }

    #[test]
    fn content_frame_records_id() {
        let mut dec = SseDecoder::new();
        let chunk = dec.feed_line(HI_FRAME).unwrap();
        assert_eq!(chunk.id, "x");
        assert_eq!(chunk.content, "Hi");
        assert!(!chunk.done);
        assert_eq!(dec.last_id(), "x");
    }

    #[test]
    fn done_sentinel_uses_last_id() {
        let mut dec = SseDecoder::new();
        dec.feed_line(HI_FRAME);
        let done = dec.feed_line("data: [DONE]").unwrap();
        assert!(done.done);
        assert_eq!(done.id, "x");
        assert!(done.content.is_empty());
        assert!(dec.is_finished());
    }

    #[test]
    fn finish_reason_is_terminal() {
        let mut dec = SseDecoder::new();
        let chunk = dec
            .feed_line(r#"data: {"id":"y","choices":[{"delta":{"content":"!"},"finish_reason":"stop"}]}"#)
            .unwrap();
        assert!(chunk.done);
        assert_eq!(chunk.content, "!");
        // A trailing sentinel after finish_reason is ignored.
        assert!(dec.feed_line("data: [DONE]").is_none());
    }

    #[test]
    fn role_only_delta_has_empty_content() {
        let mut dec = SseDecoder::new();
        let chunk = dec
            .feed_line(r#"data: {"id":"z","choices":[{"delta":{"role":"assistant"},"finish_reason":null}]}"#)
            .unwrap();
        assert_eq!(chunk.content, "");
        assert!(!chunk.is_terminal());
    }

    #[test]
    fn frame_without_choices_only_updates_id() {
        let mut dec = SseDecoder::new();
        assert!(dec.feed_line(r#"data: {"id":"w","choices":[]}"#).is_none());
        assert_eq!(dec.last_id(), "w");
    }

    #[test]
    fn malformed_frame_is_terminal_error() {
        let mut dec = SseDecoder::new();
        let chunk = dec.feed_line("data: {not json}").unwrap();
        assert!(matches!(chunk.error, Some(AiError::Decode { .. })));
        assert!(!chunk.done);
        assert!(dec.feed_line(HI_FRAME).is_none());
    }

    #[test]
    fn crlf_terminator_stripped() {
        let mut dec = SseDecoder::new();
        let chunk = dec.feed_bytes(format!("{HI_FRAME}\r\n").as_bytes()).unwrap();
        assert_eq!(chunk.content, "Hi");
    }

    #[test]
    fn invalid_utf8_is_decode_error() {
        let mut dec = SseDecoder::new();
        let chunk = dec.feed_bytes(b"data: \xff\xfe\n").unwrap();
        assert!(matches!(chunk.error, Some(AiError::Decode { .. })));
    }

    #[test]
    fn premature_end_only_once() {
        let mut dec = SseDecoder::new();
        assert!(dec.premature_end("eof").is_some());
        assert!(dec.premature_end("eof").is_none());
    }

    // -- Decoder task ---------------------------------------------------------

    #[tokio::test]
    async fn hi_then_done() {
        let body = body_of(&[&format!("{HI_FRAME}\n\n"), "data: [DONE]\n\n"]);
        let chunks = collect(decode(body, CancellationToken::new(), 8)).await;

        assert_eq!(
            summary(&chunks),
            vec![
                ("x".into(), "Hi".into(), false, false),
                ("x".into(), String::new(), true, false),
            ]
        );
    }

    #[tokio::test]
    async fn lines_split_across_reads() {
        let whole = format!("{HI_FRAME}\n\ndata: [DONE]\n\n");
        let (a, b) = whole.split_at(17);
        let (b, c) = b.split_at(40);
        let chunks = collect(decode(body_of(&[a, b, c]), CancellationToken::new(), 8)).await;

        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].content, "Hi");
        assert!(chunks[1].done);
    }

    #[tokio::test]
    async fn malformed_frame_stops_stream() {
        let body = body_of(&[
            &format!("{HI_FRAME}\n\n"),
            "data: {oops\n\n",
            &format!("{HI_FRAME}\n\n"),
            "data: [DONE]\n\n",
        ]);
        let chunks = collect(decode(body, CancellationToken::new(), 8)).await;

        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].content, "Hi");
        assert!(matches!(chunks[1].error, Some(AiError::Decode { .. })));
    }

    #[tokio::test]
    async fn eof_without_terminal_is_read_error() {
        let chunks = collect(decode(
            body_of(&[&format!("{HI_FRAME}\n\n")]),
            CancellationToken::new(),
            8,
        ))
        .await;

        assert_eq!(chunks.len(), 2);
        let last = chunks.last().unwrap();
        assert_eq!(last.id, "x");
        assert!(matches!(last.error, Some(AiError::StreamRead { .. })));
    }

    #[tokio::test]
    async fn final_line_without_newline_is_decoded() {
        let body = body_of(&[&format!("{HI_FRAME}\n\n"), "data: [DONE]"]);
        let chunks = collect(decode(body, CancellationToken::new(), 8)).await;

        assert_eq!(chunks.len(), 2);
        assert!(chunks[1].done);
    }

    #[tokio::test]
    async fn read_error_becomes_terminal_chunk() {
        let parts: Vec<Result<Vec<u8>, std::io::Error>> = vec![
            Ok(format!("{HI_FRAME}\n").into_bytes()),
            Err(std::io::Error::other("connection reset")),
            Ok(b"data: [DONE]\n".to_vec()),
        ];
        let chunks = collect(decode(
            futures::stream::iter(parts),
            CancellationToken::new(),
            8,
        ))
        .await;

        assert_eq!(chunks.len(), 2);
        match &chunks[1].error {
            Some(AiError::StreamRead { reason }) => assert!(reason.contains("connection reset")),
            other => panic!("expected StreamRead, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn oversized_line_ends_stream_with_read_error() {
        let filler = vec![b'a'; 1024];
        let mut parts: Vec<Result<Vec<u8>, std::io::Error>> =
            (0..70).map(|_| Ok(filler.clone())).collect();
        parts.push(Ok(b"\ndata: [DONE]\n".to_vec()));

        let chunks = collect(decode(
            futures::stream::iter(parts),
            CancellationToken::new(),
            8,
        ))
        .await;

        assert_eq!(chunks.len(), 1);
        assert!(!chunks[0].done);
        match &chunks[0].error {
            Some(AiError::StreamRead { reason }) => assert!(reason.contains("too long")),
            other => panic!("expected StreamRead, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn long_line_under_limit_in_small_reads() {
        let text = "z".repeat(MAX_LINE_BYTES / 2);
        let frame = format!(
            r#"data: {{"id":"long","choices":[{{"delta":{{"content":"{text}"}},"finish_reason":"stop"}}]}}"#
        );
        let bytes = format!("{frame}\n").into_bytes();
        let parts: Vec<Result<Vec<u8>, std::io::Error>> =
            bytes.chunks(512).map(|c| Ok(c.to_vec())).collect();

        let chunks = collect(decode(
            futures::stream::iter(parts),
            CancellationToken::new(),
            8,
        ))
        .await;

        assert_eq!(chunks.len(), 1);
        assert!(chunks[0].done);
        assert_eq!(chunks[0].content.len(), MAX_LINE_BYTES / 2);
    }

    #[tokio::test]
    async fn small_buffer_delivers_everything_in_order() {
        let mut frames: Vec<String> = (0..20)
            .map(|i| {
                format!(
                    "data: {{\"id\":\"s\",\"choices\":[{{\"delta\":{{\"content\":\"{i}\"}},\"finish_reason\":null}}]}}\n\n"
                )
            })
            .collect();
        frames.push("data: [DONE]\n\n".into());
        let parts: Vec<&str> = frames.iter().map(String::as_str).collect();

        let mut stream = decode(body_of(&parts), CancellationToken::new(), 1);
        let mut seen = Vec::new();
        while let Some(chunk) = stream.recv().await {
            tokio::time::sleep(Duration::from_millis(1)).await;
            seen.push(chunk);
        }

        assert_eq!(seen.len(), 21);
        for (i, chunk) in seen.iter().take(20).enumerate() {
            assert_eq!(chunk.content, i.to_string());
        }
        assert!(seen[20].done);
    }

    #[tokio::test]
    async fn same_bytes_decode_identically() {
        let parts = [
            "data: {\"id\":\"a\",\"choices\":[{\"delta\":{\"content\":\"one\"},\"finish_reason\":null}]}\n\n",
            ": ping\n\n",
            "data: {\"id\":\"a\",\"choices\":[{\"delta\":{\"content\":\" two\"},\"finish_reason\":null}]}\n\n",
            "data: [DONE]\n\n",
        ];
        let first = collect(decode(body_of(&parts), CancellationToken::new(), 4)).await;
        let second = collect(decode(body_of(&parts), CancellationToken::new(), 4)).await;
        assert_eq!(summary(&first), summary(&second));
        assert_eq!(first.len(), 3);
    }

    struct DropFlag(Arc<AtomicBool>);

    impl Drop for DropFlag {
        fn drop(&mut self) {
            self.0.store(true, Ordering::SeqCst);
        }
    }

    /// A body that yields one frame and then never produces another byte.
    fn stalled_body(
        released: Arc<AtomicBool>,
    ) -> impl Stream<Item = Result<Vec<u8>, std::io::Error>> + Send + 'static {
        let guard = DropFlag(released);
        let first = futures::stream::iter(vec![Ok(format!("{HI_FRAME}\n\n").into_bytes())]);
        let rest = futures::stream::poll_fn(move |_| {
            let _held = &guard;
            Poll::<Option<Result<Vec<u8>, std::io::Error>>>::Pending
        });
        first.chain(rest)
    }

    #[tokio::test]
    async fn cancellation_closes_stream_and_releases_body() {
        let released = Arc::new(AtomicBool::new(false));
        let cancel = CancellationToken::new();
        let mut stream = decode(stalled_body(Arc::clone(&released)), cancel.clone(), 8);

        let first = stream.recv().await.unwrap();
        assert_eq!(first.content, "Hi");

        cancel.cancel();
        let next = tokio::time::timeout(Duration::from_secs(1), stream.recv())
            .await
            .expect("stream should close after cancellation");
        assert!(next.is_none());

        for _ in 0..100 {
            if released.load(Ordering::SeqCst) {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("body was not released after cancellation");
    }

    #[tokio::test]
    async fn dropping_consumer_releases_body() {
        let released = Arc::new(AtomicBool::new(false));
        let mut stream = decode(
            stalled_body(Arc::clone(&released)),
            CancellationToken::new(),
            8,
        );
        assert!(stream.recv().await.is_some());
        drop(stream);

        for _ in 0..100 {
            if released.load(Ordering::SeqCst) {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("body was not released after the consumer dropped");
    }

    #[tokio::test]
    async fn chunk_stream_implements_stream() {
        let body = body_of(&[&format!("{HI_FRAME}\n"), "data: [DONE]\n"]);
        let stream = decode(body, CancellationToken::new(), 2);
        let chunks: Vec<StreamChunk> = stream.collect().await;
        assert_eq!(chunks.len(), 2);
    }
}
