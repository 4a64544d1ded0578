//! Chat application state and input handling.
//!
//! [`TuiApp`] holds the transcript, the input buffer, scroll state and the
//! conversation sent to the provider. Replies are streamed by a background
//! task that reports back through a [`tokio::sync::mpsc`] channel, so the
//! draw loop never blocks on the network.

use std::time::Duration;

use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use aiwrap_ai::{AiService, ChatRequest, Message, collect_stream};

/// Banner shown when the session starts.
const WELCOME: &str = "Welcome to AI Chat! Type a message and press Enter.";

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Who a transcript line belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    /// Local notices (welcome banner).
    System,
    /// Text typed by the user.
    User,
    /// Model output, possibly still streaming.
    Assistant,
    /// A failed request.
    Error,
}

/// A single line of the transcript.
#[derive(Debug, Clone)]
pub struct ChatEntry {
    pub kind: EntryKind,
    pub content: String,
}

impl ChatEntry {
    /// Create a new transcript entry.
    pub fn new(kind: EntryKind, content: impl Into<String>) -> Self {
        Self {
            kind,
            content: content.into(),
        }
    }
}

/// Events sent from the streaming task to the UI loop.
#[derive(Debug)]
pub enum StreamEvent {
    /// A fragment of the reply arrived.
    Delta(String),
    /// The reply finished; carries the full text.
    Finished(String),
    /// The request failed.
    Error(String),
}

/// Actions the UI loop should take after processing a key event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppAction {
    /// Continue the main loop.
    Continue,
    /// Exit the application.
    Quit,
}

/// Static settings for a chat session.
#[derive(Debug, Clone)]
pub struct ChatSettings {
    /// Registry name of the provider to talk to.
    pub provider: String,
    /// Model identifier; empty means the provider default.
    pub model: String,
    /// First message of every conversation.
    pub system_prompt: String,
    /// Deadline for one streamed reply.
    pub request_timeout: Duration,
}

// ---------------------------------------------------------------------------
// TuiApp
// ---------------------------------------------------------------------------

/// The chat application state.
pub struct TuiApp {
    /// Current text in the input field.
    input: String,
    /// Cursor position within the input field, in characters.
    cursor_pos: usize,
    /// Lines displayed in the transcript area.
    entries: Vec<ChatEntry>,
    /// Vertical scroll offset from the bottom of the transcript.
    scroll_offset: u16,
    /// Whether a reply is currently streaming.
    thinking: bool,
    /// Service used to reach the provider.
    service: AiService,
    settings: ChatSettings,
    /// Conversation history sent with every request.
    conversation: Vec<Message>,
    /// Cancels the in-flight reply, if any.
    cancel: Option<CancellationToken>,
    /// Receiver for events from the streaming task.
    event_rx: mpsc::UnboundedReceiver<StreamEvent>,
    /// Sender cloned into spawned streaming tasks.
    event_tx: mpsc::UnboundedSender<StreamEvent>,
}

impl TuiApp {
    /// Create a new chat session.
    pub fn new(service: AiService, settings: ChatSettings) -> Self {
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let conversation = vec![Message::system(&settings.system_prompt)];

        Self {
            input: String::new(),
            cursor_pos: 0,
            entries: vec![ChatEntry::new(EntryKind::System, WELCOME)],
            scroll_offset: 0,
            thinking: false,
            service,
            settings,
            conversation,
            cancel: None,
            event_rx,
            event_tx,
        }
    }

    // -- Accessors ----------------------------------------------------------

    /// Return the current input text.
    pub fn input(&self) -> &str {
        &self.input
    }

    /// Return the cursor position within the input, in characters.
    pub fn cursor_pos(&self) -> usize {
        self.cursor_pos
    }

    /// Return the transcript.
    pub fn entries(&self) -> &[ChatEntry] {
        &self.entries
    }

    /// Return the conversation sent to the provider.
    pub fn conversation(&self) -> &[Message] {
        &self.conversation
    }

    /// Return the current scroll offset.
    pub fn scroll_offset(&self) -> u16 {
        self.scroll_offset
    }

    /// Return whether a reply is streaming.
    pub fn is_thinking(&self) -> bool {
        self.thinking
    }

    /// Return the model shown in the header.
    pub fn model_name(&self) -> &str {
        if self.settings.model.is_empty() {
            "default"
        } else {
            &self.settings.model
        }
    }

    // -- Key handling -------------------------------------------------------

    /// Handle a key event and return the action the UI should take.
    pub fn handle_key(&mut self, key: KeyEvent) -> AppAction {
        if (key.modifiers.contains(KeyModifiers::CONTROL) && key.code == KeyCode::Char('c'))
            || key.code == KeyCode::Esc
        {
            self.cancel_in_flight();
            return AppAction::Quit;
        }

        match key.code {
            KeyCode::Enter => self.submit_input(),
            KeyCode::Char(c) => {
                let at = self.byte_index(self.cursor_pos);
                self.input.insert(at, c);
                self.cursor_pos += 1;
            }
            KeyCode::Backspace if self.cursor_pos > 0 => {
                self.cursor_pos -= 1;
                let at = self.byte_index(self.cursor_pos);
                self.input.remove(at);
            }
            KeyCode::Delete if self.cursor_pos < self.input_len() => {
                let at = self.byte_index(self.cursor_pos);
                self.input.remove(at);
            }
            KeyCode::Left => self.cursor_pos = self.cursor_pos.saturating_sub(1),
            KeyCode::Right => self.cursor_pos = (self.cursor_pos + 1).min(self.input_len()),
            KeyCode::Home => self.cursor_pos = 0,
            KeyCode::End => self.cursor_pos = self.input_len(),
            KeyCode::Up => self.scroll_up(1),
            KeyCode::Down => self.scroll_down(1),
            KeyCode::PageUp => self.scroll_up(10),
            KeyCode::PageDown => self.scroll_down(10),
            _ => {}
        }

        AppAction::Continue
    }

    fn input_len(&self) -> usize {
        self.input.chars().count()
    }

    /// Byte offset of the character at `char_pos`.
    fn byte_index(&self, char_pos: usize) -> usize {
        self.input
            .char_indices()
            .nth(char_pos)
            .map_or(self.input.len(), |(i, _)| i)
    }

    // -- Scrolling ----------------------------------------------------------

    fn scroll_up(&mut self, lines: u16) {
        self.scroll_offset = self.scroll_offset.saturating_add(lines);
    }

    fn scroll_down(&mut self, lines: u16) {
        self.scroll_offset = self.scroll_offset.saturating_sub(lines);
    }

    // -- Submission ---------------------------------------------------------

    /// Submit the current input and start streaming the reply.
    fn submit_input(&mut self) {
        let text = self.input.trim().to_owned();
        if text.is_empty() || self.thinking {
            return;
        }

        self.entries.push(ChatEntry::new(EntryKind::User, &text));
        self.conversation.push(Message::user(&text));
        // Placeholder the deltas are appended to.
        self.entries.push(ChatEntry::new(EntryKind::Assistant, ""));

        self.input.clear();
        self.cursor_pos = 0;
        self.scroll_offset = 0;
        self.thinking = true;

        let cancel = CancellationToken::new();
        self.cancel = Some(cancel.clone());
        self.spawn_stream_task(cancel);
    }

    /// Spawn the task that streams one reply into the event channel.
    fn spawn_stream_task(&self, cancel: CancellationToken) {
        let service = self.service.clone();
        let provider = self.settings.provider.clone();
        let request =
            ChatRequest::new(self.conversation.clone()).with_model(self.settings.model.clone());
        let deadline = self.settings.request_timeout;
        let tx = self.event_tx.clone();

        tokio::spawn(async move {
            let reply = stream_reply(&service, &provider, &request, cancel.clone(), &tx);
            let event = match tokio::time::timeout(deadline, reply).await {
                Ok(Ok(text)) => StreamEvent::Finished(text),
                Ok(Err(e)) => StreamEvent::Error(e.to_string()),
                Err(_) => {
                    cancel.cancel();
                    StreamEvent::Error(format!(
                        "request timed out after {}s",
                        deadline.as_secs()
                    ))
                }
            };
            let _ = tx.send(event);
        });
    }

    fn cancel_in_flight(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            tracing::debug!("cancelling in-flight reply");
            cancel.cancel();
        }
    }

    // -- Event polling ------------------------------------------------------

    /// Drain the event channel and update state accordingly.
    ///
    /// Should be called on every iteration of the main UI loop.
    pub fn check_stream_events(&mut self) {
        while let Ok(event) = self.event_rx.try_recv() {
            match event {
                StreamEvent::Delta(text) => {
                    if let Some(entry) = self
                        .entries
                        .last_mut()
                        .filter(|e| e.kind == EntryKind::Assistant)
                    {
                        entry.content.push_str(&text);
                    }
                    self.scroll_offset = 0;
                }
                StreamEvent::Finished(text) => {
                    tracing::debug!(chars = text.len(), "reply finished");
                    if let Some(entry) = self.entries.last_mut()
                        && entry.kind == EntryKind::Assistant
                    {
                        entry.content.clone_from(&text);
                    }
                    self.conversation.push(Message::assistant(text));
                    self.finish_request();
                }
                StreamEvent::Error(msg) => {
                    tracing::warn!(error = %msg, "reply failed");
                    if self
                        .entries
                        .last()
                        .is_some_and(|e| e.kind == EntryKind::Assistant && e.content.is_empty())
                    {
                        self.entries.pop();
                    }
                    self.entries
                        .push(ChatEntry::new(EntryKind::Error, format!("Error: {msg}")));
                    self.finish_request();
                }
            }
        }
    }

    fn finish_request(&mut self) {
        self.thinking = false;
        self.cancel = None;
        self.scroll_offset = 0;
    }
}

impl Drop for TuiApp {
    fn drop(&mut self) {
        self.cancel_in_flight();
    }
}

// ---------------------------------------------------------------------------
// Background streaming
// ---------------------------------------------------------------------------

/// Stream one reply, forwarding each fragment as a [`StreamEvent::Delta`].
async fn stream_reply(
    service: &AiService,
    provider: &str,
    request: &ChatRequest,
    cancel: CancellationToken,
    tx: &mpsc::UnboundedSender<StreamEvent>,
) -> aiwrap_ai::Result<String> {
    let stream = service.chat_stream(provider, request, cancel).await?;
    collect_stream(stream, |delta| {
        let _ = tx.send(StreamEvent::Delta(delta.to_owned()));
    })
    .await
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
