use serde::{Deserialize, Serialize};
use tokio::sync::mpsc::UnboundedSender;
use tracing::warn;

use crate::api::ChatClient;
use crate::session::SessionId;

/// Shown in place of the answer when the stream fails mid-flight. Partial
/// content is discarded, not preserved.
pub const ANSWER_FAILED: &str =
    "Sorry, something went wrong while fetching the answer. Please try again.";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputMode {
    Normal,
    Editing,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// Ordered transcript of the conversation, insertion order = chronological
/// order. At most the last record is ever mutated, and only while a
/// submission is in flight.
#[derive(Debug, Default)]
pub struct Conversation {
    messages: Vec<Message>,
}

impl Conversation {
    pub fn append(&mut self, message: Message) {
        self.messages.push(message);
    }

    /// Replace the content of the final record. Used both for fragment
    /// accumulation and for the terminal error overwrite.
    pub fn replace_last(&mut self, content: impl Into<String>) {
        if let Some(last) = self.messages.last_mut() {
            last.content = content.into();
        }
    }

    /// Roll back an optimistic insertion. Only called when a submission fails
    /// before any fragment arrived.
    pub fn remove_last(&mut self) {
        self.messages.pop();
    }

    /// Replace the whole transcript with the history returned by the server.
    pub fn replace_all(&mut self, messages: Vec<Message>) {
        self.messages = messages;
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn last(&self) -> Option<&Message> {
        self.messages.last()
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}

/// Lifecycle of one submission. `Submitting` covers the window between the
/// optimistic append and the channel opening; only `Idle` accepts new input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Submitting,
    Streaming,
}

/// Asynchronous outcomes delivered back into the event loop, processed in the
/// transport's send order.
#[derive(Debug)]
pub enum Update {
    HistoryLoaded(Vec<Message>),
    Opened,
    Fragment(String),
    Completed,
    StreamFailed,
    OpenFailed,
}

pub struct App {
    // Core state
    pub should_quit: bool,
    pub input_mode: InputMode,
    pub conversation: Conversation,
    pub phase: Phase,

    // Input state
    pub input: String,
    pub input_cursor: usize, // cursor position in chars

    // Transcript scroll state
    pub chat_scroll: u16,
    pub chat_height: u16, // inner height of the transcript area
    pub chat_width: u16,  // inner width, for wrap calculations

    // Animation state
    pub animation_frame: u8, // 0-2 for ellipsis animation

    // Service access
    pub session: SessionId,
    pub client: ChatClient,
    pub updates_tx: UnboundedSender<Update>,
    pub stream_task: Option<tokio::task::JoinHandle<()>>,
}

impl App {
    pub fn new(server_url: &str, updates_tx: UnboundedSender<Update>) -> Self {
        Self {
            should_quit: false,
            input_mode: InputMode::Editing,
            conversation: Conversation::default(),
            phase: Phase::Idle,

            input: String::new(),
            input_cursor: 0,

            chat_scroll: 0,
            chat_height: 0,
            chat_width: 0,

            animation_frame: 0,

            session: SessionId::generate(),
            client: ChatClient::new(server_url),
            updates_tx,
            stream_task: None,
        }
    }

    pub fn is_loading(&self) -> bool {
        self.phase != Phase::Idle
    }

    /// Fetch the stored conversation once at startup. A failure is logged and
    /// leaves the transcript empty; there is no retry.
    pub fn load_history(&self) {
        let client = self.client.clone();
        let session = self.session.clone();
        let tx = self.updates_tx.clone();
        tokio::spawn(async move {
            match client.history(&session).await {
                Ok(messages) => {
                    let _ = tx.send(Update::HistoryLoaded(messages));
                }
                Err(err) => warn!(%session, "history fetch failed: {err:#}"),
            }
        });
    }

    /// Start a submission from the current input. Returns the trimmed
    /// question when a stream should be opened; `None` means the input was
    /// empty or another submission is still in flight (both no-ops, the typed
    /// text is kept in the latter case).
    pub fn begin_submission(&mut self) -> Option<String> {
        let question = self.input.trim().to_string();
        if question.is_empty() || self.is_loading() {
            return None;
        }

        self.input.clear();
        self.input_cursor = 0;

        self.conversation.append(Message::user(question.clone()));
        // Placeholder: filled by fragments, overwritten on error, removed on
        // open failure
        self.conversation.append(Message::assistant(String::new()));

        self.phase = Phase::Submitting;
        self.scroll_chat_to_bottom();

        Some(question)
    }

    pub fn apply_update(&mut self, update: Update) {
        match update {
            Update::HistoryLoaded(messages) => {
                self.conversation.replace_all(messages);
                self.scroll_chat_to_bottom();
            }
            Update::Opened => {
                if self.phase == Phase::Submitting {
                    self.phase = Phase::Streaming;
                }
            }
            Update::Fragment(fragment) => {
                if let Some(last) = self.conversation.last() {
                    let mut content = last.content.clone();
                    content.push_str(&fragment);
                    self.conversation.replace_last(content);
                }
                self.scroll_chat_to_bottom();
            }
            Update::Completed => {
                self.finish_stream();
            }
            Update::StreamFailed => {
                self.conversation.replace_last(ANSWER_FAILED);
                self.finish_stream();
                self.scroll_chat_to_bottom();
            }
            Update::OpenFailed => {
                self.conversation.remove_last();
                self.finish_stream();
            }
        }
    }

    fn finish_stream(&mut self) {
        self.phase = Phase::Idle;
        self.stream_task = None;
    }

    /// Abort an open subscription (the only cancellation primitive) and leave
    /// the event loop.
    pub fn quit(&mut self) {
        if let Some(task) = self.stream_task.take() {
            task.abort();
        }
        self.should_quit = true;
    }

    /// Tick animation frame (called by Tick event)
    pub fn tick_animation(&mut self) {
        if self.is_loading() {
            self.animation_frame = (self.animation_frame + 1) % 3;
        }
    }

    // Manual transcript scrolling
    pub fn scroll_up(&mut self) {
        self.chat_scroll = self.chat_scroll.saturating_sub(1);
    }

    pub fn scroll_down(&mut self) {
        let max_scroll = self.total_chat_lines().saturating_sub(self.chat_height);
        if self.chat_scroll < max_scroll {
            self.chat_scroll += 1;
        }
    }

    pub fn scroll_to_top(&mut self) {
        self.chat_scroll = 0;
    }

    /// Pin the transcript to its bottom edge; every mutation of the
    /// conversation ends up here.
    pub fn scroll_chat_to_bottom(&mut self) {
        let total_lines = self.total_chat_lines();
        let visible_height = if self.chat_height > 0 {
            self.chat_height
        } else {
            20
        };

        if total_lines > visible_height {
            self.chat_scroll = total_lines.saturating_sub(visible_height);
        } else {
            self.chat_scroll = 0;
        }
    }

    /// Wrapped line count of the transcript, mirroring how the UI lays out
    /// each message: role label, wrapped content, blank separator.
    fn total_chat_lines(&self) -> u16 {
        let wrap_width = if self.chat_width > 0 {
            self.chat_width as usize
        } else {
            50
        };

        let mut total_lines: u16 = 0;
        for msg in self.conversation.messages() {
            total_lines += 1; // Role line ("You:" or "AI:")
            if msg.content.is_empty() {
                // Placeholder renders one line ("Thinking..." while loading)
                total_lines += 1;
            } else {
                for line in msg.content.lines() {
                    // Character count, not byte length, for UTF-8 content
                    let char_count = line.chars().count();
                    if char_count == 0 {
                        total_lines += 1;
                    } else {
                        total_lines += ((char_count / wrap_width) + 1) as u16;
                    }
                }
            }
            total_lines += 1; // Blank line after message
        }
        total_lines
    }
}
