//! Per-thread UI session state.
//!
//! Lives only as long as the thread is open. Nothing here is persisted; a
//! thread switch starts a fresh session and the messages are reloaded from
//! the store.

use crate::domain::Message;
use crate::enrich::normalize_url;

/// Display preferences carried across threads
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ThreadPreferences {
    pub hide_tool_calls: bool,
    pub chat_history_open: bool,
}

#[derive(Debug, Default)]
pub struct ThreadSession {
    pub thread_id: Option<String>,
    pub is_loading: bool,
    /// Store error field as last reported
    pub error: Option<String>,
    first_token_received: bool,
    prev_message_length: usize,
    input: String,
    url: String,
}

impl ThreadSession {
    pub fn new(thread_id: Option<String>) -> Self {
        Self {
            thread_id,
            ..Self::default()
        }
    }

    pub fn input(&self) -> &str {
        &self.input
    }

    pub fn set_input(&mut self, input: impl Into<String>) {
        self.input = input.into();
    }

    pub fn url(&self) -> Option<&str> {
        if self.url.is_empty() {
            None
        } else {
            Some(&self.url)
        }
    }

    /// Set the URL to attach to the next message, adding a scheme if missing.
    pub fn set_url(&mut self, url: &str) {
        self.url = normalize_url(url);
    }

    pub fn clear_draft(&mut self) {
        self.input.clear();
        self.url.clear();
    }

    pub fn first_token_received(&self) -> bool {
        self.first_token_received
    }

    pub fn prev_message_length(&self) -> usize {
        self.prev_message_length
    }

    /// Track the displayed list; the first AI message to arrive after a
    /// length change marks the first token of the run.
    pub fn observe_messages(&mut self, messages: &[Message]) {
        if messages.len() != self.prev_message_length
            && messages.last().is_some_and(Message::is_ai)
        {
            self.first_token_received = true;
        }
        self.prev_message_length = messages.len();
    }

    /// Reset for a new run.
    pub fn begin_run(&mut self) {
        self.first_token_received = false;
        self.is_loading = true;
    }

    /// Reset for a run that replaces the last message, so the replacement
    /// still registers as a length change.
    pub fn rewind(&mut self) {
        self.prev_message_length = self.prev_message_length.saturating_sub(1);
        self.begin_run();
    }

    pub fn end_run(&mut self) {
        self.is_loading = false;
    }

    /// Whether to show the "assistant is thinking" placeholder.
    pub fn show_loading_indicator(&self) -> bool {
        self.is_loading && !self.first_token_received
    }
}
