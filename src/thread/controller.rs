//! Thread controller: drives one open thread against an injected store.
//!
//! The controller never changes the authoritative message list. It submits
//! requests to the store, keeps the optimistic projections for runs the
//! store has not confirmed yet, and applies the store's events as they
//! arrive.

use tracing::{debug, info, warn};

use crate::domain::{Checkpoint, Message, ThreadValues};
use crate::enrich::{url_message_text, ContentFetcher};
use crate::error::{ChatError, Result};
use crate::store::{
    MessageMetadata, MessageStore, RunId, StoreEvent, SubmitOptions, SubmitPayload,
};

use super::accumulator::{missing_tool_results, DO_NOT_RENDER_ID_PREFIX};
use super::errors::{ErrorSurfacer, Notification};
use super::navigator::{branch_switcher, edit_request, regenerate_request, BranchSwitcher};
use super::optimistic::{OptimisticQueue, Projection};
use super::session::{ThreadPreferences, ThreadSession};

pub struct ThreadController<S, F> {
    store: S,
    fetcher: F,
    session: ThreadSession,
    preferences: ThreadPreferences,
    confirmed: ThreadValues,
    pending: OptimisticQueue,
    surfacer: ErrorSurfacer,
    /// Run whose completion ends the loading state
    active_run: Option<RunId>,
}

impl<S: MessageStore, F: ContentFetcher> ThreadController<S, F> {
    pub fn new(store: S, fetcher: F, preferences: ThreadPreferences) -> Self {
        let thread_id = store.thread_id();
        Self {
            store,
            fetcher,
            session: ThreadSession::new(thread_id),
            preferences,
            confirmed: ThreadValues::default(),
            pending: OptimisticQueue::new(),
            surfacer: ErrorSurfacer::new(),
            active_run: None,
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn session(&self) -> &ThreadSession {
        &self.session
    }

    pub fn session_mut(&mut self) -> &mut ThreadSession {
        &mut self.session
    }

    pub fn preferences(&self) -> &ThreadPreferences {
        &self.preferences
    }

    pub fn preferences_mut(&mut self) -> &mut ThreadPreferences {
        &mut self.preferences
    }

    /// Last state reported by the store.
    pub fn confirmed(&self) -> &ThreadValues {
        &self.confirmed
    }

    pub fn pending_runs(&self) -> usize {
        self.pending.len()
    }

    /// State to display: the confirmed state with pending projections applied.
    pub fn displayed(&self) -> ThreadValues {
        self.pending.project(&self.confirmed)
    }

    /// Displayed messages minus synthesized placeholders.
    pub fn visible_messages(&self) -> Vec<Message> {
        self.displayed()
            .messages
            .into_iter()
            .filter(|m| !m.has_id_prefix(DO_NOT_RENDER_ID_PREFIX))
            .collect()
    }

    /// Set the draft and submit it.
    pub async fn send(&mut self, text: &str, url: Option<&str>) -> Result<Option<RunId>> {
        self.session.set_input(text);
        self.session.set_url(url.unwrap_or_default());
        self.submit().await
    }

    /// Submit the current draft.
    ///
    /// Does nothing for a blank draft or while a run is loading. Unanswered
    /// tool calls get placeholder results ahead of the new message. When a
    /// URL is attached its summary follows as a second human message; a
    /// failed or empty fetch drops only that second message.
    pub async fn submit(&mut self) -> Result<Option<RunId>> {
        let input = self.session.input().trim().to_string();
        if input.is_empty() || self.session.is_loading {
            return Ok(None);
        }

        self.session.begin_run();

        let mut messages = missing_tool_results(&self.confirmed.messages);
        if !messages.is_empty() {
            debug!("Answering {} dangling tool calls", messages.len());
        }
        messages.push(Message::human(input));

        if let Some(url) = self.session.url().map(str::to_string) {
            let summary = self.fetcher.fetch_summary(&url).await;
            if summary.trim().is_empty() {
                warn!("No content extracted from {}; sending without it", url);
            } else {
                messages.push(Message::human(url_message_text(&url, &summary)));
            }
        }

        let run_id = match self
            .store
            .submit(Some(SubmitPayload::new(messages.clone())), SubmitOptions::values())
        {
            Ok(run_id) => run_id,
            Err(e) => {
                self.session.end_run();
                return Err(e);
            }
        };

        self.track(run_id, Projection::append(messages));
        self.session.clear_draft();
        let displayed = self.displayed();
        self.session.observe_messages(&displayed.messages);
        Ok(Some(run_id))
    }

    /// Rerun from `parent`, or from the root when `None`.
    pub fn regenerate(&mut self, parent: Option<Checkpoint>) -> Result<RunId> {
        self.session.rewind();
        let run_id = match self.store.submit(None, regenerate_request(parent)) {
            Ok(run_id) => run_id,
            Err(e) => {
                self.session.end_run();
                return Err(e);
            }
        };
        self.track(run_id, Projection::identity());
        Ok(run_id)
    }

    /// Rerun from the checkpoint before `message` first appeared.
    pub fn regenerate_message(&mut self, message: &Message) -> Result<RunId> {
        let parent = self
            .store
            .messages_metadata(message)
            .and_then(|meta| meta.parent_checkpoint().cloned());
        self.regenerate(parent)
    }

    /// Replace a human message with new text on a new branch.
    pub fn edit_message(&mut self, message: &Message, text: &str) -> Result<RunId> {
        if !message.is_human() {
            return Err(ChatError::Store("Only human messages can be edited".to_string()));
        }
        let meta = self.metadata(message).ok_or_else(|| {
            ChatError::Store(format!(
                "No history for message {}",
                message.id().unwrap_or("<unsaved>")
            ))
        })?;
        let request = edit_request(&meta, message, text);

        self.session.begin_run();
        let run_id = match self.store.submit(Some(request.payload), request.options) {
            Ok(run_id) => run_id,
            Err(e) => {
                self.session.end_run();
                return Err(e);
            }
        };
        self.track(run_id, request.projection);
        let displayed = self.displayed();
        self.session.observe_messages(&displayed.messages);
        Ok(run_id)
    }

    pub fn metadata(&self, message: &Message) -> Option<MessageMetadata> {
        self.store.messages_metadata(message)
    }

    pub fn branch_switcher(&self, message: &Message) -> Option<BranchSwitcher> {
        branch_switcher(&self.metadata(message)?)
    }

    pub fn select_branch(&mut self, branch: &str) -> Result<()> {
        self.store.set_branch(branch)
    }

    /// Cancel the in-flight run and fall back to the confirmed state.
    pub fn stop(&mut self) {
        self.store.stop();
        self.session.end_run();
        self.active_run = None;
        self.pending.clear();
    }

    /// Switch threads; `None` starts a new one on the next submission.
    pub fn open_thread(&mut self, thread_id: Option<&str>) -> Result<()> {
        self.store.stop();
        self.store.open_thread(thread_id)?;
        self.session = ThreadSession::new(thread_id.map(str::to_string));
        self.confirmed = ThreadValues::default();
        self.pending.clear();
        self.surfacer = ErrorSurfacer::new();
        self.active_run = None;
        Ok(())
    }

    pub fn new_thread(&mut self) -> Result<()> {
        self.open_thread(None)
    }

    fn track(&mut self, run_id: RunId, projection: Projection) {
        self.pending.enqueue(run_id, projection);
        self.active_run = Some(run_id);
    }

    /// Apply a store event. Returns a notification for a newly seen error.
    pub fn apply(&mut self, event: StoreEvent) -> Option<Notification> {
        match event {
            StoreEvent::ThreadCreated { thread_id } => {
                // A run of a previously open thread may report late
                if self.store.thread_id().as_deref() == Some(thread_id.as_str()) {
                    info!("Created thread {}", thread_id);
                    self.session.thread_id = Some(thread_id);
                } else {
                    debug!("Ignoring creation of thread {} after a switch", thread_id);
                }
            }
            StoreEvent::RunStarted { run_id } => {
                debug!("Run {} started", run_id);
                self.session.error = None;
            }
            StoreEvent::Values { run_id, values } => {
                self.confirmed = values;
                if let Some(run_id) = run_id {
                    self.pending.confirm(run_id);
                }
                let displayed = self.displayed();
                self.session.observe_messages(&displayed.messages);
            }
            StoreEvent::Error { run_id, message } => {
                debug!("Run {} reported an error", run_id);
                self.session.error = Some(message);
            }
            StoreEvent::RunFinished { run_id } => {
                self.pending.confirm(run_id);
                if self.active_run == Some(run_id) {
                    self.active_run = None;
                    self.session.end_run();
                }
            }
        }

        self.surfacer.observe(self.session.error.as_deref())
    }
}
