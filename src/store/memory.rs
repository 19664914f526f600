//! In-process message store.
//!
//! Runs execute synchronously inside `submit` and their events are queued on
//! the channel, so callers observe the same asynchronous shape as with the
//! remote store. Replies come from a pluggable [`Responder`].

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use tracing::{debug, warn};
use uuid::Uuid;

use super::{
    metadata_for, CheckpointTarget, MessageMetadata, MessageStore, RunId, StoreEvent,
    StoreEventSender, SubmitOptions, SubmitPayload,
};
use crate::domain::{Checkpoint, CheckpointTree, Message, ThreadState, ThreadValues};
use crate::error::{ChatError, Result};

/// Produces the assistant's reply to a conversation.
pub trait Responder: Send + Sync {
    /// Messages to append after `messages`, or an error message for the run.
    fn respond(&self, messages: &[Message]) -> std::result::Result<Vec<Message>, String>;
}

/// Replies to the latest human message with its own text.
#[derive(Debug, Clone, Default)]
pub struct EchoResponder;

impl Responder for EchoResponder {
    fn respond(&self, messages: &[Message]) -> std::result::Result<Vec<Message>, String> {
        let last_human = messages
            .iter()
            .rev()
            .find(|m| m.is_human())
            .ok_or_else(|| "Nothing to respond to".to_string())?;
        Ok(vec![Message::ai(format!(
            "Echo: {}",
            last_human.content_string()
        ))])
    }
}

#[derive(Default)]
struct MemoryState {
    current: Option<String>,
    threads: HashMap<String, CheckpointTree>,
}

pub struct InMemoryMessageStore {
    state: Mutex<MemoryState>,
    responder: Box<dyn Responder>,
    events: StoreEventSender,
}

impl InMemoryMessageStore {
    pub fn new(responder: impl Responder + 'static, events: StoreEventSender) -> Self {
        Self {
            state: Mutex::new(MemoryState::default()),
            responder: Box::new(responder),
            events,
        }
    }

    /// Store that echoes every human message.
    pub fn echo(events: StoreEventSender) -> Self {
        Self::new(EchoResponder, events)
    }

    fn lock(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn emit(&self, event: StoreEvent) {
        if self.events.send(event).is_err() {
            debug!("Store event receiver dropped");
        }
    }

    /// Number of checkpoints recorded for the current thread.
    pub fn checkpoint_count(&self) -> usize {
        let state = self.lock();
        state
            .current
            .as_ref()
            .and_then(|id| state.threads.get(id))
            .map_or(0, CheckpointTree::len)
    }
}

/// Record a new head state below `parent` and return its checkpoint.
fn push_state(
    tree: &mut CheckpointTree,
    thread_id: &str,
    parent: Option<Checkpoint>,
    values: ThreadValues,
) -> Checkpoint {
    let mut checkpoint = Checkpoint::generate();
    checkpoint.thread_id = Some(thread_id.to_string());
    tree.insert(ThreadState {
        values,
        checkpoint: checkpoint.clone(),
        parent_checkpoint: parent,
    });
    tree.set_head(checkpoint.id());
    checkpoint
}

impl MessageStore for InMemoryMessageStore {
    fn thread_id(&self) -> Option<String> {
        self.lock().current.clone()
    }

    fn open_thread(&self, thread_id: Option<&str>) -> Result<()> {
        let mut state = self.lock();
        let values = match thread_id {
            Some(id) => {
                let tree = state
                    .threads
                    .get(id)
                    .ok_or_else(|| ChatError::Store(format!("Unknown thread: {}", id)))?;
                let values = tree.head_values();
                state.current = Some(id.to_string());
                values
            }
            None => {
                state.current = None;
                ThreadValues::default()
            }
        };
        drop(state);

        self.emit(StoreEvent::Values {
            run_id: None,
            values,
        });
        Ok(())
    }

    fn submit(&self, payload: Option<SubmitPayload>, options: SubmitOptions) -> Result<RunId> {
        let run_id = RunId::new();
        let mut state = self.lock();

        let thread_id = match state.current.clone() {
            Some(id) => id,
            None => {
                let id = Uuid::new_v4().to_string();
                state.threads.insert(id.clone(), CheckpointTree::new());
                state.current = Some(id.clone());
                self.emit(StoreEvent::ThreadCreated {
                    thread_id: id.clone(),
                });
                id
            }
        };
        let tree = state.threads.entry(thread_id.clone()).or_default();

        let base = match &options.checkpoint {
            CheckpointTarget::Head => tree.head().cloned(),
            CheckpointTarget::At(cp) => Some(
                tree.get(cp.id())
                    .cloned()
                    .ok_or_else(|| ChatError::UnknownCheckpoint(cp.checkpoint_id.clone()))?,
            ),
            CheckpointTarget::Root => None,
        };

        debug!("Run {} starting on thread {}", run_id, thread_id);
        self.emit(StoreEvent::RunStarted { run_id });

        let mut parent = base.as_ref().map(|s| s.checkpoint.clone());
        let mut values = base.map(|s| s.values).unwrap_or_default();

        if let Some(payload) = payload {
            values = values.merged(&payload.messages);
            parent = Some(push_state(tree, &thread_id, parent, values.clone()));
            self.emit(StoreEvent::Values {
                run_id: Some(run_id),
                values: values.clone(),
            });
        }

        match self.responder.respond(&values.messages) {
            Ok(reply) if !reply.is_empty() => {
                values = values.merged(&reply);
                push_state(tree, &thread_id, parent, values.clone());
                self.emit(StoreEvent::Values {
                    run_id: Some(run_id),
                    values,
                });
            }
            Ok(_) => {}
            Err(message) => {
                warn!("Run {} failed: {}", run_id, message);
                self.emit(StoreEvent::Error { run_id, message });
            }
        }

        self.emit(StoreEvent::RunFinished { run_id });
        Ok(run_id)
    }

    fn stop(&self) {
        // Runs complete inside `submit`; nothing is ever in flight.
        debug!("Stop requested with no run in flight");
    }

    fn messages_metadata(&self, message: &Message) -> Option<MessageMetadata> {
        let state = self.lock();
        let tree = state.threads.get(state.current.as_ref()?)?;
        metadata_for(tree, message)
    }

    fn set_branch(&self, branch: &str) -> Result<()> {
        let mut state = self.lock();
        let current = state.current.clone().ok_or(ChatError::NoThread)?;
        let tree = state.threads.get_mut(&current).ok_or(ChatError::NoThread)?;

        let leaf = tree
            .latest_leaf(branch)
            .map(|s| s.checkpoint.checkpoint_id.clone())
            .ok_or_else(|| ChatError::UnknownBranch(branch.to_string()))?;
        tree.set_head(&leaf);
        let values = tree.head_values();
        drop(state);

        self.emit(StoreEvent::Values {
            run_id: None,
            values,
        });
        Ok(())
    }
}
