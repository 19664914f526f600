//! Message store abstraction.
//!
//! A message store owns the authoritative message list and checkpoint graph
//! of a thread. Everything else only submits requests to it. `submit`
//! returns as soon as the run is scheduled; the resulting state arrives later
//! as [`StoreEvent`]s on the channel handed to the store at construction.

mod memory;

pub use memory::{EchoResponder, InMemoryMessageStore, Responder};

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::domain::{Checkpoint, CheckpointTree, Message, ThreadState, ThreadValues};
use crate::error::Result;

/// Client-assigned id of one `submit` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RunId(Uuid);

impl RunId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for RunId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for RunId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// What the server streams back for a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StreamMode {
    Values,
}

/// Where a run starts from
#[derive(Debug, Clone, Default, PartialEq)]
pub enum CheckpointTarget {
    /// Continue from the current head of the thread
    #[default]
    Head,
    /// Resume from a specific checkpoint, forking a new branch
    At(Checkpoint),
    /// Start over from an empty thread state
    Root,
}

impl From<Option<Checkpoint>> for CheckpointTarget {
    fn from(checkpoint: Option<Checkpoint>) -> Self {
        match checkpoint {
            Some(cp) => CheckpointTarget::At(cp),
            None => CheckpointTarget::Root,
        }
    }
}

/// Input for a run
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SubmitPayload {
    pub messages: Vec<Message>,
}

impl SubmitPayload {
    pub fn new(messages: Vec<Message>) -> Self {
        Self { messages }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SubmitOptions {
    pub stream_mode: Vec<StreamMode>,
    pub checkpoint: CheckpointTarget,
}

impl SubmitOptions {
    /// Stream full state snapshots from the current head.
    pub fn values() -> Self {
        Self {
            stream_mode: vec![StreamMode::Values],
            checkpoint: CheckpointTarget::Head,
        }
    }

    pub fn with_checkpoint(mut self, checkpoint: CheckpointTarget) -> Self {
        self.checkpoint = checkpoint;
        self
    }
}

impl Default for SubmitOptions {
    fn default() -> Self {
        Self::values()
    }
}

/// Branch information for a message
#[derive(Debug, Clone, PartialEq)]
pub struct MessageMetadata {
    /// Checkpoint id of the branch the message belongs to
    pub branch: Option<String>,
    /// Sibling branches at the point the message was created, in creation order
    pub branch_options: Vec<String>,
    /// State in which the message first appeared
    pub first_seen_state: Option<ThreadState>,
}

impl MessageMetadata {
    pub fn parent_checkpoint(&self) -> Option<&Checkpoint> {
        self.first_seen_state
            .as_ref()
            .and_then(|s| s.parent_checkpoint.as_ref())
    }
}

/// Authoritative updates emitted by a store
#[derive(Debug, Clone, PartialEq)]
pub enum StoreEvent {
    /// The store created a thread for the first submission
    ThreadCreated { thread_id: String },
    RunStarted { run_id: RunId },
    /// Full state snapshot; `run_id` is `None` for branch switches and
    /// thread loads.
    Values {
        run_id: Option<RunId>,
        values: ThreadValues,
    },
    Error { run_id: RunId, message: String },
    RunFinished { run_id: RunId },
}

pub type StoreEventSender = mpsc::UnboundedSender<StoreEvent>;
pub type StoreEventReceiver = mpsc::UnboundedReceiver<StoreEvent>;

pub fn event_channel() -> (StoreEventSender, StoreEventReceiver) {
    mpsc::unbounded_channel()
}

/// Streaming message store.
pub trait MessageStore {
    /// Current thread, if one has been created or opened.
    fn thread_id(&self) -> Option<String>;

    /// Switch to an existing thread, or to a fresh one with `None`.
    fn open_thread(&self, thread_id: Option<&str>) -> Result<()>;

    /// Schedule a run. `None` payload resumes without new input.
    fn submit(&self, payload: Option<SubmitPayload>, options: SubmitOptions) -> Result<RunId>;

    /// Cancel the in-flight run, keeping the last confirmed state.
    fn stop(&self);

    fn messages_metadata(&self, message: &Message) -> Option<MessageMetadata>;

    /// Move the thread head to the newest state of the given branch.
    fn set_branch(&self, branch: &str) -> Result<()>;
}

/// Branch metadata for a message on the tree's active path.
pub(crate) fn metadata_for(tree: &CheckpointTree, message: &Message) -> Option<MessageMetadata> {
    let first_seen = tree.first_seen(message.id()?)?;
    let branch = first_seen.checkpoint.checkpoint_id.clone();
    Some(MessageMetadata {
        branch_options: tree.siblings(&branch),
        branch: Some(branch),
        first_seen_state: Some(first_seen.clone()),
    })
}
