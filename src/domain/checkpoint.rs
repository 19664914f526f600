//! Checkpoints and the per-thread checkpoint tree.
//!
//! A thread's history is a tree: regenerating or editing a message starts a
//! new branch from an earlier checkpoint while the old branch stays
//! reachable. The tree is an arena of nodes with parent links and ordered
//! children, indexed by checkpoint id.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::debug;
use uuid::Uuid;

use super::message::{null_as_default, ThreadValues};

/// Opaque pointer to a point in a thread's history.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Checkpoint {
    pub checkpoint_id: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub checkpoint_ns: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thread_id: Option<String>,
}

impl Checkpoint {
    pub fn new(checkpoint_id: impl Into<String>) -> Self {
        Self {
            checkpoint_id: checkpoint_id.into(),
            checkpoint_ns: String::new(),
            thread_id: None,
        }
    }

    /// Fresh checkpoint with a random id.
    pub fn generate() -> Self {
        Self::new(Uuid::new_v4().to_string())
    }

    pub fn id(&self) -> &str {
        &self.checkpoint_id
    }
}

/// Thread values at a checkpoint, linked to the checkpoint before it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThreadState {
    #[serde(default)]
    pub values: ThreadValues,
    pub checkpoint: Checkpoint,
    #[serde(default)]
    pub parent_checkpoint: Option<Checkpoint>,
}

#[derive(Debug, Clone)]
struct CheckpointNode {
    state: ThreadState,
    parent: Option<usize>,
    children: Vec<usize>,
}

/// Arena of checkpoint nodes for one thread.
#[derive(Debug, Clone, Default)]
pub struct CheckpointTree {
    nodes: Vec<CheckpointNode>,
    index: HashMap<String, usize>,
    roots: Vec<usize>,
    head: Option<usize>,
}

impl CheckpointTree {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn clear(&mut self) {
        self.nodes.clear();
        self.index.clear();
        self.roots.clear();
        self.head = None;
    }

    /// Insert a state and return whether it was new.
    ///
    /// Checkpoints are immutable, so re-inserting a known id is a no-op. A
    /// parent that is not in the tree (history truncated by the server) makes
    /// the node a root.
    pub fn insert(&mut self, state: ThreadState) -> bool {
        if self.index.contains_key(state.checkpoint.id()) {
            return false;
        }

        let parent = state
            .parent_checkpoint
            .as_ref()
            .and_then(|p| self.index.get(p.id()).copied());
        if parent.is_none() {
            if let Some(declared) = &state.parent_checkpoint {
                debug!(
                    "Parent checkpoint {} not loaded; treating {} as a root",
                    declared.id(),
                    state.checkpoint.id()
                );
            }
        }

        let idx = self.nodes.len();
        self.index.insert(state.checkpoint.id().to_string(), idx);
        self.nodes.push(CheckpointNode {
            state,
            parent,
            children: Vec::new(),
        });
        match parent {
            Some(p) => self.nodes[p].children.push(idx),
            None => self.roots.push(idx),
        }
        true
    }

    pub fn get(&self, checkpoint_id: &str) -> Option<&ThreadState> {
        self.index.get(checkpoint_id).map(|&i| &self.nodes[i].state)
    }

    pub fn contains(&self, checkpoint_id: &str) -> bool {
        self.index.contains_key(checkpoint_id)
    }

    pub fn parent(&self, checkpoint_id: &str) -> Option<&ThreadState> {
        let idx = *self.index.get(checkpoint_id)?;
        self.nodes[idx].parent.map(|p| &self.nodes[p].state)
    }

    pub fn head(&self) -> Option<&ThreadState> {
        self.head.map(|i| &self.nodes[i].state)
    }

    /// Move the head; unknown ids leave it unchanged.
    pub fn set_head(&mut self, checkpoint_id: &str) -> bool {
        match self.index.get(checkpoint_id) {
            Some(&idx) => {
                self.head = Some(idx);
                true
            }
            None => false,
        }
    }

    /// Values at the head, empty for a fresh thread.
    pub fn head_values(&self) -> ThreadValues {
        self.head().map(|s| s.values.clone()).unwrap_or_default()
    }

    /// Ids of the checkpoints sharing this checkpoint's parent, in creation
    /// order. Includes the checkpoint itself.
    pub fn siblings(&self, checkpoint_id: &str) -> Vec<String> {
        let Some(&idx) = self.index.get(checkpoint_id) else {
            return Vec::new();
        };
        let peers = match self.nodes[idx].parent {
            Some(p) => &self.nodes[p].children,
            None => &self.roots,
        };
        peers
            .iter()
            .map(|&i| self.nodes[i].state.checkpoint.checkpoint_id.clone())
            .collect()
    }

    /// Newest leaf reachable from a checkpoint, following the most recently
    /// created child at every step.
    pub fn latest_leaf(&self, checkpoint_id: &str) -> Option<&ThreadState> {
        let mut idx = *self.index.get(checkpoint_id)?;
        while let Some(&next) = self.nodes[idx].children.last() {
            idx = next;
        }
        Some(&self.nodes[idx].state)
    }

    /// States from the root down to the head.
    pub fn active_path(&self) -> Vec<&ThreadState> {
        let mut path = Vec::new();
        let mut current = self.head;
        while let Some(idx) = current {
            path.push(&self.nodes[idx].state);
            current = self.nodes[idx].parent;
        }
        path.reverse();
        path
    }

    /// Earliest state on the active path whose values contain the message.
    pub fn first_seen(&self, message_id: &str) -> Option<&ThreadState> {
        self.active_path()
            .into_iter()
            .find(|state| state.values.contains(message_id))
    }
}
