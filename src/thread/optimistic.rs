//! Optimistic projections awaiting confirmation.
//!
//! Every submission enqueues a projection of "last confirmed state" to
//! "state to show now", tagged with its run id. The displayed state is the
//! confirmed state with all pending projections applied in submission order.
//! When the store confirms a run, that run's projection and every older one
//! are dropped: the authoritative state already contains their effect, or
//! supersedes it.

use std::collections::VecDeque;

use crate::domain::{Message, ThreadValues};
use crate::store::RunId;

type ProjectFn = Box<dyn Fn(&ThreadValues) -> ThreadValues + Send + Sync>;

/// Pure mapping from the previous state to the state to display.
pub struct Projection(ProjectFn);

impl Projection {
    pub fn new(f: impl Fn(&ThreadValues) -> ThreadValues + Send + Sync + 'static) -> Self {
        Self(Box::new(f))
    }

    /// Show the previous state unchanged.
    pub fn identity() -> Self {
        Self::new(|prev| prev.clone())
    }

    /// Append messages to the previous state.
    pub fn append(messages: Vec<Message>) -> Self {
        Self::new(move |prev| prev.with_appended(&messages))
    }

    /// Show a fixed state regardless of the previous one.
    pub fn replace(values: ThreadValues) -> Self {
        Self::new(move |_| values.clone())
    }

    pub fn apply(&self, prev: &ThreadValues) -> ThreadValues {
        (self.0)(prev)
    }
}

impl std::fmt::Debug for Projection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Projection(..)")
    }
}

#[derive(Debug)]
struct PendingOp {
    run_id: RunId,
    projection: Projection,
}

#[derive(Debug, Default)]
pub struct OptimisticQueue {
    pending: VecDeque<PendingOp>,
}

impl OptimisticQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn enqueue(&mut self, run_id: RunId, projection: Projection) {
        self.pending.push_back(PendingOp { run_id, projection });
    }

    /// Confirmed state with every pending projection applied.
    pub fn project(&self, confirmed: &ThreadValues) -> ThreadValues {
        self.pending
            .iter()
            .fold(confirmed.clone(), |state, op| op.projection.apply(&state))
    }

    /// Drop the projection for `run_id` and all older ones. Returns how many
    /// were dropped; unknown runs drop nothing.
    pub fn confirm(&mut self, run_id: RunId) -> usize {
        match self.pending.iter().position(|op| op.run_id == run_id) {
            Some(pos) => self.pending.drain(..=pos).count(),
            None => 0,
        }
    }

    pub fn is_pending(&self, run_id: RunId) -> bool {
        self.pending.iter().any(|op| op.run_id == run_id)
    }

    pub fn clear(&mut self) {
        self.pending.clear();
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}
