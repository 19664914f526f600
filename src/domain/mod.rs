//! Domain types shared across modules.
//!
//! Messages, thread values and checkpoints are used by the stores, the
//! thread controller and the render layer alike. Keeping them here avoids
//! circular dependencies between those modules.

mod checkpoint;
mod message;

pub use checkpoint::{Checkpoint, CheckpointTree, ThreadState};
pub use message::{Message, MessageContent, Role, ThreadValues, ToolCall};
