//! Client-side thread logic.
//!
//! Everything between the user and the message store: repairing tool-call
//! pairing before a send, optimistic projections, branch navigation, error
//! notifications and the per-thread session state.

mod accumulator;
mod controller;
mod errors;
mod navigator;
mod optimistic;
mod session;

// Re-exports
pub use accumulator::{ensure_tool_calls_have_responses, missing_tool_results, DO_NOT_RENDER_ID_PREFIX};
pub use controller::ThreadController;
pub use errors::{ErrorSurfacer, Notification, ERROR_TITLE};
pub use navigator::{branch_switcher, edit_request, regenerate_request, BranchSwitcher, EditRequest};
pub use optimistic::{OptimisticQueue, Projection};
pub use session::{ThreadPreferences, ThreadSession};
