//! Agent chat client.
//!
//! A thread controller drives one conversation against a streaming message
//! store, either a LangGraph-compatible server ([`api::RemoteMessageStore`])
//! or the in-process [`store::InMemoryMessageStore`]. It keeps optimistic
//! projections of runs in flight, answers dangling tool calls, attaches
//! fetched page summaries and navigates checkpoint branches.

pub mod api;
pub mod config;
pub mod domain;
pub mod enrich;
pub mod error;
pub mod records;
pub mod render;
pub mod store;
pub mod thread;
