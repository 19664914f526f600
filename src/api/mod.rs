//! API client for LangGraph-compatible agent servers.
//!
//! Covers the three endpoints a chat thread needs: thread creation,
//! checkpoint history and streamed runs. [`RemoteMessageStore`] builds the
//! message store on top of them.

mod client;
mod http;
mod sse;
mod store;
mod types;

pub use client::ApiClient;
pub use sse::SseStreamParser;
pub use store::RemoteMessageStore;
pub use types::{
    ApiError, ApiStatus, CreateThreadRequest, HistoryRequest, RunEvent, RunStreamRequest,
    ThreadInfo,
};
