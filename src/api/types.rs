//! Agent server request/response types and API errors.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::domain::{Checkpoint, ThreadValues};
use crate::store::{StreamMode, SubmitPayload};

// ============================================================================
// Threads
// ============================================================================

/// Body of `POST /threads`
#[derive(Debug, Clone, Default, Serialize)]
pub struct CreateThreadRequest {
    pub metadata: Map<String, Value>,
}

/// Thread record returned by the server
#[derive(Debug, Clone, Deserialize)]
pub struct ThreadInfo {
    pub thread_id: String,
    #[serde(default)]
    pub created_at: Option<String>,
}

/// Body of `POST /threads/{thread_id}/history`
#[derive(Debug, Clone, Serialize)]
pub struct HistoryRequest {
    pub limit: usize,
}

impl Default for HistoryRequest {
    fn default() -> Self {
        Self { limit: 1000 }
    }
}

// ============================================================================
// Runs
// ============================================================================

/// Body of `POST /threads/{thread_id}/runs/stream`
#[derive(Debug, Clone, Serialize)]
pub struct RunStreamRequest {
    pub assistant_id: String,
    /// `null` resumes from the checkpoint without new input
    pub input: Option<SubmitPayload>,
    pub stream_mode: Vec<StreamMode>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub checkpoint: Option<Checkpoint>,
}

/// Run metadata announced at the start of a stream
#[derive(Debug, Clone, Deserialize)]
pub struct RunMetadata {
    pub run_id: String,
}

/// Events of a run stream, by SSE event name
#[derive(Debug, Clone, PartialEq)]
pub enum RunEvent {
    Metadata { run_id: String },
    Values(ThreadValues),
    Error(String),
    End,
}

// ============================================================================
// API Status Codes
// ============================================================================

/// Classification of HTTP failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApiStatus {
    Ok,
    /// Request was cancelled (client closed connection) - retryable
    Cancelled,
    Unknown,
    /// Service unavailable - retryable
    Unavailable,
    /// Endpoint, thread or assistant not found
    NotFound,
    InvalidArgument,
    /// Rate limit exceeded
    ResourceExhausted,
    /// Missing or invalid API key - FATAL
    Unauthenticated,
    PermissionDenied,
    DeadlineExceeded,
    /// Run conflicts with one already in progress on the thread
    Conflict,
}

impl ApiStatus {
    /// Convert from HTTP status code to internal API status
    pub fn from_http_status(http_status: u16) -> Self {
        match http_status {
            200..=299 => ApiStatus::Ok,
            400 | 422 => ApiStatus::InvalidArgument,
            401 => ApiStatus::Unauthenticated,
            403 => ApiStatus::PermissionDenied,
            404 => ApiStatus::NotFound,
            408 | 504 => ApiStatus::DeadlineExceeded,
            409 => ApiStatus::Conflict,
            429 => ApiStatus::ResourceExhausted,
            499 => ApiStatus::Cancelled,
            500..=599 => ApiStatus::Unavailable,
            _ => ApiStatus::Unknown,
        }
    }

    /// Check if this error is fatal (requires user action, cannot continue)
    pub fn is_fatal(&self) -> bool {
        matches!(self, ApiStatus::Unauthenticated | ApiStatus::PermissionDenied)
    }

    pub fn error_message(&self) -> &'static str {
        match self {
            ApiStatus::Ok => "Success",
            ApiStatus::Cancelled => "Request was cancelled",
            ApiStatus::Unknown => "Unknown error occurred",
            ApiStatus::Unavailable => "Agent server temporarily unavailable",
            ApiStatus::NotFound => "Not found",
            ApiStatus::InvalidArgument => "Invalid request",
            ApiStatus::ResourceExhausted => "Rate limit exceeded. Please wait and try again",
            ApiStatus::Unauthenticated => "Authentication failed. Check AGENT_CHAT_API_KEY",
            ApiStatus::PermissionDenied => "Permission denied",
            ApiStatus::DeadlineExceeded => "Request timed out",
            ApiStatus::Conflict => "Thread is busy with another run",
        }
    }
}

impl std::fmt::Display for ApiStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.error_message())
    }
}

// ============================================================================
// API Error Type
// ============================================================================

/// API error with status code and details.
#[derive(Debug, Clone)]
pub struct ApiError {
    pub status: ApiStatus,
    pub http_status: u16,
    pub message: String,
}

impl ApiError {
    /// Create from HTTP status code and response body
    pub fn from_http_response(http_status: u16, body: String) -> Self {
        let status = ApiStatus::from_http_status(http_status);

        let message = match status {
            ApiStatus::Unauthenticated => format!(
                "Authentication failed (HTTP {}). Check that AGENT_CHAT_API_KEY is set and valid.",
                http_status
            ),
            ApiStatus::ResourceExhausted => format!(
                "Rate limit exceeded (HTTP {}). Please wait and try again.",
                http_status
            ),
            _ => {
                let detail = error_detail(&body);
                if detail.is_empty() {
                    format!("API error (HTTP {}): {}", http_status, status.error_message())
                } else {
                    format!("API error (HTTP {}): {}", http_status, detail)
                }
            }
        };

        Self {
            status,
            http_status,
            message,
        }
    }

    pub fn is_fatal(&self) -> bool {
        self.status.is_fatal()
    }

    /// Get a hint message for the user
    pub fn user_hint(&self) -> &'static str {
        match self.status {
            ApiStatus::Unauthenticated | ApiStatus::PermissionDenied => {
                "Set AGENT_CHAT_API_KEY (or --api-key) to a key accepted by the agent server."
            }
            ApiStatus::NotFound => "Check --api-url, --assistant-id and --thread-id.",
            ApiStatus::Unavailable => {
                "The agent server is temporarily unavailable. Please try again later."
            }
            _ => "An unexpected error occurred. Please try again.",
        }
    }
}

/// Pull the `detail` field out of a JSON error body, or return the body.
fn error_detail(body: &str) -> String {
    serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|v| v.get("detail").and_then(Value::as_str).map(str::to_string))
        .unwrap_or_else(|| body.trim().to_string())
}

impl std::fmt::Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for ApiError {}
