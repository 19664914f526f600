//! Library error type.

use thiserror::Error;

use crate::api::ApiError;

pub type Result<T, E = ChatError> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum ChatError {
    #[error("Message store error: {0}")]
    Store(String),

    #[error("Unknown checkpoint: {0}")]
    UnknownCheckpoint(String),

    #[error("Unknown branch: {0}")]
    UnknownBranch(String),

    #[error("No thread is open")]
    NoThread,

    #[error("Configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Api(#[from] ApiError),

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Invalid URL: {0}")]
    Url(#[from] url::ParseError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
