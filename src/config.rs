//! Resolved client configuration.

use std::path::PathBuf;
use url::Url;

use crate::error::{ChatError, Result};

pub const DEFAULT_API_URL: &str = "http://localhost:2024";
pub const DEFAULT_ASSISTANT_ID: &str = "agent";

/// Data directory under the home directory
const DATA_DIR_NAME: &str = ".agent-chat";

#[derive(Debug, Clone)]
pub struct ChatConfig {
    pub api_url: String,
    pub assistant_id: String,
    pub api_key: Option<String>,
    pub data_dir: PathBuf,
}

impl ChatConfig {
    /// Validate the server settings and resolve the data directory
    /// (defaults to ~/.agent-chat).
    pub fn new(
        api_url: &str,
        assistant_id: &str,
        api_key: Option<String>,
        data_dir: Option<PathBuf>,
    ) -> Result<Self> {
        let api_url = api_url.trim();
        let parsed = Url::parse(api_url)?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(ChatError::Config(format!(
                "API URL must use http or https: {}",
                api_url
            )));
        }

        let assistant_id = assistant_id.trim();
        if assistant_id.is_empty() {
            return Err(ChatError::Config("Assistant id must not be empty".to_string()));
        }

        let data_dir = match data_dir {
            Some(dir) => dir,
            None => default_data_dir()?,
        };

        Ok(Self {
            api_url: api_url.to_string(),
            assistant_id: assistant_id.to_string(),
            api_key: api_key.filter(|k| !k.trim().is_empty()),
            data_dir,
        })
    }
}

pub fn default_data_dir() -> Result<PathBuf> {
    dirs::home_dir()
        .map(|home| home.join(DATA_DIR_NAME))
        .ok_or_else(|| ChatError::Config("Could not determine home directory".to_string()))
}
