use clap::{Parser, Subcommand};
use std::path::PathBuf;

use agent_chat::config::{DEFAULT_API_URL, DEFAULT_ASSISTANT_ID};
use agent_chat::records::LinkStatus;

/// Agent chat - terminal client for LangGraph-compatible agent servers
#[derive(Parser)]
#[command(name = "agent-chat")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Agent server URL
    #[arg(long, env = "AGENT_CHAT_API_URL", default_value = DEFAULT_API_URL)]
    pub api_url: String,

    /// Assistant (graph) to run
    #[arg(long, env = "AGENT_CHAT_ASSISTANT_ID", default_value = DEFAULT_ASSISTANT_ID)]
    pub assistant_id: String,

    /// API key sent as x-api-key
    #[arg(long, env = "AGENT_CHAT_API_KEY", hide_env_values = true)]
    pub api_key: Option<String>,

    /// Directory for local data such as link records. Defaults to ~/.agent-chat
    #[arg(long, env = "AGENT_CHAT_DATA_DIR")]
    pub data_dir: Option<PathBuf>,

    #[command(flatten)]
    pub chat: ChatArgs,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Chat with the assistant (default)
    Chat,
    /// Fetch a page and print the summary that would be attached to a message
    Fetch {
        /// Page URL (http:// is assumed when no scheme is given)
        url: String,
    },
    /// Manage saved link records
    Records {
        #[command(subcommand)]
        action: RecordsAction,
    },
}

#[derive(clap::Args, Debug, Default, Clone)]
pub struct ChatArgs {
    /// Open an existing thread
    #[arg(short, long, global = true)]
    pub thread_id: Option<String>,

    /// Hide tool calls and tool results in the transcript
    #[arg(long, global = true)]
    pub hide_tool_calls: bool,

    /// Print the thread history when it is opened
    #[arg(long, global = true)]
    pub history: bool,

    /// Use the in-process echo assistant instead of the server
    #[arg(long, global = true)]
    pub offline: bool,
}

#[derive(Subcommand)]
pub enum RecordsAction {
    /// Save a link in the Ready state
    Add { url: String },
    /// List saved links
    List,
    /// Change the status of a saved link
    Status {
        /// Record number as shown by `records list`
        index: usize,
        /// Ready, Progress or Done
        status: LinkStatus,
    },
}
