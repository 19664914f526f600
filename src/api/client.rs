use futures_util::StreamExt;
use reqwest::{Client, RequestBuilder, Response};
use serde::{de::DeserializeOwned, Serialize};
use std::time::Duration;
use tracing::{debug, error};
use url::Url;
use uuid::Uuid;

use super::http::send_with_retry;
use super::sse::SseStreamParser;
use super::types::{
    ApiError, CreateThreadRequest, HistoryRequest, RunEvent, RunStreamRequest, ThreadInfo,
};
use crate::domain::ThreadState;
use crate::error::Result;

/// Default request timeout in seconds
const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Connect timeout for run streams; the stream itself may run much longer
const STREAM_CONNECT_TIMEOUT_SECS: u64 = 10;

/// Default CLI version (from Cargo.toml)
const DEFAULT_VERSION: &str = env!("CARGO_PKG_VERSION");

fn build_user_agent() -> String {
    std::env::var("AGENT_CHAT_USER_AGENT")
        .unwrap_or_else(|_| format!("agent-chat/{}", DEFAULT_VERSION))
}

/// HTTP client for a LangGraph-compatible agent server
#[derive(Debug, Clone)]
pub struct ApiClient {
    client: Client,
    stream_client: Client,
    base_url: Url,
    api_key: Option<String>,
    user_agent: String,
    session_id: String,
}

impl ApiClient {
    pub fn new(api_url: &str, api_key: Option<String>) -> Result<Self> {
        // Keep any path prefix when joining endpoints
        let base_url = if api_url.ends_with('/') {
            Url::parse(api_url)?
        } else {
            Url::parse(&format!("{}/", api_url))?
        };

        let client = Client::builder()
            .timeout(Duration::from_secs(DEFAULT_TIMEOUT_SECS))
            .build()?;
        let stream_client = Client::builder()
            .connect_timeout(Duration::from_secs(STREAM_CONNECT_TIMEOUT_SECS))
            .build()?;

        Ok(Self {
            client,
            stream_client,
            base_url,
            api_key: api_key.filter(|k| !k.is_empty()),
            user_agent: build_user_agent(),
            session_id: Uuid::new_v4().to_string(),
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn build_url(base_url: &Url, endpoint: &str) -> Result<Url> {
        Ok(base_url.join(endpoint)?)
    }

    fn post(&self, client: &Client, url: &Url) -> RequestBuilder {
        let mut request = client
            .post(url.clone())
            .header("Content-Type", "application/json")
            .header("User-Agent", &self.user_agent)
            .header("x-request-id", Uuid::new_v4().to_string())
            .header("x-request-session-id", &self.session_id);

        if let Some(key) = &self.api_key {
            request = request.header("x-api-key", key);
        }
        request
    }

    /// Turn a non-success response into an [`ApiError`].
    async fn check_status(response: Response) -> Result<Response> {
        let status = response.status();
        debug!("Status: {}", status);
        if status.is_success() {
            return Ok(response);
        }

        let error_text = response
            .text()
            .await
            .unwrap_or_else(|_| "Unknown error".to_string());
        let api_error = ApiError::from_http_response(status.as_u16(), error_text);

        if api_error.is_fatal() {
            error!("❌ {}", api_error.message);
            error!("   {}", api_error.user_hint());
        } else {
            error!("API request failed: {}", api_error.message);
        }
        Err(api_error.into())
    }

    /// POST a JSON body with retries and parse the JSON response.
    async fn call_api<T, R>(&self, endpoint: &str, body: &T) -> Result<R>
    where
        T: Serialize,
        R: DeserializeOwned,
    {
        let url = Self::build_url(&self.base_url, endpoint)?;
        debug!("=== API Request ===");
        debug!("URL: {}", url);

        let response = send_with_retry(|| self.post(&self.client, &url).json(body)).await?;
        let response = Self::check_status(response).await?;
        let response_text = response.text().await?;
        Ok(serde_json::from_str(&response_text)?)
    }

    pub async fn create_thread(&self) -> Result<ThreadInfo> {
        self.call_api("threads", &CreateThreadRequest::default())
            .await
    }

    /// Checkpoint history of a thread, newest first.
    pub async fn thread_history(&self, thread_id: &str) -> Result<Vec<ThreadState>> {
        self.call_api(
            &format!("threads/{}/history", thread_id),
            &HistoryRequest::default(),
        )
        .await
    }

    /// Start a run and feed its events to `on_event` until the stream ends.
    ///
    /// Runs are not idempotent, so the request is sent once.
    pub async fn stream_run<F>(
        &self,
        thread_id: &str,
        request: &RunStreamRequest,
        mut on_event: F,
    ) -> Result<()>
    where
        F: FnMut(RunEvent),
    {
        let url = Self::build_url(&self.base_url, &format!("threads/{}/runs/stream", thread_id))?;
        debug!("=== Run Stream ===");
        debug!("URL: {}", url);

        let response = self
            .post(&self.stream_client, &url)
            .header("Accept", "text/event-stream")
            .json(request)
            .send()
            .await?;
        let response = Self::check_status(response).await?;

        let mut bytes = response.bytes_stream();
        let mut parser = SseStreamParser::default();
        while let Some(chunk) = bytes.next().await {
            for event in parser.feed(&chunk?) {
                let done = event == RunEvent::End;
                on_event(event);
                if done {
                    return Ok(());
                }
            }
        }

        if !parser.is_empty_buffer() {
            debug!("Run stream closed with an incomplete frame");
        }
        Ok(())
    }
}
