//! Message store backed by a remote agent server.
//!
//! Runs stream on spawned tokio tasks; each `values` event is forwarded as
//! a [`StoreEvent::Values`]. After every run, finished, failed or stopped,
//! the checkpoint history is reloaded so the head and the branch metadata
//! match what the server persisted.

use std::sync::{Arc, Mutex, MutexGuard};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::client::ApiClient;
use super::types::{RunEvent, RunStreamRequest};
use crate::domain::{Checkpoint, CheckpointTree, Message, ThreadState, ThreadValues};
use crate::error::{ChatError, Result};
use crate::store::{
    metadata_for, CheckpointTarget, MessageMetadata, MessageStore, RunId, StoreEvent,
    StoreEventSender, SubmitOptions, SubmitPayload,
};

#[derive(Default)]
struct RemoteState {
    thread_id: Option<String>,
    tree: CheckpointTree,
    tasks: Vec<JoinHandle<()>>,
}

type SharedState = Arc<Mutex<RemoteState>>;

fn lock(state: &SharedState) -> MutexGuard<'_, RemoteState> {
    state.lock().unwrap_or_else(|e| e.into_inner())
}

fn emit(events: &StoreEventSender, event: StoreEvent) {
    if events.send(event).is_err() {
        debug!("Store event receiver dropped");
    }
}

/// Checkpoint to send for a run, `None` letting the server pick.
fn resolve_checkpoint(tree: &CheckpointTree, target: &CheckpointTarget) -> Option<Checkpoint> {
    match target {
        CheckpointTarget::Head => tree.head().map(|s| s.checkpoint.clone()),
        CheckpointTarget::At(checkpoint) => Some(checkpoint.clone()),
        CheckpointTarget::Root => None,
    }
}

/// Merge a history listing (newest first) into the tree and move the head
/// to the newest state.
fn absorb_history(tree: &mut CheckpointTree, history: Vec<ThreadState>) {
    let newest = history.first().map(|s| s.checkpoint.checkpoint_id.clone());
    for state in history.into_iter().rev() {
        tree.insert(state);
    }
    if let Some(id) = newest {
        tree.set_head(&id);
    }
}

pub struct RemoteMessageStore {
    client: ApiClient,
    assistant_id: String,
    state: SharedState,
    events: StoreEventSender,
}

impl RemoteMessageStore {
    pub fn new(client: ApiClient, assistant_id: impl Into<String>, events: StoreEventSender) -> Self {
        Self {
            client,
            assistant_id: assistant_id.into(),
            state: Arc::new(Mutex::new(RemoteState::default())),
            events,
        }
    }

    fn spawn(&self, task: impl std::future::Future<Output = ()> + Send + 'static) {
        let handle = tokio::spawn(task);
        let mut state = lock(&self.state);
        state.tasks.retain(|t| !t.is_finished());
        state.tasks.push(handle);
    }

    fn abort_all(&self) -> usize {
        let mut state = lock(&self.state);
        let tasks = std::mem::take(&mut state.tasks);
        let mut aborted = 0;
        for task in tasks {
            if !task.is_finished() {
                task.abort();
                aborted += 1;
            }
        }
        aborted
    }
}

/// Reload the history of `thread_id`; a no-op if the store moved on.
async fn refresh_history(client: &ApiClient, state: &SharedState, thread_id: &str) -> Result<()> {
    let history = client.thread_history(thread_id).await?;
    debug!("Loaded {} checkpoints for thread {}", history.len(), thread_id);

    let mut state = lock(state);
    if state.thread_id.as_deref() == Some(thread_id) {
        absorb_history(&mut state.tree, history);
    }
    Ok(())
}

struct RunTask {
    client: ApiClient,
    state: SharedState,
    events: StoreEventSender,
    run_id: RunId,
    request: RunStreamRequest,
}

impl RunTask {
    async fn run(self) {
        let run_id = self.run_id;
        emit(&self.events, StoreEvent::RunStarted { run_id });

        if let Err(e) = self.stream().await {
            warn!("Run {} failed: {}", run_id, e);
            emit(
                &self.events,
                StoreEvent::Error {
                    run_id,
                    message: e.to_string(),
                },
            );
        }

        // The server may have persisted part of a failed run
        let thread_id = lock(&self.state).thread_id.clone();
        if let Some(thread_id) = thread_id {
            if let Err(e) = refresh_history(&self.client, &self.state, &thread_id).await {
                warn!("Failed to reload thread {} after run {}: {}", thread_id, run_id, e);
            }
        }
        emit(&self.events, StoreEvent::RunFinished { run_id });
    }

    async fn thread_id(&self) -> Result<String> {
        let existing = lock(&self.state).thread_id.clone();
        if let Some(id) = existing {
            return Ok(id);
        }

        let thread = self.client.create_thread().await?;
        info!("Created thread {}", thread.thread_id);
        lock(&self.state).thread_id = Some(thread.thread_id.clone());
        emit(
            &self.events,
            StoreEvent::ThreadCreated {
                thread_id: thread.thread_id.clone(),
            },
        );
        Ok(thread.thread_id)
    }

    async fn stream(&self) -> Result<()> {
        let thread_id = self.thread_id().await?;
        let run_id = self.run_id;

        self.client
            .stream_run(&thread_id, &self.request, |event| match event {
                RunEvent::Metadata { run_id: server_run } => {
                    debug!("Run {} is server run {}", run_id, server_run);
                }
                RunEvent::Values(values) => emit(
                    &self.events,
                    StoreEvent::Values {
                        run_id: Some(run_id),
                        values,
                    },
                ),
                RunEvent::Error(message) => {
                    warn!("Run {} reported: {}", run_id, message);
                    emit(&self.events, StoreEvent::Error { run_id, message });
                }
                RunEvent::End => debug!("Run {} stream ended", run_id),
            })
            .await
    }
}

impl MessageStore for RemoteMessageStore {
    fn thread_id(&self) -> Option<String> {
        lock(&self.state).thread_id.clone()
    }

    fn open_thread(&self, thread_id: Option<&str>) -> Result<()> {
        self.abort_all();
        {
            let mut state = lock(&self.state);
            state.thread_id = thread_id.map(str::to_string);
            state.tree.clear();
        }

        let Some(thread_id) = thread_id.map(str::to_string) else {
            emit(
                &self.events,
                StoreEvent::Values {
                    run_id: None,
                    values: ThreadValues::default(),
                },
            );
            return Ok(());
        };

        let client = self.client.clone();
        let state = Arc::clone(&self.state);
        let events = self.events.clone();
        self.spawn(async move {
            match refresh_history(&client, &state, &thread_id).await {
                Ok(()) => {
                    let values = lock(&state).tree.head_values();
                    emit(&events, StoreEvent::Values { run_id: None, values });
                }
                Err(e) => {
                    warn!("Failed to load thread {}: {}", thread_id, e);
                    emit(
                        &events,
                        StoreEvent::Error {
                            run_id: RunId::new(),
                            message: e.to_string(),
                        },
                    );
                }
            }
        });
        Ok(())
    }

    fn submit(&self, payload: Option<SubmitPayload>, options: SubmitOptions) -> Result<RunId> {
        let run_id = RunId::new();
        let checkpoint = resolve_checkpoint(&lock(&self.state).tree, &options.checkpoint);
        debug!(
            "Submitting run {} (input: {}, checkpoint: {:?})",
            run_id,
            payload.is_some(),
            checkpoint.as_ref().map(Checkpoint::id)
        );

        let task = RunTask {
            client: self.client.clone(),
            state: Arc::clone(&self.state),
            events: self.events.clone(),
            run_id,
            request: RunStreamRequest {
                assistant_id: self.assistant_id.clone(),
                input: payload,
                stream_mode: options.stream_mode,
                checkpoint,
            },
        };
        self.spawn(task.run());
        Ok(run_id)
    }

    /// Abort in-flight runs, then reload the history so the head covers
    /// whatever the server kept of them.
    fn stop(&self) {
        let aborted = self.abort_all();
        if aborted == 0 {
            return;
        }
        info!("Stopped {} in-flight run(s)", aborted);

        let Some(thread_id) = self.thread_id() else {
            return;
        };
        let client = self.client.clone();
        let state = Arc::clone(&self.state);
        let events = self.events.clone();
        self.spawn(async move {
            match refresh_history(&client, &state, &thread_id).await {
                Ok(()) => {
                    let values = {
                        let state = lock(&state);
                        (state.thread_id.as_deref() == Some(thread_id.as_str()))
                            .then(|| state.tree.head_values())
                    };
                    if let Some(values) = values {
                        emit(&events, StoreEvent::Values { run_id: None, values });
                    }
                }
                Err(e) => warn!("Failed to reload thread {} after stop: {}", thread_id, e),
            }
        });
    }

    fn messages_metadata(&self, message: &Message) -> Option<MessageMetadata> {
        metadata_for(&lock(&self.state).tree, message)
    }

    fn set_branch(&self, branch: &str) -> Result<()> {
        let values = {
            let mut state = lock(&self.state);
            if state.thread_id.is_none() {
                return Err(ChatError::NoThread);
            }
            let leaf = state
                .tree
                .latest_leaf(branch)
                .map(|s| s.checkpoint.checkpoint_id.clone())
                .ok_or_else(|| ChatError::UnknownBranch(branch.to_string()))?;
            state.tree.set_head(&leaf);
            state.tree.head_values()
        };

        emit(&self.events, StoreEvent::Values { run_id: None, values });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::event_channel;
    use std::time::Duration;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    fn state(id: &str, parent: Option<&str>, messages: Vec<Message>) -> ThreadState {
        ThreadState {
            values: ThreadValues::new(messages),
            checkpoint: Checkpoint::new(id),
            parent_checkpoint: parent.map(Checkpoint::new),
        }
    }

    fn store() -> (RemoteMessageStore, crate::store::StoreEventReceiver) {
        let (tx, rx) = event_channel();
        let client = ApiClient::new("http://localhost:2024", None).unwrap();
        (RemoteMessageStore::new(client, "agent", tx), rx)
    }

    #[test]
    fn test_absorb_history_newest_first() {
        let human = Message::human("hi").with_id("h");
        let history = vec![
            state("c2", Some("c1"), vec![human.clone(), Message::ai("yo").with_id("a")]),
            state("c1", Some("c0"), vec![human]),
            state("c0", None, vec![]),
        ];
        let mut tree = CheckpointTree::new();
        absorb_history(&mut tree, history);

        assert_eq!(tree.len(), 3);
        assert_eq!(tree.head().unwrap().checkpoint.id(), "c2");
        assert_eq!(tree.parent("c2").unwrap().checkpoint.id(), "c1");
        assert_eq!(tree.first_seen("h").unwrap().checkpoint.id(), "c1");
    }

    #[test]
    fn test_resolve_checkpoint() {
        let mut tree = CheckpointTree::new();
        assert!(resolve_checkpoint(&tree, &CheckpointTarget::Head).is_none());

        absorb_history(&mut tree, vec![state("c0", None, vec![])]);
        assert_eq!(
            resolve_checkpoint(&tree, &CheckpointTarget::Head),
            Some(Checkpoint::new("c0"))
        );
        assert_eq!(
            resolve_checkpoint(&tree, &CheckpointTarget::At(Checkpoint::new("x"))),
            Some(Checkpoint::new("x"))
        );
        assert!(resolve_checkpoint(&tree, &CheckpointTarget::Root).is_none());
    }

    #[tokio::test]
    async fn test_new_thread_emits_empty_values() {
        let (store, mut rx) = store();
        store.open_thread(None).unwrap();
        assert!(store.thread_id().is_none());
        assert_eq!(
            rx.try_recv().unwrap(),
            StoreEvent::Values {
                run_id: None,
                values: ThreadValues::default(),
            }
        );
    }

    #[tokio::test]
    async fn test_set_branch_moves_head() {
        let (store, mut rx) = store();
        {
            let mut guard = lock(&store.state);
            guard.thread_id = Some("t1".to_string());
            absorb_history(
                &mut guard.tree,
                vec![
                    state_with("c3", "c1", "second"),
                    state_with("c2", "c1", "first"),
                    state("c1", None, vec![Message::human("hi").with_id("h")]),
                ],
            );
        }

        store.set_branch("c2").unwrap();
        match rx.try_recv().unwrap() {
            StoreEvent::Values { run_id, values } => {
                assert!(run_id.is_none());
                assert_eq!(values.messages[1].content_string(), "first");
            }
            other => panic!("unexpected event: {:?}", other),
        }
        assert!(matches!(
            store.set_branch("missing"),
            Err(ChatError::UnknownBranch(_))
        ));
    }

    fn state_with(id: &str, parent: &str, reply: &str) -> ThreadState {
        state(
            id,
            Some(parent),
            vec![
                Message::human("hi").with_id("h"),
                Message::ai(reply).with_id(format!("ai-{}", id)),
            ],
        )
    }

    #[tokio::test]
    async fn test_set_branch_without_thread() {
        let (store, _rx) = store();
        assert!(matches!(store.set_branch("c1"), Err(ChatError::NoThread)));
    }

    /// Minimal HTTP server answering each path with a fixed status and body.
    async fn serve(routes: Vec<(&'static str, u16, String)>) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            while let Ok((mut socket, _)) = listener.accept().await {
                let routes = routes.clone();
                tokio::spawn(async move {
                    let mut request = Vec::new();
                    let mut chunk = [0u8; 4096];
                    let header_end = loop {
                        let n = socket.read(&mut chunk).await.unwrap_or(0);
                        if n == 0 {
                            return;
                        }
                        request.extend_from_slice(&chunk[..n]);
                        if let Some(pos) = request.windows(4).position(|w| w == b"\r\n\r\n") {
                            break pos + 4;
                        }
                    };
                    let head = String::from_utf8_lossy(&request[..header_end]).to_string();
                    let content_length = head
                        .lines()
                        .filter_map(|line| line.split_once(':'))
                        .find(|(name, _)| name.eq_ignore_ascii_case("content-length"))
                        .and_then(|(_, value)| value.trim().parse::<usize>().ok())
                        .unwrap_or(0);
                    while request.len() < header_end + content_length {
                        let n = socket.read(&mut chunk).await.unwrap_or(0);
                        if n == 0 {
                            break;
                        }
                        request.extend_from_slice(&chunk[..n]);
                    }

                    let path = head.split_whitespace().nth(1).unwrap_or("/").to_string();
                    let (status, body) = routes
                        .iter()
                        .find(|(p, _, _)| *p == path)
                        .map(|(_, status, body)| (*status, body.clone()))
                        .unwrap_or((404, String::new()));
                    let response = format!(
                        "HTTP/1.1 {} Test\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{}",
                        status,
                        body.len(),
                        body
                    );
                    let _ = socket.write_all(response.as_bytes()).await;
                    let _ = socket.shutdown().await;
                });
            }
        });
        format!("http://{}", addr)
    }

    /// Thread `t1` at c1 locally; the server has since moved on to c2, which
    /// holds the input of the interrupted run.
    fn interrupted_history() -> String {
        serde_json::to_string(&vec![
            state(
                "c2",
                Some("c1"),
                vec![
                    Message::human("hi").with_id("h"),
                    Message::ai("yo").with_id("a"),
                    Message::human("more").with_id("h2"),
                ],
            ),
            state(
                "c1",
                None,
                vec![Message::human("hi").with_id("h"), Message::ai("yo").with_id("a")],
            ),
        ])
        .unwrap()
    }

    fn remote_store(base_url: &str) -> (RemoteMessageStore, crate::store::StoreEventReceiver) {
        let (tx, rx) = event_channel();
        let client = ApiClient::new(base_url, None).unwrap();
        let store = RemoteMessageStore::new(client, "agent", tx);
        {
            let mut guard = lock(&store.state);
            guard.thread_id = Some("t1".to_string());
            absorb_history(
                &mut guard.tree,
                vec![state(
                    "c1",
                    None,
                    vec![Message::human("hi").with_id("h"), Message::ai("yo").with_id("a")],
                )],
            );
        }
        (store, rx)
    }

    async fn next_event(rx: &mut crate::store::StoreEventReceiver) -> StoreEvent {
        tokio::time::timeout(Duration::from_secs(10), rx.recv())
            .await
            .expect("timed out waiting for a store event")
            .expect("event channel closed")
    }

    #[tokio::test]
    async fn test_failed_run_reloads_history() {
        let base_url = serve(vec![
            ("/threads/t1/history", 200, interrupted_history()),
            ("/threads/t1/runs/stream", 500, r#"{"detail":"graph crashed"}"#.to_string()),
        ])
        .await;
        let (store, mut rx) = remote_store(&base_url);

        let run_id = store
            .submit(
                Some(SubmitPayload::new(vec![Message::human("more").with_id("h2")])),
                SubmitOptions::values(),
            )
            .unwrap();

        assert_eq!(next_event(&mut rx).await, StoreEvent::RunStarted { run_id });
        assert!(matches!(next_event(&mut rx).await, StoreEvent::Error { .. }));
        assert_eq!(next_event(&mut rx).await, StoreEvent::RunFinished { run_id });

        // The next run continues from what the server kept
        let guard = lock(&store.state);
        assert_eq!(
            resolve_checkpoint(&guard.tree, &CheckpointTarget::Head),
            Some(Checkpoint::new("c2"))
        );
    }

    #[tokio::test]
    async fn test_stop_reloads_history() {
        let base_url = serve(vec![("/threads/t1/history", 200, interrupted_history())]).await;
        let (store, mut rx) = remote_store(&base_url);
        store.spawn(std::future::pending::<()>());

        store.stop();

        match next_event(&mut rx).await {
            StoreEvent::Values { run_id, values } => {
                assert!(run_id.is_none());
                assert_eq!(values.len(), 3);
                assert_eq!(values.messages[2].content_string(), "more");
            }
            other => panic!("unexpected event: {:?}", other),
        }
        assert_eq!(lock(&store.state).tree.head().unwrap().checkpoint.id(), "c2");
    }

    #[tokio::test]
    async fn test_stop_without_runs_is_quiet() {
        let (store, mut rx) = remote_store("http://127.0.0.1:9");
        store.stop();
        assert!(rx.try_recv().is_err());
    }
}
