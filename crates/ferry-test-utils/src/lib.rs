//! Shared test utilities for Ferry crates: stock executors, mock backends,
//! and config fixtures.

use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures::future::BoxFuture;
use futures::stream::{self, BoxStream, StreamExt};

use ferry_core::config::{AppConfig, ModelConfig};
use ferry_core::error::{FerryError, Result};
use ferry_core::traits::{ChatClient, Transcriber};
use ferry_core::types::{ChatMessage, StopReason, StreamDelta};
use ferry_workflow::{ExecutionContext, Executor, WorkflowEvent, WorkflowRun};

// ── Executors ────────────────────────────────────────────────────

/// Appends a fixed suffix to its input.
pub struct AppendExecutor {
    id: String,
    suffix: String,
}

impl AppendExecutor {
    pub fn new(id: &str, suffix: &str) -> Self {
        Self {
            id: id.to_string(),
            suffix: suffix.to_string(),
        }
    }
}

impl Executor for AppendExecutor {
    type Input = String;
    type Output = String;

    fn id(&self) -> &str {
        &self.id
    }

    fn handle(
        &self,
        input: String,
        _ctx: ExecutionContext<String>,
    ) -> BoxFuture<'_, Result<Option<String>>> {
        Box::pin(async move { Ok(Some(format!("{}{}", input, self.suffix))) })
    }
}

pub struct UppercaseExecutor {
    id: String,
}

impl UppercaseExecutor {
    pub fn new(id: &str) -> Self {
        Self { id: id.to_string() }
    }
}

impl Executor for UppercaseExecutor {
    type Input = String;
    type Output = String;

    fn id(&self) -> &str {
        &self.id
    }

    fn handle(
        &self,
        input: String,
        _ctx: ExecutionContext<String>,
    ) -> BoxFuture<'_, Result<Option<String>>> {
        Box::pin(async move { Ok(Some(input.to_uppercase())) })
    }
}

pub struct ReverseExecutor {
    id: String,
}

impl ReverseExecutor {
    pub fn new(id: &str) -> Self {
        Self { id: id.to_string() }
    }
}

impl Executor for ReverseExecutor {
    type Input = String;
    type Output = String;

    fn id(&self) -> &str {
        &self.id
    }

    fn handle(
        &self,
        input: String,
        _ctx: ExecutionContext<String>,
    ) -> BoxFuture<'_, Result<Option<String>>> {
        Box::pin(async move { Ok(Some(input.chars().rev().collect())) })
    }
}

/// Always fails with the given message. Counts its invocations.
pub struct FailingExecutor {
    id: String,
    message: String,
    calls: Arc<AtomicUsize>,
}

impl FailingExecutor {
    pub fn new(id: &str, message: &str) -> Self {
        Self {
            id: id.to_string(),
            message: message.to_string(),
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Shared invocation counter; grab it before handing the executor to a builder.
    pub fn calls(&self) -> Arc<AtomicUsize> {
        self.calls.clone()
    }
}

impl Executor for FailingExecutor {
    type Input = String;
    type Output = String;

    fn id(&self) -> &str {
        &self.id
    }

    fn handle(
        &self,
        _input: String,
        _ctx: ExecutionContext<String>,
    ) -> BoxFuture<'_, Result<Option<String>>> {
        Box::pin(async move {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Err(FerryError::executor(&self.id, &self.message))
        })
    }
}

/// Yields its input as `chunks` streaming pieces, then completes with the
/// whole input.
pub struct ChunkingExecutor {
    id: String,
    chunks: usize,
}

impl ChunkingExecutor {
    pub fn new(id: &str, chunks: usize) -> Self {
        Self {
            id: id.to_string(),
            chunks,
        }
    }
}

impl Executor for ChunkingExecutor {
    type Input = String;
    type Output = String;

    fn id(&self) -> &str {
        &self.id
    }

    fn handle(
        &self,
        input: String,
        ctx: ExecutionContext<String>,
    ) -> BoxFuture<'_, Result<Option<String>>> {
        Box::pin(async move {
            for i in 0..self.chunks {
                ctx.yield_output(format!("{}[{}]", input, i)).await?;
            }
            Ok(Some(input))
        })
    }
}

/// Blocks until the run is cancelled. Counts how many invocations observed
/// the cancellation.
pub struct BlockingExecutor {
    id: String,
    observed: Arc<AtomicUsize>,
}

impl BlockingExecutor {
    pub fn new(id: &str) -> Self {
        Self {
            id: id.to_string(),
            observed: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn observed(&self) -> Arc<AtomicUsize> {
        self.observed.clone()
    }
}

impl Executor for BlockingExecutor {
    type Input = String;
    type Output = String;

    fn id(&self) -> &str {
        &self.id
    }

    fn handle(
        &self,
        _input: String,
        ctx: ExecutionContext<String>,
    ) -> BoxFuture<'_, Result<Option<String>>> {
        Box::pin(async move {
            ctx.cancellation_token().cancelled().await;
            self.observed.fetch_add(1, Ordering::SeqCst);
            Err(FerryError::Cancelled)
        })
    }
}

/// Ignores cancellation and sleeps far longer than any test waits.
pub struct StubbornExecutor {
    id: String,
}

impl StubbornExecutor {
    pub fn new(id: &str) -> Self {
        Self { id: id.to_string() }
    }
}

impl Executor for StubbornExecutor {
    type Input = String;
    type Output = String;

    fn id(&self) -> &str {
        &self.id
    }

    fn handle(
        &self,
        input: String,
        _ctx: ExecutionContext<String>,
    ) -> BoxFuture<'_, Result<Option<String>>> {
        Box::pin(async move {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Ok(Some(input))
        })
    }
}

pub struct PanickingExecutor {
    id: String,
}

impl PanickingExecutor {
    pub fn new(id: &str) -> Self {
        Self { id: id.to_string() }
    }
}

impl Executor for PanickingExecutor {
    type Input = String;
    type Output = String;

    fn id(&self) -> &str {
        &self.id
    }

    fn handle(
        &self,
        input: String,
        _ctx: ExecutionContext<String>,
    ) -> BoxFuture<'_, Result<Option<String>>> {
        Box::pin(async move { explode(&input) })
    }
}

fn explode(input: &str) -> Result<Option<String>> {
    panic!("cannot handle {:?}", input)
}

// ── Run helpers ──────────────────────────────────────────────────

/// Drain a run, failing the test if it takes longer than five seconds.
pub async fn collect_events(run: WorkflowRun) -> Vec<WorkflowEvent> {
    tokio::time::timeout(Duration::from_secs(5), run.collect::<Vec<_>>())
        .await
        .unwrap_or_else(|_| panic!("workflow run did not finish within 5s"))
}

/// Compact `kind:executor` labels for asserting event order.
pub fn event_labels(events: &[WorkflowEvent]) -> Vec<String> {
    events
        .iter()
        .map(|e| match e {
            WorkflowEvent::ExecutorCompleted { executor_id, .. } => {
                format!("completed:{}", executor_id)
            }
            WorkflowEvent::WorkflowOutput {
                executor_id,
                terminal: true,
                ..
            } => format!("output:{}", executor_id),
            WorkflowEvent::WorkflowOutput { executor_id, .. } => format!("partial:{}", executor_id),
            WorkflowEvent::WorkflowError { executor_id, .. } => format!("error:{}", executor_id),
        })
        .collect()
}

// ── Mock backends ────────────────────────────────────────────────

/// A chat client that replays scripted replies, one per request, streamed
/// word by word. Records every request it receives.
#[derive(Default)]
pub struct MockChatClient {
    replies: Mutex<VecDeque<Result<String>>>,
    requests: Mutex<Vec<Vec<ChatMessage>>>,
}

impl MockChatClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_reply(self, reply: &str) -> Self {
        self.push(Ok(reply.to_string()));
        self
    }

    pub fn with_error(self, message: &str) -> Self {
        self.push(Err(FerryError::LlmRequest(message.to_string())));
        self
    }

    fn push(&self, reply: Result<String>) {
        if let Ok(mut replies) = self.replies.lock() {
            replies.push_back(reply);
        }
    }

    /// Messages of every request seen so far.
    pub fn requests(&self) -> Vec<Vec<ChatMessage>> {
        self.requests.lock().map(|r| r.clone()).unwrap_or_default()
    }
}

impl ChatClient for MockChatClient {
    fn chat_stream(
        &self,
        _config: &ModelConfig,
        messages: Vec<ChatMessage>,
    ) -> BoxFuture<'_, Result<BoxStream<'_, Result<StreamDelta>>>> {
        Box::pin(async move {
            if let Ok(mut requests) = self.requests.lock() {
                requests.push(messages);
            }
            let reply = self
                .replies
                .lock()
                .ok()
                .and_then(|mut r| r.pop_front())
                .unwrap_or_else(|| Err(FerryError::LlmRequest("no scripted reply".into())))?;

            let mut deltas: Vec<Result<StreamDelta>> = reply
                .split_inclusive(' ')
                .map(|w| Ok(StreamDelta::TextDelta(w.to_string())))
                .collect();
            deltas.push(Ok(StreamDelta::Stop(StopReason::EndTurn)));
            Ok(stream::iter(deltas).boxed())
        })
    }
}

/// A transcriber returning a fixed text and recording the file names it saw.
pub struct MockTranscriber {
    text: String,
    files: Mutex<Vec<(String, usize)>>,
}

impl MockTranscriber {
    pub fn new(text: &str) -> Self {
        Self {
            text: text.to_string(),
            files: Mutex::new(Vec::new()),
        }
    }

    /// `(file_name, byte_len)` of every transcription request.
    pub fn files(&self) -> Vec<(String, usize)> {
        self.files.lock().map(|f| f.clone()).unwrap_or_default()
    }
}

impl Transcriber for MockTranscriber {
    fn transcribe(&self, audio: Vec<u8>, file_name: &str) -> BoxFuture<'_, Result<String>> {
        let file_name = file_name.to_string();
        Box::pin(async move {
            if let Ok(mut files) = self.files.lock() {
                files.push((file_name, audio.len()));
            }
            Ok(self.text.clone())
        })
    }
}

// ── Config fixtures ──────────────────────────────────────────────

pub fn test_model_config() -> ModelConfig {
    ModelConfig {
        provider: "openai".to_string(),
        model_id: "test-model".to_string(),
        api_key: Some("sk-test".to_string()),
        base_url: None,
        max_tokens: 256,
        temperature: 0.0,
        retry: None,
    }
}

/// A minimal `AppConfig` parsed from TOML.
pub fn test_config() -> AppConfig {
    toml::from_str(
        r#"
[model]
model_id = "test-model"
api_key = "sk-test"
"#,
    )
    .unwrap_or_else(|e| panic!("fixture config must parse: {}", e))
}

/// Write `content` to `ferry.toml` in a fresh temp dir.
pub fn write_config(content: &str) -> (tempfile::TempDir, PathBuf) {
    let dir = tempfile::tempdir().unwrap_or_else(|e| panic!("tempdir: {}", e));
    let path = dir.path().join("ferry.toml");
    std::fs::write(&path, content).unwrap_or_else(|e| panic!("write config: {}", e));
    (dir, path)
}
