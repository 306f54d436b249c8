//! Ollama backend: a local model server standing in for the on-device model.
//!
//! Availability comes from `/api/tags`, downloads from `/api/pull`, and chat
//! from `/api/chat`. Ollama is stateless per request, so each session keeps
//! its own turn history and replays it on every prompt.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::OllamaConfig;
use crate::error::LlmError;

use super::host::{
    Availability, DownloadMonitor, FragmentStream, LanguageModelHost, ModelSession, SessionOptions,
};

const PROVIDER: &str = "ollama";

/// Buffered fragments between the reader task and the consumer.
const FRAGMENT_CHANNEL_CAPACITY: usize = 64;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

// ── Wire types ──────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct TagsResponse {
    #[serde(default)]
    models: Vec<TagModel>,
}

#[derive(Debug, Deserialize)]
struct TagModel {
    name: String,
}

#[derive(Debug, Deserialize)]
struct PullProgress {
    #[serde(default)]
    status: String,
    total: Option<u64>,
    completed: Option<u64>,
    error: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct WireMessage {
    role: String,
    #[serde(default)]
    content: String,
}

impl WireMessage {
    fn new(role: &str, content: impl Into<String>) -> Self {
        Self {
            role: role.to_string(),
            content: content.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize)]
struct ChatOptions {
    temperature: f32,
    top_k: u32,
    num_ctx: u32,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<WireMessage>,
    stream: bool,
    options: ChatOptions,
}

#[derive(Debug, Deserialize)]
struct ChatChunk {
    message: Option<WireMessage>,
    #[serde(default)]
    done: bool,
    prompt_eval_count: Option<u64>,
    eval_count: Option<u64>,
    error: Option<String>,
}

impl ChatChunk {
    fn content(&self) -> &str {
        self.message.as_ref().map(|m| m.content.as_str()).unwrap_or("")
    }

    fn tokens_used(&self) -> Option<u64> {
        match (self.prompt_eval_count, self.eval_count) {
            (None, None) => None,
            (p, e) => Some(p.unwrap_or(0) + e.unwrap_or(0)),
        }
    }
}

/// Splits a byte stream into newline-delimited records. Chunks from the
/// server do not respect line boundaries.
#[derive(Debug, Default)]
struct LineBuffer {
    pending: Vec<u8>,
}

impl LineBuffer {
    fn push(&mut self, bytes: &[u8]) -> Vec<String> {
        self.pending.extend_from_slice(bytes);
        let mut lines = Vec::new();
        while let Some(pos) = self.pending.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.pending.drain(..=pos).collect();
            let text = String::from_utf8_lossy(&line).trim().to_string();
            if !text.is_empty() {
                lines.push(text);
            }
        }
        lines
    }

    fn finish(&mut self) -> Option<String> {
        let text = String::from_utf8_lossy(&self.pending).trim().to_string();
        self.pending.clear();
        (!text.is_empty()).then_some(text)
    }
}

fn request_failed(reason: impl std::fmt::Display) -> LlmError {
    LlmError::RequestFailed {
        provider: PROVIDER.to_string(),
        reason: reason.to_string(),
    }
}

fn invalid_response(reason: impl std::fmt::Display) -> LlmError {
    LlmError::InvalidResponse {
        provider: PROVIDER.to_string(),
        reason: reason.to_string(),
    }
}

/// `llama3.2` matches a listed `llama3.2:latest`.
fn model_matches(listed: &str, wanted: &str) -> bool {
    listed == wanted || (!wanted.contains(':') && listed == format!("{}:latest", wanted))
}

// ── Host ────────────────────────────────────────────────────────────────

/// Host backed by an Ollama server.
pub struct OllamaHost {
    client: reqwest::Client,
    config: OllamaConfig,
}

impl OllamaHost {
    pub fn new(config: OllamaConfig) -> Result<Self, LlmError> {
        let client = reqwest::Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .build()
            .map_err(|e| request_failed(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self { client, config })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.config.base_url, path)
    }

    async fn model_installed(&self) -> Result<bool, LlmError> {
        let response = self
            .client
            .get(self.url("/api/tags"))
            .timeout(self.config.request_timeout)
            .send()
            .await
            .map_err(request_failed)?;

        if !response.status().is_success() {
            return Err(request_failed(format!("tags returned {}", response.status())));
        }

        let tags: TagsResponse = response.json().await.map_err(invalid_response)?;
        Ok(tags
            .models
            .iter()
            .any(|m| model_matches(&m.name, &self.config.model)))
    }

    async fn pull_model(&self, monitor: Option<&DownloadMonitor>) -> Result<(), LlmError> {
        info!(model = %self.config.model, "Downloading model");

        let response = self
            .client
            .post(self.url("/api/pull"))
            .json(&serde_json::json!({ "model": self.config.model, "stream": true }))
            .send()
            .await
            .map_err(request_failed)?;

        if !response.status().is_success() {
            return Err(request_failed(format!("pull returned {}", response.status())));
        }

        let mut lines = LineBuffer::default();
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let bytes = chunk.map_err(request_failed)?;
            for line in lines.push(&bytes) {
                apply_pull_line(&line, monitor)?;
            }
        }
        if let Some(line) = lines.finish() {
            apply_pull_line(&line, monitor)?;
        }

        if let Some(monitor) = monitor {
            monitor.report(1.0);
        }
        info!(model = %self.config.model, "Model download complete");
        Ok(())
    }
}

fn apply_pull_line(line: &str, monitor: Option<&DownloadMonitor>) -> Result<(), LlmError> {
    let progress: PullProgress = match serde_json::from_str(line) {
        Ok(p) => p,
        Err(e) => {
            warn!(error = %e, "Skipping malformed pull progress line");
            return Ok(());
        }
    };

    if let Some(err) = progress.error {
        return Err(request_failed(format!("pull failed: {}", err)));
    }

    if let (Some(total), Some(completed), Some(monitor)) = (progress.total, progress.completed, monitor)
        && total > 0
    {
        monitor.report(completed as f64 / total as f64);
    }
    debug!(status = %progress.status, "Pull progress");
    Ok(())
}

#[async_trait]
impl LanguageModelHost for OllamaHost {
    fn name(&self) -> &str {
        PROVIDER
    }

    async fn availability(&self) -> Result<Availability, LlmError> {
        if self.model_installed().await? {
            Ok(Availability::Available)
        } else {
            Ok(Availability::AfterDownload)
        }
    }

    async fn create_session(
        &self,
        options: SessionOptions,
    ) -> Result<Arc<dyn ModelSession>, LlmError> {
        if !self.model_installed().await? {
            self.pull_model(options.monitor.as_ref()).await?;
        }

        let session = OllamaSession::new(self.client.clone(), self.config.clone(), &options);
        info!(session_id = %session.id, model = %self.config.model, "Ollama session created");
        Ok(Arc::new(session))
    }
}

// ── Session ─────────────────────────────────────────────────────────────

#[derive(Debug, Default)]
struct SessionState {
    history: Vec<WireMessage>,
    input_usage: u64,
    destroyed: bool,
}

impl SessionState {
    fn record_turn(&mut self, input: &str, reply: &str, tokens_used: Option<u64>) {
        if self.destroyed {
            return;
        }
        self.history.push(WireMessage::new("user", input));
        self.history.push(WireMessage::new("assistant", reply));
        if let Some(tokens) = tokens_used {
            self.input_usage = tokens;
        }
    }
}

/// One conversation against an Ollama model.
pub struct OllamaSession {
    id: Uuid,
    client: reqwest::Client,
    config: OllamaConfig,
    options: ChatOptions,
    state: Arc<Mutex<SessionState>>,
}

impl OllamaSession {
    fn new(client: reqwest::Client, config: OllamaConfig, options: &SessionOptions) -> Self {
        let mut state = SessionState::default();
        if !options.system_prompt.trim().is_empty() {
            state
                .history
                .push(WireMessage::new("system", options.system_prompt.clone()));
        }

        let chat_options = ChatOptions {
            temperature: options.temperature,
            top_k: options.top_k,
            num_ctx: config.num_ctx,
        };

        Self {
            id: Uuid::new_v4(),
            client,
            config,
            options: chat_options,
            state: Arc::new(Mutex::new(state)),
        }
    }

    fn lock_state(&self) -> std::sync::MutexGuard<'_, SessionState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Build the message list for a new turn, failing if destroyed.
    fn messages_for(&self, input: &str) -> Result<Vec<WireMessage>, LlmError> {
        let state = self.lock_state();
        if state.destroyed {
            return Err(LlmError::SessionDestroyed);
        }
        let mut messages = state.history.clone();
        messages.push(WireMessage::new("user", input));
        Ok(messages)
    }

    async fn send_chat(
        &self,
        messages: Vec<WireMessage>,
        stream: bool,
        cancel: &CancellationToken,
    ) -> Result<reqwest::Response, LlmError> {
        let request = ChatRequest {
            model: &self.config.model,
            messages,
            stream,
            options: self.options,
        };

        let mut builder = self.client.post(format!("{}/api/chat", self.config.base_url));
        if !stream {
            builder = builder.timeout(self.config.request_timeout);
        }
        let send = builder.json(&request).send();

        let response = tokio::select! {
            result = send => result.map_err(request_failed)?,
            _ = cancel.cancelled() => return Err(LlmError::Aborted),
        };

        if !response.status().is_success() {
            return Err(request_failed(format!("chat returned {}", response.status())));
        }
        Ok(response)
    }
}

#[async_trait]
impl ModelSession for OllamaSession {
    async fn prompt_streaming(
        &self,
        input: &str,
        cancel: CancellationToken,
    ) -> Result<FragmentStream, LlmError> {
        let messages = self.messages_for(input)?;
        let response = self.send_chat(messages, true, &cancel).await?;

        let (tx, rx) = mpsc::channel(FRAGMENT_CHANNEL_CAPACITY);
        let state = Arc::clone(&self.state);
        let input = input.to_string();
        let session_id = self.id;

        tokio::spawn(async move {
            let mut bytes = response.bytes_stream();
            let mut lines = LineBuffer::default();
            let mut reply = String::new();

            loop {
                let chunk = tokio::select! {
                    chunk = bytes.next() => chunk,
                    _ = cancel.cancelled() => {
                        debug!(session_id = %session_id, "Streaming prompt cancelled");
                        let _ = tx.send(Err(LlmError::Aborted)).await;
                        return;
                    }
                };

                let (batch, ended) = match chunk {
                    Some(Ok(bytes)) => (lines.push(&bytes), false),
                    Some(Err(e)) => {
                        let _ = tx.send(Err(request_failed(e))).await;
                        return;
                    }
                    None => (lines.finish().into_iter().collect::<Vec<_>>(), true),
                };

                for line in batch {
                    let parsed: ChatChunk = match serde_json::from_str(&line) {
                        Ok(c) => c,
                        Err(e) => {
                            let _ = tx.send(Err(invalid_response(e))).await;
                            return;
                        }
                    };

                    if let Some(err) = parsed.error.as_deref() {
                        let _ = tx.send(Err(request_failed(err))).await;
                        return;
                    }

                    let content = parsed.content();
                    if !content.is_empty() {
                        reply.push_str(content);
                        if tx.send(Ok(content.to_string())).await.is_err() {
                            // Consumer went away; the turn never completed.
                            return;
                        }
                    }

                    if parsed.done {
                        let mut state = state.lock().unwrap_or_else(|p| p.into_inner());
                        state.record_turn(&input, &reply, parsed.tokens_used());
                        return;
                    }
                }

                if ended {
                    let _ = tx
                        .send(Err(invalid_response("stream ended before completion")))
                        .await;
                    return;
                }
            }
        });

        Ok(Box::pin(ReceiverStream::new(rx)))
    }

    async fn prompt(&self, input: &str, cancel: CancellationToken) -> Result<String, LlmError> {
        let messages = self.messages_for(input)?;
        let response = self.send_chat(messages, false, &cancel).await?;

        let body = tokio::select! {
            body = response.text() => body.map_err(request_failed)?,
            _ = cancel.cancelled() => return Err(LlmError::Aborted),
        };
        let parsed: ChatChunk = serde_json::from_str(&body)?;
        if let Some(err) = parsed.error.as_deref() {
            return Err(request_failed(err));
        }

        let reply = parsed.content().to_string();
        self.lock_state()
            .record_turn(input, &reply, parsed.tokens_used());
        Ok(reply)
    }

    async fn destroy(&self) {
        let mut state = self.lock_state();
        if !state.destroyed {
            state.destroyed = true;
            state.history.clear();
            info!(session_id = %self.id, "Ollama session destroyed");
        }
    }

    fn input_usage(&self) -> Option<u64> {
        Some(self.lock_state().input_usage)
    }

    fn input_quota(&self) -> Option<u64> {
        Some(u64::from(self.config.num_ctx))
    }
}
