//! OpenAI-compatible backend client.
//!
//! Works with LM Studio, Ollama, vLLM, llama.cpp server and any endpoint
//! exposing `/v1/embeddings`, `/v1/models` and streaming
//! `/v1/chat/completions`.
//!
//! Supports:
//! - Batched embeddings
//! - Streaming chat completions (SSE) with reasoning-span removal
//! - Model listing and health checks

use async_trait::async_trait;
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tinyrag_config::normalize_base_url;
use tinyrag_core::error::ProviderError;
use tinyrag_core::message::ChatMessage;
use tinyrag_core::provider::*;
use tracing::{debug, trace, warn};

const THINK_OPEN: &str = "[THINK]";
const THINK_CLOSE: &str = "[/THINK]";

/// An OpenAI-compatible embedding + chat backend.
///
/// `base_url` is the server root without `/v1`; the client appends the
/// versioned paths itself.
pub struct OpenAiCompatProvider {
    base_url: String,
    chat_model: String,
    embed_model: String,
    request_timeout: Duration,
    client: reqwest::Client,
}

impl OpenAiCompatProvider {
    /// Create a new client. `request_timeout` bounds non-streaming calls.
    pub fn new(
        base_url: impl AsRef<str>,
        chat_model: impl Into<String>,
        embed_model: impl Into<String>,
        request_timeout: Duration,
    ) -> Result<Self, ProviderError> {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| ProviderError::NotConfigured(format!("HTTP client: {e}")))?;

        Ok(Self {
            base_url: normalize_base_url(base_url.as_ref()),
            chat_model: chat_model.into(),
            embed_model: embed_model.into(),
            request_timeout,
            client,
        })
    }

    /// A client that only talks to `/v1/models` (discovery, settings checks).
    pub fn probe(base_url: impl AsRef<str>, timeout: Duration) -> Result<Self, ProviderError> {
        Self::new(base_url, "", "", timeout)
    }

    fn url(&self, path: &str) -> String {
        format!("{}/v1/{}", self.base_url, path)
    }

    /// Map a non-200 status to a typed error, keeping the body for the caller.
    async fn status_error(context: &str, response: reqwest::Response) -> ProviderError {
        let status = response.status().as_u16();
        let body = response.text().await.unwrap_or_default();
        warn!(status, body = %body, "Backend returned error for {context}");
        match status {
            429 => ProviderError::RateLimited { retry_after_secs: 5 },
            401 | 403 => ProviderError::AuthenticationFailed(format!("{context} {status}: {body}")),
            404 if context == "embed" => ProviderError::ModelNotFound(format!("{context} {status}: {body}")),
            _ => ProviderError::ApiError {
                status_code: status,
                message: format!("{context} {status}: {body}"),
            },
        }
    }
}

#[async_trait]
impl tinyrag_core::Provider for OpenAiCompatProvider {
    fn name(&self) -> &str {
        "openai-compat"
    }

    fn models(&self) -> ModelInfo {
        ModelInfo {
            base_url: self.base_url.clone(),
            chat_model: self.chat_model.clone(),
            embed_model: self.embed_model.clone(),
        }
    }

    async fn embed(&self, inputs: &[String]) -> std::result::Result<Vec<Vec<f32>>, ProviderError> {
        let body = EmbeddingApiRequest {
            model: &self.embed_model,
            input: inputs,
        };

        debug!(model = %self.embed_model, count = inputs.len(), "Sending embedding request");

        let response = self
            .client
            .post(self.url("embeddings"))
            .timeout(self.request_timeout)
            .json(&body)
            .send()
            .await
            .map_err(map_send_error)?;

        if response.status().as_u16() != 200 {
            return Err(Self::status_error("embed", response).await);
        }

        let api_resp: EmbeddingApiResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::InvalidResponse(format!("embeddings: {e}")))?;

        if api_resp.data.len() != inputs.len() {
            return Err(ProviderError::InvalidResponse(format!(
                "embeddings: expected {} vectors, got {}",
                inputs.len(),
                api_resp.data.len()
            )));
        }

        Ok(api_resp.data.into_iter().map(|d| d.embedding).collect())
    }

    async fn stream_chat(&self, request: ChatRequest) -> std::result::Result<TokenStream, ProviderError> {
        let messages = request.wire_messages();
        let body = ChatApiRequest {
            model: &self.chat_model,
            messages: &messages,
            stream: true,
        };

        debug!(model = %self.chat_model, messages = messages.len(), "Sending streaming request");

        let response = self
            .client
            .post(self.url("chat/completions"))
            .header("Accept", "text/event-stream")
            .json(&body)
            .send()
            .await
            .map_err(map_send_error)?;

        if response.status().as_u16() != 200 {
            return Err(Self::status_error("chat HTTP", response).await);
        }

        let (tx, rx) = tokio::sync::mpsc::channel(64);

        // Reads the SSE byte stream. Once the receiver is dropped the task
        // returns and drops `response`, which aborts the backend request,
        // even while nothing visible is being produced.
        tokio::spawn(async move {
            let mut byte_stream = response.bytes_stream();
            let mut decoder = SseDecoder::default();
            let mut think = ThinkFilter::default();

            loop {
                let chunk_result = tokio::select! {
                    biased;
                    _ = tx.closed() => {
                        trace!("Token receiver dropped, abandoning stream");
                        return;
                    }
                    next = byte_stream.next() => match next {
                        Some(chunk) => chunk,
                        None => return,
                    },
                };
                let bytes = match chunk_result {
                    Ok(b) => b,
                    Err(e) => {
                        let _ = tx.send(Err(ProviderError::StreamInterrupted(e.to_string()))).await;
                        return;
                    }
                };

                for event in decoder.push(&bytes) {
                    let delta = match event {
                        SseEvent::Done => return,
                        SseEvent::Delta(delta) => delta,
                    };
                    let visible = think.filter(&delta);
                    if visible.is_empty() {
                        continue;
                    }
                    if tx.send(Ok(visible)).await.is_err() {
                        trace!("Token receiver dropped, abandoning stream");
                        return; // receiver dropped
                    }
                }
            }
        });

        Ok(rx)
    }

    async fn list_models(&self) -> std::result::Result<Vec<String>, ProviderError> {
        let response = self
            .client
            .get(self.url("models"))
            .timeout(self.request_timeout)
            .send()
            .await
            .map_err(map_send_error)?;

        if !response.status().is_success() {
            return Err(Self::status_error("models", response).await);
        }

        let body: ModelsApiResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::InvalidResponse(format!("models: {e}")))?;

        let mut models: Vec<String> = body
            .data
            .into_iter()
            .map(|m| m.id)
            .filter(|id| !id.is_empty())
            .collect();
        models.sort();
        Ok(models)
    }

    async fn health_check(&self) -> std::result::Result<bool, ProviderError> {
        let response = self
            .client
            .get(self.url("models"))
            .timeout(self.request_timeout)
            .send()
            .await
            .map_err(map_send_error)?;

        Ok(response.status().as_u16() == 200)
    }
}

fn map_send_error(e: reqwest::Error) -> ProviderError {
    if e.is_timeout() {
        ProviderError::Timeout(e.to_string())
    } else {
        ProviderError::Network(e.to_string())
    }
}

// --- SSE decoding ---

/// One decoded server-sent event from a chat completion stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SseEvent {
    /// A `delta.content` fragment
    Delta(String),
    /// The `[DONE]` sentinel
    Done,
}

/// Incremental line decoder for `data: {...}` event streams.
///
/// Bytes may arrive split anywhere, including inside a UTF-8 sequence.
#[derive(Debug, Default)]
pub struct SseDecoder {
    pending: Vec<u8>,
}

impl SseDecoder {
    /// Feed bytes, return the events completed by them.
    pub fn push(&mut self, bytes: &[u8]) -> Vec<SseEvent> {
        self.pending.extend_from_slice(bytes);
        let mut events = Vec::new();

        while let Some(line_end) = self.pending.iter().position(|&b| b == b'\n') {
            let raw: Vec<u8> = self.pending.drain(..=line_end).collect();
            let line = String::from_utf8_lossy(&raw);
            let line = line.trim_end_matches(['\n', '\r']);

            // Skip empty lines and SSE comments
            if line.is_empty() || line.starts_with(':') {
                continue;
            }

            let Some(data) = line.strip_prefix("data:") else {
                continue;
            };
            let data = data.trim();

            if data == "[DONE]" {
                events.push(SseEvent::Done);
                break;
            }

            match serde_json::from_str::<StreamResponse>(data) {
                Ok(resp) => {
                    let content = resp
                        .choices
                        .into_iter()
                        .next()
                        .and_then(|c| c.delta.content)
                        .unwrap_or_default();
                    if !content.is_empty() {
                        events.push(SseEvent::Delta(content));
                    }
                }
                Err(e) => {
                    trace!(data = %data, error = %e, "Ignoring unparseable SSE chunk");
                }
            }
        }

        events
    }
}

/// Removes `[THINK]` … `[/THINK]` reasoning spans from token deltas.
#[derive(Debug, Default)]
pub struct ThinkFilter {
    in_think: bool,
}

impl ThinkFilter {
    /// Return the visible part of `delta`, carrying think state across calls.
    pub fn filter(&mut self, delta: &str) -> String {
        let mut out = String::new();
        let mut rest = delta;
        loop {
            if self.in_think {
                match rest.find(THINK_CLOSE) {
                    Some(pos) => {
                        self.in_think = false;
                        rest = &rest[pos + THINK_CLOSE.len()..];
                    }
                    None => return out,
                }
            } else {
                match rest.find(THINK_OPEN) {
                    Some(pos) => {
                        out.push_str(&rest[..pos]);
                        self.in_think = true;
                        rest = &rest[pos + THINK_OPEN.len()..];
                    }
                    None => {
                        out.push_str(rest);
                        return out;
                    }
                }
            }
        }
    }
}

// --- OpenAI API types (internal) ---

#[derive(Debug, Serialize)]
struct EmbeddingApiRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Debug, Deserialize)]
struct EmbeddingApiResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
}

#[derive(Debug, Serialize)]
struct ChatApiRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    stream: bool,
}

#[derive(Debug, Deserialize)]
struct ModelsApiResponse {
    #[serde(default)]
    data: Vec<ModelEntry>,
}

#[derive(Debug, Deserialize)]
struct ModelEntry {
    #[serde(default)]
    id: String,
}

/// A single SSE `data: {...}` chunk from a streaming response.
#[derive(Debug, Deserialize)]
struct StreamResponse {
    #[serde(default)]
    choices: Vec<StreamChoice>,
}

#[derive(Debug, Deserialize)]
struct StreamChoice {
    delta: StreamDelta,
}

#[derive(Debug, Deserialize)]
struct StreamDelta {
    #[serde(default)]
    content: Option<String>,
}
