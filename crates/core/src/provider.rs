//! Provider trait — the abstraction over the completion backend.
//!
//! A Provider embeds text and streams chat completions. Everything the
//! retrieval engine needs from a model goes through this trait, so tests can
//! substitute a scripted backend.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::error::ProviderError;
use crate::message::ChatMessage;

/// A streamed completion: token deltas or a terminal error.
///
/// Dropping the receiver cancels the in-flight backend request.
pub type TokenStream = mpsc::Receiver<std::result::Result<String, ProviderError>>;

/// A chat completion request.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChatRequest {
    /// System prompt, sent as the first message when non-empty
    #[serde(default)]
    pub system: String,

    /// Conversation turns in order
    pub messages: Vec<ChatMessage>,
}

impl ChatRequest {
    pub fn new(system: impl Into<String>, messages: Vec<ChatMessage>) -> Self {
        Self { system: system.into(), messages }
    }

    /// Messages with the system prompt prepended, as sent on the wire.
    pub fn wire_messages(&self) -> Vec<ChatMessage> {
        let mut out = Vec::with_capacity(self.messages.len() + 1);
        if !self.system.is_empty() {
            out.push(ChatMessage::system(self.system.clone()));
        }
        out.extend(self.messages.iter().cloned());
        out
    }
}

/// Which backend endpoint and models a provider talks to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelInfo {
    pub base_url: String,
    pub chat_model: String,
    pub embed_model: String,
}

/// The core Provider trait.
#[async_trait]
pub trait Provider: Send + Sync {
    /// A human-readable name for this provider (e.g., "openai-compat", "mock").
    fn name(&self) -> &str;

    /// Endpoint and model names, reported in session metadata.
    fn models(&self) -> ModelInfo;

    /// Embed a batch of texts, one vector per input in the same order.
    async fn embed(&self, inputs: &[String]) -> std::result::Result<Vec<Vec<f32>>, ProviderError>;

    /// Embed a single text.
    async fn embed_one(&self, input: &str) -> std::result::Result<Vec<f32>, ProviderError> {
        self.embed(&[input.to_string()])
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| ProviderError::InvalidResponse("embed: no embedding returned".into()))
    }

    /// Start a streamed completion.
    async fn stream_chat(&self, request: ChatRequest) -> std::result::Result<TokenStream, ProviderError>;

    /// Run a completion to the end and return the whole text.
    async fn complete(&self, request: ChatRequest) -> std::result::Result<String, ProviderError> {
        let mut rx = self.stream_chat(request).await?;
        let mut out = String::new();
        while let Some(token) = rx.recv().await {
            out.push_str(&token?);
        }
        Ok(out)
    }

    /// List available models for this backend.
    async fn list_models(&self) -> std::result::Result<Vec<String>, ProviderError> {
        Ok(Vec::new())
    }

    /// Health check — can we reach the backend?
    async fn health_check(&self) -> std::result::Result<bool, ProviderError> {
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Echo;

    #[async_trait]
    impl Provider for Echo {
        fn name(&self) -> &str {
            "echo"
        }

        fn models(&self) -> ModelInfo {
            ModelInfo {
                base_url: "http://localhost".into(),
                chat_model: "chat".into(),
                embed_model: "embed".into(),
            }
        }

        async fn embed(&self, inputs: &[String]) -> Result<Vec<Vec<f32>>, ProviderError> {
            Ok(inputs.iter().map(|s| vec![s.len() as f32]).collect())
        }

        async fn stream_chat(&self, request: ChatRequest) -> Result<TokenStream, ProviderError> {
            let (tx, rx) = mpsc::channel(8);
            let last = request.messages.last().map(|m| m.content.clone()).unwrap_or_default();
            tokio::spawn(async move {
                for word in last.split_inclusive(' ') {
                    if tx.send(Ok(word.to_string())).await.is_err() {
                        return;
                    }
                }
            });
            Ok(rx)
        }
    }

    #[test]
    fn system_prompt_is_prepended() {
        let req = ChatRequest::new("be brief", vec![ChatMessage::user("hi")]);
        let wire = req.wire_messages();
        assert_eq!(wire.len(), 2);
        assert_eq!(wire[0], ChatMessage::system("be brief"));
    }

    #[test]
    fn empty_system_prompt_is_omitted() {
        let req = ChatRequest::new("", vec![ChatMessage::user("hi")]);
        assert_eq!(req.wire_messages().len(), 1);
    }

    #[tokio::test]
    async fn complete_collects_the_stream() {
        let out = Echo
            .complete(ChatRequest::new("", vec![ChatMessage::user("one two three")]))
            .await
            .unwrap();
        assert_eq!(out, "one two three");
    }

    #[tokio::test]
    async fn embed_one_takes_the_first_vector() {
        let v = Echo.embed_one("abcd").await.unwrap();
        assert_eq!(v, vec![4.0]);
    }
}
