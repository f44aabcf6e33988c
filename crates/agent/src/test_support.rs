//! Scripted provider shared by the agent tests.

use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use tinyrag_core::error::ProviderError;
use tinyrag_core::provider::{ChatRequest, ModelInfo, Provider, TokenStream};
use tokio::sync::mpsc;

/// A scripted chat reply.
pub enum Reply {
    Tokens(Vec<String>),
    /// Some tokens, then a stream error.
    Broken(Vec<String>, ProviderError),
    /// The request itself fails.
    Refused(ProviderError),
}

/// Embeds by lookup table and answers chat requests from a queue.
///
/// Unknown texts embed to a vector orthogonal to [`unit_at`] vectors. An
/// empty reply queue refuses the request.
pub struct MockProvider {
    vectors: Mutex<HashMap<String, Vec<f32>>>,
    replies: Mutex<VecDeque<Reply>>,
    requests: Mutex<Vec<ChatRequest>>,
    embedded: Mutex<Vec<String>>,
}

impl MockProvider {
    pub fn new() -> Self {
        Self {
            vectors: Mutex::new(HashMap::new()),
            replies: Mutex::new(VecDeque::new()),
            requests: Mutex::new(Vec::new()),
            embedded: Mutex::new(Vec::new()),
        }
    }

    pub fn set_vector(&self, text: &str, vector: Vec<f32>) {
        self.vectors.lock().unwrap().insert(text.to_string(), vector);
    }

    pub fn push_reply(&self, text: &str) {
        self.push(Reply::Tokens(vec![text.to_string()]));
    }

    pub fn push_tokens(&self, tokens: &[&str]) {
        self.push(Reply::Tokens(tokens.iter().map(|t| t.to_string()).collect()));
    }

    pub fn push(&self, reply: Reply) {
        self.replies.lock().unwrap().push_back(reply);
    }

    pub fn chat_calls(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    pub fn chat_requests(&self) -> Vec<ChatRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn embedded(&self) -> Vec<String> {
        self.embedded.lock().unwrap().clone()
    }
}

/// A unit vector whose cosine similarity with `[1, 0, 0]` is `score`.
pub fn unit_at(score: f32) -> Vec<f32> {
    vec![score, (1.0 - score * score).max(0.0).sqrt(), 0.0]
}

#[async_trait]
impl Provider for MockProvider {
    fn name(&self) -> &str {
        "mock"
    }

    fn models(&self) -> ModelInfo {
        ModelInfo {
            base_url: "http://mock".into(),
            chat_model: "mock-chat".into(),
            embed_model: "mock-embed".into(),
        }
    }

    async fn embed(&self, inputs: &[String]) -> Result<Vec<Vec<f32>>, ProviderError> {
        self.embedded.lock().unwrap().extend(inputs.iter().cloned());
        let vectors = self.vectors.lock().unwrap();
        Ok(inputs
            .iter()
            .map(|t| vectors.get(t).cloned().unwrap_or_else(|| vec![0.0, 0.0, 1.0]))
            .collect())
    }

    async fn stream_chat(&self, request: ChatRequest) -> Result<TokenStream, ProviderError> {
        self.requests.lock().unwrap().push(request);
        let reply = self.replies.lock().unwrap().pop_front();
        let (tokens, tail) = match reply {
            Some(Reply::Tokens(tokens)) => (tokens, None),
            Some(Reply::Broken(tokens, err)) => (tokens, Some(err)),
            Some(Reply::Refused(err)) => return Err(err),
            None => return Err(ProviderError::NotConfigured("no scripted reply".into())),
        };

        let (tx, rx) = mpsc::channel(tokens.len() + 1);
        for token in tokens {
            let _ = tx.try_send(Ok(token));
        }
        if let Some(err) = tail {
            let _ = tx.try_send(Err(err));
        }
        Ok(rx)
    }
}
