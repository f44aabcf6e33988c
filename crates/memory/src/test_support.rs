//! Deterministic embedder shared by the store tests.

use async_trait::async_trait;
use std::sync::Mutex;
use tinyrag_core::error::ProviderError;
use tinyrag_core::provider::{ChatRequest, ModelInfo, Provider, TokenStream};

const VOCAB: [&str; 6] = ["mars", "venus", "red", "hot", "earth", "moon"];

/// Bag-of-words embedder over a tiny vocabulary plus a bias dimension.
pub struct KeywordEmbedder {
    batches: Mutex<Vec<usize>>,
    fail_from: Option<usize>,
}

impl KeywordEmbedder {
    pub fn new() -> Self {
        Self { batches: Mutex::new(Vec::new()), fail_from: None }
    }

    /// Succeed for the first `n` calls, then fail every call.
    pub fn failing_after(n: usize) -> Self {
        Self { batches: Mutex::new(Vec::new()), fail_from: Some(n) }
    }

    pub fn calls(&self) -> usize {
        self.batches.lock().unwrap().len()
    }

    pub fn batch_sizes(&self) -> Vec<usize> {
        self.batches.lock().unwrap().clone()
    }

    pub fn vector(text: &str) -> Vec<f32> {
        let lower = text.to_lowercase();
        let mut v: Vec<f32> = VOCAB
            .iter()
            .map(|word| lower.split_whitespace().filter(|w| w == word).count() as f32)
            .collect();
        v.push(0.1);
        v
    }
}

#[async_trait]
impl Provider for KeywordEmbedder {
    fn name(&self) -> &str {
        "keyword"
    }

    fn models(&self) -> ModelInfo {
        ModelInfo {
            base_url: "http://localhost".into(),
            chat_model: "none".into(),
            embed_model: "keyword".into(),
        }
    }

    async fn embed(&self, inputs: &[String]) -> Result<Vec<Vec<f32>>, ProviderError> {
        let call = {
            let mut batches = self.batches.lock().unwrap();
            batches.push(inputs.len());
            batches.len() - 1
        };
        if self.fail_from.is_some_and(|n| call >= n) {
            return Err(ProviderError::ApiError {
                status_code: 500,
                message: "embed 500 Internal Server Error: boom".into(),
            });
        }
        Ok(inputs.iter().map(|s| Self::vector(s)).collect())
    }

    async fn stream_chat(&self, _request: ChatRequest) -> Result<TokenStream, ProviderError> {
        Err(ProviderError::NotConfigured("keyword embedder has no chat model".into()))
    }
}

/// `count` chunks named `"{prefix} {i}"`.
pub fn numbered_chunks(prefix: &str, count: usize) -> Vec<String> {
    (0..count).map(|i| format!("{prefix} {i}")).collect()
}
