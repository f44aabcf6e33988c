//! Local backend discovery.
//!
//! Probes the default ports of LM Studio and Ollama and suggests chat and
//! embedding models from the ids they report.

use serde::{Deserialize, Serialize};
use std::time::Duration;
use tinyrag_core::Provider;

use crate::openai_compat::OpenAiCompatProvider;

/// Endpoints probed by [`discover`].
pub const DEFAULT_CANDIDATES: [&str; 2] = ["http://localhost:1234", "http://localhost:11434"];

const MAX_RECOMMENDATIONS: usize = 8;

const CHAT_HINTS: [&str; 7] = ["llama", "mistral", "qwen", "gemma", "phi", "gpt", "ministral"];

/// Result of probing one endpoint.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EndpointProbe {
    pub ok: bool,
    pub base_url: String,
    pub provider_hint: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub models: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub recommend_chat: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub recommend_embed: Vec<String>,
}

/// Guess the server product from its port.
pub fn provider_hint(base_url: &str) -> &'static str {
    if base_url.contains("11434") {
        "Ollama"
    } else if base_url.contains("1234") {
        "LM Studio"
    } else {
        "OpenAI-compatible"
    }
}

/// Split model ids into likely chat and embedding models (at most 8 each).
pub fn recommend_models(models: &[String]) -> (Vec<String>, Vec<String>) {
    let mut chat = Vec::new();
    let mut embed = Vec::new();
    for model in models {
        let lower = model.to_lowercase();
        if lower.contains("embed") {
            embed.push(model.clone());
        }
        if CHAT_HINTS.iter().any(|hint| lower.contains(hint)) {
            chat.push(model.clone());
        }
    }
    chat.truncate(MAX_RECOMMENDATIONS);
    embed.truncate(MAX_RECOMMENDATIONS);
    (chat, embed)
}

/// List the models of one endpoint and annotate the result.
pub async fn probe(base_url: &str, timeout: Duration) -> EndpointProbe {
    let mut result = EndpointProbe {
        base_url: tinyrag_config::normalize_base_url(base_url),
        provider_hint: provider_hint(base_url).to_string(),
        ..Default::default()
    };

    let listed = match OpenAiCompatProvider::probe(&result.base_url, timeout) {
        Ok(client) => client.list_models().await,
        Err(e) => Err(e),
    };

    match listed {
        Ok(models) => {
            let (chat, embed) = recommend_models(&models);
            result.ok = true;
            result.models = models;
            result.recommend_chat = chat;
            result.recommend_embed = embed;
        }
        Err(e) => {
            tracing::debug!(base_url = %result.base_url, error = %e, "Endpoint probe failed");
            result.error = Some(e.to_string());
        }
    }
    result
}

/// Probe all default local endpoints concurrently.
pub async fn discover(timeout: Duration) -> Vec<EndpointProbe> {
    futures::future::join_all(DEFAULT_CANDIDATES.iter().map(|base| probe(base, timeout))).await
}
