//! Direct sub-prompt against the active chat model.

use async_trait::async_trait;
use std::sync::Arc;
use tinyrag_core::error::ToolError;
use tinyrag_core::message::ChatMessage;
use tinyrag_core::provider::{ChatRequest, Provider};
use tinyrag_core::tool::{Tool, ToolKind, ToolOutput};

pub struct LlmTool {
    provider: Arc<dyn Provider>,
}

impl LlmTool {
    pub fn new(provider: Arc<dyn Provider>) -> Self {
        Self { provider }
    }
}

#[async_trait]
impl Tool for LlmTool {
    fn name(&self) -> &str {
        "llm"
    }

    fn description(&self) -> String {
        "Führe einen direkten Prompt gegen das konfigurierte LLM aus (für kreative Antworten oder kurze Analysen).".into()
    }

    fn param_hint(&self) -> String {
        "Prompt / Frage".into()
    }

    fn kind(&self) -> ToolKind {
        ToolKind::Llm
    }

    fn source_name(&self, query: &str) -> String {
        format!("llm:{query}")
    }

    async fn execute(&self, query: &str) -> Result<ToolOutput, ToolError> {
        let request = ChatRequest::new("", vec![ChatMessage::user(query)]);
        let text = self
            .provider
            .complete(request)
            .await
            .map_err(|e| ToolError::failed(self.name(), e))?;
        Ok(ToolOutput { source: self.source_name(query), text })
    }
}
