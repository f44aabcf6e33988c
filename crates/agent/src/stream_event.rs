//! Session-level streaming events.
//!
//! `SessionEvent` is what a session emits while answering one question.
//! The gateway forwards them as SSE events; the CLI prints them.
//!
//! Order within one session:
//! - `meta`        — ids, mode, models (always first)
//! - `debug`       — retrieval trace, only when requested
//! - `token`       — answer text as it is generated
//! - `tool_request`/`tool_result` — after the answer, at most once each
//! - `error`       — generation failed
//! - `done`        — always last

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tinyrag_core::provider::ModelInfo;
use tinyrag_core::retrieval::RetrievalTrace;

/// How a question is answered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionMode {
    Normal,
    /// Larger `k` and a structured research answer
    Deep,
    /// No generation; the retrieved context is returned as-is
    Offline,
}

impl SessionMode {
    /// Offline wins over deep.
    pub fn from_flags(deep: bool, offline: bool) -> Self {
        match (deep, offline) {
            (_, true) => Self::Offline,
            (true, false) => Self::Deep,
            (false, false) => Self::Normal,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Normal => "normal",
            Self::Deep => "deep",
            Self::Offline => "offline",
        }
    }
}

/// First event of every session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionMeta {
    pub chat_id: String,
    pub title: String,
    pub request_id: String,
    pub mode: SessionMode,
    pub k: usize,
    pub base_k: usize,
    pub chunk_size: usize,
    pub total_chunks: usize,
    pub debug: bool,
    pub deep: bool,
    pub offline: bool,
    pub message_count: usize,
    pub created: DateTime<Utc>,
    pub updated: DateTime<Utc>,
    pub persona_id: String,
    pub persona_name: String,
    pub models: ModelInfo,
}

/// Retrieval and prompt statistics for one session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DebugInfo {
    pub request_id: String,
    pub mode: SessionMode,
    pub question: String,
    pub used_k: usize,
    pub base_k: usize,
    pub chunk_size: usize,
    pub total_chunks: usize,
    pub context_chars: usize,
    pub system_prompt_chars: usize,
    pub history_messages: usize,
    pub models: ModelInfo,
    pub retrieval: RetrievalTrace,
    pub persona_id: String,
    pub persona_name: String,
    pub persona_prompt_chars: usize,
}

/// Outcome of a requested tool.
///
/// Exactly one shape per outcome: `source` + `output` on success, `error`
/// on failure, `allowed: false` + `error` when the policy refused it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolResultEvent {
    pub tool: String,
    pub query: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub allowed: Option<bool>,
}

impl ToolResultEvent {
    pub fn succeeded(tool: &str, query: &str, source: &str, output: &str) -> Self {
        Self {
            tool: tool.into(),
            query: query.into(),
            source: Some(source.into()),
            output: Some(output.into()),
            error: None,
            allowed: None,
        }
    }

    pub fn failed(tool: &str, query: &str, error: impl ToString) -> Self {
        Self {
            tool: tool.into(),
            query: query.into(),
            source: None,
            output: None,
            error: Some(error.to_string()),
            allowed: None,
        }
    }

    pub fn denied(tool: &str, query: &str, reason: impl ToString) -> Self {
        Self {
            allowed: Some(false),
            ..Self::failed(tool, query, reason)
        }
    }

    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}

/// Events emitted by a session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SessionEvent {
    Meta(Box<SessionMeta>),

    Debug(Box<DebugInfo>),

    /// Partial answer text, relayed verbatim.
    Token { content: String },

    /// The answer asked for a tool.
    ToolRequest { tool: String, query: String },

    ToolResult(ToolResultEvent),

    /// Generation or retrieval failed.
    Error { message: String },

    /// The stream is complete.
    Done,
}

impl SessionEvent {
    /// SSE event name for this event type.
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::Meta(_) => "meta",
            Self::Debug(_) => "debug",
            Self::Token { .. } => "token",
            Self::ToolRequest { .. } => "tool_request",
            Self::ToolResult(_) => "tool_result",
            Self::Error { .. } => "error",
            Self::Done => "done",
        }
    }

    pub fn token(content: impl Into<String>) -> Self {
        Self::Token {
            content: content.into(),
        }
    }
}
