//! Retrieval decision and trace types.
//!
//! The context assembler walks a small state machine per question. These
//! types name its branches and record what it did so a caller can show
//! which chunks ended up in the prompt and why.

use serde::{Deserialize, Serialize};

use crate::store::ChunkHit;

/// Separator placed between chunks in an assembled context.
pub const CONTEXT_SEPARATOR: &str = "\n---\n";

/// Which branch of the retrieval procedure produced the context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecisionTag {
    /// The refined query named a stored article exactly.
    ArticleSpecific,
    /// At least one hit cleared the high-confidence threshold.
    HighConfidence,
    /// Arbitration failed; hits above the relaxed threshold were used.
    RelaxedFallback,
    /// Arbitration decided no retrieved material is needed.
    AnswerDirect,
    /// Arbitration supplied its own `k`/threshold.
    LmRequestedRetrieval,
}

impl DecisionTag {
    pub fn as_str(&self) -> &'static str {
        match self {
            DecisionTag::ArticleSpecific => "article_specific",
            DecisionTag::HighConfidence => "high_confidence",
            DecisionTag::RelaxedFallback => "relaxed_fallback",
            DecisionTag::AnswerDirect => "answer_direct",
            DecisionTag::LmRequestedRetrieval => "lm_requested_retrieval",
        }
    }
}

impl std::fmt::Display for DecisionTag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What the arbitration model asked for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RetrievalAction {
    AnswerDirect,
    RetrieveMore,
}

/// A parsed arbitration reply.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrievalDecision {
    pub action: RetrievalAction,
    pub k: usize,
    pub threshold: f32,
    /// Refined query suggested by the model; empty when none was given.
    #[serde(default)]
    pub query: String,
}

/// One chunk as it appears in the debug trace.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DebugChunk {
    pub score: f32,
    pub content: String,
    pub article: String,
    pub chunk_idx: i64,
    pub is_neighbor: bool,
}

impl DebugChunk {
    pub fn primary(hit: &ChunkHit) -> Self {
        Self {
            score: hit.score,
            content: hit.content.clone(),
            article: hit.article.clone(),
            chunk_idx: hit.chunk_idx,
            is_neighbor: false,
        }
    }

    pub fn neighbor(article: &str, chunk_idx: i64, content: &str) -> Self {
        Self {
            score: crate::store::NEIGHBOR_SCORE,
            content: content.to_string(),
            article: article.to_string(),
            chunk_idx,
            is_neighbor: true,
        }
    }
}

/// Timing, decision and the chunks actually used for one question.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrievalTrace {
    pub chunks: Vec<DebugChunk>,
    pub embed_ms: u64,
    pub search_ms: u64,
    pub total_chunks: usize,
    pub used_k: usize,
    pub decision: DecisionTag,
    /// Query the vector probe was run with.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub search_query: String,
}

/// The output of the context assembler.
#[derive(Debug, Clone, PartialEq)]
pub struct AssembledContext {
    /// Chunks joined with [`CONTEXT_SEPARATOR`]; empty for `answer_direct`.
    pub context: String,
    pub trace: RetrievalTrace,
}

impl AssembledContext {
    pub fn decision(&self) -> DecisionTag {
        self.trace.decision
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decision_tags_serialize_as_snake_case() {
        for tag in [
            DecisionTag::ArticleSpecific,
            DecisionTag::HighConfidence,
            DecisionTag::RelaxedFallback,
            DecisionTag::AnswerDirect,
            DecisionTag::LmRequestedRetrieval,
        ] {
            let json = serde_json::to_value(tag).unwrap();
            assert_eq!(json, serde_json::json!(tag.as_str()));
        }
    }

    #[test]
    fn action_uses_upper_case_wire_names() {
        let action: RetrievalAction = serde_json::from_str("\"RETRIEVE_MORE\"").unwrap();
        assert_eq!(action, RetrievalAction::RetrieveMore);
    }

    #[test]
    fn neighbor_chunks_carry_sentinel_score() {
        let chunk = DebugChunk::neighbor("Mars", 1, "text");
        assert!(chunk.is_neighbor);
        assert_eq!(chunk.score, -1.0);
    }
}
