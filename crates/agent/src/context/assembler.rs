//! Adaptive context assembly.
//!
//! Per question the assembler walks a small state machine:
//!
//! 1. **Refine** the question to a bare entity when it is phrased as
//!    "who is X" / "tell me about X".
//! 2. **Embed** the refined query.
//! 3. **Article shortcut**: if the refined query names a stored article,
//!    every chunk of that article is the context (`article_specific`).
//! 4. **Probe** the store for ranked candidates.
//! 5. **High confidence**: hits above the high threshold are used directly
//!    (`high_confidence`).
//! 6. **Arbitration**: otherwise the chat model sees a candidate summary and
//!    either answers without context (`answer_direct`) or names its own
//!    `k`/threshold (`lm_requested_retrieval`). If arbitration fails, hits
//!    above the relaxed threshold are used (`relaxed_fallback`).
//! 7. **Stitch** each primary hit with its positional neighbours.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Instant;

use tinyrag_config::RetrievalConfig;
use tinyrag_core::error::Result;
use tinyrag_core::provider::Provider;
use tinyrag_core::retrieval::{
    AssembledContext, CONTEXT_SEPARATOR, DebugChunk, DecisionTag, RetrievalAction, RetrievalTrace,
};
use tinyrag_core::store::{ChunkHit, ChunkStore, candidate_limit};
use tracing::{debug, info, warn};

use crate::decision::{analyze_question, summarize_candidates};
use crate::refine::refine_search_query;

/// Thresholds and sizes that steer the retrieval decision.
#[derive(Debug, Clone, PartialEq)]
pub struct RetrievalPolicy {
    pub high_confidence: f32,
    pub relaxed_threshold: f32,
    pub requested_threshold: f32,
    pub search_threshold: f32,
    pub candidate_floor: usize,
    pub candidate_cap: usize,
    pub summary_size: usize,
}

impl From<&RetrievalConfig> for RetrievalPolicy {
    fn from(config: &RetrievalConfig) -> Self {
        Self {
            high_confidence: config.high_confidence,
            relaxed_threshold: config.relaxed_threshold,
            requested_threshold: config.requested_threshold,
            search_threshold: config.search_threshold,
            candidate_floor: config.candidate_floor,
            candidate_cap: config.candidate_cap,
            summary_size: config.summary_size,
        }
    }
}

impl Default for RetrievalPolicy {
    fn default() -> Self {
        Self::from(&RetrievalConfig::default())
    }
}

/// Builds the retrieved context for a question.
#[derive(Clone)]
pub struct ContextAssembler {
    store: Arc<dyn ChunkStore>,
    policy: RetrievalPolicy,
}

impl ContextAssembler {
    pub fn new(store: Arc<dyn ChunkStore>, policy: RetrievalPolicy) -> Self {
        Self { store, policy }
    }

    pub fn store(&self) -> &Arc<dyn ChunkStore> {
        &self.store
    }

    pub fn policy(&self) -> &RetrievalPolicy {
        &self.policy
    }

    /// Assemble the context for `question` with `k` primary hits.
    pub async fn assemble(&self, provider: &dyn Provider, question: &str, k: usize) -> Result<AssembledContext> {
        let k = k.max(1);
        let search_query = refine_search_query(question);

        let started = Instant::now();
        let query_vec = provider.embed_one(&search_query).await?;
        let embed_ms = started.elapsed().as_millis() as u64;

        let total_chunks = self.store.count_all().await?;
        let trace = |chunks: Vec<DebugChunk>, search_ms: u64, used_k: usize, decision: DecisionTag| RetrievalTrace {
            chunks,
            embed_ms,
            search_ms,
            total_chunks,
            used_k,
            decision,
            search_query: search_query.clone(),
        };

        if !search_query.is_empty() && self.store.article_count(&search_query).await? > 0 {
            let hits = self.store.article_chunks(&search_query).await?;
            info!(article = %search_query, chunks = hits.len(), decision = "article_specific", "Using whole article");
            let context = join_contents(hits.iter().map(|h| h.content.as_str()));
            let chunks: Vec<DebugChunk> = hits.iter().map(DebugChunk::primary).collect();
            return Ok(AssembledContext {
                context,
                trace: trace(chunks, 0, k, DecisionTag::ArticleSpecific),
            });
        }

        let started = Instant::now();
        let limit = candidate_limit(k, self.policy.candidate_floor, self.policy.candidate_cap);
        let hits = self.store.similarity_search(&query_vec, limit).await?;
        let search_ms = started.elapsed().as_millis() as u64;
        debug!(candidates = hits.len(), limit, search_ms, "Similarity probe done");

        if hits.iter().any(|h| h.score > self.policy.high_confidence) {
            let selected = select_above(&hits, self.policy.high_confidence, false, k);
            let (context, chunks) = self.stitch(&selected).await?;
            info!(primaries = selected.len(), decision = "high_confidence", "Context assembled");
            return Ok(AssembledContext {
                context,
                trace: trace(chunks, search_ms, k, DecisionTag::HighConfidence),
            });
        }

        let summary = summarize_candidates(&hits, self.policy.summary_size);
        let decision = match analyze_question(provider, question, &summary, k, self.policy.requested_threshold).await
        {
            Ok(decision) => decision,
            Err(e) => {
                warn!(error = %e, "Retrieval arbitration failed, using relaxed fallback");
                let selected = select_above(&hits, self.policy.relaxed_threshold, true, k);
                let (context, chunks) = self.stitch(&selected).await?;
                return Ok(AssembledContext {
                    context,
                    trace: trace(chunks, search_ms, k, DecisionTag::RelaxedFallback),
                });
            }
        };

        if decision.action == RetrievalAction::AnswerDirect {
            info!(decision = "answer_direct", "Answering without retrieved context");
            return Ok(AssembledContext {
                context: String::new(),
                trace: trace(Vec::new(), search_ms, 0, DecisionTag::AnswerDirect),
            });
        }

        // The original query vector is reused; a suggested query is only recorded.
        let wanted_k = decision.k.max(1);
        let mut selected = select_above(&hits, decision.threshold, true, wanted_k);
        if selected.is_empty() {
            selected = hits.iter().take(wanted_k).cloned().collect();
        }
        let (context, chunks) = self.stitch(&selected).await?;
        info!(
            primaries = selected.len(),
            k = wanted_k,
            threshold = decision.threshold,
            decision = "lm_requested_retrieval",
            "Context assembled"
        );

        let mut trace = trace(chunks, search_ms, wanted_k, DecisionTag::LmRequestedRetrieval);
        if !decision.query.is_empty() {
            trace.search_query = decision.query;
        }
        Ok(AssembledContext { context, trace })
    }

    /// Primary hits scoring strictly above the search threshold, up to `k`,
    /// each with its neighbours. Used by the plain search endpoint.
    pub async fn search(&self, provider: &dyn Provider, query: &str, k: usize) -> Result<Vec<DebugChunk>> {
        let k = k.max(1);
        let query_vec = provider.embed_one(query).await?;
        let limit = candidate_limit(k, self.policy.candidate_floor, self.policy.candidate_cap);
        let hits = self.store.similarity_search(&query_vec, limit).await?;
        let selected = select_above(&hits, self.policy.search_threshold, false, k);
        let (_, chunks) = self.stitch(&selected).await?;
        Ok(chunks)
    }

    /// Interleave primaries with their neighbours: previous, hit, next.
    ///
    /// Every `(article, idx)` appears at most once across the whole result.
    async fn stitch(&self, primaries: &[ChunkHit]) -> Result<(String, Vec<DebugChunk>)> {
        let mut seen: HashSet<(String, i64)> = primaries
            .iter()
            .map(|h| (h.article.clone(), h.chunk_idx))
            .collect();
        let mut chunks = Vec::with_capacity(primaries.len() * 3);

        for hit in primaries {
            if hit.chunk_idx > 0 {
                self.push_neighbor(&mut seen, &mut chunks, &hit.article, hit.chunk_idx - 1)
                    .await?;
            }
            chunks.push(DebugChunk::primary(hit));
            self.push_neighbor(&mut seen, &mut chunks, &hit.article, hit.chunk_idx + 1)
                .await?;
        }

        let context = join_contents(chunks.iter().map(|c| c.content.as_str()));
        Ok((context, chunks))
    }

    async fn push_neighbor(
        &self,
        seen: &mut HashSet<(String, i64)>,
        chunks: &mut Vec<DebugChunk>,
        article: &str,
        idx: i64,
    ) -> Result<()> {
        if !seen.insert((article.to_string(), idx)) {
            return Ok(());
        }
        if let Some(content) = self.store.fetch_by_position(article, idx).await? {
            chunks.push(DebugChunk::neighbor(article, idx, &content));
        }
        Ok(())
    }
}

/// Hits clearing `threshold` in rank order, at most `k`.
fn select_above(hits: &[ChunkHit], threshold: f32, inclusive: bool, k: usize) -> Vec<ChunkHit> {
    hits.iter()
        .filter(|h| if inclusive { h.score >= threshold } else { h.score > threshold })
        .take(k)
        .cloned()
        .collect()
}

fn join_contents<'a>(parts: impl Iterator<Item = &'a str>) -> String {
    parts.collect::<Vec<_>>().join(CONTEXT_SEPARATOR)
}
