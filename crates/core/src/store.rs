//! ChunkStore trait — persisted chunks with embedding vectors.
//!
//! A chunk is a bounded slice of an article plus its embedding. The store
//! owns ID allocation and ranks chunks by cosine similarity against a query
//! vector. Articles are the unit of ingestion and deletion.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::MemoryError;
use crate::provider::Provider;

/// Number of chunks embedded per backend request during ingestion.
pub const EMBED_BATCH_SIZE: usize = 16;

/// Score reserved for chunks included by position rather than similarity.
pub const NEIGHBOR_SCORE: f32 = -1.0;

/// A ranked chunk returned by a query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkHit {
    pub article: String,
    pub chunk_idx: i64,
    pub content: String,
    /// Cosine similarity in `[-1, 1]`, or [`NEIGHBOR_SCORE`]
    pub score: f32,
}

impl ChunkHit {
    /// Identity of the chunk within the store.
    pub fn key(&self) -> (&str, i64) {
        (self.article.as_str(), self.chunk_idx)
    }
}

/// Per-article chunk count.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArticleCount {
    pub article: String,
    pub chunks: usize,
}

/// Result of an ingestion attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    /// The article already had chunks; nothing was written.
    Skipped { existing: usize },
    /// All chunks were embedded and stored.
    Inserted { chunks: usize },
}

/// Candidate limit for a similarity probe that wants `k` primary hits.
///
/// At least `floor`, at most `cap`, otherwise `3 * k`.
pub fn candidate_limit(k: usize, floor: usize, cap: usize) -> usize {
    k.saturating_mul(3).max(floor).min(cap)
}

/// The core ChunkStore trait.
///
/// Implementations: SQLite (persistent), in-memory (tests, ephemeral runs).
#[async_trait]
pub trait ChunkStore: Send + Sync {
    /// The backend name (e.g., "sqlite", "in_memory").
    fn name(&self) -> &str;

    /// Embed and persist the chunks of an article.
    ///
    /// Skips the article entirely if it already has at least one chunk.
    /// Embedding happens without holding the store lock.
    async fn insert(
        &self,
        embedder: &dyn Provider,
        article: &str,
        chunks: &[String],
    ) -> std::result::Result<InsertOutcome, MemoryError>;

    /// Chunks ranked by cosine similarity to `query`, best first.
    async fn similarity_search(
        &self,
        query: &[f32],
        limit: usize,
    ) -> std::result::Result<Vec<ChunkHit>, MemoryError>;

    /// Content of the chunk at `(article, idx)`, if present.
    async fn fetch_by_position(
        &self,
        article: &str,
        idx: i64,
    ) -> std::result::Result<Option<String>, MemoryError>;

    /// All chunks of an article ordered by position, scored as neighbors.
    async fn article_chunks(&self, article: &str) -> std::result::Result<Vec<ChunkHit>, MemoryError>;

    /// Number of chunks stored for one article.
    async fn article_count(&self, article: &str) -> std::result::Result<usize, MemoryError>;

    /// Total number of chunks.
    async fn count_all(&self) -> std::result::Result<usize, MemoryError>;

    /// Every article with its chunk count, ordered by name.
    async fn list_articles(&self) -> std::result::Result<Vec<ArticleCount>, MemoryError>;

    /// Delete all chunks of an article and return how many were removed.
    async fn delete_article(&self, article: &str) -> std::result::Result<usize, MemoryError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn candidate_limit_is_bounded() {
        assert_eq!(candidate_limit(5, 100, 1000), 100);
        assert_eq!(candidate_limit(50, 100, 1000), 150);
        assert_eq!(candidate_limit(5000, 100, 1000), 1000);
        assert_eq!(candidate_limit(usize::MAX, 100, 1000), 1000);
    }

    #[test]
    fn hit_key_identifies_position() {
        let hit = ChunkHit {
            article: "Mars".into(),
            chunk_idx: 2,
            content: "red".into(),
            score: 0.5,
        };
        assert_eq!(hit.key(), ("Mars", 2));
    }

    #[test]
    fn article_count_serialization() {
        let json = serde_json::to_value(ArticleCount { article: "Mars".into(), chunks: 3 }).unwrap();
        assert_eq!(json, serde_json::json!({"article": "Mars", "chunks": 3}));
    }
}
