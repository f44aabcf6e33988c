//! In-memory chunk store — useful for testing and ephemeral runs.

use crate::ingest::{IdAllocator, embed_batch};
use crate::vector::{self, Candidate};
use async_trait::async_trait;
use std::collections::BTreeMap;
use tinyrag_core::error::MemoryError;
use tinyrag_core::provider::Provider;
use tinyrag_core::store::{ArticleCount, ChunkHit, ChunkStore, EMBED_BATCH_SIZE, InsertOutcome, NEIGHBOR_SCORE};
use tokio::sync::RwLock;
use tracing::{debug, info};

struct StoredChunk {
    id: i64,
    article: String,
    chunk_idx: i64,
    content: String,
    embedding: Vec<f32>,
}

/// A chunk store that keeps every row in a Vec, ordered by id.
pub struct InMemoryChunkStore {
    rows: RwLock<Vec<StoredChunk>>,
    ids: IdAllocator,
}

impl InMemoryChunkStore {
    pub fn new() -> Self {
        Self {
            rows: RwLock::new(Vec::new()),
            ids: IdAllocator::starting_at(1),
        }
    }
}

impl Default for InMemoryChunkStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ChunkStore for InMemoryChunkStore {
    fn name(&self) -> &str {
        "in_memory"
    }

    async fn insert(
        &self,
        embedder: &dyn Provider,
        article: &str,
        chunks: &[String],
    ) -> Result<InsertOutcome, MemoryError> {
        let existing = self.article_count(article).await?;
        if existing > 0 {
            info!(article, existing, "Article already ingested, skipping");
            return Ok(InsertOutcome::Skipped { existing });
        }

        let mut written = 0usize;
        for (batch_no, batch) in chunks.chunks(EMBED_BATCH_SIZE).enumerate() {
            let vectors = embed_batch(embedder, batch_no, batch).await?;
            let ids = self.ids.allocate(batch.len()).await;

            let mut rows = self.rows.write().await;
            if batch_no == 0 {
                let raced = rows.iter().filter(|r| r.article == article).count();
                if raced > 0 {
                    return Ok(InsertOutcome::Skipped { existing: raced });
                }
            }
            for ((id, content), embedding) in ids.clone().zip(batch).zip(vectors) {
                rows.push(StoredChunk {
                    id,
                    article: article.to_string(),
                    chunk_idx: written as i64,
                    content: content.clone(),
                    embedding,
                });
                written += 1;
            }
            debug!(article, batch = batch_no, ids = ?ids, "Stored chunk batch");
        }

        Ok(InsertOutcome::Inserted { chunks: written })
    }

    async fn similarity_search(&self, query: &[f32], limit: usize) -> Result<Vec<ChunkHit>, MemoryError> {
        let rows = self.rows.read().await;
        Ok(vector::rank(
            rows.iter().map(|r| Candidate {
                article: &r.article,
                chunk_idx: r.chunk_idx,
                content: &r.content,
                embedding: &r.embedding,
            }),
            query,
            limit,
        ))
    }

    async fn fetch_by_position(&self, article: &str, idx: i64) -> Result<Option<String>, MemoryError> {
        let rows = self.rows.read().await;
        Ok(rows
            .iter()
            .find(|r| r.article == article && r.chunk_idx == idx)
            .map(|r| r.content.clone()))
    }

    async fn article_chunks(&self, article: &str) -> Result<Vec<ChunkHit>, MemoryError> {
        let rows = self.rows.read().await;
        let mut hits: Vec<ChunkHit> = rows
            .iter()
            .filter(|r| r.article == article)
            .map(|r| ChunkHit {
                article: r.article.clone(),
                chunk_idx: r.chunk_idx,
                content: r.content.clone(),
                score: NEIGHBOR_SCORE,
            })
            .collect();
        hits.sort_by_key(|h| h.chunk_idx);
        Ok(hits)
    }

    async fn article_count(&self, article: &str) -> Result<usize, MemoryError> {
        Ok(self.rows.read().await.iter().filter(|r| r.article == article).count())
    }

    async fn count_all(&self) -> Result<usize, MemoryError> {
        Ok(self.rows.read().await.len())
    }

    async fn list_articles(&self) -> Result<Vec<ArticleCount>, MemoryError> {
        let rows = self.rows.read().await;
        let mut counts: BTreeMap<&str, usize> = BTreeMap::new();
        for r in rows.iter() {
            *counts.entry(r.article.as_str()).or_default() += 1;
        }
        Ok(counts
            .into_iter()
            .map(|(article, chunks)| ArticleCount { article: article.to_string(), chunks })
            .collect())
    }

    async fn delete_article(&self, article: &str) -> Result<usize, MemoryError> {
        let mut rows = self.rows.write().await;
        let before = rows.len();
        rows.retain(|r| r.article != article);
        Ok(before - rows.len())
    }
}
