//! SQLite chunk store.
//!
//! Uses a single SQLite database file with two tables:
//! - `chunks` — one row per article chunk with its embedding blob
//! - `meta` — small key/value table holding the chunk id high-water mark
//!
//! Similarity is computed in Rust over a full scan; the table is indexed by
//! article for ingestion checks, neighbor lookups and deletion.

use crate::ingest::{IdAllocator, embed_batch};
use crate::vector::{self, Candidate};
use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::{Row, SqlitePool};
use std::str::FromStr;
use tinyrag_core::error::MemoryError;
use tinyrag_core::provider::Provider;
use tinyrag_core::store::{ArticleCount, ChunkHit, ChunkStore, EMBED_BATCH_SIZE, InsertOutcome, NEIGHBOR_SCORE};
use tokio::sync::Mutex;
use tracing::{debug, info};

const NEXT_ID_KEY: &str = "next_chunk_id";

/// A persistent chunk store backed by one SQLite file.
pub struct SqliteChunkStore {
    pool: SqlitePool,
    /// Serializes every statement; never held across an embedding call.
    db: Mutex<()>,
    ids: IdAllocator,
}

impl SqliteChunkStore {
    /// Open (or create) the store at `path`.
    ///
    /// Pass `":memory:"` for an ephemeral database; it is confined to a single
    /// connection so every statement sees the same data.
    pub async fn new(path: &str) -> Result<Self, MemoryError> {
        let in_memory = path.contains(":memory:");
        let options = SqliteConnectOptions::from_str(path)
            .map_err(|e| MemoryError::Storage(format!("Invalid SQLite path: {e}")))?
            .create_if_missing(true)
            .journal_mode(if in_memory { SqliteJournalMode::Memory } else { SqliteJournalMode::Wal })
            .synchronous(SqliteSynchronous::Normal);

        let pool = SqlitePoolOptions::new()
            .max_connections(if in_memory { 1 } else { 4 })
            .connect_with(options)
            .await
            .map_err(|e| MemoryError::Storage(format!("Failed to open SQLite: {e}")))?;

        let store = Self::from_pool(pool).await?;
        info!("SQLite chunk store initialized at {path}");
        Ok(store)
    }

    /// Create from an existing pool.
    pub async fn from_pool(pool: SqlitePool) -> Result<Self, MemoryError> {
        run_migrations(&pool).await?;
        let next = load_next_id(&pool).await?;
        debug!(next_id = next, "Chunk id allocator seeded");
        Ok(Self {
            pool,
            db: Mutex::new(()),
            ids: IdAllocator::starting_at(next),
        })
    }

    async fn count_for(&self, article: &str) -> Result<usize, MemoryError> {
        let row = sqlx::query("SELECT COUNT(*) AS cnt FROM chunks WHERE article = ?1")
            .bind(article)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| MemoryError::QueryFailed(format!("article count: {e}")))?;
        let cnt: i64 = row
            .try_get("cnt")
            .map_err(|e| MemoryError::QueryFailed(format!("cnt column: {e}")))?;
        Ok(cnt as usize)
    }

    /// Write one embedded batch and advance the persisted id mark atomically.
    async fn write_batch(
        &self,
        article: &str,
        first_idx: usize,
        first_id: i64,
        texts: &[String],
        vectors: &[Vec<f32>],
    ) -> Result<(), MemoryError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| MemoryError::Storage(format!("BEGIN failed: {e}")))?;

        for (offset, (content, embedding)) in texts.iter().zip(vectors).enumerate() {
            sqlx::query(
                r#"
                INSERT INTO chunks (id, article, chunk_idx, content, embedding)
                VALUES (?1, ?2, ?3, ?4, ?5)
                "#,
            )
            .bind(first_id + offset as i64)
            .bind(article)
            .bind((first_idx + offset) as i64)
            .bind(content)
            .bind(vector::encode_embedding(embedding))
            .execute(&mut *tx)
            .await
            .map_err(|e| MemoryError::Storage(format!("INSERT failed: {e}")))?;
        }

        sqlx::query(
            r#"
            INSERT INTO meta (key, value) VALUES (?1, ?2)
            ON CONFLICT(key) DO UPDATE SET value = MAX(value, excluded.value)
            "#,
        )
        .bind(NEXT_ID_KEY)
        .bind(first_id + texts.len() as i64)
        .execute(&mut *tx)
        .await
        .map_err(|e| MemoryError::Storage(format!("id mark update: {e}")))?;

        tx.commit()
            .await
            .map_err(|e| MemoryError::Storage(format!("COMMIT failed: {e}")))
    }
}

async fn run_migrations(pool: &SqlitePool) -> Result<(), MemoryError> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS chunks (
            id         INTEGER PRIMARY KEY,
            article    TEXT NOT NULL,
            chunk_idx  INTEGER NOT NULL,
            content    TEXT NOT NULL,
            embedding  BLOB NOT NULL,
            UNIQUE(article, chunk_idx)
        )
        "#,
    )
    .execute(pool)
    .await
    .map_err(|e| MemoryError::MigrationFailed(format!("chunks table: {e}")))?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_chunks_article ON chunks(article)")
        .execute(pool)
        .await
        .map_err(|e| MemoryError::MigrationFailed(format!("article index: {e}")))?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS meta (
            key    TEXT PRIMARY KEY,
            value  INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await
    .map_err(|e| MemoryError::MigrationFailed(format!("meta table: {e}")))?;

    debug!("SQLite migrations complete");
    Ok(())
}

/// The first id that is safe to hand out: past both the stored mark and
/// every existing row.
async fn load_next_id(pool: &SqlitePool) -> Result<i64, MemoryError> {
    let row = sqlx::query(
        r#"
        SELECT
            COALESCE((SELECT value FROM meta WHERE key = ?1), 1) AS mark,
            COALESCE((SELECT MAX(id) FROM chunks), 0) AS max_id
        "#,
    )
    .bind(NEXT_ID_KEY)
    .fetch_one(pool)
    .await
    .map_err(|e| MemoryError::QueryFailed(format!("id mark: {e}")))?;

    let mark: i64 = row
        .try_get("mark")
        .map_err(|e| MemoryError::QueryFailed(format!("mark column: {e}")))?;
    let max_id: i64 = row
        .try_get("max_id")
        .map_err(|e| MemoryError::QueryFailed(format!("max_id column: {e}")))?;
    Ok(mark.max(max_id + 1))
}

fn row_to_hit(row: &sqlx::sqlite::SqliteRow, score: f32) -> Result<ChunkHit, MemoryError> {
    Ok(ChunkHit {
        article: row
            .try_get("article")
            .map_err(|e| MemoryError::QueryFailed(format!("article column: {e}")))?,
        chunk_idx: row
            .try_get("chunk_idx")
            .map_err(|e| MemoryError::QueryFailed(format!("chunk_idx column: {e}")))?,
        content: row
            .try_get("content")
            .map_err(|e| MemoryError::QueryFailed(format!("content column: {e}")))?,
        score,
    })
}

#[async_trait]
impl ChunkStore for SqliteChunkStore {
    fn name(&self) -> &str {
        "sqlite"
    }

    async fn insert(
        &self,
        embedder: &dyn Provider,
        article: &str,
        chunks: &[String],
    ) -> Result<InsertOutcome, MemoryError> {
        let existing = {
            let _guard = self.db.lock().await;
            self.count_for(article).await?
        };
        if existing > 0 {
            info!(article, existing, "Article already ingested, skipping");
            return Ok(InsertOutcome::Skipped { existing });
        }

        let mut written = 0usize;
        for (batch_no, batch) in chunks.chunks(EMBED_BATCH_SIZE).enumerate() {
            let vectors = embed_batch(embedder, batch_no, batch).await?;
            let ids = self.ids.allocate(batch.len()).await;

            let _guard = self.db.lock().await;
            if batch_no == 0 {
                let raced = self.count_for(article).await?;
                if raced > 0 {
                    info!(article, existing = raced, "Article ingested concurrently, skipping");
                    return Ok(InsertOutcome::Skipped { existing: raced });
                }
            }
            self.write_batch(article, written, ids.start, batch, &vectors).await?;
            written += batch.len();
            debug!(article, batch = batch_no, ids = ?ids, "Stored chunk batch");
        }

        info!(article, chunks = written, "Article ingested");
        Ok(InsertOutcome::Inserted { chunks: written })
    }

    async fn similarity_search(&self, query: &[f32], limit: usize) -> Result<Vec<ChunkHit>, MemoryError> {
        let rows = {
            let _guard = self.db.lock().await;
            sqlx::query("SELECT article, chunk_idx, content, embedding FROM chunks ORDER BY id")
                .fetch_all(&self.pool)
                .await
                .map_err(|e| MemoryError::QueryFailed(format!("Vector scan: {e}")))?
        };

        let mut decoded = Vec::with_capacity(rows.len());
        for row in &rows {
            let article: &str = row
                .try_get("article")
                .map_err(|e| MemoryError::QueryFailed(format!("article column: {e}")))?;
            let chunk_idx: i64 = row
                .try_get("chunk_idx")
                .map_err(|e| MemoryError::QueryFailed(format!("chunk_idx column: {e}")))?;
            let content: &str = row
                .try_get("content")
                .map_err(|e| MemoryError::QueryFailed(format!("content column: {e}")))?;
            let blob: &[u8] = row
                .try_get("embedding")
                .map_err(|e| MemoryError::QueryFailed(format!("embedding column: {e}")))?;
            decoded.push((article, chunk_idx, content, vector::decode_embedding(blob)));
        }

        Ok(vector::rank(
            decoded.iter().map(|(article, chunk_idx, content, embedding)| Candidate {
                article,
                chunk_idx: *chunk_idx,
                content,
                embedding,
            }),
            query,
            limit,
        ))
    }

    async fn fetch_by_position(&self, article: &str, idx: i64) -> Result<Option<String>, MemoryError> {
        let _guard = self.db.lock().await;
        let row = sqlx::query("SELECT content FROM chunks WHERE article = ?1 AND chunk_idx = ?2")
            .bind(article)
            .bind(idx)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| MemoryError::QueryFailed(format!("GET by position: {e}")))?;

        match row {
            Some(r) => Ok(Some(
                r.try_get("content")
                    .map_err(|e| MemoryError::QueryFailed(format!("content column: {e}")))?,
            )),
            None => Ok(None),
        }
    }

    async fn article_chunks(&self, article: &str) -> Result<Vec<ChunkHit>, MemoryError> {
        let _guard = self.db.lock().await;
        let rows = sqlx::query("SELECT article, chunk_idx, content FROM chunks WHERE article = ?1 ORDER BY chunk_idx")
            .bind(article)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| MemoryError::QueryFailed(format!("article chunks: {e}")))?;

        rows.iter().map(|r| row_to_hit(r, NEIGHBOR_SCORE)).collect()
    }

    async fn article_count(&self, article: &str) -> Result<usize, MemoryError> {
        let _guard = self.db.lock().await;
        self.count_for(article).await
    }

    async fn count_all(&self) -> Result<usize, MemoryError> {
        let _guard = self.db.lock().await;
        let row = sqlx::query("SELECT COUNT(*) AS cnt FROM chunks")
            .fetch_one(&self.pool)
            .await
            .map_err(|e| MemoryError::QueryFailed(format!("COUNT: {e}")))?;

        let cnt: i64 = row
            .try_get("cnt")
            .map_err(|e| MemoryError::QueryFailed(format!("cnt column: {e}")))?;
        Ok(cnt as usize)
    }

    async fn list_articles(&self) -> Result<Vec<ArticleCount>, MemoryError> {
        let _guard = self.db.lock().await;
        let rows = sqlx::query("SELECT article, COUNT(*) AS cnt FROM chunks GROUP BY article ORDER BY article")
            .fetch_all(&self.pool)
            .await
            .map_err(|e| MemoryError::QueryFailed(format!("list articles: {e}")))?;

        rows.iter()
            .map(|r| {
                let article: String = r
                    .try_get("article")
                    .map_err(|e| MemoryError::QueryFailed(format!("article column: {e}")))?;
                let cnt: i64 = r
                    .try_get("cnt")
                    .map_err(|e| MemoryError::QueryFailed(format!("cnt column: {e}")))?;
                Ok(ArticleCount { article, chunks: cnt as usize })
            })
            .collect()
    }

    async fn delete_article(&self, article: &str) -> Result<usize, MemoryError> {
        let _guard = self.db.lock().await;
        let result = sqlx::query("DELETE FROM chunks WHERE article = ?1")
            .bind(article)
            .execute(&self.pool)
            .await
            .map_err(|e| MemoryError::Storage(format!("DELETE failed: {e}")))?;

        let removed = result.rows_affected() as usize;
        info!(article, removed, "Article deleted");
        Ok(removed)
    }
}
