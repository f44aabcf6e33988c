//! Shared ingestion helpers for chunk stores.

use std::ops::Range;
use tinyrag_core::{MemoryError, Provider};
use tokio::sync::Mutex;

/// Monotonic chunk id allocator.
///
/// Ids are handed out in contiguous ranges and never reused within the
/// lifetime of the allocator. Persistent stores seed it from a stored
/// high-water mark so ids stay unique across restarts and deletions.
pub struct IdAllocator {
    next: Mutex<i64>,
}

impl IdAllocator {
    pub fn starting_at(next: i64) -> Self {
        Self {
            next: Mutex::new(next.max(1)),
        }
    }

    /// Reserve `count` consecutive ids.
    pub async fn allocate(&self, count: usize) -> Range<i64> {
        let mut next = self.next.lock().await;
        let start = *next;
        *next += count as i64;
        start..*next
    }

    /// The id the next allocation will start at.
    pub async fn peek(&self) -> i64 {
        *self.next.lock().await
    }
}

/// Embed one ingestion batch, labelling failures with the batch number.
pub async fn embed_batch(
    embedder: &dyn Provider,
    batch_no: usize,
    texts: &[String],
) -> Result<Vec<Vec<f32>>, MemoryError> {
    let vectors = embedder
        .embed(texts)
        .await
        .map_err(|e| MemoryError::EmbeddingFailed(format!("embed batch {batch_no}: {e}")))?;
    if vectors.len() != texts.len() {
        return Err(MemoryError::EmbeddingFailed(format!(
            "embed batch {batch_no}: expected {} vectors, got {}",
            texts.len(),
            vectors.len()
        )));
    }
    Ok(vectors)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn allocations_are_contiguous_and_disjoint() {
        let ids = IdAllocator::starting_at(7);
        assert_eq!(ids.allocate(3).await, 7..10);
        assert_eq!(ids.allocate(0).await, 10..10);
        assert_eq!(ids.allocate(2).await, 10..12);
        assert_eq!(ids.peek().await, 12);
    }

    #[tokio::test]
    async fn ids_start_at_one() {
        let ids = IdAllocator::starting_at(0);
        assert_eq!(ids.allocate(1).await, 1..2);
    }
}
