//! Vector similarity utilities.
//!
//! Pure-Rust implementations of:
//! - Cosine similarity
//! - Ranking stored chunks against a query vector
//! - The little-endian `f32` blob encoding used for persisted embeddings

use tinyrag_core::ChunkHit;

/// Compute cosine similarity between two vectors.
///
/// Returns a value in [-1, 1] where 1 = identical, 0 = orthogonal, -1 = opposite.
/// Returns 0.0 if the lengths differ or either vector is empty or zero.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0f64;
    let mut norm_a = 0.0f64;
    let mut norm_b = 0.0f64;

    for (x, y) in a.iter().zip(b.iter()) {
        let x = *x as f64;
        let y = *y as f64;
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom < 1e-10 {
        return 0.0;
    }

    (dot / denom) as f32
}

/// A stored chunk as seen by the ranker.
pub struct Candidate<'a> {
    pub article: &'a str,
    pub chunk_idx: i64,
    pub content: &'a str,
    pub embedding: &'a [f32],
}

/// Score every candidate against `query` and keep the best `limit`.
///
/// Ties keep their input order, so callers that feed rows in id order get
/// a deterministic ranking. Only the kept candidates are copied into hits.
pub fn rank<'a, I>(candidates: I, query: &[f32], limit: usize) -> Vec<ChunkHit>
where
    I: IntoIterator<Item = Candidate<'a>>,
{
    let mut scored: Vec<(f32, Candidate<'a>)> = candidates
        .into_iter()
        .map(|c| (cosine_similarity(c.embedding, query), c))
        .collect();

    scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));
    scored.truncate(limit);
    scored
        .into_iter()
        .map(|(score, c)| ChunkHit {
            article: c.article.to_string(),
            chunk_idx: c.chunk_idx,
            content: c.content.to_string(),
            score,
        })
        .collect()
}

/// Encode an embedding as a little-endian `f32` blob.
pub fn encode_embedding(embedding: &[f32]) -> Vec<u8> {
    embedding.iter().flat_map(|f| f.to_le_bytes()).collect()
}

/// Decode a blob written by [`encode_embedding`]. Trailing bytes are ignored.
pub fn decode_embedding(blob: &[u8]) -> Vec<f32> {
    blob.chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect()
}
