//! Chunk storage and conversation history for tinyRAG.

pub mod chats;
pub mod chunker;
pub mod in_memory;
pub mod ingest;
pub mod vector;

#[cfg(feature = "sqlite")]
pub mod sqlite;

#[cfg(test)]
mod test_support;

pub use chats::ChatStore;
pub use chunker::chunk_text;
pub use in_memory::InMemoryChunkStore;
pub use vector::cosine_similarity;

#[cfg(feature = "sqlite")]
pub use sqlite::SqliteChunkStore;
