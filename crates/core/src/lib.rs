//! # tinyRAG Core
//!
//! Domain types, traits, and error definitions for the tinyRAG retrieval
//! engine. This crate has **no framework dependencies**: it defines the
//! model that the store, backend client, tools and session pipeline
//! implement against.
//!
//! ## Design Philosophy
//!
//! Every external collaborator is a trait here. Implementations live in
//! their respective crates. This enables:
//! - Swapping the chunk store or completion backend via configuration
//! - Easy testing with scripted providers and in-memory stores
//! - Clean dependency graph (all crates depend inward on core)

pub mod error;
pub mod message;
pub mod provider;
pub mod retrieval;
pub mod store;
pub mod tool;

// Re-export key types at crate root for ergonomics
pub use error::{Error, MemoryError, ProviderError, Result, ToolError};
pub use message::{ChatMessage, Conversation, Role, StoredMessage};
pub use provider::{ChatRequest, ModelInfo, Provider, TokenStream};
pub use retrieval::{
    AssembledContext, CONTEXT_SEPARATOR, DebugChunk, DecisionTag, RetrievalAction,
    RetrievalDecision, RetrievalTrace,
};
pub use store::{ArticleCount, ChunkHit, ChunkStore, InsertOutcome, NEIGHBOR_SCORE};
pub use tool::{Tool, ToolDescriptor, ToolKind, ToolOutput, ToolRegistry, ToolRequest};
