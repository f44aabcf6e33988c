//! Context for one question.
//!
//! | Part | Source | Trim strategy |
//! |------|--------|---------------|
//! | Persona | Settings | Never trimmed |
//! | Tool catalog | Tool registry | Never trimmed |
//! | Retrieved chunks | Chunk store | Cut to a fixed length over the ceiling |
//! | Conversation history | Chat store | Last N turns |

pub mod assembler;
pub mod prompt;

pub use assembler::{ContextAssembler, RetrievalPolicy};
pub use prompt::{PromptParts, SystemPrompt, TRUNCATION_MARKER, build_system_prompt};
