//! The question-answering pipeline of tinyRAG.
//!
//! A session follows a **Retrieve → Generate → Act** cycle:
//!
//! 1. **Receive** a question (HTTP API or CLI)
//! 2. **Retrieve** context adaptively (article shortcut, confident hits,
//!    or model-arbitrated retrieval) and stitch neighbouring chunks
//! 3. **Generate** a streamed answer with the tool catalog in the prompt
//! 4. **If the answer requests a tool**: police it, run it once, store its
//!    output as a new article and continue the answer
//! 5. **Record** the answer in the conversation

pub mod context;
pub mod decision;
pub mod gate;
pub mod refine;
pub mod session;
pub mod stream_event;
pub mod tool_protocol;

#[cfg(test)]
mod test_support;

pub use context::{ContextAssembler, PromptParts, RetrievalPolicy, SystemPrompt, build_system_prompt};
pub use decision::{analyze_question, parse_decision};
pub use gate::{ExecutionGate, Verdict};
pub use refine::refine_search_query;
pub use session::{Session, SessionError, SessionOutcome, SessionRequest, deep_k};
pub use stream_event::{DebugInfo, SessionEvent, SessionMeta, SessionMode, ToolResultEvent};
pub use tool_protocol::{MarkerGrammar, ToolRequestGrammar};
