//! Completion backend implementations for tinyRAG.
//!
//! All backends implement the `tinyrag_core::Provider` trait. The active
//! one sits behind a [`ProviderHandle`] so the settings API can replace it
//! while requests are in flight.

pub mod discovery;
pub mod handle;
pub mod openai_compat;

pub use discovery::{EndpointProbe, discover, probe, provider_hint, recommend_models};
pub use handle::{ProviderHandle, build_from_settings};
pub use openai_compat::{OpenAiCompatProvider, SseDecoder, SseEvent, ThinkFilter};
