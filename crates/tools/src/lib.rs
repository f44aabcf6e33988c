//! Built-in tool implementations for tinyRAG.
//!
//! Tools let a generated answer pull in material the chunk store does not
//! have yet: encyclopedia and dictionary lookups, web and StackOverflow
//! search, user-registered template APIs, arithmetic, a sub-prompt to the
//! chat model and sandboxed script execution.
//!
//! The registry is cheap to build and is rebuilt from the current settings
//! snapshot for every request, so settings changes apply immediately.

pub mod calculator;
pub mod code_exec;
pub mod duckduckgo;
pub mod llm;
pub mod mediawiki;
pub mod sandbox;
pub mod template_api;
pub mod web;

use std::sync::Arc;
use std::time::Duration;

use tinyrag_config::{Settings, ToolsConfig};
use tinyrag_core::error::ToolError;
use tinyrag_core::provider::Provider;
use tinyrag_core::tool::ToolRegistry;

pub use calculator::CalculatorTool;
pub use code_exec::{CodeExecMode, CodeExecTool};
pub use duckduckgo::{DuckDuckGoTool, SearchFlavor};
pub use llm::LlmTool;
pub use mediawiki::{WikipediaTool, WiktionaryTool};
pub use sandbox::{SandboxLimits, SandboxTool, run_sandboxed};
pub use template_api::TemplateApiTool;
pub use web::WebClient;

/// Build the tool catalog for one request.
///
/// `exec_code` is registered in check-only mode unless the settings allow
/// code execution. The `sandbox` tool is always listed; whether it may run
/// is decided by the execution gate.
pub fn build_registry(
    settings: &Settings,
    tools: &ToolsConfig,
    provider: Arc<dyn Provider>,
) -> Result<ToolRegistry, ToolError> {
    let web = WebClient::new(Duration::from_secs(tools.http_timeout_secs))?;
    let limits = SandboxLimits::from_config(tools);

    let mut registry = ToolRegistry::new();
    registry.register(Box::new(WikipediaTool::new(web.clone(), &settings.lang)));
    registry.register(Box::new(DuckDuckGoTool::new(web.clone(), SearchFlavor::DuckDuckGo)));
    registry.register(Box::new(WiktionaryTool::new(web.clone(), &settings.lang)));
    registry.register(Box::new(DuckDuckGoTool::new(web.clone(), SearchFlavor::StackOverflow)));
    registry.register(Box::new(DuckDuckGoTool::new(web.clone(), SearchFlavor::WebSearch)));
    registry.register(Box::new(SandboxTool::new(limits)));
    registry.register(Box::new(LlmTool::new(provider)));
    registry.register(Box::new(CalculatorTool));

    let mode = if settings.allow_code_exec {
        CodeExecMode::Execute
    } else {
        CodeExecMode::CheckOnly
    };
    registry.register(Box::new(CodeExecTool::new(limits, mode)));

    for api in &settings.custom_apis {
        registry.register(Box::new(TemplateApiTool::new(web.clone(), api.clone())));
    }

    tracing::debug!(tools = registry.len(), "Tool registry built");
    Ok(registry)
}
