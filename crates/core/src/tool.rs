//! Tool trait — capabilities a generated answer can request.
//!
//! Tools take a single free-text query and return plain text. The text is
//! ingested into the chunk store under a synthetic article name chosen by
//! the tool, so later questions can retrieve it.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use crate::error::ToolError;

/// A tool invocation extracted from generated text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolRequest {
    pub tool: String,
    #[serde(default)]
    pub query: String,
}

/// The result of a successful tool execution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolOutput {
    /// Synthetic article name the output is stored under (e.g. `wiki:Mars`)
    pub source: String,

    /// Plain text produced by the tool
    pub text: String,
}

/// How a tool is treated by the execution policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolKind {
    /// Read-only network lookups (encyclopedia, search, dictionary)
    Lookup,
    /// Caller-registered URL templates
    Template,
    /// Pure arithmetic
    Arithmetic,
    /// Sub-prompt to the chat model
    Llm,
    /// Restricted script interpreter
    Sandbox,
    /// Arbitrary code execution
    CodeExec,
}

/// What the tool catalog exposes to the prompt and the API.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolDescriptor {
    pub name: String,
    pub description: String,
    pub param_hint: String,
}

/// The core Tool trait.
#[async_trait]
pub trait Tool: Send + Sync {
    /// The unique name of this tool (e.g., "wikipedia", "calculate").
    fn name(&self) -> &str;

    /// A description of what this tool does (shown to the model).
    fn description(&self) -> String;

    /// Short hint about what the query should look like.
    fn param_hint(&self) -> String;

    fn kind(&self) -> ToolKind;

    /// Synthetic article name for the output of `query`.
    fn source_name(&self, query: &str) -> String;

    /// Execute the tool with the given query.
    async fn execute(&self, query: &str) -> std::result::Result<ToolOutput, ToolError>;

    fn descriptor(&self) -> ToolDescriptor {
        ToolDescriptor {
            name: self.name().to_string(),
            description: self.description(),
            param_hint: self.param_hint(),
        }
    }
}

/// A registry of available tools, kept in registration order.
pub struct ToolRegistry {
    tools: HashMap<String, Box<dyn Tool>>,
    order: Vec<String>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self {
            tools: HashMap::new(),
            order: Vec::new(),
        }
    }

    /// Register a tool. Replaces any existing tool with the same name.
    pub fn register(&mut self, tool: Box<dyn Tool>) {
        let name = tool.name().to_string();
        if self.tools.insert(name.clone(), tool).is_none() {
            self.order.push(name);
        }
    }

    /// Get a tool by name.
    pub fn get(&self, name: &str) -> Option<&dyn Tool> {
        self.tools.get(name).map(|t| t.as_ref())
    }

    /// Descriptors in registration order.
    pub fn descriptors(&self) -> Vec<ToolDescriptor> {
        self.order
            .iter()
            .filter_map(|n| self.tools.get(n))
            .map(|t| t.descriptor())
            .collect()
    }

    /// Execute a tool request without any policy check.
    pub async fn execute(&self, request: &ToolRequest) -> std::result::Result<ToolOutput, ToolError> {
        let tool = self
            .tools
            .get(&request.tool)
            .ok_or_else(|| ToolError::NotFound(request.tool.clone()))?;
        tool.execute(&request.query).await
    }

    /// List all registered tool names.
    pub fn names(&self) -> Vec<&str> {
        self.order.iter().map(|s| s.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}
