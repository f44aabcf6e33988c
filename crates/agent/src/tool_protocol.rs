//! Tool-request grammar for generated answers.
//!
//! An answer requests a tool by ending with a marker such as
//!
//! ```text
//! [TOOL_REQUEST]{"tool":"wikipedia","query":"Mars"}[/TOOL_REQUEST]
//! ```
//!
//! Orchestration only talks to [`ToolRequestGrammar`], so a backend with
//! native function calling can plug in a different grammar.

use regex_lite::Regex;
use std::sync::LazyLock;
use tinyrag_core::tool::ToolRequest;

/// Finds, removes and documents tool requests in free text.
pub trait ToolRequestGrammar: Send + Sync {
    /// The first well-formed request in `text`, if any.
    fn find_first(&self, text: &str) -> Option<ToolRequest>;

    /// `text` with every request marker removed and surrounding whitespace trimmed.
    fn strip_all(&self, text: &str) -> String;

    /// Instructions for the model describing the request format.
    fn describe(&self) -> String;
}

// The JSON may itself contain braces (scripts for the sandbox), so it runs
// lazily up to the closing tag.
static MARKER: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"(?s)\[TOOL_REQUEST\]\s*(\{.*?\})\s*\[/TOOL_REQUEST\]").ok());

// Any opening tag through its closing tag or the end of the text.
static ANY_MARKER: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"(?s)\[TOOL_REQUEST\].*?(?:\[/TOOL_REQUEST\]|\z)").ok());

/// The `[TOOL_REQUEST]{json}[/TOOL_REQUEST]` marker.
#[derive(Debug, Clone, Copy, Default)]
pub struct MarkerGrammar;

impl ToolRequestGrammar for MarkerGrammar {
    fn find_first(&self, text: &str) -> Option<ToolRequest> {
        let marker = MARKER.as_ref()?;
        // Only the first marker counts, even when it is malformed.
        let caps = marker.captures(text)?;
        let request: ToolRequest = serde_json::from_str(caps.get(1)?.as_str()).ok()?;
        if request.tool.trim().is_empty() {
            return None;
        }
        Some(request)
    }

    fn strip_all(&self, text: &str) -> String {
        match ANY_MARKER.as_ref() {
            Some(marker) => marker.replace_all(text, "").trim().to_string(),
            None => text.trim().to_string(),
        }
    }

    fn describe(&self) -> String {
        "[TOOL_REQUEST]{\"tool\":\"<name>\",\"query\":\"<suchbegriff>\"}[/TOOL_REQUEST]".into()
    }
}
