//! Sandboxed script execution.
//!
//! Scripts are written in a tiny imperative language (numbers, strings,
//! booleans, `let`, `if`/`else`, `while`, `print`). There is no file,
//! network, process or environment access at all; the only observable
//! effect is the text produced by `print`.
//!
//! Every statement and expression step burns one unit of fuel. A run stops
//! when fuel runs out, when the wall-clock timeout elapses, or when output
//! grows past a fixed cap.

mod interp;
mod lexer;
mod parser;

use async_trait::async_trait;
use std::time::Duration;
use tinyrag_config::ToolsConfig;
use tinyrag_core::error::ToolError;
use tinyrag_core::tool::{Tool, ToolKind, ToolOutput};
use tracing::debug;

pub use interp::MAX_OUTPUT_BYTES;

/// Failure inside the script language itself.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ScriptError {
    #[error("line {line}: {msg}")]
    Syntax { line: usize, msg: String },

    #[error("line {line}: {msg}")]
    Runtime { line: usize, msg: String },

    #[error("fuel exhausted after {0} steps")]
    FuelExhausted(u64),

    #[error("output exceeds {0} bytes")]
    OutputLimit(usize),
}

impl ScriptError {
    pub fn syntax(line: usize, msg: impl Into<String>) -> Self {
        Self::Syntax { line, msg: msg.into() }
    }

    pub fn runtime(line: usize, msg: impl Into<String>) -> Self {
        Self::Runtime { line, msg: msg.into() }
    }
}

/// Resource limits for a single run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SandboxLimits {
    pub fuel: u64,
    pub timeout: Duration,
}

impl SandboxLimits {
    pub fn from_config(config: &ToolsConfig) -> Self {
        Self {
            fuel: config.sandbox_fuel,
            timeout: Duration::from_secs(config.sandbox_timeout_secs),
        }
    }
}

impl Default for SandboxLimits {
    fn default() -> Self {
        Self::from_config(&ToolsConfig::default())
    }
}

fn compile(source: &str) -> Result<Vec<parser::Stmt>, ScriptError> {
    let tokens = lexer::tokenize(source)?;
    parser::parse(&tokens)
}

/// Parse `source` without running it.
pub fn check(source: &str) -> Result<(), ScriptError> {
    compile(source).map(|_| ())
}

/// Parse and run `source` on the blocking pool and return its output.
///
/// The outer result of the task is the parse, the inner one the run.
pub async fn run_sandboxed(
    tool_name: &str,
    source: &str,
    limits: SandboxLimits,
) -> Result<String, ToolError> {
    let source = source.to_string();
    let fuel = limits.fuel;
    let task = tokio::task::spawn_blocking(move || {
        compile(&source).map(|program| interp::run(&program, fuel))
    });

    let joined = tokio::time::timeout(limits.timeout, task)
        .await
        .map_err(|_| ToolError::Timeout {
            tool_name: tool_name.to_string(),
            timeout_secs: limits.timeout.as_secs(),
        })?;

    let outcome = joined
        .map_err(|e| ToolError::Panicked {
            tool_name: tool_name.to_string(),
            message: e.to_string(),
        })?
        .map_err(|e| ToolError::InvalidArguments(e.to_string()))?;

    match outcome {
        Ok(output) => {
            debug!(tool = tool_name, bytes = output.len(), "Script finished");
            Ok(output)
        }
        Err(e @ (ScriptError::FuelExhausted(_) | ScriptError::OutputLimit(_))) => {
            Err(ToolError::SandboxViolation(e.to_string()))
        }
        Err(e) => Err(ToolError::failed(tool_name, e)),
    }
}

/// The `sandbox` catalog entry.
pub struct SandboxTool {
    limits: SandboxLimits,
}

impl SandboxTool {
    pub fn new(limits: SandboxLimits) -> Self {
        Self { limits }
    }
}

#[async_trait]
impl Tool for SandboxTool {
    fn name(&self) -> &str {
        "sandbox"
    }

    fn description(&self) -> String {
        "Führt ein kleines Skript in einer isolierten Umgebung aus (ohne Datei- und Netzwerkzugriff). Ausgaben mit print(...).".into()
    }

    fn param_hint(&self) -> String {
        "Skript (z.B. 'let x = 2; while x < 100 { x = x * x } print(x)')".into()
    }

    fn kind(&self) -> ToolKind {
        ToolKind::Sandbox
    }

    fn source_name(&self, query: &str) -> String {
        format!("sandbox:{}", query.trim())
    }

    async fn execute(&self, query: &str) -> Result<ToolOutput, ToolError> {
        let output = run_sandboxed(self.name(), query, self.limits).await?;
        Ok(ToolOutput {
            source: self.source_name(query),
            text: output,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn limits() -> SandboxLimits {
        SandboxLimits {
            fuel: 100_000,
            timeout: Duration::from_secs(5),
        }
    }

    #[tokio::test]
    async fn runs_script() {
        let out = run_sandboxed(
            "sandbox",
            "let total = 0\nlet i = 1\nwhile i <= 10 { total = total + i; i = i + 1 }\nprint(\"sum\", total)",
            limits(),
        )
        .await
        .unwrap();
        assert_eq!(out, "sum 55\n");
    }

    #[tokio::test]
    async fn infinite_loop_runs_out_of_fuel() {
        let err = run_sandboxed("sandbox", "while true { }", limits())
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::SandboxViolation(ref m) if m.contains("fuel")), "{err}");
    }

    #[tokio::test]
    async fn syntax_error_is_invalid_arguments() {
        let err = run_sandboxed("sandbox", "let = 1", limits()).await.unwrap_err();
        assert!(matches!(err, ToolError::InvalidArguments(ref m) if m.contains("line 1")));
    }

    #[tokio::test]
    async fn runtime_error_reports_tool() {
        let err = run_sandboxed("sandbox", "print(1)\nprint(1 / 0)", limits())
            .await
            .unwrap_err();
        let ToolError::ExecutionFailed { tool_name, reason } = err else {
            panic!("unexpected error");
        };
        assert_eq!(tool_name, "sandbox");
        assert!(reason.contains("line 2"), "{reason}");
    }

    #[tokio::test]
    async fn deep_nesting_is_a_syntax_error() {
        let source = format!("print({}1{})", "(".repeat(100_000), ")".repeat(100_000));
        let err = run_sandboxed("sandbox", &source, limits()).await.unwrap_err();
        assert!(matches!(err, ToolError::InvalidArguments(ref m) if m.contains("too deep")), "{err}");
        assert!(check(&source).is_err());
    }

    #[test]
    fn check_only_parses() {
        assert!(check("while true { }").is_ok());
        assert!(check("print(").is_err());
    }

    #[tokio::test]
    async fn tool_output_source() {
        let tool = SandboxTool::new(limits());
        let out = tool.execute("print(2 ^ 10)").await.unwrap();
        assert_eq!(out.source, "sandbox:print(2 ^ 10)");
        assert_eq!(out.text, "1024\n");
        assert_eq!(tool.kind(), ToolKind::Sandbox);
    }
}
