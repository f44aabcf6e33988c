//! `exec_code`: run a script in the sandbox, or only check that it parses.

use async_trait::async_trait;
use tinyrag_core::error::ToolError;
use tinyrag_core::tool::{Tool, ToolKind, ToolOutput};

use crate::sandbox::{self, SandboxLimits};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CodeExecMode {
    Execute,
    CheckOnly,
}

pub struct CodeExecTool {
    limits: SandboxLimits,
    mode: CodeExecMode,
}

impl CodeExecTool {
    pub fn new(limits: SandboxLimits, mode: CodeExecMode) -> Self {
        Self { limits, mode }
    }

    pub fn mode(&self) -> CodeExecMode {
        self.mode
    }
}

#[async_trait]
impl Tool for CodeExecTool {
    fn name(&self) -> &str {
        "exec_code"
    }

    fn description(&self) -> String {
        "Prüft Code statisch (Syntax) oder führt ihn, falls in den Einstellungen erlaubt, in der Sandbox aus.".into()
    }

    fn param_hint(&self) -> String {
        "Quellcode im Sandbox-Skriptformat".into()
    }

    fn kind(&self) -> ToolKind {
        ToolKind::CodeExec
    }

    fn source_name(&self, query: &str) -> String {
        let prefix = match self.mode {
            CodeExecMode::Execute => "code:exec",
            CodeExecMode::CheckOnly => "code:check",
        };
        format!("{prefix}:{}", query.trim())
    }

    async fn execute(&self, query: &str) -> Result<ToolOutput, ToolError> {
        let text = match self.mode {
            CodeExecMode::Execute => sandbox::run_sandboxed(self.name(), query, self.limits).await?,
            CodeExecMode::CheckOnly => match sandbox::check(query) {
                Ok(()) => "Statische Prüfung: ok (Code wurde nicht ausgeführt)".to_string(),
                Err(e) => format!("Statische Prüfung fehlgeschlagen: {e}"),
            },
        };
        Ok(ToolOutput {
            source: self.source_name(query),
            text,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn check_only_never_runs() {
        let tool = CodeExecTool::new(SandboxLimits::default(), CodeExecMode::CheckOnly);
        let out = tool.execute("while true { print(1) }").await.unwrap();
        assert_eq!(out.source, "code:check:while true { print(1) }");
        assert!(out.text.contains("ok"));

        let bad = tool.execute("print(").await.unwrap();
        assert!(bad.text.contains("fehlgeschlagen"));
        assert!(bad.text.contains("line 1"));
    }

    #[tokio::test]
    async fn execute_mode_runs_in_sandbox() {
        let tool = CodeExecTool::new(SandboxLimits::default(), CodeExecMode::Execute);
        let out = tool.execute("print(6 * 7)").await.unwrap();
        assert_eq!(out.source, "code:exec:print(6 * 7)");
        assert_eq!(out.text, "42\n");
    }
}
