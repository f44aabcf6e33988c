//! Execution policy for tool requests.
//!
//! Lookups, template APIs, arithmetic and the LLM sub-prompt always run.
//! The script sandbox needs `allow_sandbox`; `exec_code` without
//! `allow_code_exec` is downgraded to a parse-only check.

use tinyrag_config::Settings;
use tinyrag_core::error::ToolError;
use tinyrag_core::tool::{Tool, ToolKind, ToolOutput, ToolRegistry, ToolRequest};
use tinyrag_tools::{CodeExecMode, CodeExecTool, SandboxLimits};
use tracing::{info, warn};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    Execute,
    StaticCheck,
    Denied(String),
}

#[derive(Debug, Clone, Copy)]
pub struct ExecutionGate {
    allow_sandbox: bool,
    allow_code_exec: bool,
    limits: SandboxLimits,
}

impl ExecutionGate {
    pub fn new(allow_sandbox: bool, allow_code_exec: bool, limits: SandboxLimits) -> Self {
        Self {
            allow_sandbox,
            allow_code_exec,
            limits,
        }
    }

    pub fn from_settings(settings: &Settings, limits: SandboxLimits) -> Self {
        Self::new(settings.allow_sandbox, settings.allow_code_exec, limits)
    }

    pub fn verdict(&self, kind: ToolKind) -> Verdict {
        match kind {
            ToolKind::Sandbox if !self.allow_sandbox => {
                Verdict::Denied("sandbox execution is disabled in settings".into())
            }
            ToolKind::CodeExec if !self.allow_code_exec => Verdict::StaticCheck,
            _ => Verdict::Execute,
        }
    }

    /// Look up, police and run `request`.
    ///
    /// Denials come back as [`ToolError::PermissionDenied`] so callers can
    /// tell them apart from runtime failures.
    pub async fn run(&self, registry: &ToolRegistry, request: &ToolRequest) -> Result<ToolOutput, ToolError> {
        let tool = registry
            .get(&request.tool)
            .ok_or_else(|| ToolError::NotFound(request.tool.clone()))?;

        match self.verdict(tool.kind()) {
            Verdict::Execute => {
                info!(tool = %request.tool, "Executing tool");
                tool.execute(&request.query).await
            }
            Verdict::StaticCheck => {
                info!(tool = %request.tool, "Code execution disabled, running static check only");
                CodeExecTool::new(self.limits, CodeExecMode::CheckOnly)
                    .execute(&request.query)
                    .await
            }
            Verdict::Denied(reason) => {
                warn!(tool = %request.tool, %reason, "Tool request denied");
                Err(ToolError::PermissionDenied {
                    tool_name: request.tool.clone(),
                    reason,
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tinyrag_tools::{CalculatorTool, SandboxTool};

    fn registry() -> ToolRegistry {
        let mut registry = ToolRegistry::new();
        registry.register(Box::new(CalculatorTool));
        registry.register(Box::new(SandboxTool::new(SandboxLimits::default())));
        registry.register(Box::new(CodeExecTool::new(SandboxLimits::default(), CodeExecMode::Execute)));
        registry
    }

    fn request(tool: &str, query: &str) -> ToolRequest {
        ToolRequest {
            tool: tool.into(),
            query: query.into(),
        }
    }

    #[test]
    fn verdicts_follow_flags() {
        let closed = ExecutionGate::new(false, false, SandboxLimits::default());
        assert_eq!(closed.verdict(ToolKind::Arithmetic), Verdict::Execute);
        assert_eq!(closed.verdict(ToolKind::Template), Verdict::Execute);
        assert!(matches!(closed.verdict(ToolKind::Sandbox), Verdict::Denied(_)));
        assert_eq!(closed.verdict(ToolKind::CodeExec), Verdict::StaticCheck);

        let open = ExecutionGate::new(true, true, SandboxLimits::default());
        assert_eq!(open.verdict(ToolKind::Sandbox), Verdict::Execute);
        assert_eq!(open.verdict(ToolKind::CodeExec), Verdict::Execute);
    }

    #[tokio::test]
    async fn denied_sandbox_is_permission_error() {
        let gate = ExecutionGate::new(false, false, SandboxLimits::default());
        let err = gate.run(&registry(), &request("sandbox", "print(1)")).await.unwrap_err();
        assert!(err.is_denied());
    }

    #[tokio::test]
    async fn code_exec_downgrades_to_check() {
        let gate = ExecutionGate::new(false, false, SandboxLimits::default());
        let out = gate.run(&registry(), &request("exec_code", "print(1)")).await.unwrap();
        assert_eq!(out.source, "code:check:print(1)");

        let open = ExecutionGate::new(false, true, SandboxLimits::default());
        let out = open.run(&registry(), &request("exec_code", "print(1)")).await.unwrap();
        assert_eq!(out.source, "code:exec:print(1)");
        assert_eq!(out.text, "1\n");
    }

    #[tokio::test]
    async fn arithmetic_always_runs_and_unknown_tools_fail() {
        let gate = ExecutionGate::new(false, false, SandboxLimits::default());
        let out = gate.run(&registry(), &request("calculate", "2^5")).await.unwrap();
        assert_eq!(out.text, "2^5 = 32");

        let err = gate.run(&registry(), &request("teleport", "x")).await.unwrap_err();
        assert!(matches!(err, ToolError::NotFound(name) if name == "teleport"));
    }
}
