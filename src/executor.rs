//! External collaborator interfaces (spec §6): node executors, the code
//! sandbox, and the LLM planner/reflector. Concrete implementations for
//! HTTP, database, container, or real LLM backends are out of scope — the
//! engine only ever depends on these traits.

use async_trait::async_trait;
use serde_json::{Map, Value};
use std::time::Duration;

/// What a [`NodeExecutor`] returns on success.
#[derive(Debug, Clone, Default)]
pub struct NodeOutput {
    pub output: Map<String, Value>,
}

/// A node-kind-specific executor. The engine never assumes anything beyond
/// this signature; HTTP/DB/container/LLM implementations live outside this
/// crate.
#[async_trait]
pub trait NodeExecutor: Send + Sync {
    async fn execute(
        &self,
        node_id: crate::node::NodeId,
        config: &Map<String, Value>,
        inputs: &Map<String, Value>,
    ) -> Result<NodeOutput, crate::error::ErrorCode>;
}

/// `execute(code, config, input_data) -> {success, output_data, stdout,
/// stderr, timed_out}` (spec §6). Required to reject dangerous
/// imports/builtins and to enforce `timeout_seconds`.
#[derive(Debug, Clone)]
pub struct SandboxConfig {
    pub timeout: Duration,
    pub memory_limit_mb: Option<u64>,
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(5),
            memory_limit_mb: None,
        }
    }
}

/// The sandbox's verdict on one execution.
#[derive(Debug, Clone, Default)]
pub struct SandboxResult {
    pub success: bool,
    pub output_data: Map<String, Value>,
    pub stdout: String,
    pub stderr: String,
    pub timed_out: bool,
}

#[async_trait]
pub trait CodeSandbox: Send + Sync {
    async fn execute(
        &self,
        code: &str,
        config: &SandboxConfig,
        input_data: &Map<String, Value>,
    ) -> SandboxResult;
}

/// The tokens a sandbox implementation must refuse, regardless of language
/// (spec §6): module/import names and dangerous builtins.
pub const FORBIDDEN_IMPORTS: &[&str] = &["os", "subprocess", "sys", "socket"];
pub const FORBIDDEN_BUILTINS: &[&str] = &["eval", "exec", "compile", "__import__"];

/// Scans `code` for any forbidden import or builtin as a plain substring
/// match, matching the spec's security-check requirement. Real sandbox
/// implementations may layer stricter (AST-based) checks on top; this is
/// the minimum every implementation must enforce.
pub fn contains_forbidden_token(code: &str) -> Option<&'static str> {
    FORBIDDEN_IMPORTS
        .iter()
        .chain(FORBIDDEN_BUILTINS)
        .find(|&&token| code.contains(token))
        .copied()
}

/// A decision proposed by the planner (spec §6): `decide(context) ->
/// decision{action_type, payload}`.
#[derive(Debug, Clone)]
pub struct PlannerDecision {
    pub action_type: String,
    pub payload: Map<String, Value>,
}

#[async_trait]
pub trait Planner: Send + Sync {
    async fn decide(&self, context: &Map<String, Value>) -> PlannerDecision;
}

/// Post-execution assessment (spec §6): `reflect(result) -> {assessment,
/// issues[], recommendations[], confidence, should_retry,
/// suggested_modifications}`.
#[derive(Debug, Clone, Default)]
pub struct Reflection {
    pub assessment: String,
    pub issues: Vec<String>,
    pub recommendations: Vec<String>,
    pub confidence: f64,
    pub should_retry: bool,
    pub suggested_modifications: Map<String, Value>,
}

#[async_trait]
pub trait Reflector: Send + Sync {
    async fn reflect(&self, result: &crate::error::ExecutionResult) -> Reflection;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn forbidden_import_detected() {
        assert_eq!(contains_forbidden_token("import os"), Some("os"));
        assert_eq!(contains_forbidden_token("eval('1+1')"), Some("eval"));
        assert_eq!(contains_forbidden_token("x = 1 + 2"), None);
    }
}
