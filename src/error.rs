//! Shared error taxonomy used across the coordination runtime.
//!
//! Every fallible node/workflow operation bottoms out in [`ErrorCode`], and
//! every node-level outcome is reported as an [`ExecutionResult`] rather than
//! a bare `Result`, so that callers can distinguish a successful empty output
//! from "no result was produced" without relying on field presence alone.
//! Consumers should rely on the `status` tag, never on which fields happen
//! to be populated.

use chrono::{DateTime, Utc};
use miette::Diagnostic;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Taxonomy of node/workflow execution failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Error, Diagnostic)]
pub enum ErrorCode {
    #[error("internal error")]
    #[diagnostic(code(coordinator::internal_error))]
    InternalError,
    #[error("validation failed")]
    #[diagnostic(code(coordinator::validation_failed))]
    ValidationFailed,
    #[error("operation timed out")]
    #[diagnostic(code(coordinator::timeout))]
    Timeout,
    #[error("rate limit exceeded")]
    #[diagnostic(code(coordinator::rate_limit))]
    RateLimit,
    #[error("upstream service error")]
    #[diagnostic(code(coordinator::upstream_error))]
    UpstreamError,
    #[error("operation cancelled")]
    #[diagnostic(code(coordinator::cancelled))]
    Cancelled,
    #[error("node not found")]
    #[diagnostic(code(coordinator::node_not_found))]
    NodeNotFound,
    #[error("cycle detected in workflow graph")]
    #[diagnostic(code(coordinator::cycle_detected))]
    CycleDetected,
}

/// Metadata every [`ExecutionResult`] variant carries.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExecutionMetadata {
    pub execution_time_ms: u64,
    pub retry_count: u32,
    pub node_id: String,
    #[serde(default)]
    pub extra: FxHashMap<String, Value>,
}

impl ExecutionMetadata {
    pub fn new(node_id: impl Into<String>) -> Self {
        Self {
            node_id: node_id.into(),
            ..Default::default()
        }
    }

    pub fn with_execution_time_ms(mut self, ms: u64) -> Self {
        self.execution_time_ms = ms;
        self
    }

    pub fn with_retry_count(mut self, count: u32) -> Self {
        self.retry_count = count;
        self
    }
}

/// Discriminated result of a single node execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ExecutionResult {
    Ok {
        output: Value,
        metadata: ExecutionMetadata,
    },
    Failure {
        error_code: ErrorCode,
        error_message: String,
        metadata: ExecutionMetadata,
    },
}

impl ExecutionResult {
    pub fn ok(output: Value, metadata: ExecutionMetadata) -> Self {
        ExecutionResult::Ok { output, metadata }
    }

    pub fn failure(
        error_code: ErrorCode,
        error_message: impl Into<String>,
        metadata: ExecutionMetadata,
    ) -> Self {
        ExecutionResult::Failure {
            error_code,
            error_message: error_message.into(),
            metadata,
        }
    }

    pub fn is_ok(&self) -> bool {
        matches!(self, ExecutionResult::Ok { .. })
    }

    pub fn metadata(&self) -> &ExecutionMetadata {
        match self {
            ExecutionResult::Ok { metadata, .. } => metadata,
            ExecutionResult::Failure { metadata, .. } => metadata,
        }
    }

    pub fn error_code(&self) -> Option<ErrorCode> {
        match self {
            ExecutionResult::Failure { error_code, .. } => Some(*error_code),
            ExecutionResult::Ok { .. } => None,
        }
    }
}

/// A single entry in an [`crate::workflow::monitor::ExecutionContext`]'s error log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorEntry {
    pub node_id: String,
    pub error_type: ErrorCode,
    pub error_message: String,
    pub attempt: u32,
    pub action_taken: String,
    pub timestamp: DateTime<Utc>,
}

/// Top-level crate error for fallible infrastructure operations (config
/// loading, YAML parsing, etc.) that are not node executions.
#[derive(Debug, Error, Diagnostic)]
pub enum CoordinatorError {
    #[error("duplicate id: {0}")]
    #[diagnostic(code(coordinator::duplicate_id))]
    DuplicateId(String),

    #[error("not found: {0}")]
    #[diagnostic(code(coordinator::not_found))]
    NotFound(String),

    #[error("unresolved reference: {0}")]
    #[diagnostic(code(coordinator::unresolved_reference))]
    UnresolvedReference(String),

    #[error("cycle detected: {0:?}")]
    #[diagnostic(code(coordinator::cycle_detected))]
    CycleDetected(Vec<String>),

    #[error("invalid node definition: {0}")]
    #[diagnostic(code(coordinator::invalid_definition))]
    InvalidDefinition(String),

    #[error("yaml parse error: {0}")]
    #[diagnostic(code(coordinator::yaml))]
    Yaml(#[from] serde_yaml::Error),

    #[error("json error: {0}")]
    #[diagnostic(code(coordinator::json))]
    Json(#[from] serde_json::Error),

    #[error("io error: {0}")]
    #[diagnostic(code(coordinator::io))]
    Io(#[from] std::io::Error),
}
