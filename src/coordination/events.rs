//! Typed event payloads carried on the [`CoordinationBus`](super::bus::CoordinationBus).
//!
//! Each payload is a plain struct, not a variant of one giant enum: the bus
//! keys subscriptions by `TypeId`, so every event type here is its own
//! subscription nominal — code that wants only `NodeExecutionEvent`s never
//! sees a `TaskTerminationEvent` arrive on the same channel.

use crate::node::NodeId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Published once, before any node in a workflow begins execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowExecutionStartedEvent {
    pub source: String,
    pub timestamp: DateTime<Utc>,
    pub workflow_id: String,
    pub node_count: usize,
}

/// Published once, after a workflow reaches a terminal state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowExecutionCompletedEvent {
    pub source: String,
    pub timestamp: DateTime<Utc>,
    pub workflow_id: String,
    pub success: bool,
    pub summary: String,
    pub failed_node: Option<NodeId>,
}

/// Lifecycle status carried by a [`NodeExecutionEvent`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeExecutionStatus {
    Running,
    Completed,
    Failed,
}

/// Published before a node's executor runs (`Running`) and again once it
/// settles (`Completed`/`Failed`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeExecutionEvent {
    pub source: String,
    pub timestamp: DateTime<Utc>,
    pub workflow_id: String,
    pub node_id: NodeId,
    pub status: NodeExecutionStatus,
    pub output: Option<Value>,
    pub error_message: Option<String>,
}

/// Finer-grained than [`NodeExecutionEvent`]: one per state-machine
/// transition, carrying overall workflow progress in `[0, 1]`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionProgressEvent {
    pub source: String,
    pub timestamp: DateTime<Utc>,
    pub workflow_id: String,
    pub node_id: Option<NodeId>,
    pub status: String,
    pub progress: f64,
    pub message: String,
    pub metadata: Value,
}

/// Published by the reflection manager's upstream producer once a
/// post-execution reflection pass completes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowReflectionCompletedEvent {
    pub source: String,
    pub timestamp: DateTime<Utc>,
    pub workflow_id: String,
    pub assessment: String,
    pub should_retry: bool,
    pub confidence: f64,
}

/// The action a [`SupervisionFacade`](crate::supervision::facade::SupervisionFacade)
/// intervention carries out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InterventionAction {
    Warning,
    Replace,
    Terminate,
}

/// Published on every supervisory intervention, regardless of outcome.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InterventionEvent {
    pub source: String,
    pub timestamp: DateTime<Utc>,
    pub session_id: String,
    pub action: InterventionAction,
    pub content: String,
    pub trigger_rule: Option<String>,
}

/// Published whenever a [`ContextInjection`](crate::injection::ContextInjection)
/// is enqueued, mirroring the queued record's routing fields.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContextInjectionEvent {
    pub source: String,
    pub timestamp: DateTime<Utc>,
    pub session_id: String,
    pub injection_type: crate::injection::InjectionType,
    pub injection_point: crate::injection::InjectionPoint,
}

/// Published by `initiate_termination`; consumed by whatever orchestrator
/// owns the task/session lifecycle outside this crate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskTerminationEvent {
    pub source: String,
    pub timestamp: DateTime<Utc>,
    pub task_id: String,
    pub workflow_id: Option<String>,
    pub reason: String,
    pub severity: String,
    pub graceful: bool,
}
