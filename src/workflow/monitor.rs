//! Per-workflow execution context and error-handling policy (spec
//! component F), consumed by [`super::agent::WorkflowAgent`].
//!
//! This is distinct from [`crate::state_monitor`]: that module aggregates
//! *every* workflow's progress from bus events for external query, while
//! `ExecutionContext` here is the single workflow run's own bookkeeping,
//! mutated directly by the agent driving it — no mutex, same single-owner
//! rationale as [`crate::context::WorkflowContext`].

use crate::error::{ErrorCode, ErrorEntry};
use crate::node::NodeId;
use chrono::{DateTime, Utc};
use rustc_hash::{FxHashMap, FxHashSet};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Terminal/running state of a workflow run as a whole.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowStatus {
    Running,
    Completed,
    Failed,
}

/// Aggregate counters a caller can read without walking the node sets.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExecutionMetrics {
    pub nodes_executed: u64,
    pub nodes_failed: u64,
    pub nodes_skipped: u64,
    pub total_retries: u64,
}

/// The monitor's view of one running workflow (spec §3). Every `NodeId`
/// known to the workflow belongs to exactly one of `pending / running /
/// executed / failed / skipped` at any instant — enforced here by routing
/// every transition through the `mark_*` methods rather than exposing the
/// sets mutably.
#[derive(Debug, Clone)]
pub struct ExecutionContext {
    pub workflow_id: String,
    pending: FxHashSet<NodeId>,
    running: FxHashSet<NodeId>,
    executed: FxHashSet<NodeId>,
    failed: FxHashSet<NodeId>,
    skipped: FxHashSet<NodeId>,
    node_inputs: FxHashMap<NodeId, Value>,
    node_outputs: FxHashMap<NodeId, Value>,
    error_log: Vec<ErrorEntry>,
    pub metrics: ExecutionMetrics,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub status: WorkflowStatus,
}

impl ExecutionContext {
    pub fn new(workflow_id: impl Into<String>, node_ids: impl IntoIterator<Item = NodeId>) -> Self {
        Self {
            workflow_id: workflow_id.into(),
            pending: node_ids.into_iter().collect(),
            running: FxHashSet::default(),
            executed: FxHashSet::default(),
            failed: FxHashSet::default(),
            skipped: FxHashSet::default(),
            node_inputs: FxHashMap::default(),
            node_outputs: FxHashMap::default(),
            error_log: Vec::new(),
            metrics: ExecutionMetrics::default(),
            started_at: Utc::now(),
            completed_at: None,
            status: WorkflowStatus::Running,
        }
    }

    pub fn total_nodes(&self) -> usize {
        self.pending.len() + self.running.len() + self.executed.len() + self.failed.len() + self.skipped.len()
    }

    pub fn mark_node_running(&mut self, id: NodeId, input: Value) {
        self.pending.remove(&id);
        self.running.insert(id);
        self.node_inputs.insert(id, input);
    }

    pub fn mark_node_completed(&mut self, id: NodeId, output: Value) {
        self.running.remove(&id);
        self.executed.insert(id);
        self.node_outputs.insert(id, output);
        self.metrics.nodes_executed += 1;
    }

    pub fn mark_node_failed(&mut self, id: NodeId, entry: ErrorEntry) {
        self.running.remove(&id);
        self.failed.insert(id);
        self.metrics.nodes_failed += 1;
        self.error_log.push(entry);
    }

    /// A node skipped before ever running moves directly from `pending`.
    pub fn mark_node_skipped(&mut self, id: NodeId) {
        self.pending.remove(&id);
        self.skipped.insert(id);
        self.metrics.nodes_skipped += 1;
    }

    pub fn record_retry(&mut self) {
        self.metrics.total_retries += 1;
    }

    pub fn finish(&mut self, success: bool) {
        self.completed_at = Some(Utc::now());
        self.status = if success {
            WorkflowStatus::Completed
        } else {
            WorkflowStatus::Failed
        };
    }

    /// `completed / total`, the definition spec §4.6 uses for
    /// `ExecutionProgressEvent.progress`.
    pub fn progress(&self) -> f64 {
        let total = self.total_nodes();
        if total == 0 {
            return 1.0;
        }
        self.executed.len() as f64 / total as f64
    }

    pub fn is_executed(&self, id: NodeId) -> bool {
        self.executed.contains(&id)
    }

    pub fn is_skipped(&self, id: NodeId) -> bool {
        self.skipped.contains(&id)
    }

    pub fn node_output(&self, id: NodeId) -> Option<&Value> {
        self.node_outputs.get(&id)
    }

    pub fn node_outputs(&self) -> &FxHashMap<NodeId, Value> {
        &self.node_outputs
    }

    pub fn executed_nodes(&self) -> Vec<NodeId> {
        let mut ids: Vec<NodeId> = self.executed.iter().copied().collect();
        ids.sort();
        ids
    }

    pub fn failed_nodes(&self) -> Vec<NodeId> {
        let mut ids: Vec<NodeId> = self.failed.iter().copied().collect();
        ids.sort();
        ids
    }

    pub fn error_log(&self) -> &[ErrorEntry] {
        &self.error_log
    }

    /// Disjoint-union invariant check (spec testable property 1); used by
    /// tests, not on any hot path.
    #[cfg(test)]
    fn covers_exactly(&self, all: &FxHashSet<NodeId>) -> bool {
        let union: FxHashSet<NodeId> = self
            .pending
            .union(&self.running)
            .copied()
            .collect::<FxHashSet<_>>()
            .union(&self.executed)
            .copied()
            .collect::<FxHashSet<_>>()
            .union(&self.failed)
            .copied()
            .collect::<FxHashSet<_>>()
            .union(&self.skipped)
            .copied()
            .collect();
        &union == all
            && self.pending.len() + self.running.len() + self.executed.len() + self.failed.len() + self.skipped.len()
                == all.len()
    }
}

/// The action an [`ErrorHandler`] requests for a failed attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorHandlingAction {
    Retry,
    Skip,
    Fail,
    Terminate,
}

/// Which error codes are retryable and how many attempts a node gets
/// (spec §4.6 retry policy, reused by the error handler's decision and by
/// [`super::agent::RetryPolicy`]).
#[derive(Debug, Clone)]
pub struct ErrorHandlingPolicy {
    pub retryable_codes: Vec<ErrorCode>,
    pub max_retries: u32,
    /// Codes that should abort the whole workflow rather than just this
    /// node, regardless of retry budget.
    pub terminal_codes: Vec<ErrorCode>,
}

impl Default for ErrorHandlingPolicy {
    fn default() -> Self {
        Self {
            retryable_codes: vec![ErrorCode::Timeout, ErrorCode::RateLimit, ErrorCode::UpstreamError],
            max_retries: 2,
            terminal_codes: vec![ErrorCode::CycleDetected, ErrorCode::Cancelled],
        }
    }
}

/// Decides what to do with a failed attempt, given the policy and how many
/// attempts have already been made. Stateless; all state lives in the
/// `ExecutionContext` the caller maintains separately.
#[derive(Debug, Clone, Default)]
pub struct ErrorHandler {
    pub policy: ErrorHandlingPolicy,
}

impl ErrorHandler {
    pub fn new(policy: ErrorHandlingPolicy) -> Self {
        Self { policy }
    }

    pub fn decide(&self, error_code: ErrorCode, attempt: u32) -> ErrorHandlingAction {
        if self.policy.terminal_codes.contains(&error_code) {
            return ErrorHandlingAction::Terminate;
        }
        if self.policy.retryable_codes.contains(&error_code) && attempt < self.policy.max_retries {
            return ErrorHandlingAction::Retry;
        }
        ErrorHandlingAction::Fail
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn node_sets_stay_disjoint_through_transitions() {
        let all: FxHashSet<NodeId> = (0..3).map(NodeId).collect();
        let mut ctx = ExecutionContext::new("w1", all.iter().copied());
        assert!(ctx.covers_exactly(&all));

        ctx.mark_node_running(NodeId(0), Value::Null);
        assert!(ctx.covers_exactly(&all));
        ctx.mark_node_completed(NodeId(0), Value::Null);
        assert!(ctx.covers_exactly(&all));

        ctx.mark_node_skipped(NodeId(1));
        assert!(ctx.covers_exactly(&all));

        ctx.mark_node_running(NodeId(2), Value::Null);
        ctx.mark_node_failed(
            NodeId(2),
            ErrorEntry {
                node_id: "node#2".into(),
                error_type: ErrorCode::Timeout,
                error_message: "boom".into(),
                attempt: 0,
                action_taken: "fail".into(),
                timestamp: Utc::now(),
            },
        );
        assert!(ctx.covers_exactly(&all));
        assert_eq!(ctx.progress(), 1.0 / 3.0);
    }

    #[test]
    fn error_handler_retries_until_budget_exhausted() {
        let handler = ErrorHandler::new(ErrorHandlingPolicy {
            retryable_codes: vec![ErrorCode::Timeout],
            max_retries: 2,
            terminal_codes: vec![],
        });
        assert_eq!(handler.decide(ErrorCode::Timeout, 0), ErrorHandlingAction::Retry);
        assert_eq!(handler.decide(ErrorCode::Timeout, 1), ErrorHandlingAction::Retry);
        assert_eq!(handler.decide(ErrorCode::Timeout, 2), ErrorHandlingAction::Fail);
        assert_eq!(
            handler.decide(ErrorCode::CycleDetected, 0),
            ErrorHandlingAction::Fail
        );
    }
}
