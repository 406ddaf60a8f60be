//! The Workflow Agent: DAG materialization, topological/conditional
//! scheduling, hierarchical expansion, and the node-level retry contract
//! (spec component H).

use super::monitor::ExecutionContext;
use super::plan::{EdgeDefinition, NodeDefinition, WorkflowPlan};
use crate::context::WorkflowContext;
use crate::coordination::bus::CoordinationBus;
use crate::coordination::events::{
    ExecutionProgressEvent, NodeExecutionEvent, NodeExecutionStatus, WorkflowExecutionCompletedEvent,
    WorkflowExecutionStartedEvent,
};
use crate::error::{CoordinatorError, ErrorCode, ErrorEntry, ExecutionMetadata, ExecutionResult};
use crate::node::{Node, NodeId, NodeRegistry};
use crate::rules::eval;
use chrono::Utc;
use rustc_hash::FxHashMap;
use serde_json::{Map, Value};
use std::collections::BTreeSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Cooperative cancellation signal threaded through node execution (spec
/// §5). Checked at suspension points; never forcibly aborts a running
/// executor call, matching "cancellation raises at the next suspension
/// point".
#[derive(Debug, Clone, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Retry contract for [`WorkflowAgent::execute_node_with_result`] (spec
/// §4.6): `delay = base_delay * backoff_factor^attempt`, retried only while
/// `error_code` is in `retryable_codes` and `attempt < max_retries`.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay: Duration,
    pub backoff_factor: f64,
    pub retryable_codes: Vec<ErrorCode>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 0,
            base_delay: Duration::from_millis(100),
            backoff_factor: 2.0,
            retryable_codes: Vec::new(),
        }
    }
}

/// Runs against a successful output; returning `false` downgrades the
/// result to `VALIDATION_FAILED` (spec §4.6).
pub type OutputValidator = Arc<dyn Fn(&Value) -> bool + Send + Sync>;

/// The outcome of a full workflow run (spec §7's user-visible failure
/// contract). Consumers must rely on `success`/`failed_node`, never on
/// field presence.
#[derive(Debug, Clone)]
pub struct WorkflowResult {
    pub success: bool,
    pub summary: String,
    pub workflow_id: String,
    pub executed_nodes: Vec<NodeId>,
    pub failed_node: Option<NodeId>,
    pub error_message: Option<String>,
    pub diagnostics: Value,
    pub execution_time: Duration,
    pub outputs: FxHashMap<NodeId, Value>,
}

/// The result of [`WorkflowAgent::execute_hierarchical_node`]: the parent's
/// own result plus every descendant's, keyed by id (spec §4.6).
#[derive(Debug, Clone)]
pub struct HierarchicalResult {
    pub node_id: NodeId,
    pub result: ExecutionResult,
    pub children_results: FxHashMap<NodeId, ExecutionResult>,
}

impl HierarchicalResult {
    pub fn status(&self) -> bool {
        self.result.is_ok() && self.children_results.values().all(ExecutionResult::is_ok)
    }
}

/// Owns the node/edge arena for one workflow run and drives its execution.
/// Generic over the node executor only through the `NodeExecutor` trait
/// object — HTTP/DB/LLM/container implementations live outside this crate.
pub struct WorkflowAgent {
    workflow_id: String,
    registry: NodeRegistry,
    context: WorkflowContext,
    bus: CoordinationBus,
    executor: Arc<dyn crate::executor::NodeExecutor>,
    cancellation: CancellationToken,
    default_retry_policy: Option<RetryPolicy>,
}

impl WorkflowAgent {
    pub fn new(
        workflow_id: impl Into<String>,
        bus: CoordinationBus,
        executor: Arc<dyn crate::executor::NodeExecutor>,
    ) -> Self {
        Self {
            workflow_id: workflow_id.into(),
            registry: NodeRegistry::new(),
            context: WorkflowContext::new(),
            bus,
            executor,
            cancellation: CancellationToken::new(),
            default_retry_policy: None,
        }
    }

    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.default_retry_policy = Some(policy);
        self
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancellation.clone()
    }

    pub fn registry(&self) -> &NodeRegistry {
        &self.registry
    }

    pub fn registry_mut(&mut self) -> &mut NodeRegistry {
        &mut self.registry
    }

    pub fn workflow_context(&self) -> &WorkflowContext {
        &self.context
    }

    /// Read-only hierarchy introspection carried from the teacher's node
    /// registry for any future canvas/CLI consumer (spec SPEC_FULL
    /// supplemented feature 6).
    pub fn node_tree(&self) -> Vec<crate::node::NodeTree> {
        self.registry.node_tree()
    }

    pub fn root_nodes(&self) -> Vec<NodeId> {
        self.registry.root_nodes()
    }

    pub fn flat_nodes_with_hierarchy(&self) -> Vec<(NodeId, usize, Option<NodeId>)> {
        self.registry.flat_nodes_with_hierarchy()
    }

    fn publish_node_event(&self, node_id: NodeId, status: NodeExecutionStatus, output: Option<Value>, error_message: Option<String>) {
        self.bus.publish(NodeExecutionEvent {
            source: "workflow_agent".into(),
            timestamp: Utc::now(),
            workflow_id: self.workflow_id.clone(),
            node_id,
            status,
            output,
            error_message,
        });
    }

    fn publish_progress(&self, node_id: Option<NodeId>, status: &str, progress: f64, message: impl Into<String>) {
        self.bus.publish(ExecutionProgressEvent {
            source: "workflow_agent".into(),
            timestamp: Utc::now(),
            workflow_id: self.workflow_id.clone(),
            node_id,
            status: status.to_string(),
            progress,
            message: message.into(),
            metadata: Value::Null,
        });
    }

    /// Materializes every [`NodeDefinition`] and [`EdgeDefinition`] in
    /// `plan` into this agent's registry, then runs it (spec §4.6 "Plan
    /// materialization"). Every edge endpoint name must resolve — unlike the
    /// permissive fallback some planner implementations use, an unresolved
    /// name here is a hard [`CoordinatorError::UnresolvedReference`], never
    /// silently treated as a literal id.
    pub async fn execute_plan(&mut self, plan: WorkflowPlan) -> Result<WorkflowResult, CoordinatorError> {
        self.materialize(&plan.nodes, &plan.edges)?;
        Ok(self.execute_workflow().await)
    }

    fn resolve_and_add_edge(
        &mut self,
        def: &EdgeDefinition,
        name_to_id: &FxHashMap<String, NodeId>,
    ) -> Result<(), CoordinatorError> {
        let source = name_to_id
            .get(&def.source_name)
            .copied()
            .ok_or_else(|| CoordinatorError::UnresolvedReference(def.source_name.clone()))?;
        let target = name_to_id
            .get(&def.target_name)
            .copied()
            .ok_or_else(|| CoordinatorError::UnresolvedReference(def.target_name.clone()))?;
        self.registry
            .add_edge(source, target, def.condition.clone())
            .map_err(|e| CoordinatorError::InvalidDefinition(e.to_string()))?;
        Ok(())
    }

    /// Converts [`NodeDefinition`]s and [`EdgeDefinition`]s into resident
    /// nodes/edges, building and returning the name→id map. Used by
    /// [`Self::execute_plan`]; also handy directly in tests/demos that
    /// already have definitions without going through a planner.
    pub fn materialize(&mut self, nodes: &[NodeDefinition], edges: &[EdgeDefinition]) -> Result<FxHashMap<String, NodeId>, CoordinatorError> {
        let mut name_to_id: FxHashMap<String, NodeId> = FxHashMap::default();
        for def in nodes {
            let id = self.registry.add_node(def.name.clone(), def.node_type);
            if let Some(node) = self.registry.get_mut(id) {
                node.config = def.config.clone();
            }
            name_to_id.insert(def.name.clone(), id);
        }
        for def in nodes {
            let Some(parent_name) = &def.parent else { continue };
            let child_id = name_to_id[&def.name];
            let parent_id = name_to_id
                .get(parent_name)
                .copied()
                .ok_or_else(|| CoordinatorError::UnresolvedReference(parent_name.clone()))?;
            self.registry
                .attach_child(parent_id, child_id)
                .map_err(|e| CoordinatorError::InvalidDefinition(e.to_string()))?;
        }
        for def in edges {
            self.resolve_and_add_edge(def, &name_to_id)?;
        }
        Ok(name_to_id)
    }

    /// Kahn's algorithm with ties broken by insertion order — [`NodeId`]s
    /// are assigned sequentially by [`NodeRegistry::add_node`], so breaking
    /// ties by ascending id *is* breaking ties by insertion order. Returns
    /// the residual (unscheduled) node set on a cycle.
    fn topological_sort(&self) -> Result<Vec<NodeId>, Vec<NodeId>> {
        let mut indegree: FxHashMap<NodeId, usize> = self.registry.node_ids().map(|id| (id, 0)).collect();
        for edge in self.registry.edges() {
            *indegree.entry(edge.target_id).or_insert(0) += 1;
        }
        let mut ready: BTreeSet<NodeId> = indegree
            .iter()
            .filter(|&(_, &deg)| deg == 0)
            .map(|(&id, _)| id)
            .collect();
        let mut order = Vec::with_capacity(self.registry.len());
        while let Some(&id) = ready.iter().next() {
            ready.remove(&id);
            order.push(id);
            for edge in self.registry.edges_from(id) {
                if let Some(deg) = indegree.get_mut(&edge.target_id) {
                    *deg -= 1;
                    if *deg == 0 {
                        ready.insert(edge.target_id);
                    }
                }
            }
        }
        if order.len() != self.registry.len() {
            let scheduled: std::collections::HashSet<NodeId> = order.into_iter().collect();
            let residual = self.registry.node_ids().filter(|id| !scheduled.contains(id)).collect();
            return Err(residual);
        }
        Ok(order)
    }

    /// Merged evaluation scope for one incoming edge's condition: the
    /// source node's last output (flattened if an object) overridden by the
    /// workflow's own vars (spec §4.6: `{…upstream_output,
    /// …workflow_context_vars}`).
    fn edge_eval_context(&self, source_id: NodeId) -> Map<String, Value> {
        let mut ctx = Map::new();
        if let Some(Value::Object(obj)) = self.context.get_node_output(source_id) {
            ctx.extend(obj.clone());
        }
        for (k, v) in self.context.vars() {
            ctx.insert(k.clone(), v.clone());
        }
        ctx
    }

    /// A node with no incoming edges always runs; otherwise it runs iff at
    /// least one incoming edge is unconditional or evaluates its condition
    /// to `true` (errors degrade to `false`, never abort scheduling).
    fn should_execute(&self, node_id: NodeId) -> bool {
        let mut incoming = self.registry.edges_into(node_id).peekable();
        if incoming.peek().is_none() {
            return true;
        }
        incoming.any(|edge| {
            if edge.is_unconditional() {
                return true;
            }
            let ctx = self.edge_eval_context(edge.source_id);
            eval::evaluate(edge.condition.as_deref().unwrap_or(""), &ctx)
        })
    }

    /// Inputs keyed by source `NodeId` (spec §4.6 data collection); a
    /// source with no stored output simply contributes no key.
    fn collect_inputs(&self, node_id: NodeId) -> Map<String, Value> {
        let mut inputs = Map::new();
        for edge in self.registry.edges_into(node_id) {
            if let Some(output) = self.context.get_node_output(edge.source_id) {
                inputs.insert(edge.source_id.to_string(), output.clone());
            }
        }
        inputs
    }

    /// Runs every resident node in topological + conditional order,
    /// publishing lifecycle events as it goes (spec §4.6). A cycle fails the
    /// whole workflow before any node executes (testable property 6).
    pub async fn execute_workflow(&mut self) -> WorkflowResult {
        let start = Instant::now();
        let node_ids: Vec<NodeId> = self.registry.node_ids().collect();
        self.bus.publish(WorkflowExecutionStartedEvent {
            source: "workflow_agent".into(),
            timestamp: Utc::now(),
            workflow_id: self.workflow_id.clone(),
            node_count: node_ids.len(),
        });

        let order = match self.topological_sort() {
            Ok(order) => order,
            Err(residual) => {
                let names: Vec<String> = residual.iter().map(|id| id.to_string()).collect();
                warn!(workflow_id = %self.workflow_id, residual = ?names, "cycle detected, workflow fails before any node executes");
                self.bus.publish(WorkflowExecutionCompletedEvent {
                    source: "workflow_agent".into(),
                    timestamp: Utc::now(),
                    workflow_id: self.workflow_id.clone(),
                    success: false,
                    summary: format!("cycle detected among nodes: {}", names.join(", ")),
                    failed_node: None,
                });
                return WorkflowResult {
                    success: false,
                    summary: "cycle detected".into(),
                    workflow_id: self.workflow_id.clone(),
                    executed_nodes: Vec::new(),
                    failed_node: None,
                    error_message: Some(ErrorCode::CycleDetected.to_string()),
                    diagnostics: serde_json::json!({ "residual": names }),
                    execution_time: start.elapsed(),
                    outputs: FxHashMap::default(),
                };
            }
        };

        let mut exec_ctx = ExecutionContext::new(self.workflow_id.clone(), node_ids.iter().copied());

        for node_id in order {
            if self.cancellation.is_cancelled() {
                exec_ctx.mark_node_failed(
                    node_id,
                    ErrorEntry {
                        node_id: node_id.to_string(),
                        error_type: ErrorCode::Cancelled,
                        error_message: "workflow cancelled".into(),
                        attempt: 0,
                        action_taken: "fail".into(),
                        timestamp: Utc::now(),
                    },
                );
                continue;
            }

            let Some(node) = self.registry.get(node_id) else { continue };
            if node.effective_type().is_virtual() {
                exec_ctx.mark_node_running(node_id, Value::Null);
                exec_ctx.mark_node_completed(node_id, Value::Null);
                self.context.set_node_output(node_id, Value::Null);
                continue;
            }

            if !self.should_execute(node_id) {
                exec_ctx.mark_node_skipped(node_id);
                debug!(workflow_id = %self.workflow_id, %node_id, "node skipped: no incoming edge condition held");
                continue;
            }

            let inputs = self.collect_inputs(node_id);
            exec_ctx.mark_node_running(node_id, Value::Object(inputs.clone()));
            self.publish_node_event(node_id, NodeExecutionStatus::Running, None, None);

            let retry_policy = self.default_retry_policy.clone();
            let result = self
                .execute_node_with_result(node_id, &inputs, retry_policy.as_ref(), None)
                .await;

            match result {
                ExecutionResult::Ok { output, .. } => {
                    exec_ctx.mark_node_completed(node_id, output.clone());
                    self.context.set_node_output(node_id, output.clone());
                    self.publish_node_event(node_id, NodeExecutionStatus::Completed, Some(output), None);
                    self.publish_progress(Some(node_id), "completed", exec_ctx.progress(), format!("{node_id} completed"));
                }
                ExecutionResult::Failure {
                    error_code,
                    error_message,
                    metadata,
                } => {
                    exec_ctx.mark_node_failed(
                        node_id,
                        ErrorEntry {
                            node_id: node_id.to_string(),
                            error_type: error_code,
                            error_message: error_message.clone(),
                            attempt: metadata.retry_count,
                            action_taken: "fail".into(),
                            timestamp: Utc::now(),
                        },
                    );
                    self.publish_node_event(node_id, NodeExecutionStatus::Failed, None, Some(error_message.clone()));
                    exec_ctx.finish(false);
                    self.bus.publish(WorkflowExecutionCompletedEvent {
                        source: "workflow_agent".into(),
                        timestamp: Utc::now(),
                        workflow_id: self.workflow_id.clone(),
                        success: false,
                        summary: format!("node {node_id} failed: {error_message}"),
                        failed_node: Some(node_id),
                    });
                    return WorkflowResult {
                        success: false,
                        summary: format!("node {node_id} failed: {error_message}"),
                        workflow_id: self.workflow_id.clone(),
                        executed_nodes: exec_ctx.executed_nodes(),
                        failed_node: Some(node_id),
                        error_message: Some(error_message),
                        diagnostics: serde_json::json!({ "error_log_len": exec_ctx.error_log().len() }),
                        execution_time: start.elapsed(),
                        outputs: exec_ctx.node_outputs().clone(),
                    };
                }
            }
        }

        exec_ctx.finish(true);
        self.bus.publish(WorkflowExecutionCompletedEvent {
            source: "workflow_agent".into(),
            timestamp: Utc::now(),
            workflow_id: self.workflow_id.clone(),
            success: true,
            summary: "workflow completed".into(),
            failed_node: None,
        });
        WorkflowResult {
            success: true,
            summary: "workflow completed".into(),
            workflow_id: self.workflow_id.clone(),
            executed_nodes: exec_ctx.executed_nodes(),
            failed_node: None,
            error_message: None,
            diagnostics: Value::Null,
            execution_time: start.elapsed(),
            outputs: exec_ctx.node_outputs().clone(),
        }
    }

    /// The execution-result contract (spec §4.6): retries per `retry_policy`
    /// with exponential backoff, then runs `output_validator` on success.
    pub async fn execute_node_with_result(
        &self,
        node_id: NodeId,
        inputs: &Map<String, Value>,
        retry_policy: Option<&RetryPolicy>,
        output_validator: Option<&OutputValidator>,
    ) -> ExecutionResult {
        let Some(node) = self.registry.get(node_id) else {
            return ExecutionResult::failure(ErrorCode::NodeNotFound, "node not resident", ExecutionMetadata::new(node_id.to_string()));
        };
        let config = node.config.clone();
        let mut attempt: u32 = 0;

        loop {
            let started = Instant::now();
            match self.executor.execute(node_id, &config, inputs).await {
                Ok(output) => {
                    let elapsed_ms = started.elapsed().as_millis() as u64;
                    let output_value = Value::Object(output.output);
                    let metadata = ExecutionMetadata::new(node_id.to_string())
                        .with_execution_time_ms(elapsed_ms)
                        .with_retry_count(attempt);
                    if let Some(validator) = output_validator {
                        if !validator(&output_value) {
                            return ExecutionResult::failure(ErrorCode::ValidationFailed, "output failed validation", metadata);
                        }
                    }
                    return ExecutionResult::ok(output_value, metadata);
                }
                Err(error_code) => {
                    let elapsed_ms = started.elapsed().as_millis() as u64;
                    let retryable = retry_policy
                        .map(|p| p.retryable_codes.contains(&error_code) && attempt < p.max_retries)
                        .unwrap_or(false);
                    if retryable {
                        let policy = retry_policy.expect("retryable implies Some");
                        let delay = policy.base_delay.mul_f64(policy.backoff_factor.powi(attempt as i32));
                        info!(%node_id, attempt, ?delay, "retrying node after failure");
                        tokio::time::sleep(delay).await;
                        attempt += 1;
                        continue;
                    }
                    let metadata = ExecutionMetadata::new(node_id.to_string())
                        .with_execution_time_ms(elapsed_ms)
                        .with_retry_count(attempt);
                    return ExecutionResult::failure(error_code, error_code.to_string(), metadata);
                }
            }
        }
    }

    /// Post-order traversal (children before parent) rooted at `root`.
    fn hierarchical_order(&self, root: NodeId) -> Vec<NodeId> {
        fn visit(id: NodeId, registry: &NodeRegistry, out: &mut Vec<NodeId>) {
            if let Some(node) = registry.get(id) {
                for &child in &node.children {
                    visit(child, registry, out);
                }
            }
            out.push(id);
        }
        let mut out = Vec::new();
        visit(root, &self.registry, &mut out);
        out
    }

    /// Executes every descendant of `root` in post order, then `root`
    /// itself — dispatching to [`Self::execute_container_node`] if `root`
    /// is a container (spec §4.6).
    pub async fn execute_hierarchical_node(&mut self, root: NodeId, retry_policy: Option<&RetryPolicy>) -> HierarchicalResult {
        let order = self.hierarchical_order(root);
        let mut children_results: FxHashMap<NodeId, ExecutionResult> = FxHashMap::default();

        for node_id in &order {
            if *node_id == root {
                continue;
            }
            let inputs = self.collect_inputs(*node_id);
            let result = self.execute_node_with_result(*node_id, &inputs, retry_policy, None).await;
            if let ExecutionResult::Ok { output, .. } = &result {
                self.context.set_node_output(*node_id, output.clone());
            }
            children_results.insert(*node_id, result);
        }

        let is_container = self.registry.get(root).map(Node::is_container).unwrap_or(false);
        let result = if is_container {
            self.execute_container_node(root, &children_results, retry_policy).await
        } else {
            let inputs = self.collect_inputs(root);
            self.execute_node_with_result(root, &inputs, retry_policy, None).await
        };
        if let ExecutionResult::Ok { output, .. } = &result {
            self.context.set_node_output(root, output.clone());
        }

        HierarchicalResult {
            node_id: root,
            result,
            children_results,
        }
    }

    /// Container dispatch: the children's already-computed results are
    /// folded into the container node's own input under `children_results`
    /// before handing off to the same `NodeExecutor` interface (spec §6 —
    /// no separate container-executor trait is specified).
    async fn execute_container_node(
        &self,
        node_id: NodeId,
        children_results: &FxHashMap<NodeId, ExecutionResult>,
        retry_policy: Option<&RetryPolicy>,
    ) -> ExecutionResult {
        let mut inputs = self.collect_inputs(node_id);
        let mut serialized = Map::new();
        for (id, result) in children_results {
            let value = match result {
                ExecutionResult::Ok { output, .. } => output.clone(),
                ExecutionResult::Failure { error_message, .. } => Value::String(error_message.clone()),
            };
            serialized.insert(id.to_string(), value);
        }
        inputs.insert("children_results".into(), Value::Object(serialized));
        self.execute_node_with_result(node_id, &inputs, retry_policy, None).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::NodeOutput;
    use crate::node::NodeType;
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use std::collections::VecDeque;

    /// A scripted executor: per-node queues of canned results, falling back
    /// to an echo of its inputs once the queue is drained.
    #[derive(Default)]
    struct ScriptedExecutor {
        scripts: Mutex<FxHashMap<NodeId, VecDeque<Result<NodeOutput, ErrorCode>>>>,
    }

    impl ScriptedExecutor {
        fn script(&self, id: NodeId, results: Vec<Result<NodeOutput, ErrorCode>>) {
            self.scripts.lock().insert(id, results.into());
        }
    }

    #[async_trait]
    impl crate::executor::NodeExecutor for ScriptedExecutor {
        async fn execute(&self, node_id: NodeId, _config: &Map<String, Value>, inputs: &Map<String, Value>) -> Result<NodeOutput, ErrorCode> {
            if let Some(queue) = self.scripts.lock().get_mut(&node_id) {
                if let Some(next) = queue.pop_front() {
                    return next;
                }
            }
            Ok(NodeOutput { output: inputs.clone() })
        }
    }

    fn output(map: serde_json::Map<String, Value>) -> NodeOutput {
        NodeOutput { output: map }
    }

    #[tokio::test]
    async fn s1_simple_linear_pipeline() {
        let exec = Arc::new(ScriptedExecutor::default());
        let bus = CoordinationBus::new();
        let mut agent = WorkflowAgent::new("wf-s1", bus, exec.clone());
        let a = NodeDefinition::new("A", NodeType::Code);
        let b = NodeDefinition::new("B", NodeType::Code);
        let ids = agent.materialize(&[a, b], &[EdgeDefinition::new("A", "B")]).unwrap();
        exec.script(ids["A"], vec![Ok(output(serde_json::json!({"x": 1}).as_object().unwrap().clone()))]);

        let result = agent.execute_workflow().await;
        assert!(result.success);
        assert_eq!(result.executed_nodes, vec![ids["A"], ids["B"]]);
    }

    #[tokio::test]
    async fn s2_conditional_branch_high_quality_path() {
        let exec = Arc::new(ScriptedExecutor::default());
        let bus = CoordinationBus::new();
        let mut agent = WorkflowAgent::new("wf-s2", bus, exec.clone());
        let validate = NodeDefinition::new("validate", NodeType::Code);
        let analyze = NodeDefinition::new("analyze", NodeType::Code);
        let clean = NodeDefinition::new("clean", NodeType::Code);
        let ids = agent
            .materialize(
                &[validate, analyze, clean],
                &[
                    EdgeDefinition::new("validate", "analyze").with_condition("quality > 0.8"),
                    EdgeDefinition::new("validate", "clean").with_condition("quality <= 0.8"),
                ],
            )
            .unwrap();
        exec.script(
            ids["validate"],
            vec![Ok(output(serde_json::json!({"quality": 0.95}).as_object().unwrap().clone()))],
        );

        let result = agent.execute_workflow().await;
        assert!(result.success);
        assert!(result.executed_nodes.contains(&ids["validate"]));
        assert!(result.executed_nodes.contains(&ids["analyze"]));
        assert!(!result.executed_nodes.contains(&ids["clean"]));
    }

    #[tokio::test]
    async fn s3_retry_succeeding_on_third_attempt() {
        let exec = Arc::new(ScriptedExecutor::default());
        let bus = CoordinationBus::new();
        let agent = WorkflowAgent::new("wf-s3", bus, exec.clone());
        let node_id = NodeId(0);
        exec.script(
            node_id,
            vec![
                Err(ErrorCode::Timeout),
                Err(ErrorCode::Timeout),
                Ok(output(serde_json::json!({"data": 42}).as_object().unwrap().clone())),
            ],
        );
        let mut agent = agent;
        agent.registry_mut().add_node("fetch", NodeType::Code);
        let policy = RetryPolicy {
            max_retries: 2,
            base_delay: Duration::from_millis(1),
            backoff_factor: 2.0,
            retryable_codes: vec![ErrorCode::Timeout],
        };
        let result = agent
            .execute_node_with_result(node_id, &Map::new(), Some(&policy), None)
            .await;
        match result {
            ExecutionResult::Ok { metadata, .. } => assert_eq!(metadata.retry_count, 2),
            ExecutionResult::Failure { .. } => panic!("expected eventual success"),
        }
    }

    #[tokio::test]
    async fn s4_cycle_detection_fails_before_any_node_runs() {
        let exec = Arc::new(ScriptedExecutor::default());
        let bus = CoordinationBus::new();
        let mut agent = WorkflowAgent::new("wf-s4", bus, exec);
        let a = NodeDefinition::new("A", NodeType::Code);
        let b = NodeDefinition::new("B", NodeType::Code);
        let c = NodeDefinition::new("C", NodeType::Code);
        agent
            .materialize(
                &[a, b, c],
                &[
                    EdgeDefinition::new("A", "B"),
                    EdgeDefinition::new("B", "C"),
                    EdgeDefinition::new("C", "A"),
                ],
            )
            .unwrap();

        let result = agent.execute_workflow().await;
        assert!(!result.success);
        assert!(result.executed_nodes.is_empty());
        assert_eq!(result.error_message.as_deref(), Some(ErrorCode::CycleDetected.to_string()).as_deref());
    }

    #[tokio::test]
    async fn s6_hierarchical_merge_aggregation() {
        let exec = Arc::new(ScriptedExecutor::default());
        let bus = CoordinationBus::new();
        let mut agent = WorkflowAgent::new("wf-s6", bus, exec.clone());
        let parent = agent.registry_mut().add_node("parent", NodeType::Parallel);
        let child_a = agent.registry_mut().add_node("child_a", NodeType::Code);
        let child_b = agent.registry_mut().add_node("child_b", NodeType::Code);
        agent.registry_mut().attach_child(parent, child_a).unwrap();
        agent.registry_mut().attach_child(parent, child_b).unwrap();
        exec.script(child_a, vec![Ok(output(serde_json::json!({"value_a": 100}).as_object().unwrap().clone()))]);
        exec.script(child_b, vec![Ok(output(serde_json::json!({"value_b": 200}).as_object().unwrap().clone()))]);
        exec.script(parent, vec![Ok(output(Map::new()))]);

        let hierarchical = agent.execute_hierarchical_node(parent, None).await;
        assert!(hierarchical.status());
        assert_eq!(hierarchical.children_results.len(), 2);
    }
}
