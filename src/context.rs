//! Hierarchical context storage: global (per user) → session → workflow
//! (spec component B).
//!
//! Reads are lock-free within single-threaded execution because each
//! `WorkflowContext` is owned exclusively by the executor task tree running
//! that workflow (spec §5 shared-resource policy) — no mutex here, unlike
//! the state/reflection monitors in [`crate::state_monitor`] and
//! [`crate::reflection`], which are genuinely shared across concurrently
//! running workflows.

use crate::node::NodeId;
use rustc_hash::FxHashMap;
use serde_json::Value;

/// A single workflow's node-output store. Created when the workflow begins,
/// destroyed explicitly when it ends — no implicit cleanup.
#[derive(Debug, Default)]
pub struct WorkflowContext {
    node_outputs: FxHashMap<NodeId, Value>,
    vars: FxHashMap<String, Value>,
}

impl WorkflowContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_node_output(&mut self, node_id: NodeId, output: Value) {
        self.node_outputs.insert(node_id, output);
    }

    /// Returns the last stored output, or `None` if the node never
    /// produced one (the spec's "none sentinel").
    pub fn get_node_output(&self, node_id: NodeId) -> Option<&Value> {
        self.node_outputs.get(&node_id)
    }

    pub fn set_var(&mut self, name: impl Into<String>, value: Value) {
        self.vars.insert(name.into(), value);
    }

    pub fn get_var(&self, name: &str) -> Option<&Value> {
        self.vars.get(name)
    }

    /// All workflow-scoped variables, used to build the merged evaluation
    /// scope for conditional-edge expressions (spec §4.6).
    pub fn vars(&self) -> &FxHashMap<String, Value> {
        &self.vars
    }

    pub fn node_outputs(&self) -> &FxHashMap<NodeId, Value> {
        &self.node_outputs
    }
}

/// One user session. Owns every workflow it has started.
#[derive(Debug, Default)]
pub struct SessionContext {
    workflows: FxHashMap<String, WorkflowContext>,
}

impl SessionContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn start_workflow(&mut self, workflow_id: impl Into<String>) -> &mut WorkflowContext {
        self.workflows.entry(workflow_id.into()).or_default()
    }

    pub fn workflow(&self, workflow_id: &str) -> Option<&WorkflowContext> {
        self.workflows.get(workflow_id)
    }

    pub fn workflow_mut(&mut self, workflow_id: &str) -> Option<&mut WorkflowContext> {
        self.workflows.get_mut(workflow_id)
    }

    pub fn end_workflow(&mut self, workflow_id: &str) -> Option<WorkflowContext> {
        self.workflows.remove(workflow_id)
    }
}

/// Global per-user scope, owning every session.
#[derive(Debug, Default)]
pub struct GlobalContext {
    sessions: FxHashMap<String, SessionContext>,
}

impl GlobalContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn session(&mut self, session_id: impl Into<String>) -> &mut SessionContext {
        self.sessions.entry(session_id.into()).or_default()
    }

    pub fn get_session(&self, session_id: &str) -> Option<&SessionContext> {
        self.sessions.get(session_id)
    }

    pub fn end_session(&mut self, session_id: &str) -> Option<SessionContext> {
        self.sessions.remove(session_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn node_output_round_trips() {
        let mut ctx = WorkflowContext::new();
        let id = NodeId(0);
        assert!(ctx.get_node_output(id).is_none());
        ctx.set_node_output(id, serde_json::json!({"x": 1}));
        assert_eq!(ctx.get_node_output(id).unwrap()["x"], 1);
    }

    #[test]
    fn hierarchy_has_no_cross_workflow_visibility() {
        let mut global = GlobalContext::new();
        let session = global.session("s1");
        session.start_workflow("w1").set_var("a", 1.into());
        session.start_workflow("w2");
        assert!(session.workflow("w2").unwrap().get_var("a").is_none());
    }
}
