//! The planner's declarative output (spec §3 `WorkflowPlan`), resolved into
//! resident [`crate::node::Node`]s and [`crate::node::Edge`]s by
//! [`super::agent::WorkflowAgent::execute_plan`].

use crate::node::NodeType;
use serde_json::{Map, Value};

/// One node the planner wants materialized, referenced by `name` (planner-
/// local, not yet a [`crate::node::NodeId`]) from [`EdgeDefinition`] and from
/// `parent`.
#[derive(Debug, Clone)]
pub struct NodeDefinition {
    pub name: String,
    pub node_type: NodeType,
    pub config: Map<String, Value>,
    /// Name of this node's parent, if it is to be attached as a child
    /// (spec §4.6 hierarchical execution). `None` for a root/top-level node.
    pub parent: Option<String>,
}

impl NodeDefinition {
    pub fn new(name: impl Into<String>, node_type: NodeType) -> Self {
        Self {
            name: name.into(),
            node_type,
            config: Map::new(),
            parent: None,
        }
    }

    pub fn with_config(mut self, config: Map<String, Value>) -> Self {
        self.config = config;
        self
    }

    pub fn with_parent(mut self, parent: impl Into<String>) -> Self {
        self.parent = Some(parent.into());
        self
    }
}

/// An edge the planner wants materialized, referencing endpoints by node
/// name (spec §3). Resolved to [`crate::node::NodeId`]s at materialization
/// time; an unresolved name is a validation error, never a silent drop.
#[derive(Debug, Clone)]
pub struct EdgeDefinition {
    pub source_name: String,
    pub target_name: String,
    pub condition: Option<String>,
}

impl EdgeDefinition {
    pub fn new(source_name: impl Into<String>, target_name: impl Into<String>) -> Self {
        Self {
            source_name: source_name.into(),
            target_name: target_name.into(),
            condition: None,
        }
    }

    pub fn with_condition(mut self, condition: impl Into<String>) -> Self {
        self.condition = Some(condition.into());
        self
    }
}

/// The planner's decision for one workflow run: a name, the originating
/// goal text, and the node/edge definitions to materialize.
#[derive(Debug, Clone, Default)]
pub struct WorkflowPlan {
    pub name: String,
    pub goal: String,
    pub nodes: Vec<NodeDefinition>,
    pub edges: Vec<EdgeDefinition>,
}

impl WorkflowPlan {
    pub fn new(name: impl Into<String>, goal: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            goal: goal.into(),
            nodes: Vec::new(),
            edges: Vec::new(),
        }
    }

    pub fn with_node(mut self, node: NodeDefinition) -> Self {
        self.nodes.push(node);
        self
    }

    pub fn with_edge(mut self, edge: EdgeDefinition) -> Self {
        self.edges.push(edge);
        self
    }
}
