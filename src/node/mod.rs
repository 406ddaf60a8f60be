//! Node/edge data model (spec component G: arena-indexed, never raw
//! back-pointers) and the node-type schema registry.

pub mod schema;

use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

pub use schema::{Constraint, FieldSchema, FieldType, NodeSchema, NodeTypeRegistry};

/// Arena index into a [`NodeRegistry`]. `Copy`, cheap to pass around; the
/// graph never stores a raw reference or pointer to a node, only this.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeId(pub u64);

/// Arena index for an [`Edge`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EdgeId(pub u64);

impl std::fmt::Display for NodeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "node#{}", self.0)
    }
}

/// The 17 built-in node types. `Start`/`End` are virtual structural
/// endpoints: never registered with effective schemas, never dispatched to
/// an executor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NodeType {
    Start,
    End,
    Llm,
    Api,
    Code,
    Condition,
    Loop,
    Parallel,
    Knowledge,
    Classify,
    Template,
    Mcp,
    Generic,
    File,
    DataProcess,
    Human,
    Container,
}

impl NodeType {
    pub fn is_virtual(self) -> bool {
        matches!(self, NodeType::Start | NodeType::End)
    }
}

/// An executable unit in the DAG.
///
/// Invariants (enforced by [`NodeRegistry`], never by `Node` alone since a
/// node doesn't know its own arena):
/// - `children` is ordered and contains no duplicate [`NodeId`].
/// - `parent_id` is `Some` iff this node's id appears in some other node's
///   `children`.
/// - a node's *effective* type for dispatch is `config["_custom_type"]` if
///   present and parseable as a [`NodeType`], else `node_type`.
/// - a node with `config["is_container"] == true` must carry a
///   `container_config` object.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Node {
    pub id: NodeId,
    pub name: String,
    pub node_type: NodeType,
    #[serde(default)]
    pub config: Map<String, Value>,
    pub parent_id: Option<NodeId>,
    #[serde(default)]
    pub children: Vec<NodeId>,
    #[serde(default)]
    pub collapsed: bool,
    #[serde(default)]
    pub output: Option<Value>,
}

impl Node {
    pub fn new(id: NodeId, name: impl Into<String>, node_type: NodeType) -> Self {
        Self {
            id,
            name: name.into(),
            node_type,
            config: Map::new(),
            parent_id: None,
            children: Vec::new(),
            collapsed: false,
            output: None,
        }
    }

    /// `config._custom_type` if set and it names a known [`NodeType`],
    /// else `node_type`.
    pub fn effective_type(&self) -> NodeType {
        self.config
            .get("_custom_type")
            .and_then(Value::as_str)
            .and_then(parse_node_type)
            .unwrap_or(self.node_type)
    }

    pub fn is_container(&self) -> bool {
        self.config
            .get("is_container")
            .and_then(Value::as_bool)
            .unwrap_or(false)
    }

    pub fn container_config(&self) -> Option<&Value> {
        self.config.get("container_config")
    }
}

fn parse_node_type(s: &str) -> Option<NodeType> {
    serde_json::from_value(Value::String(s.to_string())).ok()
}

/// A directed link between two resident nodes, optionally guarded by a
/// condition expression (see [`crate::rules::eval`]).
///
/// A null or empty condition means "always take" (spec §3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Edge {
    pub id: EdgeId,
    pub source_id: NodeId,
    pub target_id: NodeId,
    pub condition: Option<String>,
}

impl Edge {
    pub fn is_unconditional(&self) -> bool {
        self.condition.as_deref().map(str::trim).unwrap_or("").is_empty()
    }
}

/// Errors from node/edge registration.
#[derive(Debug, thiserror::Error, miette::Diagnostic)]
pub enum NodeError {
    #[error("node id {0} is not resident in the registry")]
    #[diagnostic(code(coordinator::node::unresident))]
    NotResident(NodeId),
    #[error("node {0} already has {1} as a child")]
    #[diagnostic(code(coordinator::node::duplicate_child))]
    DuplicateChild(NodeId, NodeId),
    #[error("edge endpoint {0} is not a resident node")]
    #[diagnostic(code(coordinator::node::dangling_edge))]
    DanglingEdge(NodeId),
}

/// Owns every [`Node`] and [`Edge`] for one workflow materialization. The
/// only way to get a `NodeId` is to add a node here; the only way to
/// dereference one is to ask the registry — there is no node-to-node raw
/// pointer anywhere in this crate.
#[derive(Debug, Default)]
pub struct NodeRegistry {
    nodes: FxHashMap<NodeId, Node>,
    edges: FxHashMap<EdgeId, Edge>,
    next_node_id: u64,
    next_edge_id: u64,
    name_index: FxHashMap<String, NodeId>,
}

impl NodeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_node(&mut self, name: impl Into<String>, node_type: NodeType) -> NodeId {
        let id = NodeId(self.next_node_id);
        self.next_node_id += 1;
        let name = name.into();
        self.name_index.insert(name.clone(), id);
        self.nodes.insert(id, Node::new(id, name, node_type));
        id
    }

    pub fn get(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(&id)
    }

    pub fn get_mut(&mut self, id: NodeId) -> Option<&mut Node> {
        self.nodes.get_mut(&id)
    }

    pub fn id_by_name(&self, name: &str) -> Option<NodeId> {
        self.name_index.get(name).copied()
    }

    pub fn contains(&self, id: NodeId) -> bool {
        self.nodes.contains_key(&id)
    }

    pub fn node_ids(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.nodes.keys().copied()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Appends `child_id` to `parent_id`'s children and sets the child's
    /// `parent_id`, maintaining invariant (b). Rejects a duplicate append of
    /// the same child.
    pub fn attach_child(&mut self, parent_id: NodeId, child_id: NodeId) -> Result<(), NodeError> {
        if !self.nodes.contains_key(&parent_id) {
            return Err(NodeError::NotResident(parent_id));
        }
        if !self.nodes.contains_key(&child_id) {
            return Err(NodeError::NotResident(child_id));
        }
        let parent = self.nodes.get_mut(&parent_id).unwrap();
        if parent.children.contains(&child_id) {
            return Err(NodeError::DuplicateChild(parent_id, child_id));
        }
        parent.children.push(child_id);
        self.nodes.get_mut(&child_id).unwrap().parent_id = Some(parent_id);
        Ok(())
    }

    /// Adds an edge, requiring both endpoints to already be resident (spec
    /// §3 edge invariant).
    pub fn add_edge(
        &mut self,
        source_id: NodeId,
        target_id: NodeId,
        condition: Option<String>,
    ) -> Result<EdgeId, NodeError> {
        if !self.nodes.contains_key(&source_id) {
            return Err(NodeError::DanglingEdge(source_id));
        }
        if !self.nodes.contains_key(&target_id) {
            return Err(NodeError::DanglingEdge(target_id));
        }
        let id = EdgeId(self.next_edge_id);
        self.next_edge_id += 1;
        self.edges.insert(
            id,
            Edge {
                id,
                source_id,
                target_id,
                condition,
            },
        );
        Ok(id)
    }

    pub fn edges(&self) -> impl Iterator<Item = &Edge> {
        self.edges.values()
    }

    pub fn edges_from(&self, source_id: NodeId) -> impl Iterator<Item = &Edge> {
        self.edges
            .values()
            .filter(move |e| e.source_id == source_id)
    }

    pub fn edges_into(&self, target_id: NodeId) -> impl Iterator<Item = &Edge> {
        self.edges
            .values()
            .filter(move |e| e.target_id == target_id)
    }

    /// Root nodes: resident nodes with no `parent_id`.
    pub fn root_nodes(&self) -> Vec<NodeId> {
        let mut roots: Vec<NodeId> = self
            .nodes
            .values()
            .filter(|n| n.parent_id.is_none())
            .map(|n| n.id)
            .collect();
        roots.sort();
        roots
    }

    /// Read-only hierarchy introspection: every node paired with its depth
    /// and parent, flattened in a parent-before-children order.
    pub fn flat_nodes_with_hierarchy(&self) -> Vec<(NodeId, usize, Option<NodeId>)> {
        let mut out = Vec::new();
        let mut stack: Vec<(NodeId, usize)> =
            self.root_nodes().into_iter().rev().map(|id| (id, 0)).collect();
        while let Some((id, depth)) = stack.pop() {
            let Some(node) = self.nodes.get(&id) else {
                continue;
            };
            out.push((id, depth, node.parent_id));
            for &child in node.children.iter().rev() {
                stack.push((child, depth + 1));
            }
        }
        out
    }

    /// The node tree rooted at every node with no parent, as nested id
    /// lists (id, children-trees) — a read-only query for future
    /// canvas/CLI consumers.
    pub fn node_tree(&self) -> Vec<NodeTree> {
        self.root_nodes()
            .into_iter()
            .map(|id| self.subtree(id))
            .collect()
    }

    fn subtree(&self, id: NodeId) -> NodeTree {
        let children = self
            .nodes
            .get(&id)
            .map(|n| n.children.iter().map(|&c| self.subtree(c)).collect())
            .unwrap_or_default();
        NodeTree { id, children }
    }
}

/// One node in the read-only tree returned by [`NodeRegistry::node_tree`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeTree {
    pub id: NodeId,
    pub children: Vec<NodeTree>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn attach_child_sets_parent_and_rejects_duplicates() {
        let mut reg = NodeRegistry::new();
        let parent = reg.add_node("parent", NodeType::Generic);
        let child = reg.add_node("child", NodeType::Code);
        reg.attach_child(parent, child).unwrap();
        assert_eq!(reg.get(child).unwrap().parent_id, Some(parent));
        assert!(matches!(
            reg.attach_child(parent, child),
            Err(NodeError::DuplicateChild(_, _))
        ));
    }

    #[test]
    fn add_edge_requires_resident_endpoints() {
        let mut reg = NodeRegistry::new();
        let a = reg.add_node("a", NodeType::Code);
        let bogus = NodeId(999);
        assert!(matches!(
            reg.add_edge(a, bogus, None),
            Err(NodeError::DanglingEdge(_))
        ));
    }

    #[test]
    fn effective_type_prefers_custom_type() {
        let mut node = Node::new(NodeId(0), "n", NodeType::Generic);
        node.config
            .insert("_custom_type".into(), Value::String("CODE".into()));
        assert_eq!(node.effective_type(), NodeType::Code);
    }

    #[test]
    fn root_nodes_excludes_attached_children() {
        let mut reg = NodeRegistry::new();
        let parent = reg.add_node("parent", NodeType::Generic);
        let child = reg.add_node("child", NodeType::Code);
        reg.attach_child(parent, child).unwrap();
        assert_eq!(reg.root_nodes(), vec![parent]);
    }
}
