//! Dependency Graph Builder (spec §4.7 "Dependency-graph mode", component
//! J): parses `source_name.output` / `source_name.output.field`
//! references declared by self-describing node parameters, builds edges
//! from them, and topologically sorts the result.

use regex::Regex;
use rustc_hash::{FxHashMap, FxHashSet};
use serde_json::Value;
use std::collections::VecDeque;
use std::sync::LazyLock;
use thiserror::Error;

static REFERENCE_PATTERN: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^([A-Za-z_][A-Za-z0-9_]*)\.output(?:\.([A-Za-z_][A-Za-z0-9_.]*))?$").unwrap());

/// One parsed `source_name.output[.field]` reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reference {
    pub source_name: String,
    pub field_path: Option<String>,
}

/// Parses a single reference string; returns `None` for anything that
/// does not match the `name.output[.field...]` grammar.
pub fn parse_reference(raw: &str) -> Option<Reference> {
    let captures = REFERENCE_PATTERN.captures(raw)?;
    Some(Reference {
        source_name: captures.get(1)?.as_str().to_string(),
        field_path: captures.get(2).map(|m| m.as_str().to_string()),
    })
}

/// One node in dependency-graph mode: a name plus the raw reference
/// strings its declared inputs point at.
#[derive(Debug, Clone)]
pub struct DependencyNode {
    pub name: String,
    pub input_references: FxHashMap<String, String>,
}

#[derive(Debug, Error)]
pub enum DependencyGraphError {
    #[error("cycle detected among dependency-graph nodes")]
    CycleDetected,
}

/// Builds edges from declared references, dropping self-references and
/// references to nodes absent from the node set (spec §4.7: "dropped with
/// a warning, never creating edges") and topologically sorts the result.
pub struct DependencyGraphBuilder {
    warnings: Vec<String>,
}

impl DependencyGraphBuilder {
    pub fn new() -> Self {
        Self { warnings: Vec::new() }
    }

    pub fn warnings(&self) -> &[String] {
        &self.warnings
    }

    /// Builds `name -> {upstream names}` edges for every resolvable
    /// reference, then returns nodes in topological (execution) order.
    pub fn build_order(&mut self, nodes: &[DependencyNode]) -> Result<Vec<String>, DependencyGraphError> {
        let known: FxHashSet<&str> = nodes.iter().map(|n| n.name.as_str()).collect();
        let mut edges: FxHashMap<String, FxHashSet<String>> = FxHashMap::default();
        for node in nodes {
            edges.entry(node.name.clone()).or_default();
        }

        for node in nodes {
            for (param, raw_reference) in &node.input_references {
                let Some(reference) = parse_reference(raw_reference) else {
                    self.warnings.push(format!("node '{}' input '{param}' is not a recognizable reference: '{raw_reference}'", node.name));
                    continue;
                };
                if reference.source_name == node.name {
                    self.warnings.push(format!("node '{}' references itself via '{param}'; dropped", node.name));
                    continue;
                }
                if !known.contains(reference.source_name.as_str()) {
                    self.warnings.push(format!(
                        "node '{}' input '{param}' references unknown node '{}'; dropped",
                        node.name, reference.source_name
                    ));
                    continue;
                }
                edges.get_mut(&node.name).expect("inserted above").insert(reference.source_name);
            }
        }

        topological_sort(&edges)
    }

    /// Assembles one node's `input_data` by dereferencing each declared
    /// reference against the stored outputs of upstream nodes.
    pub fn resolve_inputs(&self, node: &DependencyNode, outputs: &FxHashMap<String, Value>) -> serde_json::Map<String, Value> {
        let mut resolved = serde_json::Map::new();
        for (param, raw_reference) in &node.input_references {
            let Some(reference) = parse_reference(raw_reference) else { continue };
            let Some(output) = outputs.get(&reference.source_name) else { continue };
            let value = match &reference.field_path {
                Some(path) => dereference_path(output, path),
                None => Some(output.clone()),
            };
            if let Some(value) = value {
                resolved.insert(param.clone(), value);
            }
        }
        resolved
    }
}

impl Default for DependencyGraphBuilder {
    fn default() -> Self {
        Self::new()
    }
}

fn dereference_path(value: &Value, path: &str) -> Option<Value> {
    let mut current = value;
    for segment in path.split('.') {
        current = current.get(segment)?;
    }
    Some(current.clone())
}

/// Kahn's algorithm over `node -> {upstream dependencies}`, breaking ties
/// by ascending node name for determinism.
fn topological_sort(edges: &FxHashMap<String, FxHashSet<String>>) -> Result<Vec<String>, DependencyGraphError> {
    let mut in_degree: FxHashMap<&str, usize> = edges.keys().map(|name| (name.as_str(), 0)).collect();
    let mut dependents: FxHashMap<&str, Vec<&str>> = FxHashMap::default();

    for (name, upstream) in edges {
        *in_degree.get_mut(name.as_str()).expect("present") += upstream.len();
        for dep in upstream {
            dependents.entry(dep.as_str()).or_default().push(name.as_str());
        }
    }

    let mut ready: std::collections::BTreeSet<&str> = in_degree.iter().filter(|(_, deg)| **deg == 0).map(|(name, _)| *name).collect();
    let mut queue: VecDeque<&str> = ready.iter().copied().collect();
    let mut order = Vec::with_capacity(edges.len());

    while let Some(name) = queue.pop_front() {
        ready.remove(name);
        order.push(name.to_string());
        if let Some(children) = dependents.get(name) {
            let mut newly_ready: Vec<&str> = Vec::new();
            for child in children {
                let degree = in_degree.get_mut(child).expect("present");
                *degree -= 1;
                if *degree == 0 {
                    newly_ready.push(child);
                }
            }
            newly_ready.sort_unstable();
            for child in newly_ready {
                queue.push_back(child);
            }
        }
    }

    if order.len() != edges.len() {
        return Err(DependencyGraphError::CycleDetected);
    }
    Ok(order)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node(name: &str, refs: &[(&str, &str)]) -> DependencyNode {
        DependencyNode {
            name: name.to_string(),
            input_references: refs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect(),
        }
    }

    #[test]
    fn parses_plain_and_field_references() {
        assert_eq!(
            parse_reference("fetch.output"),
            Some(Reference { source_name: "fetch".to_string(), field_path: None })
        );
        assert_eq!(
            parse_reference("fetch.output.body.items"),
            Some(Reference { source_name: "fetch".to_string(), field_path: Some("body.items".to_string()) })
        );
        assert_eq!(parse_reference("not a reference"), None);
    }

    #[test]
    fn builds_order_respecting_dependencies() {
        let nodes = vec![node("a", &[]), node("b", &[("x", "a.output")]), node("c", &[("y", "b.output.total")])];
        let mut builder = DependencyGraphBuilder::new();
        let order = builder.build_order(&nodes).expect("acyclic");
        assert_eq!(order, vec!["a".to_string(), "b".to_string(), "c".to_string()]);
        assert!(builder.warnings().is_empty());
    }

    #[test]
    fn self_reference_and_unknown_reference_are_dropped_with_warning() {
        let nodes = vec![node("a", &[("x", "a.output"), ("y", "missing.output")])];
        let mut builder = DependencyGraphBuilder::new();
        let order = builder.build_order(&nodes).expect("still acyclic, edges dropped");
        assert_eq!(order, vec!["a".to_string()]);
        assert_eq!(builder.warnings().len(), 2);
    }

    #[test]
    fn cycle_is_detected() {
        let nodes = vec![node("a", &[("x", "b.output")]), node("b", &[("y", "a.output")])];
        let mut builder = DependencyGraphBuilder::new();
        assert!(matches!(builder.build_order(&nodes), Err(DependencyGraphError::CycleDetected)));
    }

    #[test]
    fn resolve_inputs_dereferences_field_path() {
        let nodes = [node("b", &[("total", "a.output.sum")])];
        let builder = DependencyGraphBuilder::new();
        let mut outputs = FxHashMap::default();
        outputs.insert("a".to_string(), serde_json::json!({"sum": 42}));
        let resolved = builder.resolve_inputs(&nodes[0], &outputs);
        assert_eq!(resolved.get("total"), Some(&Value::from(42)));
    }
}
