//! The YAML node-definition schema (spec §4.7): the on-disk description
//! of a self-describing node, independent of the in-memory [`crate::node`]
//! arena used by the DAG-mode workflow agent.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// What kind of work a leaf (non-`nested`) node definition performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutorType {
    Code,
    Llm,
    Parallel,
    Sequential,
}

/// What to do when a child of a `nested` node fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OnFailure {
    Abort,
    Skip,
    Continue,
}

/// How to combine `nested` children's outputs into the parent's output
/// (spec §4.7's aggregation table).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputAggregation {
    Merge,
    List,
    First,
    Last,
}

impl Default for OutputAggregation {
    fn default() -> Self {
        Self::Merge
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RetryConfig {
    #[serde(default)]
    pub max_attempts: u32,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ErrorStrategy {
    #[serde(default)]
    pub on_failure: OnFailure,
    #[serde(default)]
    pub retry: RetryConfig,
}

impl Default for OnFailure {
    fn default() -> Self {
        Self::Abort
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExecutionConfig {
    #[serde(default)]
    pub timeout_seconds: Option<u64>,
    #[serde(default)]
    pub sandbox: Option<String>,
}

/// A single declared input/output parameter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParameterSpec {
    pub name: String,
    #[serde(rename = "type", default)]
    pub param_type: Option<String>,
    #[serde(default)]
    pub required: bool,
    #[serde(default)]
    pub default: Option<Value>,
    #[serde(default)]
    pub description: Option<String>,
}

/// A `nested` node's fan-out configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NestedConfig {
    #[serde(default)]
    pub parallel: bool,
    pub children: Vec<String>,
}

/// The full on-disk shape of one node's YAML definition (spec §4.7).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeDefinition {
    pub name: String,
    #[serde(default = "default_kind")]
    pub kind: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub author: String,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub category: String,
    pub executor_type: ExecutorType,
    #[serde(default)]
    pub language: Option<String>,
    #[serde(default)]
    pub parameters: Vec<ParameterSpec>,
    #[serde(default)]
    pub returns: Option<String>,
    #[serde(default)]
    pub nested: Option<NestedConfig>,
    #[serde(default)]
    pub error_strategy: ErrorStrategy,
    #[serde(default)]
    pub execution: ExecutionConfig,
    #[serde(default)]
    pub output_aggregation: OutputAggregation,
}

fn default_kind() -> String {
    "node".to_string()
}

impl NodeDefinition {
    pub fn has_children(&self) -> bool {
        self.nested.is_some()
    }
}

/// Errors raised parsing or validating a node definition.
#[derive(Debug, Error)]
pub enum DefinitionError {
    #[error("node definition {0} not found")]
    NotFound(String),
    #[error("cannot parse YAML for node definition: {0}")]
    ParseError(#[from] serde_yaml::Error),
    #[error("node definition '{name}' declares a nested block with no children")]
    EmptyNestedChildren { name: String },
}

/// Parses one YAML document into a [`NodeDefinition`], rejecting a
/// `nested` block with missing or empty `children` (spec §4.7).
pub fn parse_definition(yaml: &str) -> Result<NodeDefinition, DefinitionError> {
    let definition: NodeDefinition = serde_yaml::from_str(yaml)?;
    if let Some(nested) = &definition.nested {
        if nested.children.is_empty() {
            return Err(DefinitionError::EmptyNestedChildren { name: definition.name.clone() });
        }
    }
    Ok(definition)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_minimal_code_definition() {
        let yaml = r#"
name: sum_values
executor_type: code
language: python
parameters:
  - name: values
    required: true
"#;
        let definition = parse_definition(yaml).expect("parses");
        assert_eq!(definition.name, "sum_values");
        assert_eq!(definition.executor_type, ExecutorType::Code);
        assert!(!definition.has_children());
    }

    #[test]
    fn nested_without_children_is_rejected() {
        let yaml = r#"
name: broken
executor_type: sequential
nested:
  parallel: false
  children: []
"#;
        assert!(matches!(parse_definition(yaml), Err(DefinitionError::EmptyNestedChildren { .. })));
    }

    #[test]
    fn malformed_yaml_is_a_parse_error() {
        let yaml = "name: [unterminated";
        assert!(matches!(parse_definition(yaml), Err(DefinitionError::ParseError(_))));
    }
}
