//! Node-type schema registry (spec component G).
//!
//! A [`NodeSchema`] is a small, hand-rolled JSON-Schema-like shape — not a
//! dependency on a general `jsonschema` crate, since the validation surface
//! this system needs (required fields, primitive type match, range/enum/
//! pattern constraints, allowed child types) is narrow enough to keep
//! self-contained.

use super::NodeType;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Primitive JSON types a [`FieldSchema`] can require.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    String,
    Number,
    Integer,
    Boolean,
    Array,
    Object,
}

impl FieldType {
    fn matches(self, value: &Value) -> bool {
        match self {
            FieldType::String => value.is_string(),
            FieldType::Number => value.is_number(),
            FieldType::Integer => value.is_i64() || value.is_u64(),
            FieldType::Boolean => value.is_boolean(),
            FieldType::Array => value.is_array(),
            FieldType::Object => value.is_object(),
        }
    }
}

/// A constraint attached to one field, checked after the type check passes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Constraint {
    Range { min: Option<f64>, max: Option<f64> },
    Enum(Vec<Value>),
    Pattern(String),
}

/// One field's shape within a [`NodeSchema`]'s input or output.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldSchema {
    pub ty: FieldType,
    #[serde(default)]
    pub required: bool,
    #[serde(default)]
    pub default: Option<Value>,
    #[serde(default)]
    pub constraint: Option<Constraint>,
}

impl FieldSchema {
    pub fn new(ty: FieldType) -> Self {
        Self {
            ty,
            required: false,
            default: None,
            constraint: None,
        }
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn with_default(mut self, default: Value) -> Self {
        self.default = Some(default);
        self
    }

    pub fn with_constraint(mut self, constraint: Constraint) -> Self {
        self.constraint = Some(constraint);
        self
    }
}

/// One violation surfaced by [`NodeSchema::validate`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SchemaViolation {
    #[error("missing required field: {0}")]
    MissingRequired(String),
    #[error("field {field} has wrong type: expected {expected:?}")]
    WrongType { field: String, expected: FieldType },
    #[error("field {field} is out of range")]
    OutOfRange { field: String },
    #[error("field {field} is not one of the allowed values")]
    NotInEnum { field: String },
    #[error("field {field} does not match pattern {pattern}")]
    PatternMismatch { field: String, pattern: String },
}

/// A node type's declared input/output shape, allowed children, and
/// description.
#[derive(Debug, Clone)]
pub struct NodeSchema {
    pub node_type: NodeType,
    pub description: String,
    pub input: FxHashMap<String, FieldSchema>,
    pub output: FxHashMap<String, FieldSchema>,
    /// Empty iff this node type may never host children. Non-empty implies
    /// it may, restricted to the listed child types.
    pub allowed_child_types: Vec<NodeType>,
}

impl NodeSchema {
    pub fn new(node_type: NodeType, description: impl Into<String>) -> Self {
        Self {
            node_type,
            description: description.into(),
            input: FxHashMap::default(),
            output: FxHashMap::default(),
            allowed_child_types: Vec::new(),
        }
    }

    pub fn with_input(mut self, field: impl Into<String>, schema: FieldSchema) -> Self {
        self.input.insert(field.into(), schema);
        self
    }

    pub fn with_output(mut self, field: impl Into<String>, schema: FieldSchema) -> Self {
        self.output.insert(field.into(), schema);
        self
    }

    pub fn allowing_children(mut self, types: impl IntoIterator<Item = NodeType>) -> Self {
        self.allowed_child_types = types.into_iter().collect();
        self
    }

    /// Validates `config` against this schema's `input` fields: required
    /// fields present, supplied fields' types match, constraints pass.
    /// Collects every violation rather than stopping at the first.
    pub fn validate(&self, config: &Map<String, Value>) -> Result<(), Vec<SchemaViolation>> {
        let mut violations = Vec::new();
        for (name, field) in &self.input {
            match config.get(name) {
                None => {
                    if field.required {
                        violations.push(SchemaViolation::MissingRequired(name.clone()));
                    }
                }
                Some(value) => {
                    if !field.ty.matches(value) {
                        violations.push(SchemaViolation::WrongType {
                            field: name.clone(),
                            expected: field.ty,
                        });
                        continue;
                    }
                    if let Some(constraint) = &field.constraint {
                        check_constraint(name, value, constraint, &mut violations);
                    }
                }
            }
        }
        if violations.is_empty() {
            Ok(())
        } else {
            Err(violations)
        }
    }

    /// Applies this schema's field defaults to `config`, leaving already-set
    /// fields untouched.
    pub fn apply_defaults(&self, config: &mut Map<String, Value>) {
        for (name, field) in &self.input {
            if !config.contains_key(name) {
                if let Some(default) = &field.default {
                    config.insert(name.clone(), default.clone());
                }
            }
        }
    }
}

fn check_constraint(
    field: &str,
    value: &Value,
    constraint: &Constraint,
    violations: &mut Vec<SchemaViolation>,
) {
    match constraint {
        Constraint::Range { min, max } => {
            let Some(n) = value.as_f64() else { return };
            let ok = min.is_none_or(|m| n >= m) && max.is_none_or(|m| n <= m);
            if !ok {
                violations.push(SchemaViolation::OutOfRange {
                    field: field.to_string(),
                });
            }
        }
        Constraint::Enum(allowed) => {
            if !allowed.contains(value) {
                violations.push(SchemaViolation::NotInEnum {
                    field: field.to_string(),
                });
            }
        }
        Constraint::Pattern(pattern) => {
            let Some(s) = value.as_str() else { return };
            let matches = regex::Regex::new(pattern).map(|re| re.is_match(s)).unwrap_or(false);
            if !matches {
                violations.push(SchemaViolation::PatternMismatch {
                    field: field.to_string(),
                    pattern: pattern.clone(),
                });
            }
        }
    }
}

/// Ships predefined schemas for every non-virtual built-in [`NodeType`] and
/// enforces the allowed-child-types rule on attach.
#[derive(Debug, Clone)]
pub struct NodeTypeRegistry {
    schemas: FxHashMap<NodeType, NodeSchema>,
}

impl Default for NodeTypeRegistry {
    fn default() -> Self {
        let mut schemas = FxHashMap::default();
        for schema in builtin_schemas() {
            schemas.insert(schema.node_type, schema);
        }
        Self { schemas }
    }
}

impl NodeTypeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn schema(&self, node_type: NodeType) -> Option<&NodeSchema> {
        self.schemas.get(&node_type)
    }

    pub fn register(&mut self, schema: NodeSchema) {
        self.schemas.insert(schema.node_type, schema);
    }

    /// GENERIC permits the full set of built-in types, including itself
    /// (self-nesting), per spec §4.5.
    pub fn validate_child(
        &self,
        parent_type: NodeType,
        child_type: NodeType,
    ) -> Result<(), SchemaViolation> {
        let allowed = self
            .schemas
            .get(&parent_type)
            .map(|s| s.allowed_child_types.contains(&child_type))
            .unwrap_or(false);
        if allowed {
            Ok(())
        } else {
            Err(SchemaViolation::NotInEnum {
                field: "child_type".to_string(),
            })
        }
    }
}

fn builtin_schemas() -> Vec<NodeSchema> {
    use NodeType::*;
    let all_types = [
        Llm, Api, Code, Condition, Loop, Parallel, Knowledge, Classify, Template, Mcp, Generic,
        File, DataProcess, Human, Container,
    ];

    vec![
        NodeSchema::new(Llm, "invokes the configured LLM planner/reflector")
            .with_input("prompt", FieldSchema::new(FieldType::String).required())
            .with_input("temperature", FieldSchema::new(FieldType::Number).with_default(0.7.into())),
        NodeSchema::new(Api, "calls an external HTTP endpoint")
            .with_input("url", FieldSchema::new(FieldType::String).required())
            .with_input("method", FieldSchema::new(FieldType::String).with_default("GET".into())),
        NodeSchema::new(Code, "runs a script in the code sandbox")
            .with_input("script", FieldSchema::new(FieldType::String).required()),
        NodeSchema::new(Condition, "gates downstream edges by evaluating an expression")
            .with_input("expression", FieldSchema::new(FieldType::String).required())
            .allowing_children(all_types),
        NodeSchema::new(Loop, "repeats its children until a condition is met")
            .with_input(
                "max_iterations",
                FieldSchema::new(FieldType::Integer)
                    .with_default(10.into())
                    .with_constraint(Constraint::Range {
                        min: Some(1.0),
                        max: Some(10_000.0),
                    }),
            )
            .allowing_children(all_types),
        NodeSchema::new(Parallel, "fans its children out concurrently")
            .allowing_children(all_types),
        NodeSchema::new(Knowledge, "retrieves from a knowledge source")
            .with_input("query", FieldSchema::new(FieldType::String).required()),
        NodeSchema::new(Classify, "classifies input into one of several labels")
            .with_input("labels", FieldSchema::new(FieldType::Array).required()),
        NodeSchema::new(Template, "renders a string template against inputs")
            .with_input("template", FieldSchema::new(FieldType::String).required()),
        NodeSchema::new(Mcp, "invokes a Model Context Protocol tool")
            .with_input("tool", FieldSchema::new(FieldType::String).required()),
        NodeSchema::new(Generic, "user-defined behavior via `_custom_type`")
            .allowing_children(all_types),
        NodeSchema::new(File, "reads or writes a file")
            .with_input("path", FieldSchema::new(FieldType::String).required()),
        NodeSchema::new(DataProcess, "transforms structured data")
            .with_input("operation", FieldSchema::new(FieldType::String).required()),
        NodeSchema::new(Human, "suspends for human-in-the-loop input")
            .with_input("prompt", FieldSchema::new(FieldType::String).required()),
        NodeSchema::new(Container, "hosts a sub-workflow executed by a container executor")
            .with_input("container_config", FieldSchema::new(FieldType::Object).required())
            .allowing_children(all_types),
    ]
}
