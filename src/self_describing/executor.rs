//! Self-Describing Node Executor (spec §4.7, component I): loads a YAML
//! node definition and runs it — dispatching to the code sandbox, an LLM
//! executor, or a plain echo, and recursing into `nested` children with
//! the declared aggregation and failure strategy.

use super::definition::{ExecutorType, NodeDefinition, OnFailure, OutputAggregation};
use super::loader::YamlNodeLoader;
use crate::coordination::bus::CoordinationBus;
use crate::error::ErrorCode;
use crate::executor::{CodeSandbox, SandboxConfig};
use chrono::Utc;
use futures_util::future::join_all;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;

/// Published when a self-describing node begins/ends execution. A
/// separate event type from [`crate::coordination::events::NodeExecutionEvent`]
/// since dependency-graph-mode nodes are identified by name, not
/// [`crate::node::NodeId`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SelfDescribingExecutionEvent {
    pub source: String,
    pub timestamp: chrono::DateTime<Utc>,
    pub name: String,
    pub status: String,
    pub execution_time_ms: Option<u64>,
    pub error_message: Option<String>,
}

#[derive(Debug, Error)]
pub enum SelfDescribingError {
    #[error("node definition error: {0}")]
    Definition(#[from] super::definition::DefinitionError),
    #[error("missing required parameter '{0}'")]
    MissingParameter(String),
    #[error("node '{0}' has no companion script")]
    ScriptNotFound(String),
    #[error("child '{child}' failed: {message}")]
    ChildFailed {
        child: String,
        message: String,
        /// Surviving siblings' outcomes at the point of abort (spec §4.7
        /// step 4: "include `children_results`"). Empty for a leaf-level
        /// failure, where there are no siblings to report.
        partial: Vec<ChildOutcome>,
    },
}

/// One child's outcome, recorded alongside a `nested` node's own result
/// (spec §4.7: "include `children_results`" on abort).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChildOutcome {
    pub name: String,
    pub success: bool,
    pub output: Value,
    pub error_message: Option<String>,
}

/// The result of [`SelfDescribingNodeExecutor::execute_node`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SelfDescribingResult {
    pub success: bool,
    pub output: Map<String, Value>,
    pub error_message: Option<String>,
    pub children_results: Vec<ChildOutcome>,
    pub execution_time_ms: u64,
}

/// Dispatches self-describing YAML node definitions, recursing into
/// `nested` children and falling back to the code sandbox / LLM interface
/// / trivial echo for leaves (spec §4.7).
pub struct SelfDescribingNodeExecutor {
    loader: YamlNodeLoader,
    sandbox: Arc<dyn CodeSandbox>,
    bus: CoordinationBus,
    script_extensions: Vec<&'static str>,
}

impl SelfDescribingNodeExecutor {
    pub fn new(loader: YamlNodeLoader, sandbox: Arc<dyn CodeSandbox>, bus: CoordinationBus) -> Self {
        Self {
            loader,
            sandbox,
            bus,
            script_extensions: vec!["py", "js", "ts"],
        }
    }

    fn publish(&self, name: &str, status: &str, execution_time_ms: Option<u64>, error_message: Option<String>) {
        self.bus.publish(SelfDescribingExecutionEvent {
            source: "self_describing_executor".to_string(),
            timestamp: Utc::now(),
            name: name.to_string(),
            status: status.to_string(),
            execution_time_ms,
            error_message,
        });
    }

    /// Runs the full spec §4.7 algorithm for the node named `name`.
    pub async fn execute_node(&self, name: &str, inputs: Map<String, Value>) -> Result<SelfDescribingResult, SelfDescribingError> {
        let started = Instant::now();
        let definition = self.loader.load(name)?;

        self.publish(name, "started", None, None);

        let inputs = Self::apply_defaults(&definition, inputs)?;

        let result = if definition.has_children() {
            self.execute_children(&definition, inputs).await
        } else {
            self.execute_leaf(&definition, &inputs).await
        };

        let elapsed_ms = started.elapsed().as_millis() as u64;
        match result {
            Ok(outcome) => {
                self.publish(name, "completed", Some(elapsed_ms), None);
                Ok(SelfDescribingResult { execution_time_ms: elapsed_ms, ..outcome })
            }
            Err(err) => {
                self.publish(name, "failed", Some(elapsed_ms), Some(err.to_string()));
                Err(err)
            }
        }
    }

    fn apply_defaults(definition: &NodeDefinition, mut inputs: Map<String, Value>) -> Result<Map<String, Value>, SelfDescribingError> {
        for param in &definition.parameters {
            if !inputs.contains_key(&param.name) {
                if let Some(default) = &param.default {
                    inputs.insert(param.name.clone(), default.clone());
                } else if param.required {
                    return Err(SelfDescribingError::MissingParameter(param.name.clone()));
                }
            }
        }
        Ok(inputs)
    }

    async fn execute_leaf(&self, definition: &NodeDefinition, inputs: &Map<String, Value>) -> Result<SelfDescribingResult, SelfDescribingError> {
        match definition.executor_type {
            ExecutorType::Code => self.execute_code_leaf(definition, inputs).await,
            ExecutorType::Llm => Ok(SelfDescribingResult {
                success: true,
                output: Map::from_iter([("echo".to_string(), Value::Object(inputs.clone()))]),
                error_message: None,
                children_results: Vec::new(),
                execution_time_ms: 0,
            }),
            ExecutorType::Parallel | ExecutorType::Sequential => Ok(SelfDescribingResult {
                success: true,
                output: inputs.clone(),
                error_message: None,
                children_results: Vec::new(),
                execution_time_ms: 0,
            }),
        }
    }

    async fn execute_code_leaf(&self, definition: &NodeDefinition, inputs: &Map<String, Value>) -> Result<SelfDescribingResult, SelfDescribingError> {
        let (_, code) = self
            .loader
            .load_script(&definition.name, &self.script_extensions)
            .ok_or_else(|| SelfDescribingError::ScriptNotFound(definition.name.clone()))?;

        let timeout = definition
            .execution
            .timeout_seconds
            .map(Duration::from_secs)
            .unwrap_or_else(|| SandboxConfig::default().timeout);
        let config = SandboxConfig { timeout, memory_limit_mb: None };

        let sandbox_result = self.sandbox.execute(&code, &config, inputs).await;
        if sandbox_result.timed_out {
            return Err(SelfDescribingError::ChildFailed {
                child: definition.name.clone(),
                message: "TIMEOUT".to_string(),
                partial: Vec::new(),
            });
        }
        if !sandbox_result.success {
            return Err(SelfDescribingError::ChildFailed {
                child: definition.name.clone(),
                message: if sandbox_result.stderr.is_empty() { "sandbox execution failed".to_string() } else { sandbox_result.stderr },
                partial: Vec::new(),
            });
        }
        Ok(SelfDescribingResult {
            success: true,
            output: sandbox_result.output_data,
            error_message: None,
            children_results: Vec::new(),
            execution_time_ms: 0,
        })
    }

    async fn execute_children(&self, definition: &NodeDefinition, inputs: Map<String, Value>) -> Result<SelfDescribingResult, SelfDescribingError> {
        let nested = definition.nested.as_ref().expect("has_children checked by caller");

        let outcomes: Vec<ChildOutcome> = if nested.parallel {
            let futures = nested.children.iter().map(|child_name| {
                let inputs = inputs.clone();
                async move { self.run_child(child_name, inputs).await }
            });
            join_all(futures).await
        } else {
            let mut outcomes = Vec::with_capacity(nested.children.len());
            let mut running_input = inputs;
            for child_name in &nested.children {
                let outcome = self.run_child(child_name, running_input.clone()).await;
                if outcome.success {
                    if let Value::Object(map) = &outcome.output {
                        running_input.extend(map.clone());
                    }
                }
                let should_abort = !outcome.success && matches!(definition.error_strategy.on_failure, OnFailure::Abort);
                outcomes.push(outcome);
                if should_abort {
                    break;
                }
            }
            outcomes
        };

        let any_abort_failure = matches!(definition.error_strategy.on_failure, OnFailure::Abort) && outcomes.iter().any(|o| !o.success);
        if any_abort_failure {
            let failed_index = outcomes.iter().position(|o| !o.success).expect("at least one failure");
            let failed = outcomes[failed_index].clone();
            let partial: Vec<ChildOutcome> = outcomes.into_iter().enumerate().filter(|(i, _)| *i != failed_index).map(|(_, o)| o).collect();
            return Err(SelfDescribingError::ChildFailed {
                child: failed.name,
                message: failed.error_message.unwrap_or_default(),
                partial,
            });
        }

        let surviving: Vec<&ChildOutcome> = outcomes.iter().filter(|o| o.success).collect();
        let output = match definition.output_aggregation {
            OutputAggregation::Merge => {
                let mut merged = Map::new();
                for outcome in &surviving {
                    merged.insert(outcome.name.clone(), outcome.output.clone());
                }
                merged
            }
            OutputAggregation::List => {
                let results: Vec<Value> = surviving.iter().map(|o| o.output.clone()).collect();
                Map::from_iter([("results".to_string(), Value::Array(results))])
            }
            OutputAggregation::First => match surviving.first() {
                Some(outcome) => outcome.output.as_object().cloned().unwrap_or_default(),
                None => Map::new(),
            },
            OutputAggregation::Last => match surviving.last() {
                Some(outcome) => outcome.output.as_object().cloned().unwrap_or_default(),
                None => Map::new(),
            },
        };

        Ok(SelfDescribingResult {
            success: true,
            output,
            error_message: None,
            children_results: outcomes,
            execution_time_ms: 0,
        })
    }

    fn run_child<'a>(&'a self, child_name: &'a str, inputs: Map<String, Value>) -> std::pin::Pin<Box<dyn std::future::Future<Output = ChildOutcome> + Send + 'a>> {
        Box::pin(async move {
            match self.execute_node(child_name, inputs).await {
                Ok(result) => ChildOutcome {
                    name: child_name.to_string(),
                    success: result.success,
                    output: Value::Object(result.output),
                    error_message: result.error_message,
                },
                Err(err) => ChildOutcome {
                    name: child_name.to_string(),
                    success: false,
                    output: Value::Object(Map::new()),
                    error_message: Some(err.to_string()),
                },
            }
        })
    }
}

/// Translates a [`SelfDescribingError`] into the engine's
/// [`ErrorCode`] taxonomy, for adapters that bridge this executor into the
/// DAG-mode [`crate::executor::NodeExecutor`] trait.
pub fn to_error_code(error: &SelfDescribingError) -> ErrorCode {
    match error {
        SelfDescribingError::Definition(_) => ErrorCode::NodeNotFound,
        SelfDescribingError::MissingParameter(_) => ErrorCode::ValidationFailed,
        SelfDescribingError::ScriptNotFound(_) => ErrorCode::ValidationFailed,
        SelfDescribingError::ChildFailed { message, .. } if message == "TIMEOUT" => ErrorCode::Timeout,
        SelfDescribingError::ChildFailed { .. } => ErrorCode::UpstreamError,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use tempfile::tempdir;

    struct EchoSandbox;

    #[async_trait]
    impl CodeSandbox for EchoSandbox {
        async fn execute(&self, _code: &str, _config: &SandboxConfig, input_data: &Map<String, Value>) -> crate::executor::SandboxResult {
            let mut output_data = Map::new();
            let total: f64 = input_data
                .get("values")
                .and_then(Value::as_array)
                .map(|values| values.iter().filter_map(Value::as_f64).sum())
                .unwrap_or(0.0);
            output_data.insert("total".to_string(), Value::from(total));
            crate::executor::SandboxResult {
                success: true,
                output_data,
                stdout: String::new(),
                stderr: String::new(),
                timed_out: false,
            }
        }
    }

    fn write_definition(dir: &std::path::Path, name: &str, yaml: &str) {
        std::fs::create_dir_all(dir).unwrap();
        std::fs::write(dir.join(format!("{name}.yaml")), yaml).unwrap();
    }

    #[tokio::test]
    async fn code_leaf_runs_through_sandbox() {
        let dir = tempdir().unwrap();
        let defs = dir.path().join("defs");
        let scripts = dir.path().join("scripts");
        write_definition(
            &defs,
            "sum_values",
            "name: sum_values\nexecutor_type: code\nlanguage: python\nparameters:\n  - name: values\n    required: true\n",
        );
        std::fs::create_dir_all(&scripts).unwrap();
        std::fs::write(scripts.join("sum_values.py"), "output_data = {'total': sum(values)}\n").unwrap();

        let loader = YamlNodeLoader::new(&defs, &scripts);
        let executor = SelfDescribingNodeExecutor::new(loader, Arc::new(EchoSandbox), CoordinationBus::new());

        let mut inputs = Map::new();
        inputs.insert("values".to_string(), Value::from(vec![1, 2, 3]));
        let result = executor.execute_node("sum_values", inputs).await.expect("succeeds");
        assert!(result.success);
        assert_eq!(result.output.get("total"), Some(&Value::from(6.0)));
    }

    #[tokio::test]
    async fn missing_required_parameter_fails() {
        let dir = tempdir().unwrap();
        let defs = dir.path().join("defs");
        write_definition(&defs, "needs_x", "name: needs_x\nexecutor_type: code\nparameters:\n  - name: x\n    required: true\n");
        let loader = YamlNodeLoader::new(&defs, dir.path().join("scripts"));
        let executor = SelfDescribingNodeExecutor::new(loader, Arc::new(EchoSandbox), CoordinationBus::new());
        let result = executor.execute_node("needs_x", Map::new()).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn sequential_children_merge_into_parent_output() {
        let dir = tempdir().unwrap();
        let defs = dir.path().join("defs");
        let scripts = dir.path().join("scripts");
        write_definition(
            &defs,
            "pipeline",
            "name: pipeline\nexecutor_type: sequential\nnested:\n  parallel: false\n  children: [step_a, step_b]\noutput_aggregation: merge\n",
        );
        write_definition(&defs, "step_a", "name: step_a\nexecutor_type: llm\n");
        write_definition(&defs, "step_b", "name: step_b\nexecutor_type: llm\n");
        std::fs::create_dir_all(&scripts).unwrap();

        let loader = YamlNodeLoader::new(&defs, &scripts);
        let executor = SelfDescribingNodeExecutor::new(loader, Arc::new(EchoSandbox), CoordinationBus::new());
        let result = executor.execute_node("pipeline", Map::new()).await.expect("succeeds");
        assert!(result.success);
        assert_eq!(result.children_results.len(), 2);
        assert!(result.output.contains_key("step_a"));
        assert!(result.output.contains_key("step_b"));
    }

    #[tokio::test]
    async fn abort_on_child_failure_surfaces_surviving_siblings() {
        let dir = tempdir().unwrap();
        let defs = dir.path().join("defs");
        let scripts = dir.path().join("scripts");
        write_definition(
            &defs,
            "pipeline",
            "name: pipeline\nexecutor_type: sequential\nnested:\n  parallel: false\n  children: [step_a, step_b]\nerror_strategy:\n  on_failure: abort\n",
        );
        write_definition(&defs, "step_a", "name: step_a\nexecutor_type: llm\n");
        write_definition(
            &defs,
            "step_b",
            "name: step_b\nexecutor_type: code\nlanguage: python\n",
        );
        std::fs::create_dir_all(&scripts).unwrap();

        let loader = YamlNodeLoader::new(&defs, &scripts);
        let executor = SelfDescribingNodeExecutor::new(loader, Arc::new(EchoSandbox), CoordinationBus::new());
        let err = executor.execute_node("pipeline", Map::new()).await.expect_err("step_b has no script");

        match err {
            SelfDescribingError::ChildFailed { child, partial, .. } => {
                assert_eq!(child, "step_b");
                assert_eq!(partial.len(), 1);
                assert_eq!(partial[0].name, "step_a");
                assert!(partial[0].success);
            }
            other => panic!("expected ChildFailed, got {other:?}"),
        }
    }
}
