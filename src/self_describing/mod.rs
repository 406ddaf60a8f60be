//! Self-Describing Node Loader/Executor and Dependency Graph Builder
//! (spec components I and J): an alternative to the arena-indexed DAG
//! mode in [`crate::workflow`], where node definitions live on disk as
//! YAML and dependencies are inferred from `name.output[.field]`
//! references rather than declared edges.

pub mod definition;
pub mod dependency_graph;
pub mod executor;
pub mod loader;

pub use definition::{parse_definition, DefinitionError, ExecutorType, NodeDefinition, OnFailure, OutputAggregation};
pub use dependency_graph::{parse_reference, DependencyGraphBuilder, DependencyGraphError, DependencyNode, Reference};
pub use executor::{to_error_code, ChildOutcome, SelfDescribingError, SelfDescribingExecutionEvent, SelfDescribingNodeExecutor, SelfDescribingResult};
pub use loader::YamlNodeLoader;
