//! The Workflow Agent: DAG materialization, scheduling, hierarchical
//! expansion, and the per-workflow execution context it drives (spec
//! components F and H).

pub mod agent;
pub mod monitor;
pub mod plan;

pub use agent::{CancellationToken, HierarchicalResult, OutputValidator, RetryPolicy, WorkflowAgent, WorkflowResult};
pub use monitor::{ErrorHandler, ErrorHandlingAction, ErrorHandlingPolicy, ExecutionContext, ExecutionMetrics, WorkflowStatus};
pub use plan::{EdgeDefinition, NodeDefinition, WorkflowPlan};
