//! # weavegraph-coordinator
//!
//! Coordination runtime for a multi-agent workflow execution system: three
//! cooperating agents — a planner (Conversation Agent), an executor
//! (Workflow Agent), and a supervisor (Coordinator Agent) — turn a
//! natural-language goal into a DAG of typed nodes, execute it with
//! conditional branching and data propagation, and supervise the loop with
//! rule-based validation, context injection, and safety interventions.
//!
//! ## Module guide
//!
//! - [`error`] — shared error taxonomy and `ExecutionResult`
//! - [`config`] — runtime configuration, loadable from the environment
//! - [`coordination`] — typed event bus coupling the three agents
//! - [`context`] — hierarchical global/session/workflow context storage
//! - [`rules`] — rule repository, restricted expression evaluator, generator, goal alignment
//! - [`decision`] — decision validator built on the rule repository
//! - [`node`] — node/edge data model and the node-type schema registry
//! - [`executor`] — external `NodeExecutor`/`CodeSandbox`/LLM interfaces
//! - [`workflow`] — the workflow agent: DAG materialization, scheduling, execution
//! - [`self_describing`] — YAML-defined nodes dispatched to code/LLM/container executors
//! - [`injection`] — context injection queue consumed by the planner loop
//! - [`supervision`] — bias/harmful/stability/efficiency monitors and intervention execution
//! - [`state_monitor`] — event-sourced workflow progress snapshots
//! - [`reflection`] — post-execution reflection history
//! - [`codegen`] — gap analysis → synthesis → sandboxed self-test → registration

pub mod codegen;
pub mod config;
pub mod context;
pub mod coordination;
pub mod decision;
pub mod error;
pub mod executor;
pub mod injection;
pub mod node;
pub mod reflection;
pub mod rules;
pub mod self_describing;
pub mod state_monitor;
pub mod supervision;
pub mod workflow;
