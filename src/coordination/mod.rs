//! The typed event bus coupling the Conversation, Workflow, and Coordinator
//! agents, plus the event payloads they exchange.

pub mod bus;
pub mod events;

pub use bus::{CoordinationBus, SubscriptionToken};
pub use events::{
    ContextInjectionEvent, ExecutionProgressEvent, InterventionAction, InterventionEvent,
    NodeExecutionEvent, NodeExecutionStatus, TaskTerminationEvent, WorkflowExecutionCompletedEvent,
    WorkflowExecutionStartedEvent, WorkflowReflectionCompletedEvent,
};
