//! Workflow State Monitor (spec component M): an event-sourced, thread-safe
//! aggregate of every workflow's progress, built purely from bus events —
//! distinct from [`crate::workflow::monitor::ExecutionContext`], which is
//! one workflow's own single-owner bookkeeping.
//!
//! `start_monitoring` unsubscribes any previously-recorded tokens before
//! subscribing fresh ones (spec §4.1/§4.8): a second call swaps the
//! registration atomically instead of leaking the prior one, the same
//! discipline [`crate::reflection::ReflectionContextManager`] applies to its
//! single subscription. The optional compression hook (spec §4.8) is swapped
//! the same way, via [`Self::set_compression_callback`].

use crate::coordination::bus::{CoordinationBus, SubscriptionToken};
use crate::coordination::events::{NodeExecutionEvent, NodeExecutionStatus, WorkflowExecutionCompletedEvent, WorkflowExecutionStartedEvent};
use crate::node::NodeId;
use crate::workflow::monitor::WorkflowStatus;
use chrono::{DateTime, Utc};
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;

/// One workflow's aggregated, monitor-side state. Returned only by value
/// (deep copy) from every query method — testable property 4.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowState {
    pub workflow_id: String,
    pub status: WorkflowStatus,
    pub node_count: usize,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub success: Option<bool>,
    pub summary: Option<String>,
    pub executed_nodes: Vec<NodeId>,
    pub running_nodes: Vec<NodeId>,
    pub failed_nodes: Vec<NodeId>,
    pub node_inputs: FxHashMap<NodeId, Value>,
    pub node_outputs: FxHashMap<NodeId, Value>,
    pub node_errors: FxHashMap<NodeId, String>,
}

impl WorkflowState {
    fn new(workflow_id: impl Into<String>, node_count: usize) -> Self {
        Self {
            workflow_id: workflow_id.into(),
            status: WorkflowStatus::Running,
            node_count,
            started_at: Utc::now(),
            completed_at: None,
            success: None,
            summary: None,
            executed_nodes: Vec::new(),
            running_nodes: Vec::new(),
            failed_nodes: Vec::new(),
            node_inputs: FxHashMap::default(),
            node_outputs: FxHashMap::default(),
            node_errors: FxHashMap::default(),
        }
    }
}

/// Counts returned by [`WorkflowStateMonitor::get_system_status`].
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct SystemStatus {
    pub total_workflows: usize,
    pub running_workflows: usize,
    pub completed_workflows: usize,
    pub failed_workflows: usize,
    pub active_nodes: usize,
}

/// Invoked with `(workflow_id, state_snapshot)` whenever compression is
/// enabled and an event updates that workflow's state. A stand-in for the
/// original's full context-compression pipeline, which depends on an LLM
/// summarizer outside this crate's scope — this hook is the seam such a
/// summarizer plugs into. Mirrors
/// [`crate::reflection::ReflectionContextManager`]'s `CompressionCallback`.
pub type StateCompressionCallback = Arc<dyn Fn(String, WorkflowState) + Send + Sync>;

/// Aggregates every workflow's progress from [`CoordinationBus`] events.
/// Cheap to clone (the state map is `Arc`-shared); typically constructed
/// once per process and handed to whichever component needs to query
/// overall progress.
#[derive(Clone)]
pub struct WorkflowStateMonitor {
    bus: CoordinationBus,
    states: Arc<parking_lot::Mutex<FxHashMap<String, WorkflowState>>>,
    subscriptions: Arc<parking_lot::Mutex<Vec<SubscriptionToken>>>,
    compression_callback: Arc<parking_lot::Mutex<Option<StateCompressionCallback>>>,
}

impl WorkflowStateMonitor {
    pub fn new(bus: CoordinationBus) -> Self {
        Self {
            bus,
            states: Arc::new(parking_lot::Mutex::new(FxHashMap::default())),
            subscriptions: Arc::new(parking_lot::Mutex::new(Vec::new())),
            compression_callback: Arc::new(parking_lot::Mutex::new(None)),
        }
    }

    pub fn set_compression_callback(&self, callback: Option<StateCompressionCallback>) {
        *self.compression_callback.lock() = callback;
    }

    /// Subscribes to the three lifecycle event types, recording each
    /// returned [`SubscriptionToken`] so [`Self::stop_monitoring`] can
    /// unsubscribe the exact registrations made here (spec §4.1). Calls
    /// [`Self::stop_monitoring`] first so a second `start_monitoring` swaps
    /// the subscriptions atomically instead of leaking the prior set and
    /// double-delivering events.
    pub fn start_monitoring(&self, enable_compression: bool) {
        self.stop_monitoring();

        let mut tokens = Vec::with_capacity(3);

        let states = self.states.clone();
        let callback_slot = self.compression_callback.clone();
        tokens.push(self.bus.subscribe::<WorkflowExecutionStartedEvent, _, _>(move |event| {
            let states = states.clone();
            let callback_slot = callback_slot.clone();
            async move {
                let snapshot = {
                    let mut states = states.lock();
                    let state = WorkflowState::new(event.workflow_id.clone(), event.node_count);
                    states.insert(event.workflow_id.clone(), state.clone());
                    state
                };
                notify_compression(enable_compression, &callback_slot, event.workflow_id, snapshot);
            }
        }));

        let states = self.states.clone();
        let callback_slot = self.compression_callback.clone();
        tokens.push(self.bus.subscribe::<WorkflowExecutionCompletedEvent, _, _>(move |event| {
            let states = states.clone();
            let callback_slot = callback_slot.clone();
            async move {
                let snapshot = {
                    let mut states = states.lock();
                    let state = states
                        .entry(event.workflow_id.clone())
                        .or_insert_with(|| WorkflowState::new(event.workflow_id.clone(), 0));
                    state.status = if event.success { WorkflowStatus::Completed } else { WorkflowStatus::Failed };
                    state.completed_at = Some(event.timestamp);
                    state.success = Some(event.success);
                    state.summary = Some(event.summary);
                    state.clone()
                };
                notify_compression(enable_compression, &callback_slot, event.workflow_id, snapshot);
            }
        }));

        let states = self.states.clone();
        let callback_slot = self.compression_callback.clone();
        tokens.push(self.bus.subscribe::<NodeExecutionEvent, _, _>(move |event| {
            let states = states.clone();
            let callback_slot = callback_slot.clone();
            async move {
                let snapshot = {
                    let mut states = states.lock();
                    let state = states
                        .entry(event.workflow_id.clone())
                        .or_insert_with(|| WorkflowState::new(event.workflow_id.clone(), 0));
                    match event.status {
                        NodeExecutionStatus::Running => {
                            if !state.running_nodes.contains(&event.node_id) {
                                state.running_nodes.push(event.node_id);
                            }
                            if let Some(output) = &event.output {
                                state.node_inputs.insert(event.node_id, output.clone());
                            }
                        }
                        NodeExecutionStatus::Completed => {
                            state.running_nodes.retain(|id| *id != event.node_id);
                            if !state.executed_nodes.contains(&event.node_id) {
                                state.executed_nodes.push(event.node_id);
                            }
                            if let Some(output) = event.output {
                                state.node_outputs.insert(event.node_id, output);
                            }
                        }
                        NodeExecutionStatus::Failed => {
                            state.running_nodes.retain(|id| *id != event.node_id);
                            if !state.failed_nodes.contains(&event.node_id) {
                                state.failed_nodes.push(event.node_id);
                            }
                            if let Some(message) = event.error_message {
                                state.node_errors.insert(event.node_id, message);
                            }
                        }
                    }
                    state.clone()
                };
                notify_compression(enable_compression, &callback_slot, event.workflow_id, snapshot);
            }
        }));

        *self.subscriptions.lock() = tokens;
    }

    /// Unsubscribes every token recorded by [`Self::start_monitoring`].
    /// Safe to call repeatedly: an empty token list is a no-op, matching
    /// the bus's own duplicate-unsubscribe contract.
    pub fn stop_monitoring(&self) {
        let tokens = std::mem::take(&mut *self.subscriptions.lock());
        for token in tokens {
            self.bus.unsubscribe(token);
        }
    }

    pub fn get_workflow_state(&self, workflow_id: &str) -> Option<WorkflowState> {
        self.states.lock().get(workflow_id).cloned()
    }

    pub fn get_all_workflow_states(&self) -> FxHashMap<String, WorkflowState> {
        self.states.lock().clone()
    }

    pub fn get_system_status(&self) -> SystemStatus {
        let states = self.states.lock();
        let mut status = SystemStatus {
            total_workflows: states.len(),
            ..Default::default()
        };
        for state in states.values() {
            match state.status {
                WorkflowStatus::Running => status.running_workflows += 1,
                WorkflowStatus::Completed => status.completed_workflows += 1,
                WorkflowStatus::Failed => status.failed_workflows += 1,
            }
            status.active_nodes += state.running_nodes.len();
        }
        status
    }

    /// Drops every completed/failed workflow whose `completed_at` is older
    /// than `max_age`. Running workflows are never cleared.
    pub fn clear_old_states(&self, max_age: Duration) {
        let cutoff = Utc::now() - chrono::Duration::from_std(max_age).unwrap_or(chrono::Duration::zero());
        self.states.lock().retain(|_, state| match state.completed_at {
            Some(completed_at) => completed_at > cutoff,
            None => true,
        });
    }

    pub fn clear_workflow_state(&self, workflow_id: &str) -> Option<WorkflowState> {
        self.states.lock().remove(workflow_id)
    }
}

fn notify_compression(
    enabled: bool,
    callback_slot: &parking_lot::Mutex<Option<StateCompressionCallback>>,
    workflow_id: String,
    snapshot: WorkflowState,
) {
    if !enabled {
        return;
    }
    if let Some(callback) = callback_slot.lock().clone() {
        callback(workflow_id, snapshot);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn started_then_node_then_completed_builds_state() {
        let bus = CoordinationBus::new();
        let monitor = WorkflowStateMonitor::new(bus.clone());
        monitor.start_monitoring(false);

        bus.publish(WorkflowExecutionStartedEvent {
            source: "test".into(),
            timestamp: Utc::now(),
            workflow_id: "w1".into(),
            node_count: 2,
        });
        tokio::time::sleep(Duration::from_millis(20)).await;

        bus.publish(NodeExecutionEvent {
            source: "test".into(),
            timestamp: Utc::now(),
            workflow_id: "w1".into(),
            node_id: NodeId(0),
            status: NodeExecutionStatus::Completed,
            output: Some(serde_json::json!({"x": 1})),
            error_message: None,
        });
        tokio::time::sleep(Duration::from_millis(20)).await;

        bus.publish(WorkflowExecutionCompletedEvent {
            source: "test".into(),
            timestamp: Utc::now(),
            workflow_id: "w1".into(),
            success: true,
            summary: "done".into(),
            failed_node: None,
        });
        tokio::time::sleep(Duration::from_millis(20)).await;

        let state = monitor.get_workflow_state("w1").expect("state recorded");
        assert_eq!(state.status, WorkflowStatus::Completed);
        assert_eq!(state.executed_nodes, vec![NodeId(0)]);
        assert_eq!(state.success, Some(true));
    }

    #[tokio::test]
    async fn completed_without_prior_started_creates_minimal_state() {
        let bus = CoordinationBus::new();
        let monitor = WorkflowStateMonitor::new(bus.clone());
        monitor.start_monitoring(false);

        bus.publish(WorkflowExecutionCompletedEvent {
            source: "test".into(),
            timestamp: Utc::now(),
            workflow_id: "orphan".into(),
            success: false,
            summary: "late arrival".into(),
            failed_node: None,
        });
        tokio::time::sleep(Duration::from_millis(20)).await;

        let state = monitor.get_workflow_state("orphan").expect("defensively created");
        assert_eq!(state.status, WorkflowStatus::Failed);
    }

    #[tokio::test]
    async fn stop_monitoring_leaves_zero_residual_subscriptions() {
        let bus = CoordinationBus::new();
        let monitor = WorkflowStateMonitor::new(bus.clone());
        monitor.start_monitoring(false);
        assert_eq!(bus.subscriber_count(), 3);
        monitor.stop_monitoring();
        assert_eq!(bus.subscriber_count(), 0);
        monitor.stop_monitoring();
        assert_eq!(bus.subscriber_count(), 0);
    }

    #[test]
    fn deep_copy_on_read_protects_internal_state() {
        let bus = CoordinationBus::new();
        let monitor = WorkflowStateMonitor::new(bus);
        monitor.states.lock().insert("w1".into(), WorkflowState::new("w1", 1));
        let mut snapshot = monitor.get_workflow_state("w1").unwrap();
        snapshot.node_count = 99;
        assert_eq!(monitor.get_workflow_state("w1").unwrap().node_count, 1);
    }

    #[tokio::test]
    async fn restarting_monitoring_swaps_subscriptions_without_duplicate_delivery() {
        use std::sync::atomic::{AtomicUsize, Ordering};

        let bus = CoordinationBus::new();
        let monitor = WorkflowStateMonitor::new(bus.clone());
        let calls = Arc::new(AtomicUsize::new(0));
        let c1 = calls.clone();
        monitor.set_compression_callback(Some(Arc::new(move |_, _| {
            c1.fetch_add(1, Ordering::SeqCst);
        })));

        monitor.start_monitoring(true);
        monitor.start_monitoring(true);
        assert_eq!(bus.subscriber_count(), 3);

        bus.publish(WorkflowExecutionStartedEvent {
            source: "test".into(),
            timestamp: Utc::now(),
            workflow_id: "w1".into(),
            node_count: 1,
        });
        tokio::time::sleep(Duration::from_millis(20)).await;

        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
