//! Supervision Coordinator (spec component L): owns the conversation
//! supervision, efficiency monitoring, and strategy repository instances,
//! and turns a termination/intervention request into a
//! [`CoordinationBus`] event plus an in-memory audit trail — grounded on
//! the source's `SupervisionCoordinator`.

use super::conversation::ConversationSupervisionModule;
use super::efficiency::{EfficiencyThresholds, WorkflowEfficiencyMonitor};
use super::strategy::StrategyRepository;
use crate::coordination::bus::CoordinationBus;
use crate::coordination::events::TaskTerminationEvent;
use chrono::Utc;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

/// One recorded intervention, outside the WARNING/REPLACE/TERMINATE action
/// taxonomy carried by [`crate::coordination::events::InterventionEvent`]
/// — this is the coordinator's own free-form audit record (spec §4.9's
/// `record_intervention`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InterventionRecord {
    pub intervention_type: String,
    pub reason: String,
    pub source: String,
    pub target_id: String,
    pub severity: String,
    pub timestamp: chrono::DateTime<Utc>,
}

/// The result of [`SupervisionCoordinator::initiate_termination`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TerminationResult {
    pub success: bool,
    pub task_id: String,
    pub termination_type: String,
    pub message: String,
    pub severity: String,
}

/// Owns the three supervision collaborators plus the coordinator's own
/// audit logs, and publishes [`TaskTerminationEvent`]s on the bus so other
/// components (a session manager, a state monitor) can react without
/// polling this struct directly.
pub struct SupervisionCoordinator {
    pub conversation_supervision: ConversationSupervisionModule,
    pub efficiency_monitor: WorkflowEfficiencyMonitor,
    pub strategy_repository: StrategyRepository,
    bus: CoordinationBus,
    termination_events: Mutex<Vec<TaskTerminationEvent>>,
    intervention_events: Mutex<Vec<InterventionRecord>>,
}

impl SupervisionCoordinator {
    pub fn new(bus: CoordinationBus, max_input_length: usize, thresholds: EfficiencyThresholds) -> Self {
        Self {
            conversation_supervision: ConversationSupervisionModule::new(max_input_length),
            efficiency_monitor: WorkflowEfficiencyMonitor::new(thresholds),
            strategy_repository: StrategyRepository::new(),
            bus,
            termination_events: Mutex::new(Vec::new()),
            intervention_events: Mutex::new(Vec::new()),
        }
    }

    /// Terminates a task, publishing a [`TaskTerminationEvent`] and
    /// appending it to the coordinator's own audit log.
    pub fn initiate_termination(
        &self,
        task_id: impl Into<String>,
        reason: impl Into<String>,
        severity: impl Into<String>,
        graceful: bool,
        workflow_id: Option<String>,
    ) -> TerminationResult {
        let task_id = task_id.into();
        let reason = reason.into();
        let severity = severity.into();
        let termination_type = if graceful { "graceful" } else { "immediate" }.to_string();

        let event = TaskTerminationEvent {
            source: "supervision_coordinator".to_string(),
            timestamp: Utc::now(),
            task_id: task_id.clone(),
            workflow_id,
            reason: reason.clone(),
            severity: severity.clone(),
            graceful,
        };
        self.termination_events.lock().push(event.clone());
        self.bus.publish(event);

        TerminationResult {
            success: true,
            message: format!("task {task_id} terminated ({termination_type}): {reason}"),
            task_id,
            termination_type,
            severity,
        }
    }

    pub fn termination_events(&self) -> Vec<TaskTerminationEvent> {
        self.termination_events.lock().clone()
    }

    /// Records an intervention in the coordinator's own audit log. Distinct
    /// from the [`crate::coordination::events::InterventionEvent`] that
    /// [`super::facade::SupervisionFacade::execute_intervention`] publishes
    /// — this is a freeform note, not a WARNING/REPLACE/TERMINATE action.
    pub fn record_intervention(
        &self,
        intervention_type: impl Into<String>,
        reason: impl Into<String>,
        source: impl Into<String>,
        target_id: impl Into<String>,
        severity: impl Into<String>,
    ) -> InterventionRecord {
        let record = InterventionRecord {
            intervention_type: intervention_type.into(),
            reason: reason.into(),
            source: source.into(),
            target_id: target_id.into(),
            severity: severity.into(),
            timestamp: Utc::now(),
        };
        self.intervention_events.lock().push(record.clone());
        record
    }

    pub fn intervention_events(&self) -> Vec<InterventionRecord> {
        self.intervention_events.lock().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn termination_publishes_event_and_logs_audit_entry() {
        let bus = CoordinationBus::new();
        let coordinator = SupervisionCoordinator::new(bus, 50_000, EfficiencyThresholds::default());
        let result = coordinator.initiate_termination("task-1", "runaway loop", "high", false, Some("w1".to_string()));
        assert!(result.success);
        assert_eq!(result.termination_type, "immediate");
        assert_eq!(coordinator.termination_events().len(), 1);
    }

    #[test]
    fn intervention_is_recorded_in_audit_log() {
        let coordinator = SupervisionCoordinator::new(CoordinationBus::new(), 50_000, EfficiencyThresholds::default());
        coordinator.record_intervention("warning", "bias detected", "conversation_supervision", "session-1", "medium");
        assert_eq!(coordinator.intervention_events().len(), 1);
    }
}
