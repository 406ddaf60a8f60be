//! Supervision Facade (spec component L, spec §4.9): the single entry
//! point that turns a triggered supervision finding into an intervention
//! — injecting a warning, queuing a replacement, or terminating a task —
//! and publishes the outcome on the [`CoordinationBus`]. Grounded on the
//! source's `SupervisionFacade.execute_intervention`.

use crate::coordination::bus::CoordinationBus;
use crate::coordination::events::{InterventionAction, InterventionEvent};
use crate::injection::ContextInjectionManager;
use chrono::Utc;
use serde::{Deserialize, Serialize};

/// What triggered an intervention and what it should do about it — the
/// facade's input, built by whatever analyzer (conversation supervision,
/// efficiency monitor, rule engine) found the issue.
#[derive(Debug, Clone)]
pub struct SupervisionInfo {
    pub session_id: String,
    pub action: InterventionAction,
    pub content: String,
    pub trigger_condition: Option<String>,
}

/// What kind of intervention actually ran, after dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InterventionOutcome {
    WarningInjected,
    ContentReplaced,
    TaskTerminated,
}

/// The result of [`SupervisionFacade::execute_intervention`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InterventionResult {
    pub success: bool,
    pub action: InterventionAction,
    pub outcome: InterventionOutcome,
    pub replacement: Option<String>,
}

/// Dispatches [`SupervisionInfo`] to the [`ContextInjectionManager`] and
/// publishes an [`InterventionEvent`] recording what happened. Does not own
/// the analyzers that produce `SupervisionInfo` — those live on
/// [`super::coordinator::SupervisionCoordinator`]; the facade is purely the
/// WARNING/REPLACE/TERMINATE dispatch seam (spec §4.9).
pub struct SupervisionFacade {
    bus: CoordinationBus,
    injection_manager: std::sync::Arc<ContextInjectionManager>,
}

impl SupervisionFacade {
    pub fn new(bus: CoordinationBus, injection_manager: std::sync::Arc<ContextInjectionManager>) -> Self {
        Self { bus, injection_manager }
    }

    /// Executes the intervention named by `info.action`:
    /// - `Warning` injects a warning the planner sees on its next turn.
    /// - `Replace` queues a `Supplement` injection carrying the
    ///   replacement content.
    /// - `Terminate` injects an intervention message explaining why the
    ///   task is ending.
    ///
    /// Always publishes an [`InterventionEvent`], regardless of outcome.
    pub fn execute_intervention(&self, info: &SupervisionInfo) -> InterventionResult {
        let outcome = match info.action {
            InterventionAction::Warning => {
                self.injection_manager.inject_warning(
                    info.session_id.clone(),
                    info.content.clone(),
                    info.trigger_condition.as_deref(),
                    10,
                );
                InterventionOutcome::WarningInjected
            }
            InterventionAction::Replace => {
                self.injection_manager.inject_context(
                    info.session_id.clone(),
                    crate::injection::InjectionType::Supplement,
                    info.content.clone(),
                    info.trigger_condition.clone(),
                    10,
                    "supervision_facade",
                );
                InterventionOutcome::ContentReplaced
            }
            InterventionAction::Terminate => {
                self.injection_manager.inject_intervention(
                    info.session_id.clone(),
                    info.content.clone(),
                    info.trigger_condition.clone(),
                    0,
                );
                InterventionOutcome::TaskTerminated
            }
        };

        self.bus.publish(InterventionEvent {
            source: "supervision_facade".to_string(),
            timestamp: Utc::now(),
            session_id: info.session_id.clone(),
            action: info.action,
            content: info.content.clone(),
            trigger_rule: info.trigger_condition.clone(),
        });

        InterventionResult {
            success: true,
            action: info.action,
            outcome,
            replacement: matches!(info.action, InterventionAction::Replace).then(|| info.content.clone()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::injection::InjectionPoint;
    use std::sync::Arc;
    use std::time::Duration;

    fn facade() -> (SupervisionFacade, CoordinationBus, Arc<ContextInjectionManager>) {
        let bus = CoordinationBus::new();
        let injection_manager = Arc::new(ContextInjectionManager::new(bus.clone()));
        let facade = SupervisionFacade::new(bus.clone(), injection_manager.clone());
        (facade, bus, injection_manager)
    }

    #[test]
    fn warning_action_injects_at_pre_thinking() {
        let (facade, _bus, injection_manager) = facade();
        let result = facade.execute_intervention(&SupervisionInfo {
            session_id: "s1".to_string(),
            action: InterventionAction::Warning,
            content: "bias detected".to_string(),
            trigger_condition: Some("gender_bias".to_string()),
        });
        assert_eq!(result.outcome, InterventionOutcome::WarningInjected);
        let pending = injection_manager.get_pending_injections("s1", InjectionPoint::PreThinking);
        assert_eq!(pending.len(), 1);
    }

    #[test]
    fn replace_action_queues_supplement_with_replacement_content() {
        let (facade, _bus, injection_manager) = facade();
        let result = facade.execute_intervention(&SupervisionInfo {
            session_id: "s1".to_string(),
            action: InterventionAction::Replace,
            content: "sanitized output".to_string(),
            trigger_condition: None,
        });
        assert_eq!(result.replacement.as_deref(), Some("sanitized output"));
        let pending = injection_manager.get_pending_injections("s1", InjectionPoint::PreLoop);
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].injection_type, crate::injection::InjectionType::Supplement);
    }

    #[tokio::test]
    async fn terminate_action_injects_at_intervention_point_and_publishes_event() {
        let (facade, bus, injection_manager) = facade();
        let events: Arc<parking_lot::Mutex<Vec<InterventionEvent>>> = Arc::new(parking_lot::Mutex::new(Vec::new()));
        let sink = events.clone();
        bus.subscribe::<InterventionEvent, _, _>(move |event| {
            let sink = sink.clone();
            async move {
                sink.lock().push(event);
            }
        });

        facade.execute_intervention(&SupervisionInfo {
            session_id: "s1".to_string(),
            action: InterventionAction::Terminate,
            content: "runaway loop".to_string(),
            trigger_condition: Some("max_iterations".to_string()),
        });

        let pending = injection_manager.get_pending_injections("s1", InjectionPoint::Intervention);
        assert_eq!(pending.len(), 1);

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(events.lock().len(), 1);
    }
}
