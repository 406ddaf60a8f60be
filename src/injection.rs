//! Context Injection Manager (spec component K): a priority-ordered, typed
//! queue of content the supervisor wants the planner to see on its next
//! loop turn.
//!
//! Injections are queued per `session_id` and drained by `injection_point`;
//! every enqueue also publishes a [`ContextInjectionEvent`] on the
//! [`CoordinationBus`] so a state monitor or audit log can observe it
//! without polling the queue.

use crate::coordination::bus::CoordinationBus;
use crate::coordination::events::ContextInjectionEvent;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

/// What kind of content an injection carries (spec §3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum InjectionType {
    Warning,
    Intervention,
    Memory,
    Observation,
    Supplement,
}

/// Where in the planner's loop an injection is delivered (spec §3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum InjectionPoint {
    PreLoop,
    PreThinking,
    PostThinking,
    Intervention,
}

/// `WARNING` maps to `PRE_THINKING`; `INTERVENTION` maps to `INTERVENTION`;
/// everything else defaults to `PRE_LOOP` (spec §3 invariant).
fn point_for(injection_type: InjectionType) -> InjectionPoint {
    match injection_type {
        InjectionType::Warning => InjectionPoint::PreThinking,
        InjectionType::Intervention => InjectionPoint::Intervention,
        _ => InjectionPoint::PreLoop,
    }
}

/// One queued unit of context (spec §3 `ContextInjection`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContextInjection {
    pub session_id: String,
    pub injection_type: InjectionType,
    pub injection_point: InjectionPoint,
    pub content: String,
    pub source: String,
    pub reason: Option<String>,
    pub priority: i32,
    pub created_at: DateTime<Utc>,
}

/// Per-session FIFO-by-priority queues, drained by [`InjectionPoint`].
pub struct ContextInjectionManager {
    bus: CoordinationBus,
    queues: Mutex<FxHashMap<String, Vec<ContextInjection>>>,
}

impl ContextInjectionManager {
    pub fn new(bus: CoordinationBus) -> Self {
        Self {
            bus,
            queues: Mutex::new(FxHashMap::default()),
        }
    }

    /// Generic constructor used by every convenience method (spec §4.10):
    /// derives the injection point from `injection_type`, enqueues, and
    /// publishes a [`ContextInjectionEvent`].
    pub fn inject_context(
        &self,
        session_id: impl Into<String>,
        injection_type: InjectionType,
        content: impl Into<String>,
        reason: Option<String>,
        priority: i32,
        source: impl Into<String>,
    ) -> ContextInjection {
        let session_id = session_id.into();
        let injection = ContextInjection {
            session_id: session_id.clone(),
            injection_type,
            injection_point: point_for(injection_type),
            content: content.into(),
            source: source.into(),
            reason,
            priority,
            created_at: Utc::now(),
        };
        self.add_injection(injection.clone());
        injection
    }

    fn add_injection(&self, injection: ContextInjection) {
        self.bus.publish(ContextInjectionEvent {
            source: injection.source.clone(),
            timestamp: injection.created_at,
            session_id: injection.session_id.clone(),
            injection_type: injection.injection_type,
            injection_point: injection.injection_point,
        });
        self.queues
            .lock()
            .entry(injection.session_id.clone())
            .or_default()
            .push(injection);
    }

    /// Drains every queued injection for `session_id` at `injection_point`,
    /// delivering in ascending-priority order (spec §4.10: "lower priority
    /// first"). Injections at other points are left queued.
    pub fn get_pending_injections(&self, session_id: &str, injection_point: InjectionPoint) -> Vec<ContextInjection> {
        let mut queues = self.queues.lock();
        let Some(queue) = queues.get_mut(session_id) else {
            return Vec::new();
        };
        let mut drained = Vec::new();
        queue.retain(|inj| {
            if inj.injection_point == injection_point {
                drained.push(inj.clone());
                false
            } else {
                true
            }
        });
        drained.sort_by_key(|inj| inj.priority);
        drained
    }

    /// `inject_warning(session_id, "content", rule_id)` — legacy contract:
    /// reason defaults from `rule_id` when no explicit reason is given.
    pub fn inject_warning(
        &self,
        session_id: impl Into<String>,
        content: impl Into<String>,
        rule_id: Option<&str>,
        priority: i32,
    ) -> ContextInjection {
        self.inject_context(
            session_id,
            InjectionType::Warning,
            content,
            rule_id.map(|r| format!("rule:{r}")),
            priority,
            "supervision",
        )
    }

    pub fn inject_intervention(
        &self,
        session_id: impl Into<String>,
        content: impl Into<String>,
        reason: Option<String>,
        priority: i32,
    ) -> ContextInjection {
        self.inject_context(session_id, InjectionType::Intervention, content, reason, priority, "supervision")
    }

    pub fn inject_memory(&self, session_id: impl Into<String>, content: impl Into<String>, priority: i32) -> ContextInjection {
        self.inject_context(session_id, InjectionType::Memory, content, None, priority, "memory")
    }

    pub fn inject_observation(&self, session_id: impl Into<String>, content: impl Into<String>, priority: i32) -> ContextInjection {
        self.inject_context(session_id, InjectionType::Observation, content, None, priority, "observation")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn warning_maps_to_pre_thinking_and_drains_in_priority_order() {
        let manager = ContextInjectionManager::new(CoordinationBus::new());
        manager.inject_warning("s1", "low priority", None, 50);
        manager.inject_warning("s1", "high priority", Some("rule-1"), 10);

        let drained = manager.get_pending_injections("s1", InjectionPoint::PreThinking);
        assert_eq!(drained.len(), 2);
        assert_eq!(drained[0].content, "high priority");
        assert_eq!(drained[0].reason.as_deref(), Some("rule:rule-1"));
    }

    #[test]
    fn other_points_are_left_queued() {
        let manager = ContextInjectionManager::new(CoordinationBus::new());
        manager.inject_memory("s1", "remember this", 0);
        assert!(manager.get_pending_injections("s1", InjectionPoint::PreThinking).is_empty());
        let pre_loop = manager.get_pending_injections("s1", InjectionPoint::PreLoop);
        assert_eq!(pre_loop.len(), 1);
    }

    #[test]
    fn unknown_session_returns_empty_without_panicking() {
        let manager = ContextInjectionManager::new(CoordinationBus::new());
        assert!(manager.get_pending_injections("nope", InjectionPoint::PreLoop).is_empty());
    }
}
