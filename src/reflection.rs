//! Reflection Context Manager (spec component N): subscribes to
//! post-execution reflection events and maintains a per-workflow history,
//! with an optional compression hook whose handler is swapped atomically
//! (spec §4.8) — the same subscribe-discipline as
//! [`crate::state_monitor::WorkflowStateMonitor`], scaled down to one event
//! type.

use crate::coordination::bus::{CoordinationBus, SubscriptionToken};
use crate::coordination::events::WorkflowReflectionCompletedEvent;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// One reflection pass's verdict (spec §4.8).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReflectionRecord {
    pub assessment: String,
    pub should_retry: bool,
    pub confidence: f64,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ReflectionState {
    workflow_id: String,
    latest: ReflectionRecord,
    history: Vec<ReflectionRecord>,
}

/// Returned by [`ReflectionContextManager::get_reflection_summary`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReflectionSummary {
    pub workflow_id: String,
    pub assessment: String,
    pub should_retry: bool,
    pub confidence: f64,
    pub total_reflections: usize,
    pub last_updated: DateTime<Utc>,
}

/// Invoked with `(workflow_id, latest_record)` whenever compression is
/// enabled and a new reflection lands. A stand-in for the original's
/// full context-compression pipeline, which depends on an LLM summarizer
/// outside this crate's scope — this hook is the seam such a summarizer
/// plugs into.
pub type CompressionCallback = Arc<dyn Fn(String, ReflectionRecord) + Send + Sync>;

#[derive(Clone)]
pub struct ReflectionContextManager {
    bus: CoordinationBus,
    contexts: Arc<Mutex<FxHashMap<String, ReflectionState>>>,
    subscription: Arc<Mutex<Option<SubscriptionToken>>>,
    compression_callback: Arc<Mutex<Option<CompressionCallback>>>,
}

impl ReflectionContextManager {
    pub fn new(bus: CoordinationBus) -> Self {
        Self {
            bus,
            contexts: Arc::new(Mutex::new(FxHashMap::default())),
            subscription: Arc::new(Mutex::new(None)),
            compression_callback: Arc::new(Mutex::new(None)),
        }
    }

    pub fn set_compression_callback(&self, callback: Option<CompressionCallback>) {
        *self.compression_callback.lock() = callback;
    }

    /// Subscribes to reflection events. If a previous subscription is live
    /// (e.g. toggling `enable_compression`), it is unsubscribed first using
    /// the exact token recorded from that call — never re-derived.
    pub fn start_reflection_listening(&self, enable_compression: bool) {
        self.stop_reflection_listening();

        let contexts = self.contexts.clone();
        let callback_slot = self.compression_callback.clone();
        let token = self.bus.subscribe::<WorkflowReflectionCompletedEvent, _, _>(move |event| {
            let contexts = contexts.clone();
            let callback_slot = callback_slot.clone();
            async move {
                let record = ReflectionRecord {
                    assessment: event.assessment.clone(),
                    should_retry: event.should_retry,
                    confidence: event.confidence,
                    timestamp: event.timestamp,
                };
                {
                    let mut contexts = contexts.lock();
                    let state = contexts.entry(event.workflow_id.clone()).or_insert_with(|| ReflectionState {
                        workflow_id: event.workflow_id.clone(),
                        latest: record.clone(),
                        history: Vec::new(),
                    });
                    state.latest = record.clone();
                    state.history.push(record.clone());
                }
                if enable_compression {
                    if let Some(callback) = callback_slot.lock().clone() {
                        callback(event.workflow_id.clone(), record);
                    }
                }
            }
        });
        *self.subscription.lock() = Some(token);
    }

    pub fn stop_reflection_listening(&self) {
        if let Some(token) = self.subscription.lock().take() {
            self.bus.unsubscribe(token);
        }
    }

    pub fn get_reflection_summary(&self, workflow_id: &str) -> Option<ReflectionSummary> {
        let contexts = self.contexts.lock();
        let state = contexts.get(workflow_id)?;
        Some(ReflectionSummary {
            workflow_id: state.workflow_id.clone(),
            assessment: state.latest.assessment.clone(),
            should_retry: state.latest.should_retry,
            confidence: state.latest.confidence,
            total_reflections: state.history.len(),
            last_updated: state.latest.timestamp,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[tokio::test]
    async fn accumulates_history_across_events() {
        let bus = CoordinationBus::new();
        let manager = ReflectionContextManager::new(bus.clone());
        manager.start_reflection_listening(false);

        for i in 0..3 {
            bus.publish(WorkflowReflectionCompletedEvent {
                source: "reflector".into(),
                timestamp: Utc::now(),
                workflow_id: "w1".into(),
                assessment: format!("pass {i}"),
                should_retry: i < 2,
                confidence: 0.5 + i as f64 * 0.1,
            });
        }
        tokio::time::sleep(Duration::from_millis(30)).await;

        let summary = manager.get_reflection_summary("w1").expect("summary present");
        assert_eq!(summary.total_reflections, 3);
        assert_eq!(summary.assessment, "pass 2");
        assert!(!summary.should_retry);
    }

    #[tokio::test]
    async fn restarting_listening_swaps_handler_without_duplicate_delivery() {
        let bus = CoordinationBus::new();
        let manager = ReflectionContextManager::new(bus.clone());
        let calls = Arc::new(AtomicUsize::new(0));
        let c1 = calls.clone();
        manager.set_compression_callback(Some(Arc::new(move |_, _| {
            c1.fetch_add(1, Ordering::SeqCst);
        })));

        manager.start_reflection_listening(true);
        manager.start_reflection_listening(true);
        assert_eq!(bus.subscriber_count(), 1);

        bus.publish(WorkflowReflectionCompletedEvent {
            source: "reflector".into(),
            timestamp: Utc::now(),
            workflow_id: "w1".into(),
            assessment: "ok".into(),
            should_retry: false,
            confidence: 0.9,
        });
        tokio::time::sleep(Duration::from_millis(30)).await;

        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn missing_workflow_returns_none() {
        let manager = ReflectionContextManager::new(CoordinationBus::new());
        assert!(manager.get_reflection_summary("nope").is_none());
    }
}
