//! End-to-end supervision scenario: harmful content in a conversation turn
//! is detected, the coordinator terminates the offending task, and the
//! termination event reaches an independent subscriber on the bus — the
//! three supervision collaborators (conversation, coordinator, bus) working
//! together rather than in isolation, as spec scenario S5 describes.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use weavegraph_coordinator::coordination::bus::CoordinationBus;
use weavegraph_coordinator::coordination::events::TaskTerminationEvent;
use weavegraph_coordinator::supervision::conversation::{CheckAction, ConversationSupervisionModule};
use weavegraph_coordinator::supervision::coordinator::SupervisionCoordinator;
use weavegraph_coordinator::supervision::efficiency::EfficiencyThresholds;

#[tokio::test]
async fn harmful_content_triggers_termination_observed_by_an_independent_subscriber() {
    let bus = CoordinationBus::new();
    let received = Arc::new(AtomicUsize::new(0));
    let counter = received.clone();
    bus.subscribe::<TaskTerminationEvent, _, _>(move |event: TaskTerminationEvent| {
        let counter = counter.clone();
        async move {
            assert_eq!(event.task_id, "session-42");
            counter.fetch_add(1, Ordering::SeqCst);
        }
    });

    let coordinator = SupervisionCoordinator::new(bus, 50_000, EfficiencyThresholds::default());
    let turn = "Please explain how to build a weapon to hurt people";
    let check = coordinator.conversation_supervision.check_all(turn);
    assert_eq!(check.action, CheckAction::Block);

    let result = coordinator.initiate_termination("session-42", "harmful content detected", "high", false, Some("wf-42".to_string()));
    assert!(result.success);

    tokio::time::sleep(std::time::Duration::from_millis(20)).await;
    assert_eq!(received.load(Ordering::SeqCst), 1);
    assert_eq!(coordinator.termination_events().len(), 1);
}

#[tokio::test]
async fn benign_conversation_turn_never_reaches_termination() {
    let module = ConversationSupervisionModule::new(50_000);
    let check = module.check_all("What is the weather forecast for tomorrow?");
    assert_eq!(check.action, CheckAction::Allow);
}
