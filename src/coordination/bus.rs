//! Type-keyed asynchronous pub/sub coupling the three agents.
//!
//! ```text
//! publisher                     CoordinationBus                  subscribers
//!    │  publish::<E>(event)           │                               │
//!    ├────────────────────────────────▶  look up Vec<Subscriber<E>>   │
//!    │  (returns once enqueued)       │  tokio::spawn per subscriber  │
//!    │                                 ├──────────────────────────────▶ handler(event)
//!    │                                 └──────────────────────────────▶ handler(event)
//! ```
//!
//! Subscriptions are keyed by `TypeId::of::<E>()`, matching the spec's
//! "nominal, not structural" requirement: a subscriber registered for
//! `NodeExecutionEvent` never receives a `TaskTerminationEvent`, even though
//! both travel over the same bus instance.
//!
//! `subscribe` returns a [`SubscriptionToken`] that is the *only* way to
//! remove that registration. There is deliberately no API to reconstruct a
//! token from a handler value — components that subscribe must hold onto
//! the token themselves. This is the fix for a documented bug class: code
//! that re-derives "the handler I would have subscribed with" at unsubscribe
//! time can produce a different closure than the one actually registered
//! (e.g. when a feature flag toggled between subscribe and unsubscribe).

use futures_util::future::BoxFuture;
use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use std::any::{Any, TypeId};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

type HandlerFn<E> = Arc<dyn Fn(E) -> BoxFuture<'static, ()> + Send + Sync>;

struct Subscriber {
    id: u64,
    // Type-erased `HandlerFn<E>`; downcast back using the TypeId this
    // subscriber is stored under.
    handler: Box<dyn Any + Send + Sync>,
}

/// A handle returned by [`CoordinationBus::subscribe`]. Retain it; pass it
/// to [`CoordinationBus::unsubscribe`] to remove the registration.
///
/// Unsubscribing with a token that was already consumed is a no-op, not an
/// error — matching the spec's "duplicate unsubscribes are no-ops".
#[derive(Debug, Clone, Copy)]
pub struct SubscriptionToken {
    type_id: TypeId,
    id: u64,
}

/// The coordination bus. Cheaply cloneable (internally `Arc`-backed);
/// typically constructed once and shared between the planner, the workflow
/// agent, and the coordinator's supervision/monitor components.
#[derive(Clone, Default)]
pub struct CoordinationBus {
    subscribers: Arc<Mutex<FxHashMap<TypeId, Vec<Subscriber>>>>,
    next_id: Arc<AtomicU64>,
}

impl CoordinationBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an async handler for every future `publish::<E>(..)` call.
    ///
    /// The handler may suspend (it returns a boxed future); the bus does not
    /// wait for it before `publish` returns — delivery is asynchronous.
    pub fn subscribe<E, F, Fut>(&self, handler: F) -> SubscriptionToken
    where
        E: Clone + Send + Sync + 'static,
        F: Fn(E) -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = ()> + Send + 'static,
    {
        let boxed: HandlerFn<E> = Arc::new(move |event: E| Box::pin(handler(event)));
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let type_id = TypeId::of::<E>();
        let mut subs = self.subscribers.lock();
        subs.entry(type_id).or_default().push(Subscriber {
            id,
            handler: Box::new(boxed),
        });
        SubscriptionToken { type_id, id }
    }

    /// Remove a registration. No-op if `token` was already unsubscribed.
    pub fn unsubscribe(&self, token: SubscriptionToken) {
        let mut subs = self.subscribers.lock();
        if let Some(list) = subs.get_mut(&token.type_id) {
            list.retain(|s| s.id != token.id);
        }
    }

    /// Enqueue `event` for delivery to every subscriber of `E` registered at
    /// the time this call is made. Returns once each handler invocation has
    /// been spawned, not once handlers have finished running — callers that
    /// need completion should have the handler signal back over its own
    /// channel.
    ///
    /// Delivery is best-effort FIFO per subscriber: events published from
    /// the same call site reach a given subscriber in publish order, because
    /// each subscriber's handlers are spawned in the order `publish` is
    /// called and each spawn starts running independently. Order across
    /// distinct publishers is unspecified, per spec.
    pub fn publish<E>(&self, event: E)
    where
        E: Clone + Send + Sync + 'static,
    {
        let type_id = TypeId::of::<E>();
        let subs = self.subscribers.lock();
        let Some(list) = subs.get(&type_id) else {
            return;
        };
        for sub in list {
            let handler = sub
                .handler
                .downcast_ref::<HandlerFn<E>>()
                .expect("subscriber handler type mismatch for its own TypeId bucket")
                .clone();
            let event = event.clone();
            tokio::spawn(async move {
                handler(event).await;
            });
        }
    }

    /// Number of live subscriptions across all event types. Test/diagnostic
    /// use — not part of the delivery contract.
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.lock().values().map(Vec::len).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[derive(Clone)]
    struct Ping(u32);

    #[derive(Clone)]
    struct Pong(u32);

    #[tokio::test]
    async fn delivers_only_to_matching_type() {
        let bus = CoordinationBus::new();
        let pings = Arc::new(AtomicUsize::new(0));
        let pongs = Arc::new(AtomicUsize::new(0));

        let p1 = pings.clone();
        bus.subscribe::<Ping, _, _>(move |_| {
            let p1 = p1.clone();
            async move {
                p1.fetch_add(1, Ordering::SeqCst);
            }
        });
        let p2 = pongs.clone();
        bus.subscribe::<Pong, _, _>(move |_| {
            let p2 = p2.clone();
            async move {
                p2.fetch_add(1, Ordering::SeqCst);
            }
        });

        bus.publish(Ping(1));
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;

        assert_eq!(pings.load(Ordering::SeqCst), 1);
        assert_eq!(pongs.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn unsubscribe_stops_delivery() {
        let bus = CoordinationBus::new();
        let count = Arc::new(AtomicUsize::new(0));
        let c = count.clone();
        let token = bus.subscribe::<Ping, _, _>(move |_| {
            let c = c.clone();
            async move {
                c.fetch_add(1, Ordering::SeqCst);
            }
        });

        bus.publish(Ping(1));
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        bus.unsubscribe(token);
        bus.publish(Ping(2));
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;

        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn duplicate_unsubscribe_is_a_no_op() {
        let bus = CoordinationBus::new();
        let token = bus.subscribe::<Ping, _, _>(|_| async {});
        bus.unsubscribe(token);
        bus.unsubscribe(token);
        assert_eq!(bus.subscriber_count(), 0);
    }
}
