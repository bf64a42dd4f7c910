//! Synchronous in-process event bus.
//!
//! Publishing invokes every live subscriber for the event's kind on the
//! caller's stack, in subscription order. A subscriber error stops dispatch
//! and is returned from [`EventBus::publish`].

use crate::event::{EventKind, ReplicationEvent};
use crate::transport::TransportError;
use std::sync::{Arc, RwLock, Weak};

/// Receives replication events from a bus.
pub trait EventSubscriber: Send + Sync {
    /// Event kinds this subscriber handles.
    fn handled_events(&self) -> &'static [EventKind];

    /// Handle one event.
    ///
    /// # Errors
    ///
    /// Returns error if handling fails; the error is propagated to the publisher.
    fn handle(&self, event: &ReplicationEvent) -> Result<(), TransportError>;
}

/// Publish/subscribe contract for replication events.
pub trait EventBus: Send + Sync {
    /// Publish an event to every subscriber of its kind.
    ///
    /// # Errors
    ///
    /// Returns the first subscriber error, or a bus error.
    fn publish(&self, event: ReplicationEvent) -> Result<(), TransportError>;

    /// Register a subscriber.
    ///
    /// Subscribers are held weakly; dropping the last strong reference
    /// unsubscribes.
    fn subscribe(&self, subscriber: Weak<dyn EventSubscriber>);
}

/// Observer-list bus dispatching on the publisher's call stack.
#[derive(Default)]
pub struct SyncEventBus {
    subscribers: RwLock<Vec<Weak<dyn EventSubscriber>>>,
}

impl SyncEventBus {
    /// Create an empty bus.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of subscribers still alive.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.subscribers
            .read()
            .map_or(0, |subs| subs.iter().filter(|s| s.strong_count() > 0).count())
    }

    fn live_subscribers(&self) -> Result<Vec<Arc<dyn EventSubscriber>>, TransportError> {
        let subs = self
            .subscribers
            .read()
            .map_err(|_| TransportError::Bus("subscriber list poisoned".to_string()))?;
        Ok(subs.iter().filter_map(Weak::upgrade).collect())
    }

    fn subscriber_slots(&self) -> usize {
        self.subscribers.read().map_or(0, |subs| subs.len())
    }

    fn prune(&self) {
        if let Ok(mut subs) = self.subscribers.write() {
            subs.retain(|s| s.strong_count() > 0);
        }
    }
}

impl EventBus for SyncEventBus {
    fn publish(&self, event: ReplicationEvent) -> Result<(), TransportError> {
        // Snapshot so handlers may publish or subscribe re-entrantly.
        let live = self.live_subscribers()?;
        let kind = event.kind();

        let mut delivered = 0usize;
        for subscriber in live.iter().filter(|s| s.handled_events().contains(&kind)) {
            subscriber.handle(&event)?;
            delivered += 1;
        }

        tracing::trace!(%kind, delivered, "Published replication event");

        if live.len() < self.subscriber_slots() {
            self.prune();
        }

        Ok(())
    }

    fn subscribe(&self, subscriber: Weak<dyn EventSubscriber>) {
        match self.subscribers.write() {
            Ok(mut subs) => subs.push(subscriber),
            Err(_) => tracing::warn!("Subscriber list poisoned, subscription dropped"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::envelope::Envelope;
    use serde_json::json;
    use std::sync::Mutex;

    struct Recorder {
        kinds: &'static [EventKind],
        seen: Mutex<Vec<EventKind>>,
        fail: bool,
    }

    impl Recorder {
        fn new(kinds: &'static [EventKind], fail: bool) -> Arc<Self> {
            Arc::new(Self {
                kinds,
                seen: Mutex::new(Vec::new()),
                fail,
            })
        }

        fn seen(&self) -> Vec<EventKind> {
            self.seen.lock().unwrap().clone()
        }
    }

    impl EventSubscriber for Recorder {
        fn handled_events(&self) -> &'static [EventKind] {
            self.kinds
        }

        fn handle(&self, event: &ReplicationEvent) -> Result<(), TransportError> {
            self.seen.lock().unwrap().push(event.kind());
            if self.fail {
                return Err(TransportError::Bus("recorder failure".to_string()));
            }
            Ok(())
        }
    }

    fn subscribe(bus: &SyncEventBus, recorder: &Arc<Recorder>) {
        let weak = Arc::downgrade(recorder);
        bus.subscribe(weak);
    }

    fn ack_event() -> ReplicationEvent {
        ReplicationEvent::AfterAck(Envelope::application(json!(1)))
    }

    #[test]
    fn dispatches_by_kind() {
        let bus = SyncEventBus::new();
        let acks = Recorder::new(&[EventKind::AfterAck], false);
        let sends = Recorder::new(&[EventKind::AfterSend], false);
        subscribe(&bus, &acks);
        subscribe(&bus, &sends);

        bus.publish(ack_event()).unwrap();

        assert_eq!(acks.seen(), vec![EventKind::AfterAck]);
        assert!(sends.seen().is_empty());
    }

    #[test]
    fn first_error_stops_dispatch() {
        let bus = SyncEventBus::new();
        let failing = Recorder::new(&EventKind::ALL, true);
        let after = Recorder::new(&EventKind::ALL, false);
        subscribe(&bus, &failing);
        subscribe(&bus, &after);

        let result = bus.publish(ack_event());

        assert!(matches!(result, Err(TransportError::Bus(_))));
        assert!(after.seen().is_empty());
    }

    #[test]
    fn dropped_subscribers_are_pruned() {
        let bus = SyncEventBus::new();
        let kept = Recorder::new(&EventKind::ALL, false);
        subscribe(&bus, &kept);
        {
            let dropped = Recorder::new(&EventKind::ALL, false);
            subscribe(&bus, &dropped);
        }
        assert_eq!(bus.subscriber_count(), 1);

        bus.publish(ack_event()).unwrap();

        assert_eq!(bus.subscriber_slots(), 1);
        assert_eq!(kept.seen().len(), 1);
    }
}
