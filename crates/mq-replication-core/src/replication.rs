//! Master/slave replication decorator.
//!
//! [`ReplicationTransport`] wraps a master [`Transport`]. After each master
//! operation on an application message it publishes the matching
//! [`ReplicationEvent`] on the bus. It is also subscribed to that bus: events
//! tagged with its own channel name are fanned out to every slave, in
//! registration order, on the same call stack.
//!
//! Envelopes whose payload is itself a replication event are passed straight
//! through to the master without stamping or publishing, which keeps mirrored
//! or echoed events from re-entering the pipeline.

use crate::bus::{EventBus, EventSubscriber};
use crate::envelope::Envelope;
use crate::event::{EventKind, ReplicationEvent};
use crate::slave::SlaveReceiver;
use crate::stamp::{ChannelNameStamp, MessageIdentityStamp};
use crate::transport::{Transport, TransportError};
use std::sync::Arc;

/// Transport decorator replicating master operations to slaves.
pub struct ReplicationTransport {
    master: Arc<dyn Transport>,
    event_bus: Arc<dyn EventBus>,
    channel: String,
    slaves: Vec<Arc<dyn SlaveReceiver>>,
}

impl ReplicationTransport {
    /// Create a decorator.
    ///
    /// The instance is not subscribed to `event_bus`; use [`Self::attach`]
    /// unless subscription is wired elsewhere.
    #[must_use]
    pub fn new(
        master: Arc<dyn Transport>,
        event_bus: Arc<dyn EventBus>,
        channel: impl Into<String>,
        slaves: Vec<Arc<dyn SlaveReceiver>>,
    ) -> Self {
        Self {
            master,
            event_bus,
            channel: channel.into(),
            slaves,
        }
    }

    /// Create a decorator and subscribe it to its own bus for every event kind.
    #[must_use]
    pub fn attach(
        master: Arc<dyn Transport>,
        event_bus: Arc<dyn EventBus>,
        channel: impl Into<String>,
        slaves: Vec<Arc<dyn SlaveReceiver>>,
    ) -> Arc<Self> {
        let transport = Arc::new(Self::new(master, Arc::clone(&event_bus), channel, slaves));
        let subscriber = Arc::downgrade(&transport);
        event_bus.subscribe(subscriber);

        tracing::info!(
            channel = %transport.channel,
            slaves = transport.slaves.len(),
            "Replication transport attached"
        );

        transport
    }

    /// Configured channel name.
    #[must_use]
    pub fn channel_name(&self) -> &str {
        &self.channel
    }

    /// Number of registered slaves.
    #[must_use]
    pub fn slave_count(&self) -> usize {
        self.slaves.len()
    }

    /// Whether `event` belongs to this transport's channel.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::MalformedEvent`] if the event's envelope has
    /// no channel name stamp.
    pub fn supports(&self, event: &ReplicationEvent) -> Result<bool, TransportError> {
        let channel = event
            .channel_name()
            .ok_or(TransportError::MalformedEvent { kind: event.kind() })?;

        Ok(channel == self.channel)
    }

    fn publish(&self, kind: EventKind, envelope: &Envelope) -> Result<(), TransportError> {
        let event = ReplicationEvent::new(kind, envelope.without_non_relayable());
        self.event_bus.publish(event)
    }

    fn fan_out(&self, event: &ReplicationEvent) -> Result<(), TransportError> {
        let kind = event.kind();

        if !self.supports(event)? {
            tracing::debug!(
                channel = %self.channel,
                event_channel = ?event.channel_name(),
                %kind,
                "Ignoring event from another channel"
            );
            return Ok(());
        }

        for slave in &self.slaves {
            tracing::debug!(
                channel = %self.channel,
                slave = slave.name(),
                %kind,
                "Dispatching to slave"
            );

            slave.receive(event).map_err(|e| {
                tracing::warn!(
                    channel = %self.channel,
                    slave = slave.name(),
                    %kind,
                    error = %e,
                    "Slave failed, aborting fan-out"
                );
                TransportError::Slave {
                    slave: slave.name().to_string(),
                    kind,
                    reason: e.to_string(),
                }
            })?;
        }

        Ok(())
    }
}

impl Transport for ReplicationTransport {
    fn send(&self, envelope: Envelope) -> Result<Envelope, TransportError> {
        tracing::debug!(channel = %self.channel, "send");

        let internal = envelope.is_replication_internal();
        let envelope = if internal {
            envelope
        } else {
            envelope
                .with(MessageIdentityStamp::generate())
                .with(ChannelNameStamp::new(self.channel.as_str()))
        };

        let sent = self.master.send(envelope)?;

        if !internal {
            self.publish(EventKind::AfterSend, &sent)?;
        }

        Ok(sent)
    }

    fn get(&self) -> Result<Vec<Envelope>, TransportError> {
        tracing::debug!(channel = %self.channel, "get");

        let envelopes = self.master.get()?;

        for envelope in envelopes.iter().filter(|e| !e.is_replication_internal()) {
            self.publish(EventKind::AfterGet, envelope)?;
        }

        Ok(envelopes)
    }

    fn ack(&self, envelope: &Envelope) -> Result<(), TransportError> {
        tracing::debug!(channel = %self.channel, "ack");

        self.master.ack(envelope)?;

        if !envelope.is_replication_internal() {
            self.publish(EventKind::AfterAck, envelope)?;
        }

        Ok(())
    }

    fn reject(&self, envelope: &Envelope) -> Result<(), TransportError> {
        tracing::debug!(channel = %self.channel, "reject");

        self.master.reject(envelope)?;

        if !envelope.is_replication_internal() {
            self.publish(EventKind::AfterReject, envelope)?;
        }

        Ok(())
    }
}

impl EventSubscriber for ReplicationTransport {
    fn handled_events(&self) -> &'static [EventKind] {
        &EventKind::ALL
    }

    fn handle(&self, event: &ReplicationEvent) -> Result<(), TransportError> {
        tracing::debug!(
            channel = %self.channel,
            kind = %event.kind(),
            "Received replication event"
        );
        self.fan_out(event)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::SyncEventBus;
    use crate::memory::InMemoryTransport;
    use serde_json::json;

    fn transport(channel: &str) -> ReplicationTransport {
        ReplicationTransport::new(
            Arc::new(InMemoryTransport::new("memory")),
            Arc::new(SyncEventBus::new()),
            channel,
            Vec::new(),
        )
    }

    #[test]
    fn supports_matches_last_channel_stamp() {
        let transport = transport("orders");

        let ours = ReplicationEvent::AfterSend(
            Envelope::application(json!(1))
                .with(ChannelNameStamp::new("billing"))
                .with(ChannelNameStamp::new("orders")),
        );
        let theirs = ReplicationEvent::AfterSend(
            Envelope::application(json!(1)).with(ChannelNameStamp::new("billing")),
        );

        assert!(transport.supports(&ours).unwrap());
        assert!(!transport.supports(&theirs).unwrap());
    }

    #[test]
    fn supports_rejects_unstamped_event() {
        let transport = transport("orders");
        let event = ReplicationEvent::AfterReject(Envelope::application(json!(1)));

        let err = transport.supports(&event).unwrap_err();
        assert!(matches!(
            err,
            TransportError::MalformedEvent {
                kind: EventKind::AfterReject
            }
        ));
    }

    #[test]
    fn accessors() {
        let transport = transport("orders");
        assert_eq!(transport.channel_name(), "orders");
        assert_eq!(transport.slave_count(), 0);
        assert_eq!(transport.handled_events().len(), 4);
    }
}
