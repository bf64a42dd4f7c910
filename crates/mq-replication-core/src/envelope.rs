//! Immutable message envelopes.
//!
//! An [`Envelope`] pairs a [`Payload`] with an ordered list of [`Stamp`]s.
//! Stamps of the same type may repeat; the "last" stamp of a type is the one
//! appended most recently. Every modifier returns a new envelope.

use crate::event::ReplicationEvent;
use crate::stamp::{Stamp, StampKind, StampType};
use serde::{Deserialize, Serialize};

/// Message carried by an envelope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "body", rename_all = "lowercase")]
pub enum Payload {
    /// A genuine application message
    Application(serde_json::Value),
    /// A replication event travelling through a transport
    Replication(Box<ReplicationEvent>),
}

/// Message payload plus ordered stamps.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    payload: Payload,
    stamps: Vec<Stamp>,
}

impl Envelope {
    /// Wrap a payload with no stamps.
    #[must_use]
    pub fn new(payload: Payload) -> Self {
        Self {
            payload,
            stamps: Vec::new(),
        }
    }

    /// Wrap an application message.
    #[must_use]
    pub fn application(body: serde_json::Value) -> Self {
        Self::new(Payload::Application(body))
    }

    /// Wrap a replication event as a message.
    #[must_use]
    pub fn replication(event: ReplicationEvent) -> Self {
        Self::new(Payload::Replication(Box::new(event)))
    }

    /// The payload.
    #[must_use]
    pub fn payload(&self) -> &Payload {
        &self.payload
    }

    /// All stamps in insertion order.
    #[must_use]
    pub fn stamps(&self) -> &[Stamp] {
        &self.stamps
    }

    /// Whether the payload is itself a replication event.
    ///
    /// Replication-internal envelopes are never stamped or re-published.
    #[must_use]
    pub fn is_replication_internal(&self) -> bool {
        matches!(self.payload, Payload::Replication(_))
    }

    /// Return a copy with `stamp` appended.
    #[must_use]
    pub fn with<S: StampType>(mut self, stamp: S) -> Self {
        self.stamps.push(stamp.into_stamp());
        self
    }

    /// Return a copy with all `stamps` appended in order.
    #[must_use]
    pub fn with_all(mut self, stamps: impl IntoIterator<Item = Stamp>) -> Self {
        self.stamps.extend(stamps);
        self
    }

    /// Return a copy without any stamp of `kind`.
    #[must_use]
    pub fn without_kind(&self, kind: StampKind) -> Self {
        self.filtered(|stamp| stamp.kind() != kind)
    }

    /// Return a copy keeping only stamps that may travel inside replication events.
    #[must_use]
    pub fn without_non_relayable(&self) -> Self {
        self.filtered(Stamp::is_relayable)
    }

    fn filtered(&self, keep: impl Fn(&Stamp) -> bool) -> Self {
        Self {
            payload: self.payload.clone(),
            stamps: self.stamps.iter().filter(|&s| keep(s)).cloned().collect(),
        }
    }

    /// The most recently appended stamp of type `S`.
    #[must_use]
    pub fn last<S: StampType>(&self) -> Option<&S> {
        self.stamps.iter().rev().find_map(S::from_stamp)
    }

    /// All stamps of type `S`, oldest first.
    pub fn all<'a, S: StampType + 'a>(&'a self) -> impl Iterator<Item = &'a S> + 'a {
        self.stamps.iter().filter_map(S::from_stamp)
    }

    /// Number of stamps of type `S`.
    #[must_use]
    pub fn count<S: StampType>(&self) -> usize {
        self.all::<S>().count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stamp::{
        ChannelNameStamp, MessageIdentityStamp, ReceivedStamp, TransportMessageIdStamp,
    };
    use serde_json::json;

    #[test]
    fn last_returns_most_recent() {
        let envelope = Envelope::application(json!({"n": 1}))
            .with(ChannelNameStamp::new("first"))
            .with(MessageIdentityStamp::generate())
            .with(ChannelNameStamp::new("second"));

        assert_eq!(
            envelope.last::<ChannelNameStamp>().map(ChannelNameStamp::name),
            Some("second")
        );
        assert_eq!(envelope.count::<ChannelNameStamp>(), 2);
        assert!(envelope.last::<ReceivedStamp>().is_none());
    }

    #[test]
    fn with_leaves_original_untouched() {
        let original = Envelope::application(json!("hello"));
        let stamped = original.clone().with(ChannelNameStamp::new("orders"));

        assert!(original.stamps().is_empty());
        assert_eq!(stamped.stamps().len(), 1);
    }

    #[test]
    fn strips_transport_local_stamps() {
        let envelope = Envelope::application(json!(1))
            .with(MessageIdentityStamp::generate())
            .with(TransportMessageIdStamp::new("42"))
            .with(ChannelNameStamp::new("orders"))
            .with(ReceivedStamp::now("memory"));

        let relayable = envelope.without_non_relayable();

        assert_eq!(relayable.stamps().len(), 2);
        assert!(relayable.last::<TransportMessageIdStamp>().is_none());
        assert!(relayable.last::<ReceivedStamp>().is_none());
        assert_eq!(relayable.payload(), envelope.payload());
    }

    #[test]
    fn with_all_appends_in_order() {
        let id = uuid::Uuid::new_v4();
        let envelope = Envelope::application(json!(1)).with_all([
            ChannelNameStamp::new("a").into_stamp(),
            MessageIdentityStamp::from_uuid(id).into_stamp(),
            ChannelNameStamp::new("b").into_stamp(),
        ]);

        let kinds: Vec<StampKind> = envelope.stamps().iter().map(Stamp::kind).collect();
        assert_eq!(
            kinds,
            vec![
                StampKind::ChannelName,
                StampKind::MessageIdentity,
                StampKind::ChannelName
            ]
        );
        assert_eq!(
            envelope
                .last::<MessageIdentityStamp>()
                .map(MessageIdentityStamp::id),
            Some(id)
        );
        assert_eq!(
            envelope
                .all::<ChannelNameStamp>()
                .map(ChannelNameStamp::name)
                .collect::<Vec<_>>(),
            vec!["a", "b"]
        );
    }

    #[test]
    fn without_kind_removes_every_instance() {
        let envelope = Envelope::application(json!(1))
            .with(ChannelNameStamp::new("a"))
            .with(ChannelNameStamp::new("b"))
            .with(MessageIdentityStamp::generate());

        let stripped = envelope.without_kind(StampKind::ChannelName);

        assert_eq!(stripped.count::<ChannelNameStamp>(), 0);
        assert_eq!(stripped.count::<MessageIdentityStamp>(), 1);
    }

    #[test]
    fn replication_payload_is_internal() {
        let inner = Envelope::application(json!(1));
        let internal = Envelope::replication(ReplicationEvent::AfterAck(inner.clone()));

        assert!(internal.is_replication_internal());
        assert!(!inner.is_replication_internal());
    }
}
