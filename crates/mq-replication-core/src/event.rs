//! Replication events published after each master operation.

use crate::envelope::Envelope;
use crate::stamp::ChannelNameStamp;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Kind of replication event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EventKind {
    /// Master `send` completed
    AfterSend,
    /// Master `get` returned the envelope
    AfterGet,
    /// Master `ack` completed
    AfterAck,
    /// Master `reject` completed
    AfterReject,
}

impl EventKind {
    /// Every event kind.
    pub const ALL: [EventKind; 4] = [
        Self::AfterSend,
        Self::AfterGet,
        Self::AfterAck,
        Self::AfterReject,
    ];

    /// Stable name, also used in topics.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::AfterSend => "after-send",
            Self::AfterGet => "after-get",
            Self::AfterAck => "after-ack",
            Self::AfterReject => "after-reject",
        }
    }

    /// Parse a stable name.
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "after-send" => Some(Self::AfterSend),
            "after-get" => Some(Self::AfterGet),
            "after-ack" => Some(Self::AfterAck),
            "after-reject" => Some(Self::AfterReject),
            _ => None,
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Notification describing a completed master operation.
///
/// Each variant holds the master's resulting envelope with transport-local
/// stamps removed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "envelope", rename_all = "kebab-case")]
pub enum ReplicationEvent {
    /// Emitted after `send`
    AfterSend(Envelope),
    /// Emitted once per envelope returned by `get`
    AfterGet(Envelope),
    /// Emitted after `ack`
    AfterAck(Envelope),
    /// Emitted after `reject`
    AfterReject(Envelope),
}

impl ReplicationEvent {
    /// Build the event of `kind` around `envelope`.
    #[must_use]
    pub fn new(kind: EventKind, envelope: Envelope) -> Self {
        match kind {
            EventKind::AfterSend => Self::AfterSend(envelope),
            EventKind::AfterGet => Self::AfterGet(envelope),
            EventKind::AfterAck => Self::AfterAck(envelope),
            EventKind::AfterReject => Self::AfterReject(envelope),
        }
    }

    /// Kind of this event.
    #[must_use]
    pub fn kind(&self) -> EventKind {
        match self {
            Self::AfterSend(_) => EventKind::AfterSend,
            Self::AfterGet(_) => EventKind::AfterGet,
            Self::AfterAck(_) => EventKind::AfterAck,
            Self::AfterReject(_) => EventKind::AfterReject,
        }
    }

    /// The master envelope this event describes.
    #[must_use]
    pub fn master_envelope(&self) -> &Envelope {
        match self {
            Self::AfterSend(envelope)
            | Self::AfterGet(envelope)
            | Self::AfterAck(envelope)
            | Self::AfterReject(envelope) => envelope,
        }
    }

    /// Channel named by the last channel stamp on the master envelope.
    #[must_use]
    pub fn channel_name(&self) -> Option<&str> {
        self.master_envelope()
            .last::<ChannelNameStamp>()
            .map(ChannelNameStamp::name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn kind_names_roundtrip() {
        for kind in EventKind::ALL {
            assert_eq!(EventKind::from_name(kind.as_str()), Some(kind));
        }
        assert_eq!(EventKind::from_name("after-nothing"), None);
    }

    #[test]
    fn new_matches_kind() {
        let envelope = Envelope::application(json!(1));
        for kind in EventKind::ALL {
            let event = ReplicationEvent::new(kind, envelope.clone());
            assert_eq!(event.kind(), kind);
            assert_eq!(event.master_envelope(), &envelope);
        }
    }

    #[test]
    fn channel_name_reads_last_stamp() {
        let event = ReplicationEvent::AfterSend(
            Envelope::application(json!(1))
                .with(ChannelNameStamp::new("billing"))
                .with(ChannelNameStamp::new("orders")),
        );
        assert_eq!(event.channel_name(), Some("orders"));

        let bare = ReplicationEvent::AfterGet(Envelope::application(json!(1)));
        assert_eq!(bare.channel_name(), None);
    }
}
