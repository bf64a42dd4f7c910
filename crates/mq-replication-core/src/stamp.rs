//! Typed metadata stamps attached to envelopes.
//!
//! Stamps fall in two groups:
//! - **Relayable**: identity and channel stamps travel with replication events
//! - **Transport-local**: queue row ids and receipt markers only make sense to the
//!   transport that produced them, and are stripped before an event is published

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Discriminant of a [`Stamp`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StampKind {
    /// Unique replication message id
    MessageIdentity,
    /// Replication channel name
    ChannelName,
    /// Id assigned by the master queue
    TransportMessageId,
    /// Receipt marker added by `get`
    Received,
}

impl StampKind {
    /// Whether stamps of this kind may travel inside a replication event.
    #[must_use]
    pub fn is_relayable(self) -> bool {
        matches!(self, Self::MessageIdentity | Self::ChannelName)
    }
}

/// A typed metadata tag carried by an [`Envelope`](crate::Envelope).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum Stamp {
    /// See [`MessageIdentityStamp`]
    MessageIdentity(MessageIdentityStamp),
    /// See [`ChannelNameStamp`]
    ChannelName(ChannelNameStamp),
    /// See [`TransportMessageIdStamp`]
    TransportMessageId(TransportMessageIdStamp),
    /// See [`ReceivedStamp`]
    Received(ReceivedStamp),
}

impl Stamp {
    /// Kind of this stamp.
    #[must_use]
    pub fn kind(&self) -> StampKind {
        match self {
            Self::MessageIdentity(_) => StampKind::MessageIdentity,
            Self::ChannelName(_) => StampKind::ChannelName,
            Self::TransportMessageId(_) => StampKind::TransportMessageId,
            Self::Received(_) => StampKind::Received,
        }
    }

    /// Whether this stamp may travel inside a replication event.
    #[must_use]
    pub fn is_relayable(&self) -> bool {
        self.kind().is_relayable()
    }
}

/// Concrete stamp types that can be looked up on an envelope by type.
pub trait StampType: Sized {
    /// Kind tag shared by every stamp of this type.
    const KIND: StampKind;

    /// Borrow the concrete stamp if `stamp` is of this type.
    fn from_stamp(stamp: &Stamp) -> Option<&Self>;

    /// Wrap into the [`Stamp`] enum.
    fn into_stamp(self) -> Stamp;
}

/// Unique id attached to every application message passing through a
/// replication transport's `send`.
///
/// A new id is generated on every `send`, including resends of the same
/// logical message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MessageIdentityStamp {
    id: Uuid,
}

impl MessageIdentityStamp {
    /// Generate a fresh random id.
    #[must_use]
    pub fn generate() -> Self {
        Self { id: Uuid::new_v4() }
    }

    /// Build from an existing id.
    #[must_use]
    pub fn from_uuid(id: Uuid) -> Self {
        Self { id }
    }

    /// The message id.
    #[must_use]
    pub fn id(&self) -> Uuid {
        self.id
    }
}

impl fmt::Display for MessageIdentityStamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.id.fmt(f)
    }
}

impl StampType for MessageIdentityStamp {
    const KIND: StampKind = StampKind::MessageIdentity;

    fn from_stamp(stamp: &Stamp) -> Option<&Self> {
        match stamp {
            Stamp::MessageIdentity(inner) => Some(inner),
            _ => None,
        }
    }

    fn into_stamp(self) -> Stamp {
        Stamp::MessageIdentity(self)
    }
}

/// Names the replication channel an envelope belongs to.
///
/// Only used for filtering events on a shared bus, never for routing content.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ChannelNameStamp {
    name: String,
}

impl ChannelNameStamp {
    /// Create a channel stamp.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }

    /// The channel name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl StampType for ChannelNameStamp {
    const KIND: StampKind = StampKind::ChannelName;

    fn from_stamp(stamp: &Stamp) -> Option<&Self> {
        match stamp {
            Stamp::ChannelName(inner) => Some(inner),
            _ => None,
        }
    }

    fn into_stamp(self) -> Stamp {
        Stamp::ChannelName(self)
    }
}

/// Id assigned to a message by the master queue (e.g. a row id).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TransportMessageIdStamp {
    id: String,
}

impl TransportMessageIdStamp {
    /// Create a transport id stamp.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self { id: id.into() }
    }

    /// The transport-local id.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }
}

impl StampType for TransportMessageIdStamp {
    const KIND: StampKind = StampKind::TransportMessageId;

    fn from_stamp(stamp: &Stamp) -> Option<&Self> {
        match stamp {
            Stamp::TransportMessageId(inner) => Some(inner),
            _ => None,
        }
    }

    fn into_stamp(self) -> Stamp {
        Stamp::TransportMessageId(self)
    }
}

/// Marks an envelope as received from a named transport.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReceivedStamp {
    transport: String,
    received_at: DateTime<Utc>,
}

impl ReceivedStamp {
    /// Stamp a receipt from `transport` at the current time.
    #[must_use]
    pub fn now(transport: impl Into<String>) -> Self {
        Self {
            transport: transport.into(),
            received_at: Utc::now(),
        }
    }

    /// Name of the receiving transport.
    #[must_use]
    pub fn transport(&self) -> &str {
        &self.transport
    }

    /// Receipt time.
    #[must_use]
    pub fn received_at(&self) -> DateTime<Utc> {
        self.received_at
    }
}

impl StampType for ReceivedStamp {
    const KIND: StampKind = StampKind::Received;

    fn from_stamp(stamp: &Stamp) -> Option<&Self> {
        match stamp {
            Stamp::Received(inner) => Some(inner),
            _ => None,
        }
    }

    fn into_stamp(self) -> Stamp {
        Stamp::Received(self)
    }
}
