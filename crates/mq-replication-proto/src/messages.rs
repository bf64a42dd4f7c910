//! CBOR wire encoding for envelopes and replication events.

use mq_replication_core::{Envelope, EventKind, MessageIdentityStamp, ReplicationEvent};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use uuid::Uuid;

fn to_cbor<T: Serialize>(value: &T) -> Result<Vec<u8>, MessageError> {
    let mut bytes = Vec::new();
    ciborium::into_writer(value, &mut bytes).map_err(|e| MessageError::Serialize(e.to_string()))?;
    Ok(bytes)
}

fn from_cbor<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, MessageError> {
    ciborium::from_reader(bytes).map_err(|e| MessageError::Deserialize(e.to_string()))
}

/// Serialize an envelope to CBOR bytes.
///
/// # Errors
///
/// Returns error if serialization fails.
pub fn encode_envelope(envelope: &Envelope) -> Result<Vec<u8>, MessageError> {
    to_cbor(envelope)
}

/// Deserialize an envelope from CBOR bytes.
///
/// # Errors
///
/// Returns error if deserialization fails.
pub fn decode_envelope(bytes: &[u8]) -> Result<Envelope, MessageError> {
    from_cbor(bytes)
}

/// Serialize a replication event to CBOR bytes.
///
/// # Errors
///
/// Returns error if serialization fails.
pub fn encode_event(event: &ReplicationEvent) -> Result<Vec<u8>, MessageError> {
    to_cbor(event)
}

/// Deserialize a replication event from CBOR bytes.
///
/// # Errors
///
/// Returns error if deserialization fails.
pub fn decode_event(bytes: &[u8]) -> Result<ReplicationEvent, MessageError> {
    from_cbor(bytes)
}

/// A replication event as sent to remote slaves.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventFrame {
    /// Channel the event was published on
    pub channel: String,
    /// Event kind
    pub kind: EventKind,
    /// Replication message id, if the envelope carries one
    pub message_id: Option<Uuid>,
    /// The event itself
    pub event: ReplicationEvent,
    /// Sender version
    pub version: String,
}

impl EventFrame {
    /// Frame an event.
    ///
    /// # Errors
    ///
    /// Returns [`MessageError::MissingChannel`] if the event has no channel stamp.
    pub fn from_event(event: &ReplicationEvent) -> Result<Self, MessageError> {
        let channel = event
            .channel_name()
            .ok_or(MessageError::MissingChannel(event.kind()))?
            .to_string();
        let message_id = event
            .master_envelope()
            .last::<MessageIdentityStamp>()
            .map(MessageIdentityStamp::id);

        Ok(Self {
            channel,
            kind: event.kind(),
            message_id,
            event: event.clone(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        })
    }

    /// Serialize to CBOR bytes.
    ///
    /// # Errors
    ///
    /// Returns error if serialization fails.
    pub fn to_cbor(&self) -> Result<Vec<u8>, MessageError> {
        to_cbor(self)
    }

    /// Deserialize from CBOR bytes.
    ///
    /// # Errors
    ///
    /// Returns error if deserialization fails.
    pub fn from_cbor(bytes: &[u8]) -> Result<Self, MessageError> {
        from_cbor(bytes)
    }
}

/// Errors for message serialization/deserialization.
#[derive(Debug, Clone, thiserror::Error)]
pub enum MessageError {
    /// Serialization failed
    #[error("serialization failed: {0}")]
    Serialize(String),
    /// Deserialization failed
    #[error("deserialization failed: {0}")]
    Deserialize(String),
    /// Event has no channel name stamp
    #[error("{0} event has no channel name stamp")]
    MissingChannel(EventKind),
}
