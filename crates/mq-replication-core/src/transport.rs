//! The queue transport contract.

use crate::envelope::Envelope;
use crate::event::EventKind;

/// A message-queue transport.
///
/// Implemented by master queues and by
/// [`ReplicationTransport`](crate::ReplicationTransport) itself.
pub trait Transport: Send + Sync {
    /// Enqueue an envelope, returning the envelope as stored by the transport.
    ///
    /// # Errors
    ///
    /// Returns error if the transport rejects the message.
    fn send(&self, envelope: Envelope) -> Result<Envelope, TransportError>;

    /// Receive a finite batch of envelopes (possibly empty).
    ///
    /// # Errors
    ///
    /// Returns error if the transport cannot be read.
    fn get(&self) -> Result<Vec<Envelope>, TransportError>;

    /// Acknowledge a received envelope.
    ///
    /// # Errors
    ///
    /// Returns error if the envelope is unknown or cannot be acknowledged.
    fn ack(&self, envelope: &Envelope) -> Result<(), TransportError>;

    /// Reject a received envelope.
    ///
    /// # Errors
    ///
    /// Returns error if the envelope is unknown or cannot be rejected.
    fn reject(&self, envelope: &Envelope) -> Result<(), TransportError>;
}

/// Errors raised by transports and the replication decorator.
#[derive(Debug, Clone, thiserror::Error)]
pub enum TransportError {
    /// Master transport failed
    #[error("master transport error: {0}")]
    Primary(String),
    /// Replication event without a channel name stamp
    #[error("malformed {kind} event: envelope has no channel name stamp")]
    MalformedEvent {
        /// Kind of the offending event
        kind: EventKind,
    },
    /// A slave receiver failed; remaining slaves were skipped
    #[error("slave '{slave}' failed on {kind}: {reason}")]
    Slave {
        /// Name of the failing slave
        slave: String,
        /// Kind of the event being dispatched
        kind: EventKind,
        /// Failure reported by the slave
        reason: String,
    },
    /// Event bus failed outside of subscriber dispatch
    #[error("event bus error: {0}")]
    Bus(String),
    /// Ack/reject for a message the transport does not hold
    #[error("unknown message: {0}")]
    UnknownMessage(String),
    /// Transport lookup or wiring is wrong
    #[error("misconfigured transport: {0}")]
    Misconfigured(String),
}
