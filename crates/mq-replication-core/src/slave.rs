//! Slave receivers notified after each master operation.

use crate::envelope::Envelope;
use crate::event::ReplicationEvent;

/// A secondary that mirrors or observes master operations.
///
/// Each method receives the master envelope of the matching event.
pub trait SlaveReceiver: Send + Sync {
    /// Name used in logs and errors.
    fn name(&self) -> &str;

    /// Mirror a completed `send`.
    ///
    /// # Errors
    ///
    /// Returns error if the slave cannot mirror the operation.
    fn slave_send(&self, master_envelope: &Envelope) -> Result<(), SlaveError>;

    /// Mirror an envelope returned by `get`.
    ///
    /// # Errors
    ///
    /// Returns error if the slave cannot mirror the operation.
    fn slave_get(&self, master_envelope: &Envelope) -> Result<(), SlaveError>;

    /// Mirror a completed `ack`.
    ///
    /// # Errors
    ///
    /// Returns error if the slave cannot mirror the operation.
    fn slave_ack(&self, master_envelope: &Envelope) -> Result<(), SlaveError>;

    /// Mirror a completed `reject`.
    ///
    /// # Errors
    ///
    /// Returns error if the slave cannot mirror the operation.
    fn slave_reject(&self, master_envelope: &Envelope) -> Result<(), SlaveError>;

    /// Dispatch `event` to the matching method.
    ///
    /// # Errors
    ///
    /// Returns whatever the matching method returns.
    fn receive(&self, event: &ReplicationEvent) -> Result<(), SlaveError> {
        match event {
            ReplicationEvent::AfterSend(envelope) => self.slave_send(envelope),
            ReplicationEvent::AfterGet(envelope) => self.slave_get(envelope),
            ReplicationEvent::AfterAck(envelope) => self.slave_ack(envelope),
            ReplicationEvent::AfterReject(envelope) => self.slave_reject(envelope),
        }
    }
}

/// Failure reported by a slave receiver.
#[derive(Debug, Clone, thiserror::Error)]
#[error("{reason}")]
pub struct SlaveError {
    reason: String,
}

impl SlaveError {
    /// Create an error with a reason.
    #[must_use]
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }

    /// The failure reason.
    #[must_use]
    pub fn reason(&self) -> &str {
        &self.reason
    }
}
