//! In-memory master queue.

use crate::envelope::Envelope;
use crate::stamp::{ReceivedStamp, TransportMessageIdStamp};
use crate::transport::{Transport, TransportError};
use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard};

const DEFAULT_BATCH_SIZE: usize = 1;

#[derive(Debug, Default)]
struct QueueState {
    next_id: u64,
    queued: VecDeque<Envelope>,
    in_flight: HashMap<String, Envelope>,
    rejected: Vec<Envelope>,
}

/// FIFO queue held in process memory.
///
/// `send` assigns a [`TransportMessageIdStamp`]; `get` moves up to
/// `batch_size` messages in flight and adds a [`ReceivedStamp`]; `ack` and
/// `reject` settle an in-flight message.
#[derive(Debug)]
pub struct InMemoryTransport {
    name: String,
    batch_size: usize,
    state: Mutex<QueueState>,
}

impl InMemoryTransport {
    /// Create an empty queue.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            batch_size: DEFAULT_BATCH_SIZE,
            state: Mutex::new(QueueState::default()),
        }
    }

    /// Set how many messages a single `get` may return.
    #[must_use]
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    /// Messages waiting to be received.
    #[must_use]
    pub fn queued_len(&self) -> usize {
        self.lock().map_or(0, |state| state.queued.len())
    }

    /// Messages received but not yet acked or rejected.
    #[must_use]
    pub fn in_flight_len(&self) -> usize {
        self.lock().map_or(0, |state| state.in_flight.len())
    }

    /// Rejected messages, oldest first.
    #[must_use]
    pub fn rejected(&self) -> Vec<Envelope> {
        self.lock()
            .map(|state| state.rejected.clone())
            .unwrap_or_default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, QueueState>, TransportError> {
        self.state
            .lock()
            .map_err(|_| TransportError::Primary(format!("queue '{}' state poisoned", self.name)))
    }

    fn settle(&self, envelope: &Envelope) -> Result<Envelope, TransportError> {
        let id = envelope
            .last::<TransportMessageIdStamp>()
            .ok_or_else(|| {
                TransportError::UnknownMessage("envelope has no transport message id".to_string())
            })?
            .id()
            .to_string();

        self.lock()?
            .in_flight
            .remove(&id)
            .ok_or(TransportError::UnknownMessage(id))
    }
}

impl Transport for InMemoryTransport {
    fn send(&self, envelope: Envelope) -> Result<Envelope, TransportError> {
        let mut state = self.lock()?;
        state.next_id += 1;
        let stamped = envelope.with(TransportMessageIdStamp::new(state.next_id.to_string()));
        state.queued.push_back(stamped.clone());
        Ok(stamped)
    }

    fn get(&self) -> Result<Vec<Envelope>, TransportError> {
        let mut state = self.lock()?;
        let take = self.batch_size.min(state.queued.len());
        let batch: Vec<Envelope> = state.queued.drain(..take).collect();
        let mut received = Vec::with_capacity(take);

        for envelope in batch {
            let envelope = envelope.with(ReceivedStamp::now(self.name.as_str()));
            if let Some(id) = envelope.last::<TransportMessageIdStamp>() {
                state.in_flight.insert(id.id().to_string(), envelope.clone());
            }
            received.push(envelope);
        }

        Ok(received)
    }

    fn ack(&self, envelope: &Envelope) -> Result<(), TransportError> {
        self.settle(envelope).map(|_| ())
    }

    fn reject(&self, envelope: &Envelope) -> Result<(), TransportError> {
        let settled = self.settle(envelope)?;
        self.lock()?.rejected.push(settled);
        Ok(())
    }
}
