//! Consume loop: get, handle, then ack or reject.

use mq_replication_core::{Envelope, MessageIdentityStamp, Payload, Transport, TransportError};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Handles received application messages.
pub trait MessageHandler: Send + Sync {
    /// Handle one envelope. An error rejects the message.
    ///
    /// # Errors
    ///
    /// Returns error if the message cannot be processed.
    fn handle(&self, envelope: &Envelope) -> Result<(), HandlerError>;
}

/// Message handling failure.
#[derive(Debug, Clone, thiserror::Error)]
#[error("{0}")]
pub struct HandlerError(pub String);

/// Logs each message; rejects empty application payloads.
pub struct LoggingHandler;

impl MessageHandler for LoggingHandler {
    fn handle(&self, envelope: &Envelope) -> Result<(), HandlerError> {
        let message_id = envelope
            .last::<MessageIdentityStamp>()
            .map(ToString::to_string);

        match envelope.payload() {
            Payload::Application(serde_json::Value::Null) => {
                Err(HandlerError("empty payload".to_string()))
            }
            Payload::Application(body) => {
                tracing::info!(message_id = ?message_id, %body, "Handled message");
                Ok(())
            }
            Payload::Replication(event) => {
                tracing::debug!(kind = %event.kind(), "Consumed replication payload");
                Ok(())
            }
        }
    }
}

/// Counters for processed messages.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct WorkerStats {
    /// Envelopes returned by `get`
    pub received: usize,
    /// Envelopes acknowledged
    pub acked: usize,
    /// Envelopes rejected
    pub rejected: usize,
}

impl WorkerStats {
    fn add(&mut self, other: Self) {
        self.received += other.received;
        self.acked += other.acked;
        self.rejected += other.rejected;
    }
}

/// Polls a transport and settles every received message.
pub struct Worker {
    transport: Arc<dyn Transport>,
    handler: Arc<dyn MessageHandler>,
    poll_interval: Duration,
}

impl Worker {
    /// Create a worker.
    #[must_use]
    pub fn new(
        transport: Arc<dyn Transport>,
        handler: Arc<dyn MessageHandler>,
        poll_interval: Duration,
    ) -> Self {
        Self {
            transport,
            handler,
            poll_interval,
        }
    }

    /// Process one batch.
    ///
    /// # Errors
    ///
    /// Returns the first transport error; messages after it stay in flight.
    pub fn run_once(&self) -> Result<WorkerStats, TransportError> {
        let envelopes = self.transport.get()?;
        let mut stats = WorkerStats {
            received: envelopes.len(),
            ..WorkerStats::default()
        };

        for envelope in &envelopes {
            match self.handler.handle(envelope) {
                Ok(()) => {
                    self.transport.ack(envelope)?;
                    stats.acked += 1;
                }
                Err(err) => {
                    tracing::warn!(error = %err, "Handler failed, rejecting message");
                    self.transport.reject(envelope)?;
                    stats.rejected += 1;
                }
            }
        }

        Ok(stats)
    }

    /// Process batches until `stop` is set.
    ///
    /// Transport errors are logged and the loop continues after the poll interval.
    pub fn run(&self, stop: &AtomicBool) -> WorkerStats {
        let mut total = WorkerStats::default();

        while !stop.load(Ordering::Relaxed) {
            match self.run_once() {
                Ok(stats) => {
                    total.add(stats);
                    if stats.received > 0 {
                        continue;
                    }
                }
                Err(err) => {
                    tracing::error!(error = %err, "Worker batch failed");
                }
            }
            std::thread::sleep(self.poll_interval);
        }

        tracing::info!(
            received = total.received,
            acked = total.acked,
            rejected = total.rejected,
            "Worker stopped"
        );
        total
    }
}
