//! # MQ Replication Protocol
//!
//! Wire formats shared by replication slaves that leave the process.
//!
//! ## Messages
//!
//! - CBOR encoding of [`Envelope`](mq_replication_core::Envelope)s and
//!   [`ReplicationEvent`](mq_replication_core::ReplicationEvent)s
//! - `EventFrame`: an event plus the channel and message id it was published for
//!
//! ## MQTT Topics
//!
//! Topic scheme: `{prefix}/v1/{channel}/{event_kind}`
//!
//! ## DSNs
//!
//! Transports are addressed as `replication://{name}`.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod dsn;
pub mod messages;
pub mod topics;

pub use dsn::{DsnError, ReplicationDsn};
pub use messages::{EventFrame, MessageError};
pub use topics::TopicScheme;
