//! # MQ Replication Core
//!
//! Master/slave replication for message-queue transports.
//!
//! This crate provides:
//! - Immutable [`Envelope`]s carrying a payload plus ordered, typed stamps
//! - The [`ReplicationEvent`] notifications published after each master operation
//! - The [`Transport`], [`SlaveReceiver`] and [`EventBus`] contracts
//! - [`ReplicationTransport`], a decorator that delegates to a master transport
//!   and fans completed operations out to slave receivers
//!
//! ## Control flow
//!
//! ```text
//! caller -> ReplicationTransport::send -> master.send
//!        -> bus.publish(AfterSend) -> ReplicationTransport::handle
//!        -> channel filter -> slave[0].slave_send .. slave[n].slave_send
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod bus;
pub mod envelope;
pub mod event;
pub mod memory;
pub mod replication;
pub mod slave;
pub mod stamp;
pub mod transport;

pub use bus::{EventBus, EventSubscriber, SyncEventBus};
pub use envelope::{Envelope, Payload};
pub use event::{EventKind, ReplicationEvent};
pub use memory::InMemoryTransport;
pub use replication::ReplicationTransport;
pub use slave::{SlaveError, SlaveReceiver};
pub use stamp::{
    ChannelNameStamp, MessageIdentityStamp, ReceivedStamp, Stamp, StampKind, StampType,
    TransportMessageIdStamp,
};
pub use transport::{Transport, TransportError};
