//! # MQTT Adapter
//!
//! Slave receiver forwarding replication events to an MQTT broker.
//!
//! Each event is framed as a CBOR [`EventFrame`](mq_replication_proto::EventFrame)
//! and published with QoS 1 on `{prefix}/v1/{channel}/{event_kind}`, so remote
//! mirrors can subscribe per channel or per event kind.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod slave;

pub use slave::{MqttSlave, MqttSlaveConfig, MqttSlaveError};
