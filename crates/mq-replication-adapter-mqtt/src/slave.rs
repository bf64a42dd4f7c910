//! MQTT-forwarding slave receiver.

use mq_replication_core::{Envelope, EventKind, ReplicationEvent, SlaveError, SlaveReceiver};
use mq_replication_proto::{EventFrame, TopicScheme};
use rumqttc::{Client, Connection, Event, MqttOptions, Packet, QoS};
use std::thread;
use std::time::Duration;
use url::Url;

/// Configuration for the MQTT slave.
#[derive(Debug, Clone)]
pub struct MqttSlaveConfig {
    /// MQTT broker URL (e.g., <tcp://localhost:1883>)
    pub broker: String,
    /// Client ID for MQTT connection
    pub client_id: String,
    /// Topic prefix
    pub prefix: String,
    /// Keep-alive interval
    pub keep_alive: Duration,
}

impl Default for MqttSlaveConfig {
    fn default() -> Self {
        Self {
            broker: "tcp://localhost:1883".to_string(),
            client_id: "mq-replication-slave".to_string(),
            prefix: mq_replication_proto::topics::DEFAULT_PREFIX.to_string(),
            keep_alive: Duration::from_secs(30),
        }
    }
}

/// Slave receiver publishing every event to an MQTT broker.
///
/// A background thread drives the connection; publishing only enqueues the
/// packet, so a slow broker does not stall fan-out until the request buffer fills.
pub struct MqttSlave {
    name: String,
    client: Client,
    topics: TopicScheme,
}

impl MqttSlave {
    /// Connect to the broker and start the connection thread.
    ///
    /// # Errors
    ///
    /// Returns error if the broker URL is invalid or the thread cannot start.
    pub fn connect(config: MqttSlaveConfig) -> Result<Self, MqttSlaveError> {
        let (host, port) = parse_mqtt_url(&config.broker)?;

        let mut mqtt_options = MqttOptions::new(&config.client_id, host, port);
        mqtt_options.set_keep_alive(config.keep_alive);

        let (client, connection) = Client::new(mqtt_options, 100);

        thread::Builder::new()
            .name(format!("mqtt-{}", config.client_id))
            .spawn(move || drive(connection))
            .map_err(|e| MqttSlaveError::Connection(e.to_string()))?;

        tracing::info!(broker = %config.broker, prefix = %config.prefix, "MQTT slave connected");

        Ok(Self {
            name: format!("mqtt:{}", config.client_id),
            client,
            topics: TopicScheme::new(config.prefix),
        })
    }

    fn forward(&self, kind: EventKind, master_envelope: &Envelope) -> Result<(), SlaveError> {
        let (topic, payload) = frame_message(&self.topics, kind, master_envelope)?;
        let payload_len = payload.len();

        self.client
            .publish(topic.as_str(), QoS::AtLeastOnce, false, payload)
            .map_err(|e| SlaveError::new(format!("publish to {topic} failed: {e}")))?;

        tracing::debug!(%topic, payload_len, "Forwarded replication event");
        Ok(())
    }
}

/// Build the topic and CBOR payload for one event.
fn frame_message(
    topics: &TopicScheme,
    kind: EventKind,
    master_envelope: &Envelope,
) -> Result<(String, Vec<u8>), SlaveError> {
    let event = ReplicationEvent::new(kind, master_envelope.clone());
    let frame = EventFrame::from_event(&event).map_err(|e| SlaveError::new(e.to_string()))?;
    let payload = frame.to_cbor().map_err(|e| SlaveError::new(e.to_string()))?;

    Ok((topics.event(&frame.channel, kind), payload))
}

fn drive(mut connection: Connection) {
    for notification in connection.iter() {
        match notification {
            Ok(Event::Incoming(Packet::ConnAck(_))) => {
                tracing::info!("Connected to MQTT broker");
            }
            Ok(_) => {}
            Err(e) => {
                tracing::error!(error = %e, "MQTT error");
                // Try to reconnect after a delay
                thread::sleep(Duration::from_secs(5));
            }
        }
    }

    tracing::debug!("MQTT connection closed");
}

impl SlaveReceiver for MqttSlave {
    fn name(&self) -> &str {
        &self.name
    }

    fn slave_send(&self, master_envelope: &Envelope) -> Result<(), SlaveError> {
        self.forward(EventKind::AfterSend, master_envelope)
    }

    fn slave_get(&self, master_envelope: &Envelope) -> Result<(), SlaveError> {
        self.forward(EventKind::AfterGet, master_envelope)
    }

    fn slave_ack(&self, master_envelope: &Envelope) -> Result<(), SlaveError> {
        self.forward(EventKind::AfterAck, master_envelope)
    }

    fn slave_reject(&self, master_envelope: &Envelope) -> Result<(), SlaveError> {
        self.forward(EventKind::AfterReject, master_envelope)
    }
}

/// Parse MQTT URL into host and port.
fn parse_mqtt_url(input: &str) -> Result<(String, u16), MqttSlaveError> {
    if input.contains("://") {
        let url =
            Url::parse(input).map_err(|e| MqttSlaveError::InvalidUrl(format!("{input}: {e}")))?;

        match url.scheme() {
            "tcp" | "mqtt" => {}
            scheme => {
                return Err(MqttSlaveError::InvalidUrl(format!(
                    "{input}: unsupported scheme '{scheme}'"
                )));
            }
        }

        let host = url
            .host_str()
            .ok_or_else(|| MqttSlaveError::InvalidUrl(format!("{input}: missing host")))?;
        let port = url.port().unwrap_or(1883);

        return Ok((host.to_string(), port));
    }

    let mut parts = input.split(':');
    let host = parts
        .next()
        .filter(|value| !value.is_empty())
        .ok_or_else(|| MqttSlaveError::InvalidUrl(format!("{input}: missing host")))?;
    let port = match parts.next() {
        None => 1883,
        Some(port) => port
            .parse()
            .map_err(|_| MqttSlaveError::InvalidUrl(format!("{input}: invalid port '{port}'")))?,
    };
    if parts.next().is_some() {
        return Err(MqttSlaveError::InvalidUrl(format!(
            "{input}: too many ':' separators"
        )));
    }

    Ok((host.to_string(), port))
}

/// Errors that can occur setting up the MQTT slave.
#[derive(Debug, Clone, thiserror::Error)]
pub enum MqttSlaveError {
    /// Invalid MQTT URL
    #[error("invalid MQTT URL: {0}")]
    InvalidUrl(String),
    /// Connection error
    #[error("connection error: {0}")]
    Connection(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use mq_replication_core::{ChannelNameStamp, MessageIdentityStamp};
    use serde_json::json;

    #[test]
    fn parse_mqtt_url_tcp() {
        let (host, port) = parse_mqtt_url("tcp://localhost:1883").unwrap();
        assert_eq!(host, "localhost");
        assert_eq!(port, 1883);
    }

    #[test]
    fn parse_mqtt_url_default_port() {
        let (host, port) = parse_mqtt_url("mqtt://broker.example.com").unwrap();
        assert_eq!(host, "broker.example.com");
        assert_eq!(port, 1883);
    }

    #[test]
    fn parse_mqtt_url_rejects_bad_input() {
        assert!(parse_mqtt_url("http://localhost").is_err());
        assert!(parse_mqtt_url("localhost:notaport").is_err());
        assert!(parse_mqtt_url("a:1:2").is_err());
        assert!(parse_mqtt_url(":1883").is_err());
    }

    #[test]
    fn frames_event_on_channel_topic() {
        let identity = MessageIdentityStamp::generate();
        let envelope = Envelope::application(json!({"order": 5}))
            .with(identity)
            .with(ChannelNameStamp::new("orders"));

        let (topic, payload) =
            frame_message(&TopicScheme::default(), EventKind::AfterGet, &envelope).unwrap();

        assert_eq!(topic, "mq-replication/v1/orders/after-get");
        let frame = EventFrame::from_cbor(&payload).unwrap();
        assert_eq!(frame.kind, EventKind::AfterGet);
        assert_eq!(frame.message_id, Some(identity.id()));
        assert_eq!(frame.event.master_envelope(), &envelope);
    }

    #[test]
    fn framing_requires_channel() {
        let envelope = Envelope::application(json!(1));
        let err = frame_message(&TopicScheme::default(), EventKind::AfterAck, &envelope)
            .unwrap_err();
        assert!(err.reason().contains("channel"));
    }
}
