//! MQTT topic scheme for mirrored replication events.
//!
//! Topic structure: `{prefix}/v1/{channel}/{event_kind}`
//!
//! This allows:
//! - Channel isolation on a shared broker
//! - Subscribing to a single event kind or to a whole channel

use mq_replication_core::EventKind;
use serde::{Deserialize, Serialize};

/// Protocol version for topic scheme.
pub const PROTOCOL_VERSION: &str = "v1";

/// Default topic prefix.
pub const DEFAULT_PREFIX: &str = "mq-replication";

/// Whether `channel` can be used as a single topic level.
///
/// Empty names, the `/` separator, the `+`/`#` wildcards and NUL are rejected.
#[must_use]
pub fn is_valid_channel(channel: &str) -> bool {
    !channel.is_empty() && !channel.contains(['/', '+', '#', '\0'])
}

/// Topic scheme configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TopicScheme {
    /// Topic prefix (default: "mq-replication")
    pub prefix: String,
}

impl Default for TopicScheme {
    fn default() -> Self {
        Self {
            prefix: DEFAULT_PREFIX.to_string(),
        }
    }
}

impl TopicScheme {
    /// Create a topic scheme with a custom prefix.
    #[must_use]
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    fn base(&self, channel: &str) -> String {
        format!("{}/{}/{}", self.prefix, PROTOCOL_VERSION, channel)
    }

    /// Topic for one event kind on a channel.
    #[must_use]
    pub fn event(&self, channel: &str, kind: EventKind) -> String {
        format!("{}/{}", self.base(channel), kind.as_str())
    }

    /// Wildcard subscription for every event on a channel.
    #[must_use]
    pub fn channel_wildcard(&self, channel: &str) -> String {
        format!("{}/#", self.base(channel))
    }

    /// Wildcard subscription for every channel.
    #[must_use]
    pub fn all_wildcard(&self) -> String {
        format!("{}/{}/#", self.prefix, PROTOCOL_VERSION)
    }

    /// Parse a topic into `(channel, kind)`.
    #[must_use]
    pub fn parse(&self, topic: &str) -> Option<(String, EventKind)> {
        let expected_prefix = format!("{}/{}/", self.prefix, PROTOCOL_VERSION);
        let remainder = topic.strip_prefix(&expected_prefix)?;

        let (channel, kind) = remainder.split_once('/')?;
        if channel.is_empty() {
            return None;
        }

        Some((channel.to_string(), EventKind::from_name(kind)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn topic_generation() {
        let scheme = TopicScheme::default();

        assert_eq!(
            scheme.event("orders", EventKind::AfterSend),
            "mq-replication/v1/orders/after-send"
        );
        assert_eq!(
            scheme.event("orders", EventKind::AfterReject),
            "mq-replication/v1/orders/after-reject"
        );
    }

    #[test]
    fn topic_parsing() {
        let scheme = TopicScheme::new("site-b");

        let (channel, kind) = scheme.parse("site-b/v1/billing/after-ack").unwrap();
        assert_eq!(channel, "billing");
        assert_eq!(kind, EventKind::AfterAck);
    }

    #[test]
    fn topic_parsing_rejects_foreign_topics() {
        let scheme = TopicScheme::default();

        assert!(scheme.parse("other/v1/orders/after-send").is_none());
        assert!(scheme.parse("mq-replication/v1/orders").is_none());
        assert!(scheme.parse("mq-replication/v1//after-send").is_none());
        assert!(scheme.parse("mq-replication/v1/orders/after-nothing").is_none());
    }

    #[test]
    fn channel_names_must_be_one_level() {
        assert!(is_valid_channel("orders"));
        assert!(is_valid_channel("orders-eu.v2"));
        assert!(!is_valid_channel(""));
        assert!(!is_valid_channel("orders/eu"));
        assert!(!is_valid_channel("orders+"));
        assert!(!is_valid_channel("#"));
    }

    #[test]
    fn wildcard_topics() {
        let scheme = TopicScheme::default();

        assert_eq!(scheme.channel_wildcard("orders"), "mq-replication/v1/orders/#");
        assert_eq!(scheme.all_wildcard(), "mq-replication/v1/#");
    }
}
