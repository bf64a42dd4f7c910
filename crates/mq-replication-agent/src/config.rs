//! Agent configuration.

use anyhow::{bail, Context, Result};
use mq_replication_proto::topics::is_valid_channel;
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

/// Agent configuration.
#[derive(Debug, Clone)]
pub struct AgentConfig {
    /// Replication channels, one transport each
    pub channels: Vec<ChannelConfig>,

    /// DSN of the transport the worker consumes
    pub transport_dsn: String,

    /// Master queue configuration
    pub queue: QueueConfig,

    /// SQLite mirror slave (optional)
    pub mirror: Option<MirrorConfig>,

    /// MQTT forwarding slave (optional)
    pub mqtt: Option<MqttConfig>,

    /// Worker configuration
    pub worker: WorkerConfig,
}

/// One replication channel.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ChannelConfig {
    /// Channel name, also the transport name in DSNs
    pub name: String,

    /// Master queue name (defaults to the channel name)
    #[serde(default)]
    pub queue_name: Option<String>,
}

impl ChannelConfig {
    /// Queue backing this channel.
    #[must_use]
    pub fn queue_name(&self) -> &str {
        self.queue_name.as_deref().unwrap_or(&self.name)
    }
}

/// Master queue configuration.
#[derive(Debug, Clone)]
pub struct QueueConfig {
    /// SQLite database path
    pub db_path: PathBuf,

    /// Messages claimed per `get`
    pub batch_size: usize,

    /// Delay before an unsettled delivered message is handed out again
    pub redeliver_timeout: Duration,
}

/// Mirror slave configuration.
#[derive(Debug, Clone)]
pub struct MirrorConfig {
    /// SQLite database path
    pub db_path: PathBuf,
}

/// MQTT slave configuration.
#[derive(Debug, Clone)]
pub struct MqttConfig {
    /// MQTT broker URL
    pub broker: String,

    /// Topic prefix
    pub topic_prefix: String,
}

/// Worker configuration.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Sleep between polls of an empty queue
    pub poll_interval: Duration,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            channels: vec![ChannelConfig {
                name: "default".to_string(),
                queue_name: None,
            }],
            transport_dsn: "replication://default".to_string(),
            queue: QueueConfig {
                db_path: PathBuf::from("./mq-replication.db"),
                batch_size: 10,
                redeliver_timeout: Duration::from_secs(3600),
            },
            mirror: None,
            mqtt: None,
            worker: WorkerConfig {
                poll_interval: Duration::from_millis(500),
            },
        }
    }
}

impl AgentConfig {
    /// Load configuration from environment variables.
    ///
    /// # Environment Variables
    ///
    /// - `MQREPL_CHANNEL`: Single channel name
    /// - `MQREPL_QUEUE_NAME`: Queue name for the single channel
    /// - `MQREPL_CHANNELS`: JSON list of `{"name", "queue_name"}` (overrides the above)
    /// - `MQREPL_TRANSPORT_DSN`: Transport consumed by the worker
    /// - `MQREPL_DB_PATH`: SQLite queue database path
    /// - `MQREPL_BATCH_SIZE`: Messages per `get`
    /// - `MQREPL_REDELIVER_TIMEOUT_MS`: Redelivery delay for unsettled messages
    /// - `MQREPL_MIRROR_DB_PATH`: Enables the SQLite mirror slave
    /// - `MQREPL_MQTT_BROKER`: Enables the MQTT slave
    /// - `MQREPL_TOPIC_PREFIX`: MQTT topic prefix
    /// - `MQREPL_POLL_INTERVAL_MS`: Worker poll interval
    ///
    /// # Errors
    ///
    /// Returns error if a variable cannot be parsed.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration through an arbitrary variable lookup.
    ///
    /// # Errors
    ///
    /// Returns error if a variable cannot be parsed.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut config = Self::default();

        if let Some(channel) = lookup("MQREPL_CHANNEL") {
            config.channels[0].name = channel;
        }

        if let Some(queue_name) = lookup("MQREPL_QUEUE_NAME") {
            config.channels[0].queue_name = Some(queue_name);
        }

        // Parse channels from JSON env var
        if let Some(channels_json) = lookup("MQREPL_CHANNELS") {
            config.channels =
                serde_json::from_str(&channels_json).context("Invalid MQREPL_CHANNELS JSON")?;
            if config.channels.is_empty() {
                bail!("MQREPL_CHANNELS must name at least one channel");
            }
        }

        for channel in &config.channels {
            if !is_valid_channel(&channel.name) {
                bail!(
                    "Invalid channel name '{}': must be non-empty without '/', '+' or '#'",
                    channel.name
                );
            }
        }

        config.transport_dsn = lookup("MQREPL_TRANSPORT_DSN")
            .unwrap_or_else(|| format!("replication://{}", config.channels[0].name));

        if let Some(db_path) = lookup("MQREPL_DB_PATH") {
            config.queue.db_path = PathBuf::from(db_path);
        }

        if let Some(batch_size) = lookup("MQREPL_BATCH_SIZE") {
            config.queue.batch_size = batch_size
                .parse()
                .context("Invalid MQREPL_BATCH_SIZE")?;
        }

        if let Some(timeout) = lookup("MQREPL_REDELIVER_TIMEOUT_MS") {
            let millis: u64 = timeout
                .parse()
                .context("Invalid MQREPL_REDELIVER_TIMEOUT_MS")?;
            config.queue.redeliver_timeout = Duration::from_millis(millis);
        }

        if let Some(db_path) = lookup("MQREPL_MIRROR_DB_PATH") {
            config.mirror = Some(MirrorConfig {
                db_path: PathBuf::from(db_path),
            });
        }

        if let Some(broker) = lookup("MQREPL_MQTT_BROKER") {
            config.mqtt = Some(MqttConfig {
                broker,
                topic_prefix: lookup("MQREPL_TOPIC_PREFIX").unwrap_or_else(|| {
                    mq_replication_proto::topics::DEFAULT_PREFIX.to_string()
                }),
            });
        }

        if let Some(interval) = lookup("MQREPL_POLL_INTERVAL_MS") {
            let millis: u64 = interval
                .parse()
                .context("Invalid MQREPL_POLL_INTERVAL_MS")?;
            config.worker.poll_interval = Duration::from_millis(millis);
        }

        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn load(vars: &[(&str, &str)]) -> Result<AgentConfig> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        AgentConfig::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn defaults() {
        let config = load(&[]).unwrap();

        assert_eq!(config.channels.len(), 1);
        assert_eq!(config.channels[0].queue_name(), "default");
        assert_eq!(config.transport_dsn, "replication://default");
        assert!(config.mirror.is_none());
        assert!(config.mqtt.is_none());
    }

    #[test]
    fn single_channel_overrides() {
        let config = load(&[
            ("MQREPL_CHANNEL", "orders"),
            ("MQREPL_QUEUE_NAME", "orders-q"),
            ("MQREPL_BATCH_SIZE", "25"),
            ("MQREPL_POLL_INTERVAL_MS", "50"),
            ("MQREPL_REDELIVER_TIMEOUT_MS", "30000"),
            ("MQREPL_MQTT_BROKER", "tcp://broker:1883"),
        ])
        .unwrap();

        assert_eq!(config.channels[0].name, "orders");
        assert_eq!(config.channels[0].queue_name(), "orders-q");
        assert_eq!(config.transport_dsn, "replication://orders");
        assert_eq!(config.queue.batch_size, 25);
        assert_eq!(config.worker.poll_interval, Duration::from_millis(50));
        assert_eq!(config.queue.redeliver_timeout, Duration::from_secs(30));
        let mqtt = config.mqtt.unwrap();
        assert_eq!(mqtt.broker, "tcp://broker:1883");
        assert_eq!(mqtt.topic_prefix, "mq-replication");
    }

    #[test]
    fn channels_from_json() {
        let config = load(&[
            (
                "MQREPL_CHANNELS",
                r#"[{"name": "orders"}, {"name": "billing", "queue_name": "invoices"}]"#,
            ),
            ("MQREPL_TRANSPORT_DSN", "replication://billing"),
        ])
        .unwrap();

        assert_eq!(config.channels.len(), 2);
        assert_eq!(config.channels[0].queue_name(), "orders");
        assert_eq!(config.channels[1].queue_name(), "invoices");
        assert_eq!(config.transport_dsn, "replication://billing");
    }

    #[test]
    fn invalid_values_fail() {
        assert!(load(&[("MQREPL_BATCH_SIZE", "many")]).is_err());
        assert!(load(&[("MQREPL_REDELIVER_TIMEOUT_MS", "-1")]).is_err());
        assert!(load(&[("MQREPL_CHANNELS", "[]")]).is_err());
        assert!(load(&[("MQREPL_CHANNELS", "{")]).is_err());
    }

    #[test]
    fn channel_names_that_break_topics_fail() {
        assert!(load(&[("MQREPL_CHANNEL", "orders/eu")]).is_err());
        assert!(load(&[("MQREPL_CHANNEL", "orders+")]).is_err());
        assert!(load(&[("MQREPL_CHANNEL", "")]).is_err());
        assert!(load(&[("MQREPL_CHANNELS", r##"[{"name": "ok"}, {"name": "#"}]"##)]).is_err());
    }
}
