//! Transport registry and `replication://` factory.
//!
//! Every replication transport is constructed once at startup and registered
//! under its channel name. DSNs are resolved against this map; nothing is
//! constructed at lookup time.

use crate::config::AgentConfig;
use anyhow::{Context, Result};
use mq_replication_adapter_mqtt::{MqttSlave, MqttSlaveConfig};
use mq_replication_adapter_sqlite::{SqliteMirror, SqliteQueue};
use mq_replication_core::{
    EventBus, ReplicationTransport, SlaveReceiver, SyncEventBus, TransportError,
};
use mq_replication_proto::{dsn, ReplicationDsn};
use std::collections::BTreeMap;
use std::sync::Arc;
use uuid::Uuid;

/// Named replication transports sharing one event bus.
pub struct TransportRegistry {
    bus: Arc<SyncEventBus>,
    transports: BTreeMap<String, Arc<ReplicationTransport>>,
}

impl TransportRegistry {
    /// Create an empty registry around `bus`.
    #[must_use]
    pub fn new(bus: Arc<SyncEventBus>) -> Self {
        Self {
            bus,
            transports: BTreeMap::new(),
        }
    }

    /// Build the configured transports: SQLite masters, one shared bus, and
    /// the optional mirror and MQTT slaves.
    ///
    /// # Errors
    ///
    /// Returns error if a database or broker connection cannot be set up.
    pub fn build(config: &AgentConfig) -> Result<Self> {
        let mut slaves: Vec<Arc<dyn SlaveReceiver>> = Vec::new();

        if let Some(mirror) = &config.mirror {
            let mirror =
                SqliteMirror::open(&mirror.db_path).context("Failed to open mirror database")?;
            slaves.push(Arc::new(mirror));
        }

        if let Some(mqtt) = &config.mqtt {
            let slave = MqttSlave::connect(MqttSlaveConfig {
                broker: mqtt.broker.clone(),
                client_id: format!("mq-replication-{}", Uuid::new_v4()),
                prefix: mqtt.topic_prefix.clone(),
                ..MqttSlaveConfig::default()
            })
            .context("Failed to create MQTT slave")?;
            slaves.push(Arc::new(slave));
        }

        let mut registry = Self::new(Arc::new(SyncEventBus::new()));

        for channel in &config.channels {
            let queue = SqliteQueue::open(&config.queue.db_path, channel.queue_name())
                .with_context(|| format!("Failed to open queue for channel '{}'", channel.name))?
                .with_batch_size(config.queue.batch_size)
                .with_redeliver_timeout(config.queue.redeliver_timeout);

            let transport = registry.attach(Arc::new(queue), &channel.name, slaves.clone());
            registry.register(transport)?;
        }

        tracing::info!(
            channels = registry.transports.len(),
            slaves = slaves.len(),
            "Transport registry built"
        );

        Ok(registry)
    }

    /// Construct a transport on this registry's bus (not yet registered).
    #[must_use]
    pub fn attach(
        &self,
        master: Arc<dyn mq_replication_core::Transport>,
        channel: &str,
        slaves: Vec<Arc<dyn SlaveReceiver>>,
    ) -> Arc<ReplicationTransport> {
        let bus: Arc<dyn EventBus> = self.bus.clone();
        ReplicationTransport::attach(master, bus, channel, slaves)
    }

    /// Register a transport under its channel name.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::Misconfigured`] if the name is taken.
    pub fn register(&mut self, transport: Arc<ReplicationTransport>) -> Result<(), TransportError> {
        let name = transport.channel_name().to_string();
        if self.transports.contains_key(&name) {
            return Err(TransportError::Misconfigured(format!(
                "transport '{name}' registered twice"
            )));
        }

        self.transports.insert(name, transport);
        Ok(())
    }

    /// Whether `dsn` is handled by this factory.
    #[must_use]
    pub fn supports(&self, dsn: &str) -> bool {
        dsn::supports(dsn)
    }

    /// Resolve a DSN to a registered transport.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::Misconfigured`] for unsupported DSNs or
    /// unknown transport names.
    pub fn create_transport(&self, dsn: &str) -> Result<Arc<ReplicationTransport>, TransportError> {
        if !self.supports(dsn) {
            return Err(TransportError::Misconfigured(format!(
                "unsupported transport DSN '{dsn}'"
            )));
        }

        let parsed =
            ReplicationDsn::parse(dsn).map_err(|e| TransportError::Misconfigured(e.to_string()))?;

        self.transports
            .get(parsed.name())
            .cloned()
            .ok_or_else(|| {
                TransportError::Misconfigured(format!(
                    "no replication transport named '{}'",
                    parsed.name()
                ))
            })
    }

    /// Registered transport names, sorted.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.transports.keys().map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ChannelConfig, MirrorConfig};
    use mq_replication_core::{Envelope, InMemoryTransport, Transport};
    use serde_json::json;
    use tempfile::TempDir;

    fn registry_with(names: &[&str]) -> TransportRegistry {
        let mut registry = TransportRegistry::new(Arc::new(SyncEventBus::new()));
        for name in names {
            let transport =
                registry.attach(Arc::new(InMemoryTransport::new(*name)), name, Vec::new());
            registry.register(transport).unwrap();
        }
        registry
    }

    #[test]
    fn resolves_registered_names() {
        let registry = registry_with(&["orders", "billing"]);

        let orders = registry.create_transport("replication://orders").unwrap();
        assert_eq!(orders.channel_name(), "orders");

        let billing = registry
            .create_transport("replication://x?service=billing")
            .unwrap();
        assert_eq!(billing.channel_name(), "billing");

        assert_eq!(registry.names().collect::<Vec<_>>(), vec!["billing", "orders"]);
    }

    #[test]
    fn unknown_or_foreign_dsns_are_misconfigurations() {
        let registry = registry_with(&["orders"]);

        assert!(!registry.supports("amqp://orders"));
        assert!(matches!(
            registry.create_transport("amqp://orders"),
            Err(TransportError::Misconfigured(_))
        ));
        assert!(matches!(
            registry.create_transport("replication://shipping"),
            Err(TransportError::Misconfigured(_))
        ));
    }

    #[test]
    fn duplicate_names_are_rejected() {
        let mut registry = registry_with(&["orders"]);
        let again =
            registry.attach(Arc::new(InMemoryTransport::new("again")), "orders", Vec::new());

        assert!(matches!(
            registry.register(again),
            Err(TransportError::Misconfigured(_))
        ));
    }

    #[test]
    fn build_wires_sqlite_master_and_mirror() {
        let dir = TempDir::new().unwrap();
        let config = AgentConfig {
            channels: vec![
                ChannelConfig {
                    name: "orders".to_string(),
                    queue_name: None,
                },
                ChannelConfig {
                    name: "billing".to_string(),
                    queue_name: None,
                },
            ],
            queue: crate::config::QueueConfig {
                db_path: dir.path().join("queue.db"),
                batch_size: 5,
                redeliver_timeout: std::time::Duration::from_secs(60),
            },
            mirror: Some(MirrorConfig {
                db_path: dir.path().join("mirror.db"),
            }),
            ..AgentConfig::default()
        };

        let registry = TransportRegistry::build(&config).unwrap();
        let orders = registry.create_transport("replication://orders").unwrap();
        orders.send(Envelope::application(json!({"order": 1}))).unwrap();

        let mirror = SqliteMirror::open(&dir.path().join("mirror.db")).unwrap();
        assert_eq!(mirror.count("orders").unwrap(), 1);
        assert_eq!(mirror.count("billing").unwrap(), 0);
        assert_eq!(orders.slave_count(), 1);
    }
}
