//! # MQ Replication Agent
//!
//! Runs replication transports over a SQLite master queue.
//!
//! ## Commands
//!
//! - `consume` (default): poll the configured transport, acking handled
//!   messages and rejecting failed ones, until Ctrl+C
//! - `send <json>`: send one application message
//!
//! Every operation is mirrored to the configured slaves (SQLite mirror, MQTT).

use anyhow::{Context, Result};
use mq_replication_core::{Envelope, MessageIdentityStamp, Transport};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

mod config;
mod registry;
mod worker;

use config::AgentConfig;
use registry::TransportRegistry;
use worker::{LoggingHandler, Worker};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args: Vec<String> = std::env::args().collect();

    match args.get(1).map_or("consume", String::as_str) {
        "consume" => consume(AgentConfig::from_env()?).await?,
        "send" => {
            let Some(body) = args.get(2) else {
                eprintln!("Usage: mq-replication-agent send <json>");
                std::process::exit(1);
            };
            send(&AgentConfig::from_env()?, body)?;
        }
        "help" | "--help" | "-h" => print_help(),
        cmd => {
            eprintln!("Unknown command: {cmd}");
            print_help();
            std::process::exit(1);
        }
    }

    Ok(())
}

async fn consume(config: AgentConfig) -> Result<()> {
    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        dsn = %config.transport_dsn,
        "Starting MQ replication agent"
    );

    let registry = TransportRegistry::build(&config)?;
    let transport = registry
        .create_transport(&config.transport_dsn)
        .context("Failed to resolve transport DSN")?;

    let worker = Worker::new(transport, Arc::new(LoggingHandler), config.worker.poll_interval);
    let stop = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&stop);
    let mut handle = tokio::task::spawn_blocking(move || worker.run(&flag));

    tracing::info!("Agent running, press Ctrl+C to stop");

    tokio::select! {
        result = &mut handle => {
            result.context("Worker task failed")?;
            return Ok(());
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Shutdown signal received");
        }
    }

    stop.store(true, Ordering::Relaxed);
    handle.await.context("Worker task failed")?;

    // Keep every channel subscribed until the worker is done.
    drop(registry);

    tracing::info!("Agent stopped");
    Ok(())
}

fn send(config: &AgentConfig, body: &str) -> Result<()> {
    let body: serde_json::Value = serde_json::from_str(body).context("Invalid JSON payload")?;

    let registry = TransportRegistry::build(config)?;
    let transport = registry
        .create_transport(&config.transport_dsn)
        .context("Failed to resolve transport DSN")?;

    let sent = transport
        .send(Envelope::application(body))
        .context("Failed to send message")?;

    if let Some(id) = sent.last::<MessageIdentityStamp>() {
        println!("{id}");
    }

    Ok(())
}

fn print_help() {
    println!(
        r#"MQ Replication Agent

USAGE:
    mq-replication-agent [COMMAND]

COMMANDS:
    consume         Consume the configured transport (default)
    send <json>     Send one application message
    help            Show this help message

ENVIRONMENT:
    MQREPL_CHANNEL, MQREPL_CHANNELS, MQREPL_TRANSPORT_DSN, MQREPL_DB_PATH,
    MQREPL_BATCH_SIZE, MQREPL_MIRROR_DB_PATH, MQREPL_MQTT_BROKER,
    MQREPL_TOPIC_PREFIX, MQREPL_POLL_INTERVAL_MS

EXAMPLES:
    MQREPL_CHANNEL=orders mq-replication-agent send '{{"order": 42}}'
    MQREPL_CHANNEL=orders MQREPL_MIRROR_DB_PATH=./mirror.db mq-replication-agent
"#
    );
}
