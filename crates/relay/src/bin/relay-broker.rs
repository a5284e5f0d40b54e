//! relay-broker: central PUB/SUB rendezvous for the bridge and its agents.
//!
//! Publishers connect to the frontend, subscribers to the backend. Every
//! message is forwarded unchanged and counted per topic namespace.
//!
//! ```bash
//! # Endpoints from config/relay.toml (local IPC when missing)
//! relay-broker
//!
//! # Explicit TCP endpoints
//! relay-broker --frontend tcp://0.0.0.0:5555 --backend tcp://0.0.0.0:5556
//! ```

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use threadgate_relay::{BrokerConfig, Endpoint, EventBroker, RelayConfig};

/// Central PUB/SUB broker for the relay.
#[derive(Parser, Debug)]
#[command(name = "relay-broker", version, about)]
struct Cli {
    /// Relay topology file.
    #[arg(long, env = "RELAY_CONFIG", default_value = "config/relay.toml")]
    config: PathBuf,

    /// Frontend endpoint override (publishers connect here).
    #[arg(long)]
    frontend: Option<String>,

    /// Backend endpoint override (subscribers connect here).
    #[arg(long)]
    backend: Option<String>,

    /// Seconds between metrics log lines (0 = disabled).
    #[arg(long, env = "RELAY_METRICS_INTERVAL", default_value_t = 30)]
    metrics_interval: u64,
}

impl Cli {
    fn broker_config(&self) -> anyhow::Result<BrokerConfig> {
        let mut config = BrokerConfig::from_relay(&RelayConfig::load_or_local(&self.config)?)?;
        if let Some(frontend) = &self.frontend {
            config.frontend = Endpoint::parse(frontend)?;
        }
        if let Some(backend) = &self.backend {
            config.backend = Endpoint::parse(backend)?;
        }
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    tracing::info!(?cli, "starting relay-broker");

    let broker = Arc::new(EventBroker::new(cli.broker_config()?));

    let broker_for_signal = broker.clone();
    tokio::spawn(async move {
        shutdown_signal().await;
        tracing::info!("shutdown signal received");
        broker_for_signal.shutdown();
    });

    if cli.metrics_interval > 0 {
        let metrics = broker.metrics().clone();
        let period = Duration::from_secs(cli.metrics_interval);
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            loop {
                interval.tick().await;
                let counts = metrics.namespace_counts.lock().await;
                tracing::info!(
                    total_messages = metrics.total(),
                    namespaces = counts.len(),
                    "broker metrics"
                );
                for (namespace, count) in counts.iter() {
                    tracing::debug!(namespace = %namespace, count, "namespace stats");
                }
            }
        });
    }

    broker.run().await?;

    tracing::info!("relay-broker exited cleanly");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();

    #[cfg(unix)]
    {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = ctrl_c => {},
                    _ = sigterm.recv() => {},
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, "failed to register SIGTERM handler");
                let _ = ctrl_c.await;
            }
        }
    }

    #[cfg(not(unix))]
    {
        let _ = ctrl_c.await;
    }
}
