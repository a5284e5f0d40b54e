use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use zeromq::prelude::*;
use zeromq::{PubSocket, SubSocket, ZmqMessage};

use crate::config::RelayConfig;
use crate::endpoint::Endpoint;
use crate::error::RelayError;

/// Counters kept while proxying.
#[derive(Debug, Default)]
pub struct BrokerMetrics {
    pub total_messages: AtomicU64,
    /// Message counts per namespace (`relay.thread`, `relay.status`, ...).
    pub namespace_counts: Mutex<HashMap<String, u64>>,
}

impl BrokerMetrics {
    pub fn total(&self) -> u64 {
        self.total_messages.load(Ordering::Relaxed)
    }
}

#[derive(Debug, Clone)]
pub struct BrokerConfig {
    /// Where publishers connect (broker binds SUB).
    pub frontend: Endpoint,
    /// Where subscribers connect (broker binds PUB).
    pub backend: Endpoint,
}

impl BrokerConfig {
    pub fn local() -> Self {
        Self {
            frontend: Endpoint::ipc("relay-frontend"),
            backend: Endpoint::ipc("relay-backend"),
        }
    }

    pub fn tcp(host: &str, frontend_port: u16, backend_port: u16) -> Self {
        Self {
            frontend: Endpoint::tcp(host, frontend_port),
            backend: Endpoint::tcp(host, backend_port),
        }
    }

    pub fn from_relay(config: &RelayConfig) -> Result<Self, RelayError> {
        Ok(Self {
            frontend: config.frontend()?,
            backend: config.backend()?,
        })
    }
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self::local()
    }
}

/// SUB frontend → PUB backend proxy.
///
/// `zeromq` 0.4 has no XPUB/XSUB, so the broker subscribes its SUB socket to
/// every topic and republishes each multipart message unchanged.
pub struct EventBroker {
    config: BrokerConfig,
    metrics: Arc<BrokerMetrics>,
    shutdown: Arc<AtomicBool>,
}

impl EventBroker {
    pub fn new(config: BrokerConfig) -> Self {
        Self {
            config,
            metrics: Arc::new(BrokerMetrics::default()),
            shutdown: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn metrics(&self) -> &Arc<BrokerMetrics> {
        &self.metrics
    }

    pub fn shutdown(&self) {
        self.shutdown.store(true, Ordering::SeqCst);
    }

    /// Bind both sockets and proxy until [`shutdown`](Self::shutdown) is called.
    pub async fn run(&self) -> Result<(), RelayError> {
        for endpoint in [&self.config.frontend, &self.config.backend] {
            endpoint.ensure_ipc_dir()?;
            endpoint.remove_stale_socket()?;
        }

        let mut frontend = SubSocket::new();
        frontend.bind(&self.config.frontend.address()).await?;
        frontend.subscribe("").await?;
        tracing::info!(endpoint = %self.config.frontend, "broker frontend (SUB) bound");

        let mut backend = PubSocket::new();
        backend.bind(&self.config.backend.address()).await?;
        tracing::info!(endpoint = %self.config.backend, "broker backend (PUB) bound");

        loop {
            if self.shutdown.load(Ordering::SeqCst) {
                tracing::info!("broker shutting down");
                break;
            }

            // Bounded wait so the shutdown flag is checked regularly.
            let msg = match tokio::time::timeout(Duration::from_millis(100), frontend.recv()).await {
                Ok(Ok(msg)) => msg,
                Ok(Err(e)) => {
                    tracing::warn!(error = %e, "frontend recv error");
                    continue;
                }
                Err(_) => continue,
            };

            let topic = extract_topic(&msg);
            let total = self.metrics.total_messages.fetch_add(1, Ordering::Relaxed) + 1;
            *self
                .metrics
                .namespace_counts
                .lock()
                .await
                .entry(namespace(&topic).to_string())
                .or_insert(0) += 1;

            tracing::debug!(topic = %topic, total, "forwarding message");

            if let Err(e) = backend.send(msg).await {
                tracing::warn!(error = %e, "backend send error");
            }
        }

        tracing::info!(total = self.metrics.total(), "broker stopped");
        Ok(())
    }
}

fn extract_topic(msg: &ZmqMessage) -> String {
    msg.iter()
        .next()
        .map(|frame| String::from_utf8_lossy(frame.as_ref()).into_owned())
        .unwrap_or_else(|| "<empty>".to_string())
}

/// The first two dot-separated segments of a topic.
fn namespace(topic: &str) -> &str {
    match topic.match_indices('.').nth(1) {
        Some((idx, _)) => &topic[..idx],
        None => topic,
    }
}
