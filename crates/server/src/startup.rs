//! Server startup: relay transport, project registry, background tasks.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use threadgate_core::Config;
use threadgate_relay::{echo, Heartbeat, MemoryTransport, MessageTransport, RelayConfig, ZmqTransport};

use crate::bridge::Bridge;
use crate::registry::ProjectRegistry;
use crate::state::AppState;

const DEMO_AGENT: &str = "echo-agent";
const DEMO_HEARTBEAT: Duration = Duration::from_secs(30);
const DEMO_DELAY: Duration = Duration::from_millis(40);

/// Shared state plus the background tasks that keep it current.
pub struct Services {
    pub state: Arc<AppState>,
    pub shutdown: Arc<Notify>,
    pub tasks: Vec<JoinHandle<()>>,
}

impl Services {
    /// Stop background tasks.
    pub async fn stop(self) {
        self.shutdown.notify_one();
        for task in self.tasks {
            task.abort();
            let _ = task.await;
        }
        info!("background tasks stopped");
    }
}

/// Connect the relay transport selected by `RELAY_MODE`.
pub async fn build_transport(config: &Config) -> anyhow::Result<Arc<dyn MessageTransport>> {
    if config.relay.is_memory() {
        info!("relay: in-process memory transport");
        return Ok(Arc::new(MemoryTransport::default()));
    }
    if config.relay.mode != "zmq" {
        warn!(mode = %config.relay.mode, "unknown relay mode, using zmq");
    }

    let relay = RelayConfig::load_or_local(&config.relay.config_path)
        .with_context(|| format!("loading relay config {}", config.relay.config_path.display()))?;
    let transport = ZmqTransport::connect(&relay)
        .await
        .context("connecting to relay broker")?;
    info!(frontend = %relay.broker.frontend, backend = %relay.broker.backend, "relay: zmq transport connected");
    Ok(Arc::new(transport))
}

pub fn build_registry(config: &Config) -> anyhow::Result<Arc<ProjectRegistry>> {
    let registry = match &config.registry.projects_file {
        Some(path) => ProjectRegistry::from_file(path, config.registry.auto_discover)
            .with_context(|| format!("loading projects file {}", path.display()))?,
        None => ProjectRegistry::new(config.registry.auto_discover),
    };
    info!(projects = registry.project_count(), auto_discover = config.registry.auto_discover, "project registry ready");
    Ok(Arc::new(registry))
}

/// Build `AppState` around `transport` and start the status listener.
pub async fn build_services(
    config: &Config,
    transport: Arc<dyn MessageTransport>,
    demo_project: Option<&str>,
) -> anyhow::Result<Services> {
    let registry = build_registry(config)?;
    let shutdown = Arc::new(Notify::new());
    let mut tasks = Vec::new();

    tasks.push(
        registry
            .clone()
            .spawn_status_listener(transport.clone())
            .await
            .context("subscribing to project status")?,
    );

    if let Some(project) = demo_project {
        registry.register(project);
        tasks.extend(spawn_demo_agent(project, transport.clone(), shutdown.clone()));
    }

    let state = Arc::new(AppState {
        bridge: Bridge::new(registry.clone(), transport, &config.bridge),
        registry,
        keep_alive: config.bridge.keep_alive(),
    });

    Ok(Services {
        state,
        shutdown,
        tasks,
    })
}

/// An echo agent plus its heartbeat, inside this process.
fn spawn_demo_agent(
    project: &str,
    transport: Arc<dyn MessageTransport>,
    shutdown: Arc<Notify>,
) -> Vec<JoinHandle<()>> {
    info!(project, agent = DEMO_AGENT, "starting in-process demo agent");

    let heartbeat = Heartbeat::new(project, "threadgate-demo")
        .agent(DEMO_AGENT, "Echo", true)
        .interval(DEMO_HEARTBEAT);
    let beats = tokio::spawn(heartbeat.run(transport.clone(), shutdown));

    let agent = tokio::spawn(async move {
        if let Err(e) = echo::serve(transport, DEMO_AGENT.to_string(), DEMO_DELAY).await {
            warn!(error = %e, "demo agent stopped");
        }
    });

    vec![beats, agent]
}
