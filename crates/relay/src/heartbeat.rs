//! Periodic project status announcements.
//!
//! An agent backend runs one [`Heartbeat`] per project it serves. Each beat
//! publishes a [`ProjectStatusEvent`] on `relay.status.<project>`; the bridge
//! treats the beat time as every listed agent's last-seen time.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::Notify;
use tracing::{info, warn};

use crate::message::Message;
use crate::messages::events::{AgentAnnouncement, ProjectStatusEvent};
use crate::messages::topics;
use crate::traits::MessageTransport;

/// Fluent description of what to announce and how often.
///
/// ```ignore
/// Heartbeat::new("demo", "backend-1")
///     .agent("npub1...", "echo", true)
///     .interval(Duration::from_secs(30))
///     .run(transport, shutdown)
///     .await;
/// ```
#[derive(Debug, Clone)]
pub struct Heartbeat {
    project: String,
    backend: String,
    agents: Vec<AgentAnnouncement>,
    interval: Duration,
}

impl Heartbeat {
    pub fn new(project: impl Into<String>, backend: impl Into<String>) -> Self {
        Self {
            project: project.into(),
            backend: backend.into(),
            agents: Vec::new(),
            interval: Duration::from_secs(30),
        }
    }

    pub fn agent(mut self, identity: impl Into<String>, name: impl Into<String>, primary: bool) -> Self {
        self.agents.push(AgentAnnouncement {
            identity: identity.into(),
            name: name.into(),
            primary,
        });
        self
    }

    /// Time between beats (default: 30s).
    pub fn interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn status(&self) -> ProjectStatusEvent {
        ProjectStatusEvent {
            project: self.project.clone(),
            backend: self.backend.clone(),
            agents: self.agents.clone(),
            created_at: Utc::now(),
        }
    }

    /// Beat immediately, then every interval, until `shutdown` is notified.
    ///
    /// Trigger shutdown with `notify_one` so a notification sent between two
    /// beats is not lost.
    pub async fn run(self, transport: Arc<dyn MessageTransport>, shutdown: Arc<Notify>) {
        info!(project = %self.project, agents = self.agents.len(), interval = ?self.interval, "heartbeat started");

        let mut ticker = tokio::time::interval(self.interval);
        loop {
            tokio::select! {
                _ = ticker.tick() => self.beat(&*transport).await,
                _ = shutdown.notified() => break,
            }
        }

        info!(project = %self.project, "heartbeat stopped");
    }

    async fn beat(&self, transport: &dyn MessageTransport) {
        match Message::new(topics::status(&self.project), &self.status()) {
            Ok(msg) => {
                if let Err(e) = transport.publish(msg).await {
                    warn!(project = %self.project, error = %e, "failed to publish heartbeat");
                }
            }
            Err(e) => warn!(project = %self.project, error = %e, "failed to serialize heartbeat"),
        }
    }
}
