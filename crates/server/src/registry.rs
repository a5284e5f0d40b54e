//! Known projects and their last reported status.
//!
//! The registry is seeded from `projects.toml` and kept current by a status
//! listener that applies agent heartbeats. Request handling only ever reads it.

use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, RwLock};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use threadgate_core::project::{AgentPresence, ProjectStatus};
use threadgate_relay::events::ProjectStatusEvent;
use threadgate_relay::{topics, MessageTransport};

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("failed to read projects file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse projects file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid project entry: {0}")]
    Invalid(String),
}

/// `projects.toml`:
///
/// ```toml
/// [[projects]]
/// d_tag = "demo"
/// title = "Demo project"
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProjectsFile {
    #[serde(default)]
    pub projects: Vec<ProjectEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectEntry {
    pub d_tag: String,
    #[serde(default)]
    pub title: Option<String>,
}

#[derive(Debug)]
pub struct ProjectRegistry {
    projects: RwLock<HashMap<String, ProjectStatus>>,
    auto_discover: bool,
}

impl ProjectRegistry {
    pub fn new(auto_discover: bool) -> Self {
        Self {
            projects: RwLock::new(HashMap::new()),
            auto_discover,
        }
    }

    pub fn from_toml(toml_str: &str, auto_discover: bool) -> Result<Self, RegistryError> {
        let file: ProjectsFile = toml::from_str(toml_str)?;
        let registry = Self::new(auto_discover);
        for entry in file.projects {
            let d_tag = entry.d_tag.trim();
            if d_tag.is_empty() || d_tag.contains('/') {
                return Err(RegistryError::Invalid(format!("bad d_tag '{}'", entry.d_tag)));
            }
            if registry.contains(d_tag) {
                return Err(RegistryError::Invalid(format!("duplicate d_tag '{d_tag}'")));
            }
            registry.register(d_tag);
        }
        Ok(registry)
    }

    pub fn from_file(path: impl AsRef<Path>, auto_discover: bool) -> Result<Self, RegistryError> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Self::from_toml(&content, auto_discover)
    }

    /// Register a project with no observed status. No-op if already known.
    pub fn register(&self, d_tag: &str) {
        self.write()
            .entry(d_tag.to_string())
            .or_insert_with(|| ProjectStatus::empty(d_tag));
    }

    pub fn contains(&self, d_tag: &str) -> bool {
        self.read().contains_key(d_tag)
    }

    /// Snapshot of a project's status, `None` if the project is unknown.
    pub fn status(&self, d_tag: &str) -> Option<ProjectStatus> {
        self.read().get(d_tag).cloned()
    }

    pub fn project_count(&self) -> usize {
        self.read().len()
    }

    /// Replace a project's status with the contents of a heartbeat.
    ///
    /// Every announced agent is marked as seen at `seen_at`. Heartbeats for
    /// unknown projects register them only when auto-discovery is enabled.
    /// A heartbeat older than the stored status is dropped. Returns whether
    /// the heartbeat was applied.
    pub fn apply_status(&self, event: &ProjectStatusEvent, seen_at: DateTime<Utc>) -> bool {
        let mut projects = self.write();
        match projects.get(&event.project) {
            Some(current) if current.updated_at.is_some_and(|t| t > seen_at) => {
                debug!(project = %event.project, %seen_at, "ignoring out-of-date heartbeat");
                return false;
            }
            Some(_) => {}
            None if !self.auto_discover => {
                debug!(project = %event.project, "ignoring heartbeat for unknown project");
                return false;
            }
            None => info!(project = %event.project, "discovered project from heartbeat"),
        }

        let status = ProjectStatus {
            project: event.project.clone(),
            backend: Some(event.backend.clone()),
            agents: event
                .agents
                .iter()
                .map(|a| AgentPresence {
                    identity: a.identity.clone(),
                    name: a.name.clone(),
                    is_primary: a.primary,
                    last_seen: Some(seen_at),
                })
                .collect(),
            updated_at: Some(seen_at),
        };
        projects.insert(event.project.clone(), status);
        true
    }

    /// Apply every `relay.status.` heartbeat until the transport closes.
    pub async fn spawn_status_listener(
        self: Arc<Self>,
        transport: Arc<dyn MessageTransport>,
    ) -> Result<JoinHandle<()>, threadgate_relay::RelayError> {
        let mut subscription = transport.subscribe(topics::STATUS_PREFIX).await?;
        info!("project status listener started");

        Ok(tokio::spawn(async move {
            while let Some(msg) = subscription.recv().await {
                match msg.decode::<ProjectStatusEvent>() {
                    Ok(event) => {
                        if self.apply_status(&event, event.created_at) {
                            debug!(project = %event.project, agents = event.agents.len(), "status applied");
                        }
                    }
                    Err(e) => warn!(topic = %msg.topic, error = %e, "undecodable status heartbeat"),
                }
            }
            info!("project status listener stopped");
        }))
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, HashMap<String, ProjectStatus>> {
        self.projects.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, HashMap<String, ProjectStatus>> {
        self.projects.write().unwrap_or_else(|e| e.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use threadgate_relay::events::AgentAnnouncement;
    use threadgate_relay::{Message, MemoryTransport};

    use super::*;

    fn heartbeat(project: &str) -> ProjectStatusEvent {
        ProjectStatusEvent {
            project: project.into(),
            backend: "backend-1".into(),
            agents: vec![
                AgentAnnouncement {
                    identity: "pm".into(),
                    name: "PM".into(),
                    primary: true,
                },
                AgentAnnouncement {
                    identity: "coder".into(),
                    name: "Coder".into(),
                    primary: false,
                },
            ],
            created_at: Utc::now(),
        }
    }

    #[test]
    fn seeds_from_toml() {
        let registry = ProjectRegistry::from_toml(
            r#"
[[projects]]
d_tag = "alpha"

[[projects]]
d_tag = "beta"
title = "Beta"
"#,
            false,
        )
        .unwrap();
        assert_eq!(registry.project_count(), 2);
        let alpha = registry.status("alpha").unwrap();
        assert!(!alpha.is_observed());
        assert!(alpha.agents.is_empty());
    }

    #[test]
    fn rejects_duplicate_and_bad_tags() {
        let dup = "[[projects]]\nd_tag = \"a\"\n[[projects]]\nd_tag = \"a\"\n";
        assert!(matches!(
            ProjectRegistry::from_toml(dup, false),
            Err(RegistryError::Invalid(_))
        ));
        let slash = "[[projects]]\nd_tag = \"a/b\"\n";
        assert!(ProjectRegistry::from_toml(slash, false).is_err());
    }

    #[test]
    fn loads_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("projects.toml");
        std::fs::write(&path, "[[projects]]\nd_tag = \"demo\"\n").unwrap();
        let registry = ProjectRegistry::from_file(&path, true).unwrap();
        assert!(registry.contains("demo"));
    }

    #[test]
    fn heartbeat_replaces_status() {
        let registry = ProjectRegistry::new(false);
        registry.register("demo");
        let seen = Utc::now();
        assert!(registry.apply_status(&heartbeat("demo"), seen));

        let status = registry.status("demo").unwrap();
        assert_eq!(status.backend.as_deref(), Some("backend-1"));
        assert_eq!(status.agents.len(), 2);
        assert!(status.agents.iter().all(|a| a.last_seen == Some(seen)));
        assert!(status.agents[0].is_primary);
    }

    #[test]
    fn late_heartbeat_does_not_roll_back_status() {
        let registry = ProjectRegistry::new(false);
        registry.register("demo");
        let now = Utc::now();
        assert!(registry.apply_status(&heartbeat("demo"), now));

        let mut old = heartbeat("demo");
        old.backend = "backend-old".into();
        assert!(!registry.apply_status(&old, now - chrono::Duration::seconds(600)));

        let status = registry.status("demo").unwrap();
        assert_eq!(status.backend.as_deref(), Some("backend-1"));
        assert!(status.agents.iter().all(|a| a.last_seen == Some(now)));

        // Same instant is not older.
        assert!(registry.apply_status(&heartbeat("demo"), now));
    }

    #[test]
    fn unknown_projects_need_auto_discover() {
        let closed = ProjectRegistry::new(false);
        assert!(!closed.apply_status(&heartbeat("ghost"), Utc::now()));
        assert!(!closed.contains("ghost"));

        let open = ProjectRegistry::new(true);
        assert!(open.apply_status(&heartbeat("ghost"), Utc::now()));
        assert!(open.contains("ghost"));
    }

    #[tokio::test]
    async fn listener_applies_heartbeats() {
        let relay: Arc<dyn MessageTransport> = Arc::new(MemoryTransport::default());
        let registry = Arc::new(ProjectRegistry::new(true));
        let handle = registry
            .clone()
            .spawn_status_listener(relay.clone())
            .await
            .unwrap();

        relay
            .publish(Message::new(topics::status("demo"), &heartbeat("demo")).unwrap())
            .await
            .unwrap();

        let mut applied = false;
        for _ in 0..50 {
            if registry.status("demo").is_some_and(|s| s.is_observed()) {
                applied = true;
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(applied, "heartbeat was not applied");
        handle.abort();
    }
}
