use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Live view of one project as last reported by its agent backend.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ProjectStatus {
    /// Project d-tag.
    pub project: String,
    /// Identity of the backend that last reported this status.
    #[serde(default)]
    pub backend: Option<String>,
    #[serde(default)]
    pub agents: Vec<AgentPresence>,
    /// When the status was last refreshed. `None` until a heartbeat is seen.
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

impl ProjectStatus {
    pub fn empty(project: impl Into<String>) -> Self {
        Self {
            project: project.into(),
            ..Default::default()
        }
    }

    /// True once any status report has been applied.
    pub fn is_observed(&self) -> bool {
        self.updated_at.is_some()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AgentPresence {
    /// Agent identity (public key or other stable id).
    pub identity: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub is_primary: bool,
    #[serde(default)]
    pub last_seen: Option<DateTime<Utc>>,
}

/// Liveness classification of a selected agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Liveness {
    Live,
    Stale,
    Unknown,
}

/// The agent chosen to answer one request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentHandle {
    pub identity: String,
    pub name: String,
    pub liveness: Liveness,
}
