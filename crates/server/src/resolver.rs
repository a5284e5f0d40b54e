use std::sync::Arc;
use std::time::Duration;

use tracing::debug;

use threadgate_core::project::ProjectStatus;
use threadgate_core::BridgeError;

use crate::registry::ProjectRegistry;

const POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Maps a path d-tag to the project's current status.
#[derive(Debug, Clone)]
pub struct ProjectResolver {
    registry: Arc<ProjectRegistry>,
    status_wait: Duration,
    poll_interval: Duration,
}

impl ProjectResolver {
    pub fn new(registry: Arc<ProjectRegistry>, status_wait: Duration) -> Self {
        Self {
            registry,
            status_wait,
            poll_interval: POLL_INTERVAL,
        }
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval.max(Duration::from_millis(1));
        self
    }

    /// Look up `d_tag`.
    ///
    /// A known project whose status has not been observed yet is polled for up
    /// to `status_wait`; if nothing arrives the empty status is returned.
    pub async fn resolve(&self, d_tag: &str) -> Result<ProjectStatus, BridgeError> {
        let Some(status) = self.registry.status(d_tag) else {
            debug!(project = %d_tag, "project not found");
            return Err(BridgeError::ProjectNotFound(d_tag.to_string()));
        };
        if status.is_observed() || self.status_wait.is_zero() {
            return Ok(status);
        }

        debug!(project = %d_tag, wait = ?self.status_wait, "waiting for first project status");
        let deadline = tokio::time::Instant::now() + self.status_wait;
        while tokio::time::Instant::now() < deadline {
            let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
            tokio::time::sleep(self.poll_interval.min(remaining)).await;
            match self.registry.status(d_tag) {
                Some(s) if s.is_observed() => return Ok(s),
                Some(_) => continue,
                None => break,
            }
        }

        debug!(project = %d_tag, "no status observed in time");
        Ok(ProjectStatus::empty(d_tag))
    }
}
