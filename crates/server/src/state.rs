use std::sync::Arc;
use std::time::Duration;

use crate::bridge::Bridge;
use crate::registry::ProjectRegistry;

pub struct AppState {
    pub bridge: Bridge,
    pub registry: Arc<ProjectRegistry>,
    /// Interval between SSE keep-alive comments.
    pub keep_alive: Duration,
}
