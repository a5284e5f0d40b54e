use std::fmt;

use thiserror::Error;

/// Why no agent could be selected for a project.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnavailableReason {
    /// The project reports no agents at all.
    NoAgents,
    /// Agents are online but none is flagged primary.
    NoPrimary,
    /// The primary's last-seen timestamp is too old or missing.
    Stale,
}

impl fmt::Display for UnavailableReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoAgents => write!(f, "no agents are online for this project"),
            Self::NoPrimary => write!(f, "no primary agent is configured for this project"),
            Self::Stale => write!(f, "the primary agent has not been seen recently"),
        }
    }
}

/// Which timer fired while waiting on an agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeoutPhase {
    /// No fragment arrived after arming.
    Armed,
    /// Silence between fragments exceeded the limit.
    InterFragment,
}

impl fmt::Display for TimeoutPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Armed => write!(f, "waiting for the first response fragment"),
            Self::InterFragment => write!(f, "waiting for the next response fragment"),
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BridgeError {
    #[error("{0}")]
    RequestInvalid(String),

    #[error("Project not found: {0}")]
    ProjectNotFound(String),

    #[error("Agent unavailable: {0}")]
    AgentUnavailable(UnavailableReason),

    #[error("Failed to publish prompt: {0}")]
    PublishFailed(String),

    #[error("Timed out {0}")]
    StreamTimeout(TimeoutPhase),

    #[error("Client disconnected")]
    ClientDisconnected,

    #[error("Agent sent too many malformed fragments ({0})")]
    MalformedFragments(u32),

    #[error("Failed to subscribe to thread: {0}")]
    Subscription(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl BridgeError {
    /// HTTP status code for this error.
    pub fn status_code(&self) -> u16 {
        match self {
            Self::RequestInvalid(_) => 400,
            Self::ProjectNotFound(_) => 404,
            Self::AgentUnavailable(_) => 503,
            Self::PublishFailed(_) => 500,
            Self::StreamTimeout(_) => 504,
            // Never surfaced; the status only matters for logging.
            Self::ClientDisconnected => 499,
            Self::MalformedFragments(_) => 502,
            Self::Subscription(_) | Self::Internal(_) => 500,
        }
    }

    /// OpenAI-compatible error `type` string.
    pub fn error_type(&self) -> &'static str {
        match self {
            Self::RequestInvalid(_) => "invalid_request_error",
            Self::ProjectNotFound(_) => "not_found_error",
            Self::AgentUnavailable(_) => "service_unavailable_error",
            Self::PublishFailed(_)
            | Self::Subscription(_)
            | Self::Internal(_)
            | Self::ClientDisconnected => "server_error",
            Self::StreamTimeout(_) => "timeout_error",
            Self::MalformedFragments(_) => "bad_gateway_error",
        }
    }

    pub fn invalid(msg: impl Into<String>) -> Self {
        Self::RequestInvalid(msg.into())
    }
}

pub type Result<T> = std::result::Result<T, BridgeError>;
