//! Payloads carried inside [`Message`](crate::Message) envelopes.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Fragment type tags as they appear on the wire.
pub const TEXT_DELTA: &str = "text-delta";
pub const REASONING_DELTA: &str = "reasoning-delta";
pub const FINISH: &str = "finish";

/// A prompt handed to an agent, published on `relay.prompt.<agent>`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThreadPrompt {
    /// Thread id, 32 hex chars. Replies go to `relay.thread.<thread_id>`.
    pub thread_id: String,
    /// Project d-tag.
    pub project: String,
    /// Identity of the addressed agent.
    pub agent: String,
    /// Short title derived from the content.
    pub title: String,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

/// One incremental piece of an agent's answer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentFragment {
    pub thread_id: String,
    /// Identity of the agent that produced the fragment.
    pub agent: String,
    /// Position in the reply, when the agent numbers its fragments.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seq: Option<u64>,
    pub data: FragmentData,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FragmentData {
    /// One of [`TEXT_DELTA`], [`REASONING_DELTA`], [`FINISH`].
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
}

impl AgentFragment {
    fn new(thread_id: &str, agent: &str, seq: Option<u64>, kind: &str, text: Option<String>) -> Self {
        Self {
            thread_id: thread_id.to_string(),
            agent: agent.to_string(),
            seq,
            data: FragmentData {
                kind: kind.to_string(),
                text,
            },
        }
    }

    pub fn text_delta(thread_id: &str, agent: &str, seq: Option<u64>, text: impl Into<String>) -> Self {
        Self::new(thread_id, agent, seq, TEXT_DELTA, Some(text.into()))
    }

    pub fn reasoning_delta(thread_id: &str, agent: &str, seq: Option<u64>, text: impl Into<String>) -> Self {
        Self::new(thread_id, agent, seq, REASONING_DELTA, Some(text.into()))
    }

    pub fn finish(thread_id: &str, agent: &str, seq: Option<u64>) -> Self {
        Self::new(thread_id, agent, seq, FINISH, None)
    }
}

/// Heartbeat from an agent backend, published on `relay.status.<project>`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectStatusEvent {
    pub project: String,
    /// Identity of the backend process running the agents.
    pub backend: String,
    pub agents: Vec<AgentAnnouncement>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentAnnouncement {
    pub identity: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub primary: bool,
}
