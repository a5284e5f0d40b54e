use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Correlation id scoping one request's prompt and its response fragments.
///
/// Rendered as 32 lowercase hex characters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ThreadId(pub Uuid);

impl ThreadId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Chat-completion id derived from this thread.
    pub fn completion_id(&self) -> String {
        let hex = self.to_string();
        format!("chatcmpl-{}", &hex[..24])
    }

    pub fn parse(s: &str) -> Option<Self> {
        Uuid::try_parse(s).ok().map(Self)
    }
}

impl Default for ThreadId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ThreadId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.simple())
    }
}

/// One in-flight exchange. Lives only as long as its HTTP request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConversationThread {
    pub id: ThreadId,
    pub project: String,
    pub agent: String,
    pub created_at: DateTime<Utc>,
}

/// What a fragment contributes to the response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FragmentKind {
    TextDelta(String),
    ReasoningDelta,
    Finish,
}

/// A decoded response fragment addressed to a thread.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundFragment {
    /// Envelope event id; the deduplication key.
    pub source_event_id: Uuid,
    pub thread_id: ThreadId,
    pub agent: String,
    pub sequence: Option<u64>,
    pub kind: FragmentKind,
}

impl InboundFragment {
    pub fn is_terminal(&self) -> bool {
        matches!(self.kind, FragmentKind::Finish)
    }
}
