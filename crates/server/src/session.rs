//! Builds the conversation thread and the prompt message for one request.

use chrono::Utc;

use threadgate_core::project::AgentHandle;
use threadgate_core::thread::{ConversationThread, ThreadId};
use threadgate_core::BridgeError;
use threadgate_relay::events::ThreadPrompt;
use threadgate_relay::{topics, Message};

const TITLE_CHARS: usize = 50;

/// First 50 characters of `content`, with `...` appended when cut.
pub fn derive_title(content: &str) -> String {
    let mut chars = content.chars();
    let title: String = chars.by_ref().take(TITLE_CHARS).collect();
    if chars.next().is_some() {
        format!("{title}...")
    } else {
        title
    }
}

/// Allocate a fresh thread and the prompt addressed to `agent`.
pub fn build(
    content: &str,
    project: &str,
    agent: &AgentHandle,
) -> Result<(ConversationThread, Message), BridgeError> {
    let thread = ConversationThread {
        id: ThreadId::new(),
        project: project.to_string(),
        agent: agent.identity.clone(),
        created_at: Utc::now(),
    };

    let prompt = ThreadPrompt {
        thread_id: thread.id.to_string(),
        project: thread.project.clone(),
        agent: thread.agent.clone(),
        title: derive_title(content),
        content: content.to_string(),
        created_at: thread.created_at,
    };

    let message = Message::with_correlation(topics::prompt(&agent.identity), &prompt, thread.id.0)
        .map_err(|e| BridgeError::Internal(format!("failed to encode prompt: {e}")))?;

    Ok((thread, message))
}
