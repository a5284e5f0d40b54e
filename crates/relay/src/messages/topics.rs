//! Topic names for relay routing.
//!
//! Topics follow `relay.<kind>.<key>` so a single namespace subscription
//! covers everything the bridge and agents exchange.

/// Prefix shared by every relay topic.
pub const NAMESPACE: &str = "relay.";

/// Prompts addressed to one agent.
pub const PROMPT_PREFIX: &str = "relay.prompt.";

/// Response fragments for one conversation thread.
pub const THREAD_PREFIX: &str = "relay.thread.";

/// Status heartbeats for one project.
pub const STATUS_PREFIX: &str = "relay.status.";

pub fn prompt(agent: &str) -> String {
    format!("{PROMPT_PREFIX}{agent}")
}

pub fn thread(thread_id: impl std::fmt::Display) -> String {
    format!("{THREAD_PREFIX}{thread_id}")
}

pub fn status(project: &str) -> String {
    format!("{STATUS_PREFIX}{project}")
}
