//! Reply logic of the development echo agent.
//!
//! The agent answers every prompt addressed to it by streaming the prompt
//! back word by word as numbered text deltas, then a finish fragment.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::RelayError;
use crate::message::Message;
use crate::messages::events::{AgentFragment, ThreadPrompt};
use crate::messages::topics;
use crate::traits::MessageTransport;

/// Split `content` into the fragments an echo reply consists of.
///
/// Whitespace between words is kept on the preceding word so the deltas
/// concatenate back to the original text.
pub fn echo_fragments(prompt: &ThreadPrompt, identity: &str) -> Vec<AgentFragment> {
    let mut fragments = Vec::new();
    let mut seq = 0u64;
    let mut current = String::new();

    for ch in prompt.content.chars() {
        if !ch.is_whitespace() && current.chars().last().is_some_and(char::is_whitespace) {
            fragments.push(AgentFragment::text_delta(
                &prompt.thread_id,
                identity,
                Some(seq),
                std::mem::take(&mut current),
            ));
            seq += 1;
        }
        current.push(ch);
    }
    if !current.is_empty() {
        fragments.push(AgentFragment::text_delta(&prompt.thread_id, identity, Some(seq), current));
        seq += 1;
    }

    fragments.push(AgentFragment::finish(&prompt.thread_id, identity, Some(seq)));
    fragments
}

/// Publish an echo reply for `prompt`, pausing `delay` between fragments.
pub async fn reply(
    transport: &dyn MessageTransport,
    prompt: &ThreadPrompt,
    identity: &str,
    delay: Duration,
) -> Result<usize, RelayError> {
    let correlation = Uuid::try_parse(&prompt.thread_id).unwrap_or_else(|_| Uuid::nil());
    let topic = topics::thread(&prompt.thread_id);
    let fragments = echo_fragments(prompt, identity);
    let count = fragments.len();

    for (i, fragment) in fragments.into_iter().enumerate() {
        if i > 0 && !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        let msg = Message::with_correlation(topic.clone(), &fragment, correlation)?;
        transport.publish(msg).await?;
    }

    debug!(thread_id = %prompt.thread_id, fragments = count, "echo reply sent");
    Ok(count)
}

/// Answer prompts on `relay.prompt.<identity>` until the subscription ends.
pub async fn serve(
    transport: Arc<dyn MessageTransport>,
    identity: String,
    delay: Duration,
) -> Result<(), RelayError> {
    let mut prompts = transport.subscribe(&topics::prompt(&identity)).await?;
    info!(identity = %identity, "echo agent listening for prompts");

    while let Some(msg) = prompts.recv().await {
        let prompt: ThreadPrompt = match msg.decode() {
            Ok(p) => p,
            Err(e) => {
                warn!(topic = %msg.topic, error = %e, "ignoring undecodable prompt");
                continue;
            }
        };
        // The subscription is a prefix match, so `pm` also sees prompts for `pm2`.
        if prompt.agent != identity {
            debug!(thread_id = %prompt.thread_id, agent = %prompt.agent, "prompt addressed to another agent");
            continue;
        }
        info!(thread_id = %prompt.thread_id, project = %prompt.project, title = %prompt.title, "prompt received");

        let transport = transport.clone();
        let identity = identity.clone();
        tokio::spawn(async move {
            if let Err(e) = reply(&*transport, &prompt, &identity, delay).await {
                warn!(thread_id = %prompt.thread_id, error = %e, "echo reply failed");
            }
        });
    }

    Ok(())
}
