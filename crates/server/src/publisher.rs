use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

use threadgate_core::BridgeError;
use threadgate_relay::{Message, MessageTransport};

/// Hands prompts to the relay, bounded by a timeout.
#[derive(Clone)]
pub struct PromptPublisher {
    transport: Arc<dyn MessageTransport>,
    timeout: Duration,
}

impl PromptPublisher {
    pub fn new(transport: Arc<dyn MessageTransport>, timeout: Duration) -> Self {
        Self { transport, timeout }
    }

    /// Returns once the transport has accepted `message`.
    pub async fn publish(&self, message: Message) -> Result<(), BridgeError> {
        let topic = message.topic.clone();
        match tokio::time::timeout(self.timeout, self.transport.publish(message)).await {
            Ok(Ok(())) => {
                debug!(topic = %topic, "prompt published");
                Ok(())
            }
            Ok(Err(e)) => {
                warn!(topic = %topic, error = %e, "prompt publish failed");
                Err(BridgeError::PublishFailed(e.to_string()))
            }
            Err(_) => {
                warn!(topic = %topic, timeout = ?self.timeout, "prompt publish timed out");
                Err(BridgeError::PublishFailed(format!(
                    "relay did not accept the prompt within {:?}",
                    self.timeout
                )))
            }
        }
    }
}

impl std::fmt::Debug for PromptPublisher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PromptPublisher")
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}
