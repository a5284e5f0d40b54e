use async_trait::async_trait;
use tracing::debug;

use crate::error::RelayError;
use crate::hub::{Hub, Subscription};
use crate::message::Message;
use crate::traits::MessageTransport;

/// In-process relay. Publishing delivers straight into the local hub.
///
/// Used for single-process runs and tests; agents must share the same
/// instance to talk to the bridge.
#[derive(Debug, Clone)]
pub struct MemoryTransport {
    hub: Hub,
}

impl MemoryTransport {
    pub fn new(capacity: usize) -> Self {
        Self {
            hub: Hub::new(capacity),
        }
    }

    pub fn hub(&self) -> &Hub {
        &self.hub
    }
}

impl Default for MemoryTransport {
    fn default() -> Self {
        Self::new(1024)
    }
}

#[async_trait]
impl MessageTransport for MemoryTransport {
    async fn publish(&self, message: Message) -> Result<(), RelayError> {
        let topic = message.topic.clone();
        let receivers = self.hub.deliver(message).await;
        debug!(topic = %topic, receivers, "published message");
        Ok(())
    }

    async fn subscribe(&self, topic_prefix: &str) -> Result<Subscription, RelayError> {
        Ok(self.hub.subscribe(topic_prefix))
    }
}
