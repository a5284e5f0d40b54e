use std::time::Duration;

use async_trait::async_trait;
use tokio::task::JoinHandle;
use tracing::{info, instrument, warn};

use crate::config::RelayConfig;
use crate::error::RelayError;
use crate::hub::{Hub, Subscription};
use crate::message::Message;
use crate::pubsub::{ZmqPublisher, ZmqSubscriber};
use crate::traits::{EventPublisher, EventSubscriber, MessageTransport};

/// Broker-backed relay.
///
/// Outbound messages go to the broker frontend over PUB. A single SUB socket
/// on the broker backend pulls the whole namespace and a pump task feeds it
/// into the local [`Hub`], which fans out to per-thread subscriptions. A full
/// subscription stalls the pump, which leaves backlog on the SUB socket.
pub struct ZmqTransport {
    publisher: ZmqPublisher,
    hub: Hub,
    pump: JoinHandle<()>,
}

impl ZmqTransport {
    #[instrument(skip_all, fields(frontend = %config.broker.frontend, backend = %config.broker.backend))]
    pub async fn connect(config: &RelayConfig) -> Result<Self, RelayError> {
        let publisher = ZmqPublisher::connect(&config.frontend()?).await?;
        let subscriber = ZmqSubscriber::connect(&config.backend()?).await?;
        subscriber.subscribe(&config.hub.namespace).await?;

        let hub = Hub::new(config.hub.capacity);
        let pump = tokio::spawn(pump(subscriber, hub.clone()));
        info!(namespace = %config.hub.namespace, "relay transport connected");

        Ok(Self {
            publisher,
            hub,
            pump,
        })
    }

    pub fn hub(&self) -> &Hub {
        &self.hub
    }
}

async fn pump(subscriber: ZmqSubscriber, hub: Hub) {
    loop {
        match subscriber.recv().await {
            Ok(message) => {
                hub.deliver(message).await;
            }
            Err(RelayError::Deserialization(e)) => {
                warn!(error = %e, "dropping undecodable envelope");
            }
            Err(e) => {
                warn!(error = %e, "relay receive failed");
                tokio::time::sleep(Duration::from_millis(100)).await;
            }
        }
    }
}

impl Drop for ZmqTransport {
    fn drop(&mut self) {
        self.pump.abort();
    }
}

#[async_trait]
impl MessageTransport for ZmqTransport {
    async fn publish(&self, message: Message) -> Result<(), RelayError> {
        self.publisher.publish(message).await
    }

    async fn subscribe(&self, topic_prefix: &str) -> Result<Subscription, RelayError> {
        Ok(self.hub.subscribe(topic_prefix))
    }
}
