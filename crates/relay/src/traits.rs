use std::sync::Arc;

use async_trait::async_trait;

use crate::error::RelayError;
use crate::hub::Subscription;
use crate::message::Message;

/// Sends envelopes onto a ZeroMQ PUB socket.
#[async_trait]
pub trait EventPublisher: Send + Sync {
    async fn publish(&self, message: Message) -> Result<(), RelayError>;
}

/// Receives envelopes from a ZeroMQ SUB socket.
#[async_trait]
pub trait EventSubscriber: Send + Sync {
    /// Subscribe to topics starting with `topic_prefix`. Empty matches all.
    async fn subscribe(&self, topic_prefix: &str) -> Result<(), RelayError>;

    /// Receive the next message. Blocks until one is available.
    async fn recv(&self) -> Result<Message, RelayError>;
}

/// The relay as seen by the bridge and by agents.
///
/// `publish` returns once the transport has accepted the message; delivery is
/// not confirmed. A [`Subscription`] receives every message published after it
/// was created whose topic starts with the prefix, and unsubscribes on drop.
#[async_trait]
pub trait MessageTransport: Send + Sync {
    async fn publish(&self, message: Message) -> Result<(), RelayError>;

    async fn subscribe(&self, topic_prefix: &str) -> Result<Subscription, RelayError>;
}

#[async_trait]
impl<T: MessageTransport + ?Sized> MessageTransport for Arc<T> {
    async fn publish(&self, message: Message) -> Result<(), RelayError> {
        (**self).publish(message).await
    }

    async fn subscribe(&self, topic_prefix: &str) -> Result<Subscription, RelayError> {
        (**self).subscribe(topic_prefix).await
    }
}
