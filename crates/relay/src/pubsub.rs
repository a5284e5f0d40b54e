use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::{debug, info, instrument};
use zeromq::prelude::*;
use zeromq::{PubSocket, SubSocket, ZmqMessage};

use crate::endpoint::Endpoint;
use crate::error::RelayError;
use crate::message::Message;
use crate::traits::{EventPublisher, EventSubscriber};

/// Build the two-frame wire form: `[topic, envelope]`.
///
/// The topic frame lets SUB sockets filter by prefix without decoding.
pub(crate) fn encode_frames(message: &Message) -> Result<ZmqMessage, RelayError> {
    let envelope = message.to_bytes()?;
    let mut frames = ZmqMessage::from(message.topic.as_str());
    frames.push_back(envelope.into());
    Ok(frames)
}

/// Decode the envelope from a received ZMQ message.
///
/// Accepts `[topic, envelope]` and, from foreign publishers, a lone envelope.
pub(crate) fn decode_frames(frames: &ZmqMessage) -> Result<Message, RelayError> {
    let parts: Vec<_> = frames.iter().collect();
    let envelope = match parts.as_slice() {
        [_, envelope, ..] => envelope.as_ref(),
        [only] => only.as_ref(),
        [] => return Err(RelayError::Transport("empty ZMQ message".into())),
    };
    Ok(Message::from_bytes(envelope)?)
}

/// PUB socket. Connects to the broker frontend, or binds for brokerless use.
pub struct ZmqPublisher {
    socket: Mutex<PubSocket>,
}

impl ZmqPublisher {
    #[instrument(skip_all, fields(endpoint = %endpoint))]
    pub async fn connect(endpoint: &Endpoint) -> Result<Self, RelayError> {
        let mut socket = PubSocket::new();
        info!("connecting PUB socket to broker frontend");
        socket.connect(&endpoint.address()).await?;
        Ok(Self {
            socket: Mutex::new(socket),
        })
    }

    #[instrument(skip_all, fields(endpoint = %endpoint))]
    pub async fn bind(endpoint: &Endpoint) -> Result<Self, RelayError> {
        endpoint.ensure_ipc_dir()?;
        let mut socket = PubSocket::new();
        info!("binding PUB socket");
        socket.bind(&endpoint.address()).await?;
        Ok(Self {
            socket: Mutex::new(socket),
        })
    }
}

#[async_trait]
impl EventPublisher for ZmqPublisher {
    async fn publish(&self, message: Message) -> Result<(), RelayError> {
        let frames = encode_frames(&message)?;
        self.socket.lock().await.send(frames).await?;
        debug!(topic = %message.topic, id = %message.id, "published message");
        Ok(())
    }
}

/// SUB socket connected to the broker backend (or directly to a bound PUB).
pub struct ZmqSubscriber {
    socket: Mutex<SubSocket>,
}

impl ZmqSubscriber {
    #[instrument(skip_all, fields(endpoint = %endpoint))]
    pub async fn connect(endpoint: &Endpoint) -> Result<Self, RelayError> {
        let mut socket = SubSocket::new();
        info!("connecting SUB socket to broker backend");
        socket.connect(&endpoint.address()).await?;
        Ok(Self {
            socket: Mutex::new(socket),
        })
    }
}

#[async_trait]
impl EventSubscriber for ZmqSubscriber {
    async fn subscribe(&self, topic_prefix: &str) -> Result<(), RelayError> {
        self.socket.lock().await.subscribe(topic_prefix).await?;
        info!(topic_prefix = %topic_prefix, "subscribed to topic prefix");
        Ok(())
    }

    async fn recv(&self) -> Result<Message, RelayError> {
        let frames = self.socket.lock().await.recv().await?;
        let message = decode_frames(&frames)?;
        debug!(topic = %message.topic, id = %message.id, "received message");
        Ok(message)
    }
}
