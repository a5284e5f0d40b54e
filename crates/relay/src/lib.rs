pub mod broker;
pub mod config;
pub mod echo;
pub mod endpoint;
pub mod error;
pub mod heartbeat;
pub mod hub;
pub mod memory;
pub mod message;
pub mod messages;
pub mod pubsub;
pub mod traits;
pub mod zmq_transport;

pub use broker::{BrokerConfig, EventBroker};
pub use config::RelayConfig;
pub use endpoint::Endpoint;
pub use error::RelayError;
pub use heartbeat::Heartbeat;
pub use hub::{Hub, Subscription};
pub use memory::MemoryTransport;
pub use message::Message;
pub use messages::events;
pub use messages::topics;
pub use pubsub::{ZmqPublisher, ZmqSubscriber};
pub use traits::{EventPublisher, EventSubscriber, MessageTransport};
pub use zmq_transport::ZmqTransport;
