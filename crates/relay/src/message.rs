use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Wire-format envelope for everything that crosses the relay.
///
/// Envelopes are MessagePack-encoded. `id` identifies one published event and
/// survives redelivery unchanged, so receivers deduplicate on it. `topic`
/// drives prefix routing, and `correlation_id` ties an event to the
/// conversation thread it belongs to.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Message {
    /// Event id, stable across redelivery.
    #[serde(default = "Uuid::new_v4")]
    pub id: Uuid,

    /// Routing topic (e.g. `relay.thread.<id>`).
    pub topic: String,

    /// MessagePack-encoded payload bytes.
    #[serde(with = "serde_bytes")]
    pub payload: Vec<u8>,

    /// When this message was created.
    pub timestamp: DateTime<Utc>,

    /// Correlation id; the thread id for prompts and fragments.
    pub correlation_id: Uuid,

    /// Schema version of the payload.
    #[serde(default = "default_version")]
    pub version: u16,
}

fn default_version() -> u16 {
    1
}

impl Message {
    /// Create a new message, serializing the payload with MessagePack.
    pub fn new<T: Serialize>(
        topic: impl Into<String>,
        payload: &T,
    ) -> Result<Self, rmp_serde::encode::Error> {
        Self::with_correlation(topic, payload, Uuid::new_v4())
    }

    /// Create a message with an explicit correlation id.
    pub fn with_correlation<T: Serialize>(
        topic: impl Into<String>,
        payload: &T,
        correlation_id: Uuid,
    ) -> Result<Self, rmp_serde::encode::Error> {
        Ok(Self {
            id: Uuid::new_v4(),
            topic: topic.into(),
            payload: rmp_serde::to_vec_named(payload)?,
            timestamp: Utc::now(),
            correlation_id,
            version: 1,
        })
    }

    /// Deserialize the payload into the expected type.
    pub fn decode<T: for<'de> Deserialize<'de>>(&self) -> Result<T, rmp_serde::decode::Error> {
        rmp_serde::from_slice(&self.payload)
    }

    /// Serialize this entire envelope to MessagePack bytes.
    pub fn to_bytes(&self) -> Result<Vec<u8>, rmp_serde::encode::Error> {
        rmp_serde::to_vec_named(self)
    }

    /// Deserialize an envelope from MessagePack bytes.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, rmp_serde::decode::Error> {
        rmp_serde::from_slice(bytes)
    }
}

/// `Vec<u8>` as a MessagePack bin instead of an array of integers.
mod serde_bytes {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], s: S) -> Result<S::Ok, S::Error> {
        s.serialize_bytes(bytes)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<u8>, D::Error> {
        let bytes: &[u8] = Deserialize::deserialize(d)?;
        Ok(bytes.to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn envelope_survives_bytes() {
        let thread = Uuid::new_v4();
        let msg = Message::with_correlation("relay.thread.x", &"hello".to_string(), thread).unwrap();
        let decoded = Message::from_bytes(&msg.to_bytes().unwrap()).unwrap();

        assert_eq!(decoded.id, msg.id);
        assert_eq!(decoded.topic, "relay.thread.x");
        assert_eq!(decoded.correlation_id, thread);
        assert_eq!(decoded.decode::<String>().unwrap(), "hello");
    }

    #[test]
    fn every_message_gets_its_own_id() {
        let a = Message::new("relay.t", &1u8).unwrap();
        let b = Message::new("relay.t", &1u8).unwrap();
        assert_ne!(a.id, b.id);
    }

    #[test]
    fn redelivered_clone_keeps_id() {
        let a = Message::new("relay.t", &1u8).unwrap();
        let b = a.clone();
        assert_eq!(a.id, b.id);
    }

    #[test]
    fn garbage_payload_fails_to_decode() {
        let mut msg = Message::new("relay.t", &1u8).unwrap();
        msg.payload = vec![0xc1];
        assert!(msg.decode::<String>().is_err());
    }
}
