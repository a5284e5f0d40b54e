//! Typed payloads and topic names used on the relay.

pub mod events;
pub mod topics;
