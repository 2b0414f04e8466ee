//! Retained presence announcements on the agent status topic
//!
//! Every agent owns `{base}agents/{user}`. The topic carries a single retained
//! byte: `0xFF` while the agent is online and `0x00` once it is gone, either
//! announced by the agent itself or published by the broker from the last
//! will. Other bus participants depend on these exact bytes.

use crate::transport::{OutboundMessage, QoS};
use bytes::Bytes;

pub const ONLINE_PAYLOAD: u8 = 0xFF;
pub const OFFLINE_PAYLOAD: u8 = 0x00;

/// Status topic for one agent identity
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusTopic(String);

impl StatusTopic {
    /// Build `{base}agents/{user}`; `base` is used verbatim, including any trailing separator
    pub fn new(base: &str, user: &str) -> Self {
        Self(format!("{base}agents/{user}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for StatusTopic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Produces the presence messages for one status topic
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PresenceAnnouncer {
    topic: StatusTopic,
}

impl PresenceAnnouncer {
    pub fn new(topic: StatusTopic) -> Self {
        Self { topic }
    }

    pub fn topic(&self) -> &StatusTopic {
        &self.topic
    }

    /// Broker-side testament; identical to the offline announcement
    pub fn last_will(&self) -> OutboundMessage {
        self.announcement(OFFLINE_PAYLOAD)
    }

    pub fn online(&self) -> OutboundMessage {
        self.announcement(ONLINE_PAYLOAD)
    }

    pub fn offline(&self) -> OutboundMessage {
        self.announcement(OFFLINE_PAYLOAD)
    }

    fn announcement(&self, byte: u8) -> OutboundMessage {
        OutboundMessage {
            topic: self.topic.as_str().to_string(),
            payload: Bytes::copy_from_slice(&[byte]),
            qos: QoS::AtLeastOnce,
            retain: true,
        }
    }
}
