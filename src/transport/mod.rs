//! Transport layer for the bus connection
//!
//! This module defines the collaborator contract the connection manager drives:
//! connect/publish/subscribe/receive primitives over an already-negotiated
//! socket. Packet framing belongs to the implementation (see [`mqtt`] for the
//! rumqttc-backed one); the manager never touches wire bytes.

use crate::error::BusError;
use async_trait::async_trait;
use bytes::Bytes;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

pub mod mqtt;

/// Delivery guarantee supported by the bus
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QoS {
    /// At most once (0)
    AtMostOnce,
    /// At least once (1)
    AtLeastOnce,
}

impl QoS {
    /// Numeric level as it appears on the wire
    pub fn level(self) -> u8 {
        match self {
            QoS::AtMostOnce => 0,
            QoS::AtLeastOnce => 1,
        }
    }
}

impl TryFrom<u8> for QoS {
    type Error = BusError;

    /// QoS 2 and anything above is rejected, never downgraded
    fn try_from(level: u8) -> Result<Self, Self::Error> {
        match level {
            0 => Ok(QoS::AtMostOnce),
            1 => Ok(QoS::AtLeastOnce),
            other => Err(BusError::InvalidQoS(other)),
        }
    }
}

/// A message handed to the transport for publishing (also used for the last will)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundMessage {
    pub topic: String,
    pub payload: Bytes,
    pub qos: QoS,
    pub retain: bool,
}

/// TLS requirements derived from the broker target
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TlsMode {
    /// Plain TCP
    None,
    /// TLS with the broker certificate validated against this CA (PEM)
    CertificateRequired { ca: PathBuf },
}

impl TlsMode {
    pub fn requires_certificate(&self) -> bool {
        matches!(self, TlsMode::CertificateRequired { .. })
    }
}

/// Username/password pair presented during the handshake
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub user: String,
    pub password: String,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("user", &self.user)
            .field("password", &"***")
            .finish()
    }
}

/// Everything the transport needs to open one broker session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectRequest {
    pub host: String,
    pub port: u16,
    pub client_id: String,
    pub credentials: Credentials,
    pub tls: TlsMode,
    pub keepalive: Duration,
    /// false keeps broker-side subscriptions across reconnects
    pub clean_session: bool,
    pub last_will: OutboundMessage,
}

/// One inbound unit decoded by the transport
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// Application message on a subscribed topic
    Message {
        topic: String,
        payload: Bytes,
        retained: bool,
    },
    /// Acknowledgment of a ping
    PingAck,
    /// Broker-initiated disconnect
    Disconnect,
    /// Any other control packet (acks and the like)
    Control(String),
}

/// Transport-level failures
#[derive(Debug, Error)]
pub enum TransportError {
    /// Nothing arrived within the read timeout; expected while idle
    #[error("Read timed out")]
    Timeout,
    #[error("Socket error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Connection closed")]
    Closed,
    #[error("No open session")]
    NotOpen,
    #[error("Connection refused: {0}")]
    Refused(String),
    #[error("Protocol violation: {0}")]
    Protocol(String),
    /// The broker stopped acknowledging pings
    #[error("Ping not acknowledged")]
    KeepaliveTimeout,
    #[error("Broker disconnected: {0}")]
    BrokerDisconnect(String),
    #[error("TLS setup failed: {0}")]
    Tls(String),
    #[error("Client error")]
    Client(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl TransportError {
    /// Idle timeouts only mean "no data within the poll window"
    pub fn is_idle_timeout(&self) -> bool {
        match self {
            TransportError::Timeout => true,
            TransportError::Io(e) => matches!(
                e.kind(),
                std::io::ErrorKind::TimedOut | std::io::ErrorKind::WouldBlock
            ),
            _ => false,
        }
    }
}

/// Transport trait driven by the connection manager
///
/// Implementations own one socket at a time. `receive_one` must return within
/// the read timeout most recently set with [`Transport::set_read_timeout`],
/// yielding `Ok(None)` (or [`TransportError::Timeout`]) when nothing arrived.
#[async_trait]
pub trait Transport: Send {
    /// Open a session; returns the broker's session-present flag
    async fn connect(&mut self, request: &ConnectRequest) -> Result<bool, TransportError>;

    /// Request a clean disconnect and release the socket
    async fn disconnect(&mut self) -> Result<(), TransportError>;

    /// Send a keepalive ping
    async fn ping(&mut self) -> Result<(), TransportError>;

    /// Receive at most one frame
    async fn receive_one(&mut self) -> Result<Option<Frame>, TransportError>;

    async fn publish(&mut self, message: OutboundMessage) -> Result<(), TransportError>;

    async fn subscribe(&mut self, topic: &str, qos: QoS) -> Result<(), TransportError>;

    /// Bound how long `receive_one` may block
    fn set_read_timeout(&mut self, timeout: Duration);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_qos_accepts_zero_and_one() {
        assert_eq!(QoS::try_from(0).unwrap(), QoS::AtMostOnce);
        assert_eq!(QoS::try_from(1).unwrap(), QoS::AtLeastOnce);
        assert_eq!(QoS::AtLeastOnce.level(), 1);
    }

    #[test]
    fn test_qos_rejects_two_and_above() {
        for level in [2u8, 3, 128, 255] {
            let result = QoS::try_from(level);
            assert!(
                matches!(result, Err(BusError::InvalidQoS(l)) if l == level),
                "QoS {level} must be rejected"
            );
        }
    }

    #[test]
    fn test_idle_timeout_classification() {
        assert!(TransportError::Timeout.is_idle_timeout());
        assert!(TransportError::Io(std::io::ErrorKind::TimedOut.into()).is_idle_timeout());
        assert!(TransportError::Io(std::io::ErrorKind::WouldBlock.into()).is_idle_timeout());
        assert!(!TransportError::Io(std::io::ErrorKind::ConnectionReset.into()).is_idle_timeout());
        assert!(!TransportError::Closed.is_idle_timeout());
    }

    #[test]
    fn test_credentials_debug_hides_password() {
        let credentials = Credentials {
            user: "sensor-7".to_string(),
            password: "hunter2".to_string(),
        };
        let rendered = format!("{credentials:?}");
        assert!(rendered.contains("sensor-7"));
        assert!(!rendered.contains("hunter2"));
    }
}
