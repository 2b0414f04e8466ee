//! Error types for the bus connection
//!
//! [`BusError`] is what callers of the publish/subscribe/activation API see.
//! [`Fault`] is the reason handed to `on_disconnect` when a connection cycle
//! ends abnormally; it never escapes the pump step.

use crate::connection::ConnectionState;
use crate::transport::TransportError;
use thiserror::Error;

/// Errors returned synchronously from the manager's public API
#[derive(Debug, Error)]
pub enum BusError {
    #[error("QoS {0} not supported (only 0 and 1)")]
    InvalidQoS(u8),

    #[error("Not connected - current state: {state:?}")]
    NotConnected { state: ConnectionState },

    #[error("Topic must not be empty")]
    EmptyTopic,

    #[error("No broker target set before activation")]
    MissingTarget,

    #[error("Connection manager already activated")]
    AlreadyActivated,

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),
}

impl BusError {
    pub fn not_connected(state: ConnectionState) -> Self {
        Self::NotConnected { state }
    }
}

/// Result type for bus operations
pub type BusResult<T> = Result<T, BusError>;

/// Broker or keepalive protocol violations
#[derive(Debug, Error)]
pub enum ProtocolFault {
    /// `elapsed_ms` is known when the connection manager measured the silence itself
    #[error("Keepalive timeout: {}", describe_silence(.elapsed_ms))]
    KeepaliveTimeout { elapsed_ms: Option<i64> },

    #[error("Broker closed the session")]
    BrokerDisconnect,

    #[error("Broker refused the connection: {0}")]
    Refused(String),

    #[error("Malformed broker response: {0}")]
    Malformed(String),
}

fn describe_silence(elapsed_ms: &Option<i64>) -> String {
    match elapsed_ms {
        Some(ms) => format!("no ping response for {ms}ms"),
        None => "ping not acknowledged by the broker".to_string(),
    }
}

/// Why a connection cycle ended
#[derive(Debug, Error)]
pub enum Fault {
    #[error("Transport fault: {0}")]
    Transport(#[source] TransportError),

    #[error("Protocol fault: {0}")]
    Protocol(#[from] ProtocolFault),
}

impl Fault {
    pub fn keepalive_timeout(elapsed_ms: i64) -> Self {
        Self::Protocol(ProtocolFault::KeepaliveTimeout {
            elapsed_ms: Some(elapsed_ms),
        })
    }

    pub fn is_protocol(&self) -> bool {
        matches!(self, Fault::Protocol(_))
    }

    pub fn is_keepalive_timeout(&self) -> bool {
        matches!(
            self,
            Fault::Protocol(ProtocolFault::KeepaliveTimeout { .. })
        )
    }
}

impl From<TransportError> for Fault {
    /// Refusals, broker disconnects, missed pongs and protocol violations
    /// reported by the transport are protocol faults
    fn from(error: TransportError) -> Self {
        match error {
            TransportError::Refused(reason) => Fault::Protocol(ProtocolFault::Refused(reason)),
            TransportError::Protocol(reason) => Fault::Protocol(ProtocolFault::Malformed(reason)),
            TransportError::KeepaliveTimeout => {
                Fault::Protocol(ProtocolFault::KeepaliveTimeout { elapsed_ms: None })
            }
            TransportError::BrokerDisconnect(_) => Fault::Protocol(ProtocolFault::BrokerDisconnect),
            other => Fault::Transport(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transport_errors_classify_as_transport_faults() {
        let fault = Fault::from(TransportError::Io(
            std::io::ErrorKind::ConnectionReset.into(),
        ));
        assert!(!fault.is_protocol());
        assert!(matches!(fault, Fault::Transport(TransportError::Io(_))));

        let fault = Fault::from(TransportError::Closed);
        assert!(matches!(fault, Fault::Transport(TransportError::Closed)));
    }

    #[test]
    fn test_refusal_and_violation_classify_as_protocol_faults() {
        let fault = Fault::from(TransportError::Refused("bad credentials".to_string()));
        assert!(fault.is_protocol());
        assert!(matches!(
            fault,
            Fault::Protocol(ProtocolFault::Refused(ref reason)) if reason == "bad credentials"
        ));

        let fault = Fault::from(TransportError::Protocol("unexpected packet".to_string()));
        assert!(matches!(fault, Fault::Protocol(ProtocolFault::Malformed(_))));
    }

    #[test]
    fn test_keepalive_timeout_is_distinguishable() {
        let fault = Fault::keepalive_timeout(61_000);
        assert!(fault.is_protocol());
        assert!(fault.is_keepalive_timeout());
        assert!(fault.to_string().contains("61000ms"));

        let other = Fault::Protocol(ProtocolFault::BrokerDisconnect);
        assert!(!other.is_keepalive_timeout());
    }

    #[test]
    fn test_transport_keepalive_and_disconnect_are_protocol_faults() {
        let fault = Fault::from(TransportError::KeepaliveTimeout);
        assert!(fault.is_protocol());
        assert!(fault.is_keepalive_timeout());
        assert!(fault.to_string().contains("not acknowledged"));

        let fault = Fault::from(TransportError::BrokerDisconnect("SessionTakenOver".to_string()));
        assert!(matches!(
            fault,
            Fault::Protocol(ProtocolFault::BrokerDisconnect)
        ));
    }

    #[test]
    fn test_bus_error_display() {
        let errors = vec![
            BusError::InvalidQoS(2),
            BusError::not_connected(ConnectionState::Connecting),
            BusError::EmptyTopic,
            BusError::MissingTarget,
            BusError::AlreadyActivated,
            BusError::Transport(TransportError::Closed),
        ];

        for error in errors {
            assert!(!error.to_string().is_empty());
        }
        assert_eq!(
            BusError::InvalidQoS(2).to_string(),
            "QoS 2 not supported (only 0 and 1)"
        );
    }
}
