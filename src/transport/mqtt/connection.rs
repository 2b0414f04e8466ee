//! Pure connection configuration for the MQTT transport
//!
//! This module turns a [`ConnectRequest`] into rumqttc options and maps
//! rumqttc failures onto [`TransportError`].

use super::message_handler::MessageHandler;
use crate::transport::{ConnectRequest, TransportError};
use rumqttc::v5::mqttbytes::v5::{ConnectProperties, LastWill};
use rumqttc::v5::{ClientError, ConnectionError, MqttOptions, StateError};
use rumqttc::{TlsConfiguration, Transport as RumqttcTransport};
use std::time::Duration;

/// rumqttc rejects keep-alive intervals below one second
const MIN_EVENT_LOOP_KEEP_ALIVE: Duration = Duration::from_secs(1);

/// Packets larger than this are refused by the event loop
const MAX_PACKET_SIZE: u32 = 256 * 1024;

/// Session Expiry Interval meaning "never expires"
pub const SESSION_NEVER_EXPIRES: u32 = u32::MAX;

/// Session Expiry Interval for a connect request (pure function)
///
/// MQTT v5 drops the session on disconnect unless an expiry is sent, so a
/// non-clean session asks the broker to keep it indefinitely.
pub fn session_expiry_interval(clean_session: bool) -> Option<u32> {
    if clean_session {
        None
    } else {
        Some(SESSION_NEVER_EXPIRES)
    }
}

/// Interval at which the event loop emits PINGREQ (pure function)
///
/// Aligned with the connection manager's ping interval (`keepalive / 2`) so
/// ping acknowledgments arrive often enough to satisfy its pong deadline.
pub fn event_loop_keep_alive(keepalive: Duration) -> Duration {
    (keepalive / 2).max(MIN_EVENT_LOOP_KEEP_ALIVE)
}

/// Pure function to configure MQTT options from a connect request
///
/// `ca_pem` must hold the CA certificate when the request requires TLS.
pub fn configure_mqtt_options(
    request: &ConnectRequest,
    ca_pem: Option<Vec<u8>>,
) -> Result<MqttOptions, TransportError> {
    let mut mqtt_options =
        MqttOptions::new(request.client_id.clone(), request.host.clone(), request.port);

    mqtt_options.set_credentials(
        request.credentials.user.clone(),
        request.credentials.password.clone(),
    );
    mqtt_options.set_clean_start(request.clean_session);
    mqtt_options.set_keep_alive(event_loop_keep_alive(request.keepalive));

    let mut properties = ConnectProperties::new();
    properties.session_expiry_interval = session_expiry_interval(request.clean_session);
    properties.max_packet_size = Some(MAX_PACKET_SIZE);
    mqtt_options.set_connect_properties(properties);

    let will = &request.last_will;
    mqtt_options.set_last_will(LastWill::new(
        will.topic.clone(),
        will.payload.clone(),
        MessageHandler::to_mqtt_qos(will.qos),
        will.retain,
        None,
    ));

    if request.tls.requires_certificate() {
        let ca = ca_pem.ok_or_else(|| {
            TransportError::Tls("certificate required but no CA loaded".to_string())
        })?;
        mqtt_options.set_transport(RumqttcTransport::tls_with_config(
            TlsConfiguration::Simple {
                ca,
                alpn: None,
                client_auth: None,
            },
        ));
    }

    Ok(mqtt_options)
}

/// Map an event loop failure (pure function)
pub fn map_connection_error(error: ConnectionError) -> TransportError {
    match error {
        ConnectionError::Io(e) => TransportError::Io(e),
        ConnectionError::MqttState(state) => map_state_error(state),
        ConnectionError::NotConnAck(packet) => {
            TransportError::Protocol(format!("expected ConnAck, received {packet:?}"))
        }
        ConnectionError::ConnectionRefused(code) => TransportError::Refused(format!("{code:?}")),
        ConnectionError::Tls(e) => TransportError::Tls(e.to_string()),
        ConnectionError::RequestsDone => TransportError::Closed,
        other => TransportError::Client(Box::new(other)),
    }
}

/// Map a protocol state failure (pure function)
///
/// The event loop raises `AwaitPingResp` when its next ping falls due while
/// the previous one is still unacknowledged.
fn map_state_error(error: StateError) -> TransportError {
    match error {
        StateError::AwaitPingResp => TransportError::KeepaliveTimeout,
        StateError::Io(e) => TransportError::Io(e),
        disconnect @ StateError::ServerDisconnect { .. } => {
            TransportError::BrokerDisconnect(disconnect.to_string())
        }
        other => TransportError::Protocol(other.to_string()),
    }
}

/// Map a request queue failure (pure function)
pub fn map_client_error(error: ClientError) -> TransportError {
    TransportError::Client(Box::new(error))
}
