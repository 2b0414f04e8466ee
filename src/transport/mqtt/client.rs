//! rumqttc-backed implementation of [`Transport`]
//!
//! The event loop is only polled from inside `connect`, `receive_one` and
//! `disconnect`, so queued requests are written whenever the connection
//! manager pumps. Requests are enqueued with the non-blocking `try_*` client
//! calls: a full request queue surfaces as an error instead of a stall.

use super::connection::{configure_mqtt_options, map_client_error, map_connection_error};
use super::message_handler::MessageHandler;
use crate::transport::{ConnectRequest, Frame, OutboundMessage, QoS, TlsMode, Transport, TransportError};
use async_trait::async_trait;
use rumqttc::v5::mqttbytes::v5::Packet;
use rumqttc::v5::{AsyncClient, Event, EventLoop};
use std::time::Duration;
use tracing::{debug, info, trace};

/// Capacity of the client request queue
const REQUEST_CAPACITY: usize = 64;

/// Lower bound for the handshake timeout when the keepalive is very short
const MIN_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// How long `disconnect` keeps polling to flush queued packets
const FLUSH_WINDOW: Duration = Duration::from_secs(1);

const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(1);

struct Session {
    client: AsyncClient,
    event_loop: EventLoop,
}

pub struct MqttTransport {
    session: Option<Session>,
    read_timeout: Duration,
}

impl MqttTransport {
    pub fn new() -> Self {
        Self {
            session: None,
            read_timeout: DEFAULT_READ_TIMEOUT,
        }
    }

    pub fn is_open(&self) -> bool {
        self.session.is_some()
    }

    fn session_mut(&mut self) -> Result<&mut Session, TransportError> {
        self.session.as_mut().ok_or(TransportError::NotOpen)
    }

    async fn load_ca(tls: &TlsMode) -> Result<Option<Vec<u8>>, TransportError> {
        match tls {
            TlsMode::None => Ok(None),
            TlsMode::CertificateRequired { ca } => tokio::fs::read(ca)
                .await
                .map(Some)
                .map_err(|e| TransportError::Tls(format!("cannot read CA {}: {e}", ca.display()))),
        }
    }

    /// Poll until the broker acknowledges the connection
    async fn await_connack(event_loop: &mut EventLoop) -> Result<bool, TransportError> {
        loop {
            match event_loop.poll().await {
                Ok(Event::Incoming(Packet::ConnAck(connack))) => {
                    return Ok(connack.session_present);
                }
                Ok(event) => trace!(?event, "Event before ConnAck"),
                Err(e) => return Err(map_connection_error(e)),
            }
        }
    }
}

impl Default for MqttTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Transport for MqttTransport {
    async fn connect(&mut self, request: &ConnectRequest) -> Result<bool, TransportError> {
        if self.session.take().is_some() {
            debug!("Dropping previous session before reconnecting");
        }

        let ca_pem = Self::load_ca(&request.tls).await?;
        let options = configure_mqtt_options(request, ca_pem)?;
        let (client, mut event_loop) = AsyncClient::new(options, REQUEST_CAPACITY);

        let connect_timeout = request.keepalive.max(MIN_CONNECT_TIMEOUT);
        let session_present =
            tokio::time::timeout(connect_timeout, Self::await_connack(&mut event_loop))
                .await
                .map_err(|_| TransportError::Timeout)??;

        info!(
            host = %request.host,
            port = request.port,
            session_present,
            "MQTT session open"
        );
        self.session = Some(Session { client, event_loop });
        Ok(session_present)
    }

    async fn disconnect(&mut self) -> Result<(), TransportError> {
        let Some(mut session) = self.session.take() else {
            return Ok(());
        };

        let requested = session.client.try_disconnect().map_err(map_client_error);

        // Drive the event loop so the queued offline publish and DISCONNECT are
        // written; it errors out once the connection is closed
        let flushed = tokio::time::timeout(FLUSH_WINDOW, async {
            loop {
                if let Err(e) = session.event_loop.poll().await {
                    trace!(error = %e, "Event loop closed");
                    break;
                }
            }
        })
        .await;
        if flushed.is_err() {
            debug!("Flush window elapsed before the event loop closed");
        }

        requested
    }

    async fn ping(&mut self) -> Result<(), TransportError> {
        // PINGREQ is emitted by the event loop on its keep-alive timer
        if !self.is_open() {
            return Err(TransportError::NotOpen);
        }
        trace!("Ping left to the event loop keep-alive");
        Ok(())
    }

    async fn receive_one(&mut self) -> Result<Option<Frame>, TransportError> {
        let read_timeout = self.read_timeout;
        let session = self.session_mut()?;

        let polled = tokio::time::timeout(read_timeout, session.event_loop.poll()).await;
        match polled {
            Err(_) => Ok(None),
            Ok(Ok(event)) => Ok(MessageHandler::route_mqtt_event(&event)),
            Ok(Err(e)) => {
                self.session = None;
                Err(map_connection_error(e))
            }
        }
    }

    async fn publish(&mut self, message: OutboundMessage) -> Result<(), TransportError> {
        let session = self.session_mut()?;
        session
            .client
            .try_publish(
                message.topic,
                MessageHandler::to_mqtt_qos(message.qos),
                message.retain,
                message.payload,
            )
            .map_err(map_client_error)
    }

    async fn subscribe(&mut self, topic: &str, qos: QoS) -> Result<(), TransportError> {
        let session = self.session_mut()?;
        session
            .client
            .try_subscribe(topic, MessageHandler::to_mqtt_qos(qos))
            .map_err(map_client_error)
    }

    fn set_read_timeout(&mut self, timeout: Duration) {
        self.read_timeout = timeout;
    }
}
