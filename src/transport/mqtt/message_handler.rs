//! Pure mapping from rumqttc v5 events to transport frames

use crate::transport::{Frame, QoS};
use rumqttc::v5::mqttbytes::v5::Packet;
use rumqttc::v5::{mqttbytes, Event};
use tracing::debug;

/// Pure event routing for the MQTT transport
pub struct MessageHandler;

impl MessageHandler {
    /// Route an event loop event to a frame (pure routing decision)
    ///
    /// Outgoing events are the event loop reporting its own writes and carry
    /// nothing for the connection manager.
    pub fn route_mqtt_event(event: &Event) -> Option<Frame> {
        match event {
            Event::Incoming(incoming) => Some(match incoming {
                Packet::Publish(publish) => Frame::Message {
                    topic: String::from_utf8_lossy(&publish.topic).to_string(),
                    payload: publish.payload.clone(),
                    retained: publish.retain,
                },
                Packet::PingResp(_) => Frame::PingAck,
                Packet::Disconnect(disconnect) => {
                    debug!(reason = ?disconnect.reason_code, "Broker sent DISCONNECT");
                    Frame::Disconnect
                }
                other => Frame::Control(Self::packet_name(other)),
            }),
            Event::Outgoing(_) => None,
        }
    }

    /// Short packet name for logging (pure function)
    pub fn packet_name(packet: &Packet) -> String {
        let rendered = format!("{packet:?}");
        rendered
            .split(|c: char| !c.is_ascii_alphanumeric())
            .next()
            .unwrap_or_default()
            .to_string()
    }

    /// Map a bus QoS onto the wire QoS (pure function)
    pub fn to_mqtt_qos(qos: QoS) -> mqttbytes::QoS {
        match qos {
            QoS::AtMostOnce => mqttbytes::QoS::AtMostOnce,
            QoS::AtLeastOnce => mqttbytes::QoS::AtLeastOnce,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use rumqttc::v5::mqttbytes::v5::{
        ConnAck, ConnectReturnCode, Disconnect, DisconnectReasonCode, PingResp, Publish,
    };

    #[test]
    fn test_route_publish() {
        let publish = Event::Incoming(Packet::Publish(Publish {
            dup: false,
            qos: mqttbytes::QoS::AtLeastOnce,
            retain: true,
            topic: Bytes::from("suit/agents/lamp"),
            pkid: 1,
            payload: Bytes::from_static(&[0xFF]),
            properties: None,
        }));

        assert_eq!(
            MessageHandler::route_mqtt_event(&publish),
            Some(Frame::Message {
                topic: "suit/agents/lamp".to_string(),
                payload: Bytes::from_static(&[0xFF]),
                retained: true,
            })
        );
    }

    #[test]
    fn test_route_ping_response_and_disconnect() {
        let pong = Event::Incoming(Packet::PingResp(PingResp));
        assert_eq!(MessageHandler::route_mqtt_event(&pong), Some(Frame::PingAck));

        let disconnect = Event::Incoming(Packet::Disconnect(Disconnect {
            reason_code: DisconnectReasonCode::NormalDisconnection,
            properties: None,
        }));
        assert_eq!(
            MessageHandler::route_mqtt_event(&disconnect),
            Some(Frame::Disconnect)
        );
    }

    #[test]
    fn test_route_other_packets_as_control() {
        let connack = Event::Incoming(Packet::ConnAck(ConnAck {
            session_present: false,
            code: ConnectReturnCode::Success,
            properties: None,
        }));

        assert_eq!(
            MessageHandler::route_mqtt_event(&connack),
            Some(Frame::Control("ConnAck".to_string()))
        );
    }

    #[test]
    fn test_qos_mapping() {
        assert_eq!(
            MessageHandler::to_mqtt_qos(QoS::AtMostOnce),
            mqttbytes::QoS::AtMostOnce
        );
        assert_eq!(
            MessageHandler::to_mqtt_qos(QoS::AtLeastOnce),
            mqttbytes::QoS::AtLeastOnce
        );
    }
}
