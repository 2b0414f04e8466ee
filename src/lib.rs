//! agentlink - resilient MQTT connection management for bus agents
//!
//! A [`ConnectionManager`] keeps one agent attached to a broker: it connects
//! with a retained last will, announces presence on `{base}agents/{user}`,
//! services the keepalive, routes inbound messages to a [`Manager`] and
//! reconnects after a backoff whenever the session fails.
//!
//! # Quick Start
//!
//! ```rust
//! use agentlink::config::{BusSection, HostConfig};
//! use agentlink::connection::{ConnectionManager, ConnectionState};
//! use agentlink::testing::mocks::{MockTransport, RecordingManager};
//! use std::time::Duration;
//!
//! # tokio_test::block_on(async {
//! let transport = MockTransport::new();
//! let settings = BusSection::new("home/", Duration::from_secs(60));
//! let mut manager = ConnectionManager::new(settings, transport.clone(), RecordingManager::new());
//! manager.set_target(HostConfig::new("localhost", 1883, "kitchen", "secret")).unwrap();
//! manager.activate().unwrap();
//!
//! assert_eq!(manager.pump().await, ConnectionState::Connected);
//! manager.publish("home/kitchen/light", "on", 1, false).await.unwrap();
//!
//! // Presence went out first: a single retained 0xFF
//! let online = &transport.published()[0];
//! assert_eq!(online.topic, "home/agents/kitchen");
//! assert_eq!(online.payload.as_ref(), &[0xFF]);
//! # });
//! ```

pub mod clock;
pub mod config;
pub mod connection;
pub mod error;
pub mod observability;
pub mod testing;
pub mod transport;

pub use clock::{Clock, ManualClock, MonotonicClock, Ticks};
pub use config::{AgentLinkConfig, BusSection, ConfigError, HostConfig, TargetSection};
pub use connection::{
    BusHandle, ConnectionManager, ConnectionState, HealthMetrics, KeepaliveMonitor, Manager,
    PresenceAnnouncer, ReconnectConfig, StatusTopic,
};
pub use error::{BusError, BusResult, Fault, ProtocolFault};
pub use transport::mqtt::MqttTransport;
pub use transport::{Frame, QoS, TlsMode, Transport, TransportError};
