//! MQTT transport backed by rumqttc (v5)
//!
//! Split the same way as the rest of the crate: pure configuration and event
//! mapping in [`connection`] and [`message_handler`], socket I/O in [`client`].
//!
//! # Usage
//!
//! ```rust,no_run
//! use agentlink::config::{BusSection, HostConfig};
//! use agentlink::connection::{ConnectionManager, ConnectionState};
//! use agentlink::testing::mocks::RecordingManager;
//! use agentlink::transport::mqtt::MqttTransport;
//! use std::time::Duration;
//!
//! # tokio_test::block_on(async {
//! let settings = BusSection::new("home/", Duration::from_secs(60));
//! let mut manager = ConnectionManager::new(settings, MqttTransport::new(), RecordingManager::new());
//! manager.set_target(HostConfig::new("localhost", 1883, "kitchen", "secret"))?;
//! manager.activate()?;
//!
//! let handle = manager.handle();
//! let driver = manager.spawn();
//! if handle.wait_for(ConnectionState::Connected).await == ConnectionState::Connected {
//!     handle.publish("home/kitchen/light", "on", 1, false).await?;
//! }
//! handle.deactivate();
//! driver.await?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! # });
//! ```

pub mod client;
pub mod connection;
pub mod message_handler;

pub use client::MqttTransport;
pub use connection::configure_mqtt_options;
pub use message_handler::MessageHandler;
