//! Resilient broker connection
//!
//! - [`state`] - lifecycle states and reconnection backoff
//! - [`keepalive`] - ping/pong deadlines on wrapping ticks
//! - [`presence`] - retained online/offline announcements and the last will
//! - [`health_monitor`] - pure reconnection decisions and health metrics
//! - [`callbacks`] - the consumer-facing [`Manager`] trait
//! - [`handle`] - cloneable publish/subscribe/deactivate handle
//! - [`manager`] - the state machine tying these together

pub mod callbacks;
pub mod handle;
pub mod health_monitor;
pub mod keepalive;
pub mod manager;
pub mod presence;
pub mod state;

pub use callbacks::Manager;
pub use handle::BusHandle;
pub use health_monitor::{HealthMetrics, HealthMonitor, ReconnectionDecision};
pub use keepalive::KeepaliveMonitor;
pub use manager::ConnectionManager;
pub use presence::{PresenceAnnouncer, StatusTopic, OFFLINE_PAYLOAD, ONLINE_PAYLOAD};
pub use state::{ConnectionState, ReconnectConfig};
