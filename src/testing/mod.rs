//! Testing utilities and mock implementations
//!
//! Lets the connection manager run against scripted collaborators, without a
//! broker or wall-clock time.

pub mod mocks;

pub use mocks::*;

use crate::connection::{PresenceAnnouncer, StatusTopic};
use crate::transport::{ConnectRequest, Credentials, TlsMode};
use std::time::Duration;

/// A plain-TCP connect request for `test/agents/test-agent`
pub fn sample_connect_request() -> ConnectRequest {
    let presence = PresenceAnnouncer::new(StatusTopic::new("test/", "test-agent"));
    ConnectRequest {
        host: "localhost".to_string(),
        port: 1883,
        client_id: "test-agent".to_string(),
        credentials: Credentials {
            user: "test-agent".to_string(),
            password: "secret".to_string(),
        },
        tls: TlsMode::None,
        keepalive: Duration::from_secs(60),
        clean_session: false,
        last_will: presence.last_will(),
    }
}
