//! Consumer-side callbacks for connection lifecycle and message delivery

use crate::error::Fault;
use async_trait::async_trait;
use bytes::Bytes;
use std::sync::Arc;

/// Receives lifecycle events and inbound messages from a connection manager
///
/// Callbacks run on the manager's pump loop. They must return promptly: the
/// keepalive is not serviced while a callback runs, so a slow callback can
/// cause a keepalive timeout.
#[async_trait]
pub trait Manager: Send + Sync {
    /// Session established and presence announced
    async fn on_connect(&self, session_present: bool);

    /// Session ended; `None` for an intentional shutdown
    async fn on_disconnect(&self, reason: Option<&Fault>);

    /// Message received on a subscribed topic, in arrival order
    async fn on_message(&self, topic: &str, payload: Bytes, retained: bool);
}

#[async_trait]
impl<M: Manager + ?Sized> Manager for Arc<M> {
    async fn on_connect(&self, session_present: bool) {
        (**self).on_connect(session_present).await
    }

    async fn on_disconnect(&self, reason: Option<&Fault>) {
        (**self).on_disconnect(reason).await
    }

    async fn on_message(&self, topic: &str, payload: Bytes, retained: bool) {
        (**self).on_message(topic, payload, retained).await
    }
}
