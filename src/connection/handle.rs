//! Cloneable handle onto a connection manager
//!
//! The manager's pump owns the state machine; a [`BusHandle`] shares only the
//! transport lock, the state receiver and the shutdown signal. Handles are how
//! callbacks and other tasks publish while the pump runs elsewhere.

use super::health_monitor::HealthMonitor;
use super::state::ConnectionState;
use crate::error::{BusError, BusResult};
use crate::transport::{OutboundMessage, QoS, Transport};
use bytes::Bytes;
use std::sync::Arc;
use tokio::sync::{watch, Mutex};
use tracing::{debug, info};

pub struct BusHandle<T> {
    transport: Arc<Mutex<T>>,
    state_rx: watch::Receiver<ConnectionState>,
    shutdown_tx: Arc<watch::Sender<bool>>,
}

impl<T> Clone for BusHandle<T> {
    fn clone(&self) -> Self {
        Self {
            transport: Arc::clone(&self.transport),
            state_rx: self.state_rx.clone(),
            shutdown_tx: Arc::clone(&self.shutdown_tx),
        }
    }
}

impl<T: Transport> BusHandle<T> {
    pub(crate) fn new(
        transport: Arc<Mutex<T>>,
        state_rx: watch::Receiver<ConnectionState>,
        shutdown_tx: Arc<watch::Sender<bool>>,
    ) -> Self {
        Self {
            transport,
            state_rx,
            shutdown_tx,
        }
    }

    pub fn state(&self) -> ConnectionState {
        *self.state_rx.borrow()
    }

    pub fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Connected
    }

    /// Request shutdown; the pump disconnects cleanly and stops. Idempotent.
    pub fn deactivate(&self) {
        let already = self.shutdown_tx.send_replace(true);
        if !already {
            info!("Deactivation requested");
        }
    }

    pub fn is_active(&self) -> bool {
        !*self.shutdown_tx.borrow()
    }

    /// Publish to `topic`; fails fast unless connected
    pub async fn publish(
        &self,
        topic: &str,
        payload: impl Into<Bytes>,
        qos: u8,
        retain: bool,
    ) -> BusResult<()> {
        let qos = QoS::try_from(qos)?;
        if topic.is_empty() {
            return Err(BusError::EmptyTopic);
        }

        let mut transport = self.transport.lock().await;
        self.check_state(HealthMonitor::can_publish)?;

        let message = OutboundMessage {
            topic: topic.to_string(),
            payload: payload.into(),
            qos,
            retain,
        };
        debug!(topic, qos = qos.level(), retain, bytes = message.payload.len(), "Publishing");
        transport.publish(message).await?;
        Ok(())
    }

    /// Subscribe to a topic filter; fails fast unless connected
    pub async fn subscribe(&self, topic: &str, qos: u8) -> BusResult<()> {
        let qos = QoS::try_from(qos)?;
        if topic.is_empty() {
            return Err(BusError::EmptyTopic);
        }

        let mut transport = self.transport.lock().await;
        self.check_state(HealthMonitor::can_subscribe)?;

        debug!(topic, qos = qos.level(), "Subscribing");
        transport.subscribe(topic, qos).await?;
        Ok(())
    }

    /// Wait until the manager reaches `target` or stops
    pub async fn wait_for(&self, target: ConnectionState) -> ConnectionState {
        let mut state_rx = self.state_rx.clone();
        let result = state_rx
            .wait_for(|state| *state == target || state.is_terminal())
            .await;
        match result {
            Ok(state) => *state,
            // Sender gone: the manager was dropped
            Err(_) => ConnectionState::Stopped,
        }
    }

    /// Checked under the transport lock so a concurrent teardown is observed
    fn check_state(&self, allowed: fn(ConnectionState) -> bool) -> BusResult<()> {
        let state = self.state();
        if !allowed(state) {
            return Err(BusError::not_connected(state));
        }
        Ok(())
    }
}
