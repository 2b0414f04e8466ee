//! Connection manager: the resilient session state machine
//!
//! One manager owns one broker session at a time and drives it through
//! `Idle -> Connecting -> Connected -> Disconnecting -> (Connecting | Stopped)`.
//! Every transition happens inside [`ConnectionManager::pump`], which runs a
//! single step and never fails: faults end the current cycle, get reported to
//! [`Manager::on_disconnect`] and lead to a backoff and a fresh attempt for as
//! long as the manager stays active.

use super::callbacks::Manager;
use super::handle::BusHandle;
use super::health_monitor::{HealthMetrics, HealthMonitor, ReconnectionDecision};
use super::keepalive::KeepaliveMonitor;
use super::presence::{PresenceAnnouncer, StatusTopic};
use super::state::{ConnectionState, ReconnectConfig};
use crate::clock::{Clock, MonotonicClock, Ticks};
use crate::config::{BusSection, HostConfig};
use crate::error::{BusError, BusResult, Fault, ProtocolFault};
use crate::transport::{ConnectRequest, Frame, Transport, TransportError};
use bytes::Bytes;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info, trace, warn, Instrument};

pub struct ConnectionManager<T: Transport, M: Manager> {
    settings: BusSection,
    target: Option<HostConfig>,
    transport: Arc<Mutex<T>>,
    manager: M,
    clock: Arc<dyn Clock>,
    state_tx: watch::Sender<ConnectionState>,
    shutdown_tx: Arc<watch::Sender<bool>>,
    keepalive: Option<KeepaliveMonitor>,
    presence: Option<PresenceAnnouncer>,
    session_open: bool,
    reconnect_attempts: u32,
    reconnect_count: u32,
    sessions_established: u32,
    connect_time: Option<Instant>,
    last_message_time: Option<Instant>,
}

impl<T: Transport, M: Manager> ConnectionManager<T, M> {
    pub fn new(settings: BusSection, transport: T, manager: M) -> Self {
        let (state_tx, _) = watch::channel(ConnectionState::Idle);
        let (shutdown_tx, _) = watch::channel(false);

        Self {
            settings,
            target: None,
            transport: Arc::new(Mutex::new(transport)),
            manager,
            clock: Arc::new(MonotonicClock::new()),
            state_tx,
            shutdown_tx: Arc::new(shutdown_tx),
            keepalive: None,
            presence: None,
            session_open: false,
            reconnect_attempts: 0,
            reconnect_count: 0,
            sessions_established: 0,
            connect_time: None,
            last_message_time: None,
        }
    }

    /// Replace the tick source (tests drive time manually)
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Record the broker target; only allowed before activation
    pub fn set_target(&mut self, target: HostConfig) -> BusResult<()> {
        if self.state() != ConnectionState::Idle {
            return Err(BusError::AlreadyActivated);
        }
        debug!(target = ?target, "Broker target set");
        self.target = Some(target);
        Ok(())
    }

    /// `Idle -> Connecting`; the next pump attempts the handshake
    pub fn activate(&mut self) -> BusResult<()> {
        if self.state() != ConnectionState::Idle {
            return Err(BusError::AlreadyActivated);
        }
        if self.target.is_none() {
            return Err(BusError::MissingTarget);
        }
        self.transition(ConnectionState::Connecting);
        Ok(())
    }

    /// Clear the active flag; the manager disconnects cleanly and stops
    pub fn deactivate(&self) {
        self.handle().deactivate();
    }

    pub fn is_active(&self) -> bool {
        !*self.shutdown_tx.borrow()
    }

    pub fn state(&self) -> ConnectionState {
        *self.state_tx.borrow()
    }

    /// Watch state transitions
    pub fn subscribe_state(&self) -> watch::Receiver<ConnectionState> {
        self.state_tx.subscribe()
    }

    pub fn handle(&self) -> BusHandle<T> {
        BusHandle::new(
            Arc::clone(&self.transport),
            self.state_tx.subscribe(),
            Arc::clone(&self.shutdown_tx),
        )
    }

    pub fn manager(&self) -> &M {
        &self.manager
    }

    pub fn status_topic(&self) -> Option<&StatusTopic> {
        self.presence.as_ref().map(PresenceAnnouncer::topic)
    }

    pub fn keepalive_monitor(&self) -> Option<&KeepaliveMonitor> {
        self.keepalive.as_ref()
    }

    pub async fn publish(
        &self,
        topic: &str,
        payload: impl Into<Bytes>,
        qos: u8,
        retain: bool,
    ) -> BusResult<()> {
        self.handle().publish(topic, payload, qos, retain).await
    }

    pub async fn subscribe(&self, topic: &str, qos: u8) -> BusResult<()> {
        self.handle().subscribe(topic, qos).await
    }

    pub fn health_metrics(&self) -> HealthMetrics {
        let now = self.clock.now();
        let since_last_pong = self
            .keepalive
            .as_ref()
            .map(|k| Duration::from_millis(k.since_last_pong(now).max(0) as u64));

        HealthMonitor::calculate_health_metrics(
            self.connect_time,
            self.last_message_time,
            since_last_pong,
            self.settings.keepalive(),
            self.reconnect_count,
        )
    }

    /// Run one step of the state machine and return the resulting state
    pub async fn pump(&mut self) -> ConnectionState {
        match self.state() {
            ConnectionState::Idle | ConnectionState::Stopped => {}
            ConnectionState::Connecting => {
                if !self.is_active() {
                    self.teardown(None).await;
                } else if let Err(fault) = self.establish().await {
                    self.teardown(Some(fault)).await;
                }
            }
            ConnectionState::Connected => {
                if !self.is_active() {
                    self.teardown(None).await;
                } else if let Err(fault) = self.service().await {
                    self.teardown(Some(fault)).await;
                }
            }
            // A previous step was cancelled mid-teardown
            ConnectionState::Disconnecting => self.settle(false).await,
        }
        self.state()
    }

    /// Drive the pump until the manager stops
    pub async fn run(&mut self) {
        if self.state() == ConnectionState::Idle {
            warn!("Connection manager run before activation, nothing to do");
            return;
        }
        while !self.pump().await.is_terminal() {}
    }

    /// Run the pump on a tokio task; the manager is handed back once stopped
    pub fn spawn(mut self) -> JoinHandle<Self>
    where
        T: 'static,
        M: 'static,
    {
        let span = match &self.target {
            Some(target) => crate::connection_span!(
                host = %target.host,
                port = target.port,
                user = %target.user
            ),
            None => tracing::info_span!("broker_connection"),
        };
        tokio::spawn(
            async move {
                self.run().await;
                self
            }
            .instrument(span),
        )
    }

    /// Connect sequence: handshake, read timeout, online presence, `on_connect`
    async fn establish(&mut self) -> Result<(), Fault> {
        let Some(target) = self.target.clone() else {
            warn!("No broker target while connecting");
            return Err(Fault::Transport(TransportError::NotOpen));
        };

        let keepalive = self.settings.keepalive();
        let presence = PresenceAnnouncer::new(StatusTopic::new(&self.settings.base, &target.user));
        let request = ConnectRequest {
            host: target.host.clone(),
            port: target.port,
            client_id: target.user.clone(),
            credentials: target.credentials(),
            tls: target.tls_mode(),
            keepalive,
            clean_session: false,
            last_will: presence.last_will(),
        };
        self.presence = Some(presence.clone());

        info!(
            host = %request.host,
            port = request.port,
            client_id = %request.client_id,
            status_topic = %presence.topic(),
            tls = request.tls.requires_certificate(),
            "Connecting to broker"
        );

        let session_present = {
            let mut transport = self.transport.lock().await;
            let session_present = transport.connect(&request).await?;
            self.session_open = true;
            transport.set_read_timeout(keepalive / 8);
            transport.publish(presence.online()).await?;
            session_present
        };

        self.keepalive = Some(KeepaliveMonitor::new(keepalive, self.clock.now()));
        self.connect_time = Some(Instant::now());
        self.last_message_time = None;
        self.reconnect_attempts = 0;
        if self.sessions_established > 0 {
            self.reconnect_count = self.reconnect_count.saturating_add(1);
        }
        self.sessions_established = self.sessions_established.saturating_add(1);

        info!(session_present, "Presence announced online");
        self.transition(ConnectionState::Connected);
        self.manager.on_connect(session_present).await;
        Ok(())
    }

    /// One steady-state iteration: at most one frame, then liveness
    async fn service(&mut self) -> Result<(), Fault> {
        let received = {
            let mut transport = self.transport.lock().await;
            transport.receive_one().await
        };
        let now = self.clock.now();

        match received {
            Ok(Some(Frame::PingAck)) => {
                trace!("Ping acknowledged");
                if let Some(keepalive) = self.keepalive.as_mut() {
                    keepalive.record_pong(now);
                }
            }
            Ok(Some(Frame::Message {
                topic,
                payload,
                retained,
            })) => {
                trace!(topic = %topic, bytes = payload.len(), retained, "Message received");
                self.last_message_time = Some(Instant::now());
                self.manager.on_message(&topic, payload, retained).await;
            }
            Ok(Some(Frame::Disconnect)) => {
                return Err(ProtocolFault::BrokerDisconnect.into());
            }
            Ok(Some(Frame::Control(kind))) => {
                trace!(packet = %kind, "Control packet");
            }
            Ok(None) => {}
            Err(e) if e.is_idle_timeout() => {}
            Err(TransportError::KeepaliveTimeout) => {
                return Err(match self.keepalive.as_ref() {
                    Some(keepalive) => Fault::keepalive_timeout(keepalive.since_last_pong(now)),
                    None => TransportError::KeepaliveTimeout.into(),
                });
            }
            Err(e) => return Err(e.into()),
        }

        self.check_liveness(now).await
    }

    async fn check_liveness(&mut self, now: Ticks) -> Result<(), Fault> {
        let Some(keepalive) = self.keepalive.as_mut() else {
            return Ok(());
        };

        if keepalive.should_ping(now) {
            keepalive.record_ping(now);
            trace!("Sending keepalive ping");
            self.transport.lock().await.ping().await?;
        }

        if keepalive.is_expired(now) {
            return Err(Fault::keepalive_timeout(keepalive.since_last_pong(now)));
        }

        Ok(())
    }

    /// End the current cycle and report it exactly once
    async fn teardown(&mut self, reason: Option<Fault>) {
        self.transition(ConnectionState::Disconnecting);
        match &reason {
            Some(fault) => warn!(fault = %fault, "Connection cycle failed"),
            None => info!("Shutting down connection"),
        }

        if self.session_open {
            // A dead socket cannot carry the announcement; the broker
            // publishes the last will instead
            let transport_usable = !matches!(reason, Some(Fault::Transport(_)));
            let mut transport = self.transport.lock().await;

            if let (true, Some(presence)) = (transport_usable, &self.presence) {
                if let Err(e) = transport.publish(presence.offline()).await {
                    debug!(error = %e, "Offline presence not delivered");
                }
            }
            if let Err(e) = transport.disconnect().await {
                debug!(error = %e, "Transport disconnect failed");
            }
        }
        self.session_open = false;
        self.keepalive = None;
        self.connect_time = None;

        self.manager.on_disconnect(reason.as_ref()).await;
        self.settle(reason.is_none()).await;
    }

    /// Back off and retry while active; otherwise stop
    async fn settle(&mut self, shutdown_reported: bool) {
        let decision = HealthMonitor::should_attempt_reconnection(
            self.reconnect_attempts,
            &self.settings.reconnect,
            !self.is_active(),
        );

        if let ReconnectionDecision::Proceed { attempt, delay_ms } = decision {
            self.reconnect_attempts = attempt;
            info!(attempt, delay_ms, "Reconnecting after backoff");
            if self.interruptible_sleep(delay_ms).await {
                self.transition(ConnectionState::Connecting);
                return;
            }
        }

        if !shutdown_reported {
            self.manager.on_disconnect(None).await;
        }
        self.transition(ConnectionState::Stopped);
    }

    /// Returns true if the sleep completed, false if shutdown was requested
    async fn interruptible_sleep(&self, delay_ms: u64) -> bool {
        let mut shutdown_rx = self.shutdown_tx.subscribe();
        if *shutdown_rx.borrow_and_update() {
            return false;
        }

        let sleep = tokio::time::sleep(Duration::from_millis(delay_ms));
        tokio::pin!(sleep);

        loop {
            tokio::select! {
                _ = &mut sleep => return true,
                changed = shutdown_rx.changed() => {
                    if changed.is_err() {
                        (&mut sleep).await;
                        return true;
                    }
                    if *shutdown_rx.borrow_and_update() {
                        info!("Shutdown signal received during reconnection delay, stopping");
                        return false;
                    }
                }
            }
        }
    }

    fn transition(&mut self, next: ConnectionState) {
        let previous = self.state_tx.send_replace(next);
        if previous != next {
            HealthMonitor::log_state_transition(previous, next);
        }
    }

    /// Backoff currently configured for reconnection attempts
    pub fn reconnect_config(&self) -> &ReconnectConfig {
        &self.settings.reconnect
    }
}
