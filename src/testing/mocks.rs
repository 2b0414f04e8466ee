//! Mock implementations for testing
//!
//! [`MockTransport`] replays scripted frames and connect outcomes and records
//! every call; [`RecordingManager`] records every callback. Both are cheap to
//! clone and clones share state, so a test keeps one copy for inspection after
//! moving the other into a connection manager.

use crate::connection::Manager;
use crate::error::Fault;
use crate::transport::{ConnectRequest, Frame, OutboundMessage, QoS, Transport, TransportError};
use async_trait::async_trait;
use bytes::Bytes;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

/// One recorded transport call
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportCall {
    Connect(ConnectRequest),
    Disconnect,
    Ping,
    Receive,
    Publish(OutboundMessage),
    Subscribe { topic: String, qos: QoS },
    SetReadTimeout(Duration),
}

#[derive(Debug, Default)]
struct MockTransportState {
    calls: Vec<TransportCall>,
    inbound: VecDeque<Result<Frame, TransportError>>,
    connect_results: VecDeque<Result<bool, TransportError>>,
    connected: bool,
    read_timeout: Option<Duration>,
    fail_publish: bool,
    fail_disconnect: bool,
    auto_pong: bool,
}

/// Scripted in-memory transport
#[derive(Debug, Clone, Default)]
pub struct MockTransport {
    state: Arc<Mutex<MockTransportState>>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer every ping with a queued ping acknowledgment
    pub fn with_auto_pong() -> Self {
        let transport = Self::new();
        transport.set_auto_pong(true);
        transport
    }

    fn state(&self) -> MutexGuard<'_, MockTransportState> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn queue_frame(&self, frame: Frame) {
        self.state().inbound.push_back(Ok(frame));
    }

    pub fn queue_message(&self, topic: &str, payload: impl Into<Bytes>, retained: bool) {
        self.queue_frame(Frame::Message {
            topic: topic.to_string(),
            payload: payload.into(),
            retained,
        });
    }

    /// The next `receive_one` fails with `error`
    pub fn queue_error(&self, error: TransportError) {
        self.state().inbound.push_back(Err(error));
    }

    /// Outcome of the next `connect`; unscripted connects succeed without a session
    pub fn queue_connect_result(&self, result: Result<bool, TransportError>) {
        self.state().connect_results.push_back(result);
    }

    pub fn set_auto_pong(&self, enabled: bool) {
        self.state().auto_pong = enabled;
    }

    pub fn fail_publishes(&self, fail: bool) {
        self.state().fail_publish = fail;
    }

    pub fn fail_disconnects(&self, fail: bool) {
        self.state().fail_disconnect = fail;
    }

    pub fn calls(&self) -> Vec<TransportCall> {
        self.state().calls.clone()
    }

    /// Calls other than receives, which dominate a running manager's log
    pub fn significant_calls(&self) -> Vec<TransportCall> {
        self.state()
            .calls
            .iter()
            .filter(|call| !matches!(call, TransportCall::Receive))
            .cloned()
            .collect()
    }

    pub fn published(&self) -> Vec<OutboundMessage> {
        self.state()
            .calls
            .iter()
            .filter_map(|call| match call {
                TransportCall::Publish(message) => Some(message.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn connect_requests(&self) -> Vec<ConnectRequest> {
        self.state()
            .calls
            .iter()
            .filter_map(|call| match call {
                TransportCall::Connect(request) => Some(request.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn ping_count(&self) -> usize {
        self.count(|call| matches!(call, TransportCall::Ping))
    }

    pub fn disconnect_count(&self) -> usize {
        self.count(|call| matches!(call, TransportCall::Disconnect))
    }

    pub fn read_timeout(&self) -> Option<Duration> {
        self.state().read_timeout
    }

    pub fn is_connected(&self) -> bool {
        self.state().connected
    }

    pub fn pending_frames(&self) -> usize {
        self.state().inbound.len()
    }

    pub fn clear_history(&self) {
        self.state().calls.clear();
    }

    fn count(&self, predicate: impl Fn(&TransportCall) -> bool) -> usize {
        self.state().calls.iter().filter(|call| predicate(*call)).count()
    }

    fn require_connected(state: &MockTransportState) -> Result<(), TransportError> {
        if state.connected {
            Ok(())
        } else {
            Err(TransportError::NotOpen)
        }
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn connect(&mut self, request: &ConnectRequest) -> Result<bool, TransportError> {
        let mut state = self.state();
        state.calls.push(TransportCall::Connect(request.clone()));

        let result = state.connect_results.pop_front().unwrap_or(Ok(false));
        state.connected = result.is_ok();
        result
    }

    async fn disconnect(&mut self) -> Result<(), TransportError> {
        let mut state = self.state();
        state.calls.push(TransportCall::Disconnect);
        state.connected = false;

        if state.fail_disconnect {
            return Err(TransportError::Closed);
        }
        Ok(())
    }

    async fn ping(&mut self) -> Result<(), TransportError> {
        let mut state = self.state();
        state.calls.push(TransportCall::Ping);
        Self::require_connected(&state)?;

        if state.auto_pong {
            state.inbound.push_back(Ok(Frame::PingAck));
        }
        Ok(())
    }

    async fn receive_one(&mut self) -> Result<Option<Frame>, TransportError> {
        let next = {
            let mut state = self.state();
            state.calls.push(TransportCall::Receive);
            state.inbound.pop_front()
        };

        match next {
            Some(Ok(frame)) => Ok(Some(frame)),
            Some(Err(error)) => Err(error),
            None => {
                // Stand-in for the read timeout; lets other tasks run
                tokio::task::yield_now().await;
                Ok(None)
            }
        }
    }

    async fn publish(&mut self, message: OutboundMessage) -> Result<(), TransportError> {
        let mut state = self.state();
        state.calls.push(TransportCall::Publish(message));
        Self::require_connected(&state)?;

        if state.fail_publish {
            return Err(TransportError::Io(std::io::ErrorKind::BrokenPipe.into()));
        }
        Ok(())
    }

    async fn subscribe(&mut self, topic: &str, qos: QoS) -> Result<(), TransportError> {
        let mut state = self.state();
        state.calls.push(TransportCall::Subscribe {
            topic: topic.to_string(),
            qos,
        });
        Self::require_connected(&state)
    }

    fn set_read_timeout(&mut self, timeout: Duration) {
        let mut state = self.state();
        state.calls.push(TransportCall::SetReadTimeout(timeout));
        state.read_timeout = Some(timeout);
    }
}

/// Summary of a disconnect reason, comparable in assertions
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DisconnectReason {
    pub description: String,
    pub protocol: bool,
    pub keepalive_timeout: bool,
}

impl From<&Fault> for DisconnectReason {
    fn from(fault: &Fault) -> Self {
        Self {
            description: fault.to_string(),
            protocol: fault.is_protocol(),
            keepalive_timeout: fault.is_keepalive_timeout(),
        }
    }
}

/// One recorded callback
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ManagerEvent {
    Connected {
        session_present: bool,
    },
    Disconnected(Option<DisconnectReason>),
    Message {
        topic: String,
        payload: Bytes,
        retained: bool,
    },
}

/// Manager that records every callback in order
#[derive(Debug, Clone, Default)]
pub struct RecordingManager {
    events: Arc<Mutex<Vec<ManagerEvent>>>,
}

impl RecordingManager {
    pub fn new() -> Self {
        Self::default()
    }

    fn log(&self) -> MutexGuard<'_, Vec<ManagerEvent>> {
        self.events
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn events(&self) -> Vec<ManagerEvent> {
        self.log().clone()
    }

    pub fn connects(&self) -> Vec<bool> {
        self.log()
            .iter()
            .filter_map(|event| match event {
                ManagerEvent::Connected { session_present } => Some(*session_present),
                _ => None,
            })
            .collect()
    }

    pub fn disconnects(&self) -> Vec<Option<DisconnectReason>> {
        self.log()
            .iter()
            .filter_map(|event| match event {
                ManagerEvent::Disconnected(reason) => Some(reason.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn messages(&self) -> Vec<(String, Bytes, bool)> {
        self.log()
            .iter()
            .filter_map(|event| match event {
                ManagerEvent::Message {
                    topic,
                    payload,
                    retained,
                } => Some((topic.clone(), payload.clone(), *retained)),
                _ => None,
            })
            .collect()
    }

    pub fn clear(&self) {
        self.log().clear();
    }
}

#[async_trait]
impl Manager for RecordingManager {
    async fn on_connect(&self, session_present: bool) {
        self.log().push(ManagerEvent::Connected { session_present });
    }

    async fn on_disconnect(&self, reason: Option<&Fault>) {
        self.log()
            .push(ManagerEvent::Disconnected(reason.map(DisconnectReason::from)));
    }

    async fn on_message(&self, topic: &str, payload: Bytes, retained: bool) {
        self.log().push(ManagerEvent::Message {
            topic: topic.to_string(),
            payload,
            retained,
        });
    }
}
