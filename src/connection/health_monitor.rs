//! Pure health monitoring and reconnection logic
//!
//! This module contains pure functions for reconnection decisions,
//! state-gated operation checks and connection health metrics.

use super::state::{ConnectionState, ReconnectConfig};
use std::time::{Duration, Instant};
use tracing::{info, warn};

/// Pure health monitoring and reconnection decision logic
pub struct HealthMonitor;

impl HealthMonitor {
    /// Determine if reconnection should be attempted (pure function)
    ///
    /// Retries are unlimited; only a shutdown request ends them.
    pub fn should_attempt_reconnection(
        current_attempts: u32,
        config: &ReconnectConfig,
        shutdown_requested: bool,
    ) -> ReconnectionDecision {
        if shutdown_requested {
            return ReconnectionDecision::AbortShutdownRequested;
        }

        let attempt = current_attempts.saturating_add(1);
        ReconnectionDecision::Proceed {
            attempt,
            delay_ms: config.calculate_backoff_delay(attempt),
        }
    }

    /// Check if connection state allows publishing (pure function)
    pub fn can_publish(state: ConnectionState) -> bool {
        matches!(state, ConnectionState::Connected)
    }

    /// Check if connection state allows subscribing (pure function)
    pub fn can_subscribe(state: ConnectionState) -> bool {
        matches!(state, ConnectionState::Connected)
    }

    /// Calculate health metrics for the connection (pure function)
    pub fn calculate_health_metrics(
        connect_time: Option<Instant>,
        last_message_time: Option<Instant>,
        since_last_pong: Option<Duration>,
        pong_deadline: Duration,
        reconnect_count: u32,
    ) -> HealthMetrics {
        let now = Instant::now();

        let uptime = connect_time.map(|t| now.duration_since(t));
        let time_since_last_message = last_message_time.map(|t| now.duration_since(t));

        HealthMetrics {
            uptime,
            time_since_last_message,
            time_since_last_pong: since_last_pong,
            reconnect_count,
            is_healthy: Self::determine_health_status(uptime, since_last_pong, pong_deadline),
        }
    }

    /// Healthy means connected with the last pong inside the deadline (pure function)
    fn determine_health_status(
        uptime: Option<Duration>,
        since_last_pong: Option<Duration>,
        pong_deadline: Duration,
    ) -> bool {
        match (uptime, since_last_pong) {
            (Some(_), Some(since)) => since < pong_deadline,
            (Some(_), None) => true,
            _ => false,
        }
    }

    /// Log connection state transition (pure logging function)
    pub fn log_state_transition(from: ConnectionState, to: ConnectionState) {
        match (from, to) {
            (ConnectionState::Idle, ConnectionState::Connecting) => {
                info!("Connection manager activated");
            }
            (ConnectionState::Connecting, ConnectionState::Connected) => {
                info!("Broker connection established");
            }
            (ConnectionState::Connected, ConnectionState::Disconnecting) => {
                warn!("Broker connection closing");
            }
            (ConnectionState::Disconnecting, ConnectionState::Connecting) => {
                info!("Reconnecting to broker");
            }
            (_, ConnectionState::Stopped) => {
                info!("Connection manager stopped");
            }
            _ => {
                info!("Connection state: {:?} -> {:?}", from, to);
            }
        }
    }

    /// Validate reconnection configuration (pure function)
    pub fn validate_reconnect_config(config: &ReconnectConfig) -> Result<(), String> {
        if config.sustained_delay == 0 {
            return Err("sustained_delay must be greater than 0".to_string());
        }

        if config.backoff_pattern.iter().any(|&delay| delay == 0) {
            return Err("backoff_pattern delays must be greater than 0".to_string());
        }

        Ok(())
    }
}

/// Decision result for reconnection attempts
#[derive(Debug, PartialEq, Eq)]
pub enum ReconnectionDecision {
    /// Proceed with reconnection attempt
    Proceed { attempt: u32, delay_ms: u64 },
    /// Abort reconnection - shutdown requested
    AbortShutdownRequested,
}

/// Health metrics for connection monitoring
#[derive(Debug, Clone, PartialEq)]
pub struct HealthMetrics {
    /// Time since the current session was established
    pub uptime: Option<Duration>,
    /// Time since the last inbound message
    pub time_since_last_message: Option<Duration>,
    /// Time since the last ping acknowledgment
    pub time_since_last_pong: Option<Duration>,
    /// Number of reconnections since activation
    pub reconnect_count: u32,
    /// Overall health status
    pub is_healthy: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_should_attempt_reconnection() {
        let config = ReconnectConfig::default();

        let decision = HealthMonitor::should_attempt_reconnection(0, &config, false);
        assert_eq!(
            decision,
            ReconnectionDecision::Proceed {
                attempt: 1,
                delay_ms: 3000
            }
        );

        // Retries never run out
        let decision = HealthMonitor::should_attempt_reconnection(10_000, &config, false);
        assert_eq!(
            decision,
            ReconnectionDecision::Proceed {
                attempt: 10_001,
                delay_ms: 3000
            }
        );

        let decision = HealthMonitor::should_attempt_reconnection(3, &config, true);
        assert_eq!(decision, ReconnectionDecision::AbortShutdownRequested);
    }

    #[test]
    fn test_should_attempt_reconnection_with_pattern() {
        let config = ReconnectConfig {
            backoff_pattern: vec![100, 400],
            sustained_delay: 1000,
        };

        assert_eq!(
            HealthMonitor::should_attempt_reconnection(1, &config, false),
            ReconnectionDecision::Proceed {
                attempt: 2,
                delay_ms: 400
            }
        );
        assert_eq!(
            HealthMonitor::should_attempt_reconnection(2, &config, false),
            ReconnectionDecision::Proceed {
                attempt: 3,
                delay_ms: 1000
            }
        );
    }

    #[test]
    fn test_can_publish_and_subscribe_only_when_connected() {
        for state in [
            ConnectionState::Idle,
            ConnectionState::Connecting,
            ConnectionState::Disconnecting,
            ConnectionState::Stopped,
        ] {
            assert!(!HealthMonitor::can_publish(state), "{state:?}");
            assert!(!HealthMonitor::can_subscribe(state), "{state:?}");
        }
        assert!(HealthMonitor::can_publish(ConnectionState::Connected));
        assert!(HealthMonitor::can_subscribe(ConnectionState::Connected));
    }

    #[test]
    fn test_calculate_health_metrics() {
        let now = Instant::now();
        let connect_time = Some(now - Duration::from_secs(3600));
        let last_message_time = Some(now - Duration::from_secs(60));

        let metrics = HealthMonitor::calculate_health_metrics(
            connect_time,
            last_message_time,
            Some(Duration::from_secs(10)),
            Duration::from_secs(60),
            2,
        );

        assert!(metrics.uptime.unwrap() >= Duration::from_secs(3600));
        assert!(metrics.time_since_last_message.unwrap() >= Duration::from_secs(60));
        assert_eq!(metrics.reconnect_count, 2);
        assert!(metrics.is_healthy);
    }

    #[test]
    fn test_determine_health_status() {
        let uptime = Some(Duration::from_secs(100));
        let deadline = Duration::from_secs(60);

        assert!(HealthMonitor::determine_health_status(
            uptime,
            Some(Duration::from_secs(5)),
            deadline
        ));
        assert!(HealthMonitor::determine_health_status(uptime, None, deadline));
        assert!(!HealthMonitor::determine_health_status(
            uptime,
            Some(Duration::from_secs(60)),
            deadline
        ));
        assert!(!HealthMonitor::determine_health_status(None, None, deadline));
    }

    #[test]
    fn test_validate_reconnect_config() {
        assert!(HealthMonitor::validate_reconnect_config(&ReconnectConfig::default()).is_ok());
        assert!(HealthMonitor::validate_reconnect_config(&ReconnectConfig::fixed(0)).is_err());

        let zero_in_pattern = ReconnectConfig {
            backoff_pattern: vec![100, 0],
            sustained_delay: 500,
        };
        assert!(HealthMonitor::validate_reconnect_config(&zero_in_pattern).is_err());
    }
}
