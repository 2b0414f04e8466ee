//! Connection state and reconnection backoff configuration

use serde::{Deserialize, Serialize};

/// Lifecycle state of one connection manager
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Constructed, not yet activated
    Idle,
    /// Activated; attempting (or about to retry) the broker handshake
    Connecting,
    /// Session open and presence announced
    Connected,
    /// Tearing down the current session
    Disconnecting,
    /// Deactivated and torn down; terminal
    Stopped,
}

impl ConnectionState {
    pub fn is_terminal(self) -> bool {
        matches!(self, ConnectionState::Stopped)
    }
}

/// Reconnection backoff configuration
///
/// The default is the fixed 3 s backoff: an empty pattern and a 3000 ms
/// sustained delay. A pattern gives an escalating backoff that settles at
/// `sustained_delay`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconnectConfig {
    /// Delays in milliseconds for the first attempts
    #[serde(default)]
    pub backoff_pattern: Vec<u64>,
    /// Delay to use once the pattern is exhausted
    #[serde(default = "default_sustained_delay")]
    pub sustained_delay: u64,
}

fn default_sustained_delay() -> u64 {
    3000
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            backoff_pattern: Vec::new(),
            sustained_delay: default_sustained_delay(),
        }
    }
}

impl ReconnectConfig {
    /// Fixed delay for every attempt
    pub fn fixed(delay_ms: u64) -> Self {
        Self {
            backoff_pattern: Vec::new(),
            sustained_delay: delay_ms,
        }
    }

    /// Calculate backoff delay for the given attempt (1-based)
    pub fn calculate_backoff_delay(&self, attempt: u32) -> u64 {
        let index = attempt.saturating_sub(1) as usize;
        self.backoff_pattern
            .get(index)
            .copied()
            .unwrap_or(self.sustained_delay)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reconnect_config_default_is_fixed_three_seconds() {
        let config = ReconnectConfig::default();
        assert!(config.backoff_pattern.is_empty());
        assert_eq!(config.calculate_backoff_delay(1), 3000);
        assert_eq!(config.calculate_backoff_delay(50), 3000);
    }

    #[test]
    fn test_calculate_backoff_delay_with_pattern() {
        let config = ReconnectConfig {
            backoff_pattern: vec![250, 500, 1000],
            sustained_delay: 2000,
        };

        assert_eq!(config.calculate_backoff_delay(1), 250);
        assert_eq!(config.calculate_backoff_delay(2), 500);
        assert_eq!(config.calculate_backoff_delay(3), 1000);

        // Pattern exhausted
        assert_eq!(config.calculate_backoff_delay(4), 2000);
        assert_eq!(config.calculate_backoff_delay(100), 2000);
    }

    #[test]
    fn test_attempt_zero_uses_first_slot() {
        let config = ReconnectConfig {
            backoff_pattern: vec![10, 20],
            sustained_delay: 30,
        };
        assert_eq!(config.calculate_backoff_delay(0), 10);
    }

    #[test]
    fn test_terminal_state() {
        assert!(ConnectionState::Stopped.is_terminal());
        assert!(!ConnectionState::Disconnecting.is_terminal());
        assert!(!ConnectionState::Idle.is_terminal());
    }
}
