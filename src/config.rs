//! Configuration for the agentlink bus connection
//!
//! A config file has two sections: `[bus]` with the settings shared by every
//! connection cycle, and `[target]` with the broker to connect to.
//! Secrets may come from the environment through `password_env`.

use crate::connection::{HealthMonitor, ReconnectConfig};
use crate::transport::{Credentials, TlsMode};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AgentLinkConfig {
    pub bus: BusSection,
    pub target: TargetSection,
}

/// Bus section
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BusSection {
    /// Topic prefix, used verbatim (include the trailing separator); may be empty
    pub base: String,
    /// MQTT keepalive in seconds
    pub keepalive_secs: u64,
    /// Reconnection backoff (default: fixed 3000 ms)
    #[serde(default)]
    pub reconnect: ReconnectConfig,
}

impl BusSection {
    pub fn new(base: impl Into<String>, keepalive: Duration) -> Self {
        Self {
            base: base.into(),
            keepalive_secs: keepalive.as_secs(),
            reconnect: ReconnectConfig::default(),
        }
    }

    pub fn with_reconnect(mut self, reconnect: ReconnectConfig) -> Self {
        self.reconnect = reconnect;
        self
    }

    pub fn keepalive(&self) -> Duration {
        Duration::from_secs(self.keepalive_secs)
    }
}

/// Target section
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TargetSection {
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Username; also used as the client id and the status topic suffix
    pub user: String,
    /// Inline password
    pub password: Option<String>,
    /// Environment variable containing the password (wins over `password`)
    pub password_env: Option<String>,
    /// CA certificate (PEM); enables TLS with certificate validation
    pub ca: Option<PathBuf>,
}

fn default_port() -> u16 {
    1883
}

/// Resolved broker target, fixed for the lifetime of a connection manager
#[derive(Clone, PartialEq, Eq)]
pub struct HostConfig {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
    pub ca: Option<PathBuf>,
}

impl HostConfig {
    pub fn new(
        host: impl Into<String>,
        port: u16,
        user: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            host: host.into(),
            port,
            user: user.into(),
            password: password.into(),
            ca: None,
        }
    }

    pub fn with_ca(mut self, ca: impl Into<PathBuf>) -> Self {
        self.ca = Some(ca.into());
        self
    }

    /// A CA file means the broker certificate must validate against it (pure function)
    pub fn tls_mode(&self) -> TlsMode {
        match &self.ca {
            Some(ca) => TlsMode::CertificateRequired { ca: ca.clone() },
            None => TlsMode::None,
        }
    }

    pub fn credentials(&self) -> Credentials {
        Credentials {
            user: self.user.clone(),
            password: self.password.clone(),
        }
    }
}

impl std::fmt::Debug for HostConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HostConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("user", &self.user)
            .field("password", &"***")
            .field("ca", &self.ca)
            .finish()
    }
}

/// Configuration loading errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    FileRead(#[from] std::io::Error),
    #[error("Failed to parse TOML: {0}")]
    TomlParse(#[from] toml::de::Error),
    #[error("Environment variable not found: {0}")]
    EnvVarNotFound(String),
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl AgentLinkConfig {
    /// Load and validate configuration from a TOML file
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    /// Parse and validate configuration from TOML text
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: AgentLinkConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.bus.keepalive_secs == 0 {
            return Err(invalid("bus.keepalive_secs must be greater than 0"));
        }
        HealthMonitor::validate_reconnect_config(&self.bus.reconnect)
            .map_err(|e| ConfigError::InvalidConfig(format!("bus.reconnect: {e}")))?;

        if self.target.host.is_empty() {
            return Err(invalid("target.host must not be empty"));
        }
        if self.target.port == 0 {
            return Err(invalid("target.port must be greater than 0"));
        }
        if self.target.user.is_empty() {
            return Err(invalid("target.user must not be empty"));
        }

        Ok(())
    }

    /// Resolve the password; the environment is read at call time
    pub fn resolve_password(&self) -> Result<String, ConfigError> {
        match (&self.target.password_env, &self.target.password) {
            (Some(name), _) => Self::get_env_var_required(name),
            (None, Some(password)) => Ok(password.clone()),
            (None, None) => Ok(String::new()),
        }
    }

    /// Build the broker target handed to the connection manager
    pub fn host_config(&self) -> Result<HostConfig, ConfigError> {
        Ok(HostConfig {
            host: self.target.host.clone(),
            port: self.target.port,
            user: self.target.user.clone(),
            password: self.resolve_password()?,
            ca: self.target.ca.clone(),
        })
    }

    fn get_env_var_required(env_var_name: &str) -> Result<String, ConfigError> {
        std::env::var(env_var_name)
            .map_err(|_| ConfigError::EnvVarNotFound(env_var_name.to_string()))
    }

    /// Create a test configuration for unit testing
    #[cfg(test)]
    pub fn test_config() -> Self {
        let toml_content = r#"
[bus]
base = "test/"
keepalive_secs = 60

[target]
host = "localhost"
port = 1883
user = "test-agent"
password = "secret"
"#;
        toml::from_str(toml_content).expect("Test config should parse")
    }
}

fn invalid(message: &str) -> ConfigError {
    ConfigError::InvalidConfig(message.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_full_config() {
        let toml_content = r#"
[bus]
base = "suit/"
keepalive_secs = 30

[bus.reconnect]
backoff_pattern = [250, 500, 1000]
sustained_delay = 2000

[target]
host = "broker.local"
port = 8883
user = "kitchen-sensor"
password = "hunter2"
ca = "/etc/agentlink/ca.pem"
"#;

        let config = AgentLinkConfig::from_toml(toml_content).unwrap();
        assert_eq!(config.bus.base, "suit/");
        assert_eq!(config.bus.keepalive(), Duration::from_secs(30));
        assert_eq!(config.bus.reconnect.backoff_pattern, vec![250, 500, 1000]);
        assert_eq!(config.bus.reconnect.sustained_delay, 2000);
        assert_eq!(config.target.port, 8883);

        let host = config.host_config().unwrap();
        assert_eq!(host.password, "hunter2");
        assert_eq!(
            host.tls_mode(),
            TlsMode::CertificateRequired {
                ca: PathBuf::from("/etc/agentlink/ca.pem")
            }
        );
    }

    #[test]
    fn test_minimal_config_defaults() {
        let config = AgentLinkConfig::test_config();
        assert!(config.validate().is_ok());
        assert_eq!(config.bus.reconnect, ReconnectConfig::default());
        assert_eq!(config.target.ca, None);

        let host = config.host_config().unwrap();
        assert_eq!(host.tls_mode(), TlsMode::None);
        assert_eq!(host.credentials().user, "test-agent");
    }

    #[test]
    fn test_port_defaults_to_1883() {
        let toml_content = r#"
[bus]
base = "b/"
keepalive_secs = 10

[target]
host = "localhost"
user = "u"
"#;
        let config = AgentLinkConfig::from_toml(toml_content).unwrap();
        assert_eq!(config.target.port, 1883);
        assert_eq!(config.resolve_password().unwrap(), "");
    }

    #[test]
    fn test_validation_rejects_bad_values() {
        let mut config = AgentLinkConfig::test_config();
        config.bus.keepalive_secs = 0;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidConfig(_))
        ));


        let mut config = AgentLinkConfig::test_config();
        config.target.user.clear();
        assert!(config.validate().is_err());

        let mut config = AgentLinkConfig::test_config();
        config.bus.reconnect = ReconnectConfig::fixed(0);
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("bus.reconnect"));
    }

    #[test]
    fn test_empty_base_is_a_valid_prefix() {
        let mut config = AgentLinkConfig::test_config();
        config.bus.base.clear();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_password_env_wins_over_inline() {
        let mut config = AgentLinkConfig::test_config();
        config.target.password_env = Some("AGENTLINK_CONFIG_UNIT_PASSWORD".to_string());
        std::env::set_var("AGENTLINK_CONFIG_UNIT_PASSWORD", "from-env");

        assert_eq!(config.host_config().unwrap().password, "from-env");

        std::env::remove_var("AGENTLINK_CONFIG_UNIT_PASSWORD");
    }

    #[test]
    fn test_missing_password_env() {
        let mut config = AgentLinkConfig::test_config();
        config.target.password_env = Some("AGENTLINK_CONFIG_UNIT_MISSING".to_string());

        let result = config.host_config();
        assert!(matches!(
            result,
            Err(ConfigError::EnvVarNotFound(ref name)) if name == "AGENTLINK_CONFIG_UNIT_MISSING"
        ));
    }

    #[test]
    fn test_host_config_debug_hides_password() {
        let host = HostConfig::new("localhost", 1883, "agent", "hunter2");
        let rendered = format!("{host:?}");
        assert!(rendered.contains("agent"));
        assert!(!rendered.contains("hunter2"));
    }
}
