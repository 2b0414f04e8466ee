//! agentlink - keep an agent attached to the bus
//!
//! `agentlink run` connects with the configured identity, announces presence,
//! subscribes to the requested topic filters and logs every delivery until
//! SIGINT/SIGTERM, then leaves the bus cleanly.

use agentlink::config::AgentLinkConfig;
use agentlink::connection::{BusHandle, ConnectionManager, Manager};
use agentlink::error::Fault;
use agentlink::observability::{init_logging, lifecycle_span, LoggingSettings};
use agentlink::transport::mqtt::MqttTransport;
use agentlink::transport::QoS;
use async_trait::async_trait;
use bytes::Bytes;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process;
use std::sync::{Arc, OnceLock};
use tokio::signal;
use tracing::{error, info, warn, Instrument, Level};

/// Resilient MQTT bus connection for agents
#[derive(Parser)]
#[command(name = "agentlink")]
#[command(about = "Keep an agent connected to an MQTT bus with presence announcements")]
#[command(version)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, value_name = "FILE", env = "AGENTLINK_CONFIG")]
    config: Option<PathBuf>,

    /// Verbose logging (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Connect and stay connected until interrupted
    Run {
        /// Topic filter to subscribe to after every connect (repeatable)
        #[arg(short, long = "subscribe", value_name = "FILTER")]
        subscriptions: Vec<String>,

        /// QoS for the subscriptions (0 or 1)
        #[arg(long, default_value_t = 0)]
        qos: u8,
    },
    /// Validate configuration
    Config {
        /// Show current configuration
        #[arg(long)]
        show: bool,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let mut logging = LoggingSettings::from_env();
    match cli.verbose {
        0 => {}
        1 => logging.level = Level::DEBUG,
        _ => logging.level = Level::TRACE,
    }
    init_logging(logging.level, logging.format, logging.include_spans);

    info!("Starting agentlink v{}", env!("CARGO_PKG_VERSION"));

    let config = match load_configuration(&cli.config) {
        Ok(config) => config,
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            process::exit(1);
        }
    };

    let result = match cli.command {
        Commands::Run { subscriptions, qos } => {
            run_link(config, subscriptions, qos)
                .instrument(lifecycle_span!(command = "run"))
                .await
        }
        Commands::Config { show } => handle_config_command(&config, show),
    };

    if let Err(e) = result {
        error!("Command failed: {}", e);
        process::exit(1);
    }

    info!("Shutdown complete");
}

fn load_configuration(
    config_path: &Option<PathBuf>,
) -> Result<AgentLinkConfig, Box<dyn std::error::Error>> {
    match config_path {
        Some(path) => {
            info!("Loading configuration from: {}", path.display());
            Ok(AgentLinkConfig::load_from_file(path)?)
        }
        None => {
            let default_paths = ["agentlink.toml", "config/agentlink.toml"];

            for path_str in default_paths {
                let path = PathBuf::from(path_str);
                if path.exists() {
                    info!("Loading configuration from: {}", path.display());
                    return Ok(AgentLinkConfig::load_from_file(&path)?);
                }
            }

            Err("No configuration file found. Provide one with -c/--config or create agentlink.toml".into())
        }
    }
}

/// Logs deliveries and (re)subscribes on every connect
struct LoggingManager {
    subscriptions: Vec<String>,
    qos: QoS,
    handle: OnceLock<BusHandle<MqttTransport>>,
}

impl LoggingManager {
    fn new(subscriptions: Vec<String>, qos: QoS) -> Self {
        Self {
            subscriptions,
            qos,
            handle: OnceLock::new(),
        }
    }

    fn attach(&self, handle: BusHandle<MqttTransport>) {
        if self.handle.set(handle).is_err() {
            warn!("Bus handle already attached");
        }
    }
}

#[async_trait]
impl Manager for LoggingManager {
    async fn on_connect(&self, session_present: bool) {
        info!(session_present, "Connected to bus");

        let Some(handle) = self.handle.get() else {
            return;
        };
        for filter in &self.subscriptions {
            match handle.subscribe(filter, self.qos.level()).await {
                Ok(()) => info!(filter = %filter, qos = self.qos.level(), "Subscribed"),
                Err(e) => warn!(filter = %filter, error = %e, "Subscribe failed"),
            }
        }
    }

    async fn on_disconnect(&self, reason: Option<&Fault>) {
        match reason {
            Some(fault) if fault.is_keepalive_timeout() => {
                warn!(fault = %fault, "Broker stopped answering pings")
            }
            Some(fault) => warn!(fault = %fault, "Disconnected from bus"),
            None => info!("Left the bus"),
        }
    }

    async fn on_message(&self, topic: &str, payload: Bytes, retained: bool) {
        match std::str::from_utf8(&payload) {
            Ok(text) => info!(topic, retained, payload = %text, "Message"),
            Err(_) => info!(topic, retained, payload = ?payload, "Message"),
        }
    }
}

async fn run_link(
    config: AgentLinkConfig,
    subscriptions: Vec<String>,
    qos: u8,
) -> Result<(), Box<dyn std::error::Error>> {
    let qos = QoS::try_from(qos)?;
    let host = config.host_config()?;
    info!(
        host = %host.host,
        port = host.port,
        user = %host.user,
        tls = host.tls_mode().requires_certificate(),
        "Bus target resolved"
    );

    let logger = Arc::new(LoggingManager::new(subscriptions, qos));
    let mut manager =
        ConnectionManager::new(config.bus.clone(), MqttTransport::new(), Arc::clone(&logger));
    manager.set_target(host)?;
    logger.attach(manager.handle());
    manager.activate()?;

    let handle = manager.handle();
    let mut driver = manager.spawn();

    let mut sigint = signal::unix::signal(signal::unix::SignalKind::interrupt())?;
    let mut sigterm = signal::unix::signal(signal::unix::SignalKind::terminate())?;

    tokio::select! {
        _ = sigint.recv() => {
            info!("Received SIGINT, shutting down gracefully...");
        }
        _ = sigterm.recv() => {
            info!("Received SIGTERM, shutting down gracefully...");
        }
        finished = &mut driver => {
            warn!("Connection manager stopped unexpectedly");
            finished?;
            return Ok(());
        }
    }

    handle.deactivate();
    let manager = driver.await?;
    info!(
        reconnects = manager.health_metrics().reconnect_count,
        "Connection manager stopped"
    );
    Ok(())
}

fn handle_config_command(
    config: &AgentLinkConfig,
    show: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    if show {
        let mut redacted = config.clone();
        if redacted.target.password.is_some() {
            redacted.target.password = Some("***".to_string());
        }
        println!("Current configuration:");
        println!("{}", toml::to_string_pretty(&redacted)?);
    }

    info!("Configuration validation complete");
    Ok(())
}
