//! Configuration module for echo-server.
//!
//! Supports both command-line arguments and TOML configuration file.
//! CLI arguments take precedence over config file values.

use clap::{Parser, ValueEnum};
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Command-line arguments for the servers
#[derive(Parser, Debug)]
#[command(name = "echo-server")]
#[command(author = "echo-server authors")]
#[command(version = "0.1.0")]
#[command(about = "A TCP echo server and an HTTP server in one process", long_about = None)]
pub struct CliArgs {
    /// `client` runs the demonstration client in the foreground and stops
    /// the servers when it finishes; `serve` (default) waits for Ctrl-C
    #[arg(value_enum)]
    pub mode: Option<RunMode>,

    /// Path to TOML configuration file
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Address for the TCP echo server (e.g., 127.0.0.1:8888)
    #[arg(short = 't', long)]
    pub tcp_listen: Option<String>,

    /// Address for the HTTP server (e.g., localhost:8080)
    #[arg(long)]
    pub http_listen: Option<String>,

    /// Maximum concurrent connections per server (unbounded when unset)
    #[arg(short = 'm', long)]
    pub max_connections: Option<usize>,

    /// Close connections that stay idle this many seconds
    #[arg(long)]
    pub idle_timeout: Option<u64>,

    /// Seconds to wait for open sessions after the listeners close
    #[arg(long)]
    pub drain_timeout: Option<u64>,

    /// Do not start the demonstration client
    #[arg(long)]
    pub no_client: bool,

    /// Number of worker threads (defaults to number of CPU cores)
    #[arg(short = 'w', long)]
    pub workers: Option<usize>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    pub log_level: String,
}

/// Positional run mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum RunMode {
    /// Run the demonstration client inline
    Client,
    /// Serve until interrupted
    Serve,
}

/// How the demonstration client is run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientMode {
    /// Alongside the servers while the process waits for an interrupt.
    Background,
    /// In the foreground; the servers stop once it finishes.
    Inline,
    /// Not at all.
    Disabled,
}

/// TOML configuration file structure
#[derive(Debug, Deserialize, Default)]
pub struct TomlConfig {
    #[serde(default)]
    pub tcp: ListenerSection,
    #[serde(default)]
    pub http: ListenerSection,
    #[serde(default)]
    pub server: ServerSection,
    #[serde(default)]
    pub shutdown: ShutdownSection,
    #[serde(default)]
    pub client: ClientSection,
    #[serde(default)]
    pub logging: LoggingSection,
}

/// Per-listener configuration
#[derive(Debug, Deserialize, Default)]
pub struct ListenerSection {
    /// Address to bind to
    pub listen: Option<String>,
    /// Maximum concurrent connections
    pub max_connections: Option<usize>,
    /// Idle timeout in seconds
    pub idle_timeout: Option<u64>,
}

/// Runtime configuration
#[derive(Debug, Deserialize, Default)]
pub struct ServerSection {
    /// Number of worker threads
    pub workers: Option<usize>,
}

/// Shutdown configuration
#[derive(Debug, Deserialize, Default)]
pub struct ShutdownSection {
    /// Seconds to wait for open sessions during shutdown
    pub drain_timeout: Option<u64>,
}

/// Demonstration client configuration
#[derive(Debug, Deserialize)]
pub struct ClientSection {
    #[serde(default = "default_client_enabled")]
    pub enabled: bool,
    /// Delay before connecting, in milliseconds
    #[serde(default = "default_startup_delay_ms")]
    pub startup_delay_ms: u64,
}

impl Default for ClientSection {
    fn default() -> Self {
        Self {
            enabled: default_client_enabled(),
            startup_delay_ms: default_startup_delay_ms(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Deserialize)]
pub struct LoggingSection {
    /// Log level
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingSection {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_tcp_listen() -> String {
    "127.0.0.1:8888".to_string()
}

fn default_http_listen() -> String {
    "localhost:8080".to_string()
}

fn default_client_enabled() -> bool {
    true
}

fn default_startup_delay_ms() -> u64 {
    2000
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Resolved settings for one listener
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListenerConfig {
    pub listen: String,
    /// `None` accepts without limit
    pub max_connections: Option<usize>,
    /// `None` lets connections idle forever
    pub idle_timeout: Option<Duration>,
}

impl ListenerConfig {
    /// Unbounded listener on `listen`, for tests
    #[cfg(test)]
    pub fn new(listen: impl Into<String>) -> Self {
        Self {
            listen: listen.into(),
            max_connections: None,
            idle_timeout: None,
        }
    }
}

/// Final resolved configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub tcp: ListenerConfig,
    pub http: ListenerConfig,
    pub workers: Option<usize>,
    pub drain_timeout: Option<Duration>,
    pub client_mode: ClientMode,
    pub client_delay: Duration,
    pub log_level: String,
}

impl Default for Config {
    fn default() -> Self {
        Self::resolve(CliArgs::parse_from(["echo-server"]), TomlConfig::default())
    }
}

impl Config {
    /// Load configuration from CLI args and optional TOML file.
    /// CLI arguments take precedence over TOML file values.
    pub fn load() -> Result<Self, ConfigError> {
        let cli = CliArgs::parse();

        // Load TOML config if specified
        let toml_config = if let Some(ref config_path) = cli.config {
            let contents = std::fs::read_to_string(config_path)
                .map_err(|e| ConfigError::FileRead(config_path.clone(), e))?;
            toml::from_str(&contents)
                .map_err(|e| ConfigError::TomlParse(config_path.clone(), e))?
        } else {
            TomlConfig::default()
        };

        Ok(Self::resolve(cli, toml_config))
    }

    /// Merge CLI args with TOML config (CLI takes precedence)
    pub fn resolve(cli: CliArgs, toml_config: TomlConfig) -> Self {
        let idle_timeout = cli.idle_timeout;
        let max_connections = cli.max_connections;
        let listener = |section: ListenerSection, cli_listen: Option<String>, default: String| {
            ListenerConfig {
                listen: cli_listen.or(section.listen).unwrap_or(default),
                max_connections: max_connections.or(section.max_connections),
                idle_timeout: idle_timeout
                    .or(section.idle_timeout)
                    .map(Duration::from_secs),
            }
        };

        let client_mode = if cli.no_client || !toml_config.client.enabled {
            ClientMode::Disabled
        } else if cli.mode == Some(RunMode::Client) {
            ClientMode::Inline
        } else {
            ClientMode::Background
        };

        Config {
            tcp: listener(toml_config.tcp, cli.tcp_listen, default_tcp_listen()),
            http: listener(toml_config.http, cli.http_listen, default_http_listen()),
            workers: cli.workers.or(toml_config.server.workers),
            drain_timeout: cli
                .drain_timeout
                .or(toml_config.shutdown.drain_timeout)
                .map(Duration::from_secs),
            client_mode,
            client_delay: Duration::from_millis(toml_config.client.startup_delay_ms),
            log_level: if cli.log_level != "info" {
                cli.log_level
            } else {
                toml_config.logging.level
            },
        }
    }
}

/// Configuration loading errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file '{path}': {err}", path = .0.display(), err = .1)]
    FileRead(PathBuf, #[source] std::io::Error),
    #[error("Failed to parse config file '{path}': {err}", path = .0.display(), err = .1)]
    TomlParse(PathBuf, #[source] toml::de::Error),
}
