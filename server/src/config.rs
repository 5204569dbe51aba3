use clap::Parser;
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

/// Command-line flags. Only flags actually given override lower layers.
#[derive(Parser, Serialize, Clone, Debug, Default)]
#[command(name = "theatre-server", version, about = "Live stage activity dashboard server")]
pub struct Cli {
    /// Port to listen on
    #[arg(long, env = "THEATRE_PORT")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,

    /// Bind address
    #[arg(long, env = "THEATRE_BIND_ADDRESS")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bind_address: Option<String>,

    /// Path to TOML config file
    #[arg(long, default_value = "./theatre.toml")]
    #[serde(skip)]
    pub config: String,

    /// Enable structured JSON logging
    #[arg(long, env = "THEATRE_JSON_LOGS")]
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub json_logs: bool,

    /// Output a commented TOML config template and exit
    #[arg(long)]
    #[serde(skip)]
    pub generate_config: bool,

    /// Tab-separated replay script: play, character, line
    #[arg(long, env = "THEATRE_PLAYS_PATH")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub plays_path: Option<String>,
}

/// Resolved server configuration.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct Config {
    pub port: u16,
    pub bind_address: String,
    pub json_logs: bool,
    pub plays_path: String,

    /// Ranking settings (loaded from [stats] section in TOML)
    #[serde(default)]
    pub stats: StatsConfig,

    /// Replay producer settings (loaded from [replay] section in TOML)
    #[serde(default)]
    pub replay: ReplayConfig,

    /// Per-connection delivery limits (loaded from [connections] section in TOML)
    #[serde(default)]
    pub connections: ConnectionsConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: 7000,
            bind_address: "127.0.0.1".to_string(),
            json_logs: false,
            plays_path: "./plays.csv".to_string(),
            stats: StatsConfig::default(),
            replay: ReplayConfig::default(),
            connections: ConnectionsConfig::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatsConfig {
    /// Entries per ranking (default: 5)
    #[serde(default = "default_top_n")]
    pub top_n: usize,

    /// Ranking refresh period in milliseconds (default: 1000)
    #[serde(default = "default_tick_interval_ms")]
    pub tick_interval_ms: u64,

    /// Sliding window length in seconds (default: 60)
    #[serde(default = "default_window_secs")]
    pub window_secs: u64,
}

impl StatsConfig {
    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }

    pub fn window(&self) -> Duration {
        Duration::from_secs(self.window_secs)
    }
}

impl Default for StatsConfig {
    fn default() -> Self {
        Self {
            top_n: default_top_n(),
            tick_interval_ms: default_tick_interval_ms(),
            window_secs: default_window_secs(),
        }
    }
}

fn default_top_n() -> usize {
    5
}

fn default_tick_interval_ms() -> u64 {
    1000
}

fn default_window_secs() -> u64 {
    60
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReplayConfig {
    /// Pause after each published line in milliseconds (default: 100)
    #[serde(default = "default_line_interval_ms")]
    pub line_interval_ms: u64,
}

impl ReplayConfig {
    pub fn line_interval(&self) -> Duration {
        Duration::from_millis(self.line_interval_ms)
    }
}

impl Default for ReplayConfig {
    fn default() -> Self {
        Self {
            line_interval_ms: default_line_interval_ms(),
        }
    }
}

fn default_line_interval_ms() -> u64 {
    100
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConnectionsConfig {
    /// Messages queued per connection before snapshots are dropped (default: 16)
    #[serde(default = "default_outbox_capacity")]
    pub outbox_capacity: usize,

    /// Upper bound on a single socket write in milliseconds (default: 5000)
    #[serde(default = "default_write_timeout_ms")]
    pub write_timeout_ms: u64,
}

impl ConnectionsConfig {
    pub fn write_timeout(&self) -> Duration {
        Duration::from_millis(self.write_timeout_ms)
    }
}

impl Default for ConnectionsConfig {
    fn default() -> Self {
        Self {
            outbox_capacity: default_outbox_capacity(),
            write_timeout_ms: default_write_timeout_ms(),
        }
    }
}

fn default_outbox_capacity() -> usize {
    16
}

fn default_write_timeout_ms() -> u64 {
    5000
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error(transparent)]
    Figment(#[from] figment::Error),
    #[error("invalid configuration: {0}")]
    Invalid(&'static str),
}

impl Config {
    /// Load config with layered precedence:
    /// built-in defaults < TOML file < env vars (THEATRE_*) < CLI args
    pub fn load(cli: &Cli) -> Result<Self, ConfigError> {
        Self::from_figment(Self::figment(cli))
    }

    /// The layered provider stack without extraction.
    /// Nested keys use a double underscore: THEATRE_STATS__TOP_N=10.
    pub fn figment(cli: &Cli) -> Figment {
        Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Toml::file(&cli.config))
            .merge(Env::prefixed("THEATRE_").split("__"))
            .merge(Serialized::defaults(cli))
    }

    pub fn from_figment(figment: Figment) -> Result<Self, ConfigError> {
        let config: Config = figment.extract()?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.stats.tick_interval_ms == 0 {
            return Err(ConfigError::Invalid("stats.tick_interval_ms must be greater than 0"));
        }
        if self.stats.window_secs == 0 {
            return Err(ConfigError::Invalid("stats.window_secs must be greater than 0"));
        }
        if self.replay.line_interval_ms == 0 {
            return Err(ConfigError::Invalid("replay.line_interval_ms must be greater than 0"));
        }
        if self.connections.outbox_capacity == 0 {
            return Err(ConfigError::Invalid("connections.outbox_capacity must be greater than 0"));
        }
        if self.connections.write_timeout_ms == 0 {
            return Err(ConfigError::Invalid("connections.write_timeout_ms must be greater than 0"));
        }
        Ok(())
    }
}

/// Generate a commented TOML config template
pub fn generate_config_template() -> String {
    r#"# Theatre Server Configuration
# Place this file at ./theatre.toml or specify with --config <path>
# All settings can be overridden via environment variables (THEATRE_PORT,
# THEATRE_STATS__TOP_N, etc.) or CLI flags (--port, etc.)

# Server port (default: 7000)
# port = 7000

# Bind address (default: 127.0.0.1)
# bind_address = "127.0.0.1"

# Enable structured JSON logging
# json_logs = false

# Tab-separated replay script: play <TAB> character <TAB> line
# plays_path = "./plays.csv"

# ---- Rankings ----
# [stats]
# top_n = 5                  # Entries per ranking list
# tick_interval_ms = 1000    # How often rankings are pushed to clients
# window_secs = 60           # Only activity this recent counts

# ---- Replay producer ----
# [replay]
# line_interval_ms = 100     # Pause after each published line

# ---- Connections ----
# [connections]
# outbox_capacity = 16       # Snapshots queued per client before dropping
# write_timeout_ms = 5000    # A client slower than this is disconnected
"#
    .to_string()
}
