//! Configuration management for robo-console.
//!
//! Configuration is loaded with the following priority (highest to lowest):
//! 1. Command-line arguments
//! 2. Environment variables
//! 3. Configuration file (JSON)
//! 4. Default values

use std::net::IpAddr;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::cli::Args;
use crate::server::{ConsoleConfig, DEFAULT_PORT};
use crate::session::{default_banner, SessionOptions, DEFAULT_MAX_INPUT_BYTES};

/// Application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Console server configuration.
    pub console: ConsoleSection,
    /// Logging configuration.
    pub logging: LoggingSection,
}

/// Console server configuration section.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConsoleSection {
    /// Host address to bind to.
    pub host: String,
    /// Port to listen on.
    pub port: u16,
    /// Allow rebinding a recently used address.
    pub reuse_address: bool,
    /// Write a banner line when a client connects.
    pub show_banner: bool,
    /// Custom banner text. Uses the built-in banner when unset.
    pub banner: Option<String>,
    /// Primary prompt.
    pub prompt: String,
    /// Prompt while a statement is incomplete.
    pub continuation_prompt: String,
    /// Bound on one evaluation in seconds. 0 disables the bound.
    pub eval_timeout_secs: u64,
    /// Bound on waiting for sessions at shutdown in seconds. 0 waits forever.
    pub shutdown_timeout_secs: u64,
    /// Longest accepted input line or statement in bytes.
    pub max_input_bytes: usize,
}

impl Default for ConsoleSection {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: DEFAULT_PORT,
            reuse_address: true,
            show_banner: true,
            banner: None,
            prompt: ">>> ".to_string(),
            continuation_prompt: "... ".to_string(),
            eval_timeout_secs: 30,
            shutdown_timeout_secs: 5,
            max_input_bytes: DEFAULT_MAX_INPUT_BYTES,
        }
    }
}

/// Logging configuration section.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSection {
    /// Log level (error, warn, info, debug, trace) or a full filter directive.
    pub level: String,
}

impl Default for LoggingSection {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl Config {
    /// Load configuration from a JSON file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(ConfigError::Io)?;
        serde_json::from_str(&content).map_err(ConfigError::Json)
    }

    /// Apply environment variable overrides.
    pub fn apply_env(&mut self) {
        self.apply_vars(|key| std::env::var(key).ok());
    }

    fn apply_vars<F>(&mut self, var: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(host) = var("ROBO_CONSOLE_HOST") {
            self.console.host = host;
        }

        if let Some(port) = var("ROBO_CONSOLE_PORT") {
            if let Ok(port) = port.parse() {
                self.console.port = port;
            }
        }

        if let Some(level) = var("ROBO_CONSOLE_LOG_LEVEL") {
            self.logging.level = level;
        } else if let Some(level) = var("RUST_LOG") {
            self.logging.level = level;
        }
    }

    /// Apply CLI argument overrides.
    pub fn apply_args(&mut self, args: &Args) {
        if let Some(host) = args.host {
            self.console.host = host.to_string();
        }

        if let Some(port) = args.port {
            self.console.port = port;
        }

        if args.no_banner {
            self.console.show_banner = false;
        }

        if let Some(secs) = args.eval_timeout {
            self.console.eval_timeout_secs = secs;
        }

        if let Some(secs) = args.shutdown_timeout {
            self.console.shutdown_timeout_secs = secs;
        }

        if let Some(ref level) = args.log_level {
            self.logging.level = level.clone();
        }
    }

    /// Load configuration with full priority chain.
    ///
    /// Priority: CLI args > env vars > config file > defaults
    pub fn load(args: &Args) -> Result<Self, ConfigError> {
        let mut config = match args.config {
            Some(ref path) => Config::from_file(path)?,
            None => Config::default(),
        };

        config.apply_env();
        config.apply_args(args);

        Ok(config)
    }

    /// Convert to the runtime console server configuration.
    pub fn to_console_config(&self) -> Result<ConsoleConfig, ConfigError> {
        let section = &self.console;
        let host: IpAddr = section
            .host
            .parse()
            .map_err(|_| ConfigError::InvalidHost(section.host.clone()))?;

        let mut session = SessionOptions::default()
            .with_prompts(&section.prompt, &section.continuation_prompt)
            .with_eval_timeout(seconds(section.eval_timeout_secs))
            .with_max_input_bytes(section.max_input_bytes);
        session = if section.show_banner {
            session.with_banner(section.banner.clone().unwrap_or_else(default_banner))
        } else {
            session.without_banner()
        };

        Ok(ConsoleConfig::new(host, section.port)
            .with_reuse_address(section.reuse_address)
            .with_session(session)
            .with_shutdown_timeout(seconds(section.shutdown_timeout_secs)))
    }

    /// Get the log level filter string.
    pub fn log_filter(&self) -> &str {
        &self.logging.level
    }
}

fn seconds(secs: u64) -> Option<Duration> {
    (secs > 0).then(|| Duration::from_secs(secs))
}

/// Configuration errors.
#[derive(Debug)]
pub enum ConfigError {
    /// IO error reading config file.
    Io(std::io::Error),
    /// JSON parsing error.
    Json(serde_json::Error),
    /// Invalid host address.
    InvalidHost(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io(e) => write!(f, "failed to read config file: {}", e),
            Self::Json(e) => write!(f, "failed to parse config file: {}", e),
            Self::InvalidHost(host) => write!(f, "invalid host address: {}", host),
        }
    }
}

impl std::error::Error for ConfigError {}
