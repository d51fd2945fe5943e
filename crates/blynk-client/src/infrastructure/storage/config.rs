//! TOML configuration for the `blynk-client` binary.
//!
//! The file is looked up at an explicit path (`--config`) or in the
//! platform-appropriate directory:
//! - Windows:  `%APPDATA%\BlynkClient\config.toml`
//! - Linux:    `$XDG_CONFIG_HOME/blynk-client/config.toml` (or `~/.config/...`)
//! - macOS:    `~/Library/Application Support/BlynkClient/config.toml`
//!
//! # Example
//!
//! ```toml
//! auth_token = "YourAuthToken"
//! log_level = "info"
//!
//! [server]
//! host = "blynk.cloud"
//! port = 80
//!
//! [timing]
//! heartbeat_secs = 10
//!
//! [reconnect]
//! policy = "exponential"
//! initial_ms = 1000
//! max_ms = 60000
//! ```
//!
//! # Serde default values
//!
//! Every field has a default, so an empty file (or no file at all) is a
//! valid configuration apart from the auth token, which must come from the
//! file, the command line, or the `BLYNK_AUTH_TOKEN` environment variable.

use std::path::{Path, PathBuf};
use std::time::Duration;

use blynk_core::protocol::command::{DEFAULT_RX_BUFFER_SIZE, MAX_WIRE_PAYLOAD};
use blynk_core::{Command, ReconnectPolicy};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::application::client::ClientConfig;

/// Upper bound for every configured period, in seconds (one day).
const MAX_PERIOD_SECS: u64 = 86_400;
/// Upper bound for every configured period, in milliseconds.
const MAX_PERIOD_MS: u64 = MAX_PERIOD_SECS * 1000;

/// Error type for configuration loading and validation.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The platform config directory could not be determined.
    #[error("could not determine platform config directory")]
    NoPlatformConfigDir,

    /// A file system I/O error occurred.
    #[error("I/O error accessing config at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The TOML content could not be parsed.
    #[error("failed to parse config TOML: {0}")]
    Parse(#[from] toml::de::Error),

    /// No auth token was configured.
    #[error("no auth token configured (set auth_token, --token or BLYNK_AUTH_TOKEN)")]
    MissingToken,

    /// A value is out of range.
    #[error("invalid config value: {0}")]
    Invalid(String),
}

// ── Config schema types ───────────────────────────────────────────────────────

/// Top-level configuration file.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AppConfig {
    /// Device auth token from the Blynk console.
    #[serde(default)]
    pub auth_token: String,
    /// `tracing` filter directive, e.g. `"info"` or `"blynk_client=debug"`.
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub timing: TimingConfig,
    #[serde(default)]
    pub reconnect: ReconnectSettings,
    #[serde(default)]
    pub device: DeviceConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

/// Timeouts and periods, in whole seconds unless the name says otherwise.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TimingConfig {
    #[serde(default = "default_ten")]
    pub heartbeat_secs: u64,
    #[serde(default = "default_ten")]
    pub login_timeout_secs: u64,
    #[serde(default = "default_ten")]
    pub ping_timeout_secs: u64,
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,
    /// How often the binary calls `step()`.
    #[serde(default = "default_poll_interval")]
    pub poll_interval_ms: u64,
}

/// Reconnect delay policy, selected by the `policy` key.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "policy", rename_all = "kebab-case")]
pub enum ReconnectSettings {
    Fixed {
        #[serde(default = "default_delay_ms")]
        delay_ms: u64,
    },
    Exponential {
        #[serde(default = "default_initial_ms")]
        initial_ms: u64,
        #[serde(default = "default_max_ms")]
        max_ms: u64,
    },
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum LoginCommand {
    Login,
    HardwareLogin,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DeviceConfig {
    #[serde(default = "default_rx_buffer_size")]
    pub rx_buffer_size: usize,
    #[serde(default = "default_true")]
    pub send_device_info: bool,
    #[serde(default = "default_login_command")]
    pub login_command: LoginCommand,
}

// ── Default helpers ───────────────────────────────────────────────────────────

fn default_log_level() -> String {
    "info".to_string()
}
fn default_host() -> String {
    "blynk.cloud".to_string()
}
fn default_port() -> u16 {
    80
}
fn default_ten() -> u64 {
    10
}
fn default_connect_timeout() -> u64 {
    5
}
fn default_poll_interval() -> u64 {
    50
}
fn default_delay_ms() -> u64 {
    5000
}
fn default_initial_ms() -> u64 {
    1000
}
fn default_max_ms() -> u64 {
    60_000
}
fn default_rx_buffer_size() -> usize {
    DEFAULT_RX_BUFFER_SIZE
}
fn default_true() -> bool {
    true
}
fn default_login_command() -> LoginCommand {
    LoginCommand::Login
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            auth_token: String::new(),
            log_level: default_log_level(),
            server: ServerConfig::default(),
            timing: TimingConfig::default(),
            reconnect: ReconnectSettings::default(),
            device: DeviceConfig::default(),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            heartbeat_secs: default_ten(),
            login_timeout_secs: default_ten(),
            ping_timeout_secs: default_ten(),
            connect_timeout_secs: default_connect_timeout(),
            poll_interval_ms: default_poll_interval(),
        }
    }
}

impl Default for ReconnectSettings {
    fn default() -> Self {
        ReconnectSettings::Fixed {
            delay_ms: default_delay_ms(),
        }
    }
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            rx_buffer_size: default_rx_buffer_size(),
            send_device_info: default_true(),
            login_command: default_login_command(),
        }
    }
}

// ── Conversion ────────────────────────────────────────────────────────────────

impl From<ReconnectSettings> for ReconnectPolicy {
    fn from(settings: ReconnectSettings) -> Self {
        match settings {
            ReconnectSettings::Fixed { delay_ms } => ReconnectPolicy::Fixed(Duration::from_millis(delay_ms)),
            ReconnectSettings::Exponential { initial_ms, max_ms } => ReconnectPolicy::Exponential {
                initial: Duration::from_millis(initial_ms),
                max: Duration::from_millis(max_ms.max(initial_ms)),
            },
        }
    }
}

impl From<LoginCommand> for Command {
    fn from(cmd: LoginCommand) -> Self {
        match cmd {
            LoginCommand::Login => Command::Login,
            LoginCommand::HardwareLogin => Command::HardwareLogin,
        }
    }
}

impl TimingConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(1))
    }
}

impl AppConfig {
    /// Validates the file and builds the runtime [`ClientConfig`].
    ///
    /// # Errors
    ///
    /// [`ConfigError::MissingToken`] if no token is set, or
    /// [`ConfigError::Invalid`] for a zero port, a zero or over-long period,
    /// or a buffer size outside `1..=MAX_WIRE_PAYLOAD / 2`.
    pub fn to_client_config(&self) -> Result<ClientConfig, ConfigError> {
        let token = self.auth_token.trim();
        if token.is_empty() {
            return Err(ConfigError::MissingToken);
        }
        if self.server.host.trim().is_empty() {
            return Err(ConfigError::Invalid("server.host is empty".into()));
        }
        if self.server.port == 0 {
            return Err(ConfigError::Invalid("server.port must be non-zero".into()));
        }
        for (name, value) in [
            ("timing.heartbeat_secs", self.timing.heartbeat_secs),
            ("timing.login_timeout_secs", self.timing.login_timeout_secs),
            ("timing.ping_timeout_secs", self.timing.ping_timeout_secs),
            ("timing.connect_timeout_secs", self.timing.connect_timeout_secs),
        ] {
            if value == 0 {
                return Err(ConfigError::Invalid(format!("{name} must be non-zero")));
            }
            if value > MAX_PERIOD_SECS {
                return Err(ConfigError::Invalid(format!("{name} must be at most {MAX_PERIOD_SECS}")));
            }
        }
        let millis = match self.reconnect {
            ReconnectSettings::Fixed { delay_ms } => vec![("reconnect.delay_ms", delay_ms)],
            ReconnectSettings::Exponential { initial_ms, max_ms } => {
                vec![("reconnect.initial_ms", initial_ms), ("reconnect.max_ms", max_ms)]
            }
        };
        for (name, value) in millis
            .into_iter()
            .chain([("timing.poll_interval_ms", self.timing.poll_interval_ms)])
        {
            if value > MAX_PERIOD_MS {
                return Err(ConfigError::Invalid(format!("{name} must be at most {MAX_PERIOD_MS}")));
            }
        }
        if self.device.rx_buffer_size == 0 {
            return Err(ConfigError::Invalid("device.rx_buffer_size must be non-zero".into()));
        }
        if self.device.rx_buffer_size > MAX_WIRE_PAYLOAD / 2 {
            return Err(ConfigError::Invalid(format!(
                "device.rx_buffer_size must be at most {}",
                MAX_WIRE_PAYLOAD / 2
            )));
        }

        Ok(ClientConfig {
            auth_token: token.to_string(),
            host: self.server.host.trim().to_string(),
            port: self.server.port,
            heartbeat: Duration::from_secs(self.timing.heartbeat_secs),
            login_timeout: Duration::from_secs(self.timing.login_timeout_secs),
            ping_timeout: Duration::from_secs(self.timing.ping_timeout_secs),
            reconnect: self.reconnect.clone().into(),
            rx_buffer_size: self.device.rx_buffer_size,
            login_command: self.device.login_command.into(),
            send_device_info: self.device.send_device_info,
        })
    }
}

// ── Loading ───────────────────────────────────────────────────────────────────

/// Determines the platform-appropriate directory for the config file.
///
/// # Errors
///
/// Returns [`ConfigError::NoPlatformConfigDir`] when the platform config base
/// directory cannot be determined from the environment.
pub fn config_dir() -> Result<PathBuf, ConfigError> {
    platform_config_dir().ok_or(ConfigError::NoPlatformConfigDir)
}

/// Resolves the full path to the default config file.
///
/// # Errors
///
/// Returns [`ConfigError::NoPlatformConfigDir`] if the base directory cannot be
/// determined.
pub fn config_file_path() -> Result<PathBuf, ConfigError> {
    Ok(config_dir()?.join("config.toml"))
}

/// Loads `AppConfig` from `path`, or from the default location when `path`
/// is `None`.
///
/// A missing file at the default location yields `AppConfig::default()`; a
/// missing file at an explicit path is an error.
///
/// # Errors
///
/// Returns [`ConfigError::Io`] for file-system errors and
/// [`ConfigError::Parse`] if the TOML is malformed.
pub fn load_config(path: Option<&Path>) -> Result<AppConfig, ConfigError> {
    let (path, explicit) = match path {
        Some(p) => (p.to_path_buf(), true),
        None => (config_file_path()?, false),
    };

    match std::fs::read_to_string(&path) {
        Ok(content) => parse_config(&content),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound && !explicit => Ok(AppConfig::default()),
        Err(source) => Err(ConfigError::Io { path, source }),
    }
}

/// Parses TOML text into an [`AppConfig`].
///
/// # Errors
///
/// Returns [`ConfigError::Parse`] if the TOML is malformed.
pub fn parse_config(content: &str) -> Result<AppConfig, ConfigError> {
    Ok(toml::from_str(content)?)
}

/// Resolves the platform config base directory plus the application subdirectory.
fn platform_config_dir() -> Option<PathBuf> {
    #[cfg(target_os = "windows")]
    {
        std::env::var_os("APPDATA").map(|p| PathBuf::from(p).join("BlynkClient"))
    }

    #[cfg(target_os = "linux")]
    {
        let base = std::env::var_os("XDG_CONFIG_HOME")
            .map(PathBuf::from)
            .or_else(|| std::env::var_os("HOME").map(|h| PathBuf::from(h).join(".config")))?;
        Some(base.join("blynk-client"))
    }

    #[cfg(target_os = "macos")]
    {
        std::env::var_os("HOME")
            .map(|h| PathBuf::from(h).join("Library").join("Application Support").join("BlynkClient"))
    }

    #[cfg(not(any(target_os = "windows", target_os = "linux", target_os = "macos")))]
    {
        None
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
