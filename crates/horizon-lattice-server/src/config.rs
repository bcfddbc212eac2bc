//! Server configuration.
//!
//! Every field has a default, so the server runs with no configuration file at
//! all. A TOML file only needs the keys it wants to override:
//!
//! ```toml
//! settings_dir = "/boot/home/config/settings/app_server"
//! health_interval_ms = 5000
//!
//! [plain_font]
//! family = "Noto Sans"
//! style = "Regular"
//! size = 12.0
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Result, ServerError};

/// Name of the well-known command port.
pub const SERVER_PORT_NAME: &str = "OBappserver";
/// Name of the raw input port.
pub const SERVER_INPUT_PORT: &str = "OBinputport";

/// A font selection for one of the system font roles.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FontSpec {
    /// Family name, e.g. "Noto Sans".
    pub family: String,
    /// Style name, e.g. "Regular".
    pub style: String,
    /// Point size.
    pub size: f32,
}

impl FontSpec {
    /// Create a font selection.
    pub fn new(family: impl Into<String>, style: impl Into<String>, size: f32) -> Self {
        Self {
            family: family.into(),
            style: style.into(),
            size,
        }
    }
}

/// Configuration for the display server.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Name of the well-known command port.
    pub command_port_name: String,
    /// Backlog of the command port.
    pub command_port_capacity: usize,
    /// Name of the raw input port.
    pub input_port_name: String,
    /// Backlog of the raw input port.
    pub input_port_capacity: usize,
    /// Backlog of each session's listening port.
    pub session_port_capacity: usize,
    /// Maximum number of ports alive at once.
    pub max_ports: usize,
    /// Interval between health monitor scans, in milliseconds.
    pub health_interval_ms: u64,
    /// Number of waits granted to each session during shutdown.
    pub drain_attempts: u32,
    /// Length of each shutdown wait, in milliseconds.
    pub drain_interval_ms: u64,
    /// Whether a Quit request shuts the server down. Disabled when driving
    /// real display hardware.
    pub honor_quit_requests: bool,
    /// Directory holding `ColorSet.json` and `DecoratorSettings.json`.
    pub settings_dir: PathBuf,
    /// Directory searched for decorator add-ons by name.
    pub decorators_dir: PathBuf,
    /// Directories scanned by the font catalog at startup.
    pub font_dirs: Vec<PathBuf>,
    /// System plain font.
    pub plain_font: FontSpec,
    /// System bold font.
    pub bold_font: FontSpec,
    /// System fixed-width font.
    pub fixed_font: FontSpec,
    /// Enable debug logging.
    pub debug: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            command_port_name: SERVER_PORT_NAME.to_string(),
            command_port_capacity: 200,
            input_port_name: SERVER_INPUT_PORT.to_string(),
            input_port_capacity: 200,
            session_port_capacity: 100,
            max_ports: 4096,
            health_interval_ms: 2000,
            drain_attempts: 5,
            drain_interval_ms: 100,
            honor_quit_requests: true,
            settings_dir: PathBuf::from("/etc/horizon/app_server"),
            decorators_dir: PathBuf::from("/usr/lib/horizon/decorators"),
            font_dirs: vec![PathBuf::from("/usr/share/fonts")],
            plain_font: FontSpec::new("Noto Sans", "Regular", 12.0),
            bold_font: FontSpec::new("Noto Sans", "Bold", 12.0),
            fixed_font: FontSpec::new("Noto Sans Mono", "Regular", 12.0),
            debug: false,
        }
    }
}

impl ServerConfig {
    /// Create the default configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Load a configuration from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ServerError::ConfigRead {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&text).map_err(|source| ServerError::ConfigParse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Parse a configuration from TOML text.
    pub fn from_toml(text: &str) -> std::result::Result<Self, toml::de::Error> {
        toml::from_str(text)
    }

    /// Set the command port name.
    pub fn with_command_port_name(mut self, name: impl Into<String>) -> Self {
        self.command_port_name = name.into();
        self
    }

    /// Set the input port name.
    pub fn with_input_port_name(mut self, name: impl Into<String>) -> Self {
        self.input_port_name = name.into();
        self
    }

    /// Set the per-session port backlog.
    pub fn with_session_port_capacity(mut self, capacity: usize) -> Self {
        self.session_port_capacity = capacity;
        self
    }

    /// Set the port limit.
    pub fn with_max_ports(mut self, max: usize) -> Self {
        self.max_ports = max;
        self
    }

    /// Set the health monitor interval.
    pub fn with_health_interval(mut self, interval: Duration) -> Self {
        self.health_interval_ms = saturating_millis(interval);
        self
    }

    /// Set the shutdown wait schedule.
    pub fn with_drain(mut self, attempts: u32, interval: Duration) -> Self {
        self.drain_attempts = attempts;
        self.drain_interval_ms = saturating_millis(interval);
        self
    }

    /// Set whether Quit requests are honored.
    pub fn with_honor_quit_requests(mut self, honor: bool) -> Self {
        self.honor_quit_requests = honor;
        self
    }

    /// Set the settings directory.
    pub fn with_settings_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.settings_dir = dir.into();
        self
    }

    /// Set the decorator add-on directory.
    pub fn with_decorators_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.decorators_dir = dir.into();
        self
    }

    /// Set the font directories.
    pub fn with_font_dirs(mut self, dirs: Vec<PathBuf>) -> Self {
        self.font_dirs = dirs;
        self
    }

    /// Interval between health monitor scans.
    pub fn health_interval(&self) -> Duration {
        Duration::from_millis(self.health_interval_ms)
    }

    /// Length of each shutdown wait.
    pub fn drain_interval(&self) -> Duration {
        Duration::from_millis(self.drain_interval_ms)
    }

    /// Longest wait for a client context to finish: every shutdown wait
    /// back to back.
    pub fn drain_timeout(&self) -> Duration {
        self.drain_interval().saturating_mul(self.drain_attempts)
    }

    /// Path of the persisted palette.
    pub fn palette_path(&self) -> PathBuf {
        self.settings_dir.join("ColorSet.json")
    }

    /// Path of the persisted decorator choice.
    pub fn decorator_settings_path(&self) -> PathBuf {
        self.settings_dir.join("DecoratorSettings.json")
    }
}

/// Whole milliseconds in `duration`, saturating at `u64::MAX`.
pub(crate) fn saturating_millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}
