//! Daemon configuration.
//!
//! Timings, thresholds and listener settings.  Defaults match the board;
//! a JSON file (`-c`) and CLI flags override them.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Which device capabilities the registry should try to bind.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceSwitches {
    pub led: bool,
    pub segment: bool,
    pub buzzer: bool,
    pub cds: bool,
}

impl Default for DeviceSwitches {
    fn default() -> Self {
        Self {
            led: true,
            segment: true,
            buzzer: true,
            cds: true,
        }
    }
}

/// Core system configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SystemConfig {
    // --- Network ---
    /// Listen address (both protocols share the port)
    pub bind_address: String,
    pub port: u16,
    /// Directory holding `index.html` for the web page
    pub web_root: PathBuf,
    /// PID file written in daemon mode
    pub pid_file: PathBuf,
    /// Blocking read timeout on a session socket (milliseconds)
    pub session_read_timeout_ms: u64,

    // --- Devices ---
    pub devices: DeviceSwitches,
    /// Raw ADC value below which the room counts as bright
    pub light_threshold: u8,

    // --- Timing ---
    /// Countdown step (milliseconds)
    pub countdown_tick_ms: u64,
    /// Alarm length when a countdown reaches zero (milliseconds)
    pub alarm_duration_ms: u64,
    /// Length of one melody note (milliseconds)
    pub melody_note_ms: u64,
    /// Light sensor polling interval in auto mode (milliseconds)
    pub auto_poll_interval_ms: u64,
    /// Upper bound between two checks of a worker's stop flag (milliseconds)
    pub cancel_poll_ms: u64,
    /// Bounded join used by cancel-and-replace and stop (milliseconds)
    pub join_timeout_ms: u64,
    /// Grace period granted to background tasks at shutdown (milliseconds)
    pub shutdown_grace_ms: u64,
}

impl Default for SystemConfig {
    fn default() -> Self {
        Self {
            // Network
            bind_address: "0.0.0.0".into(),
            port: 8080,
            web_root: PathBuf::from("web"),
            pid_file: PathBuf::from("/var/run/iotctl.pid"),
            session_read_timeout_ms: 500,

            // Devices
            devices: DeviceSwitches::default(),
            light_threshold: 180,

            // Timing
            countdown_tick_ms: 1000,
            alarm_duration_ms: 3000,
            melody_note_ms: 280,
            auto_poll_interval_ms: 1000,
            cancel_poll_ms: 100,
            join_timeout_ms: 3000,
            shutdown_grace_ms: 2000,
        }
    }
}

/// Errors from loading or validating a [`SystemConfig`].
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("cannot read config file {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("config file {path} is not valid JSON: {source}")]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },
    /// A field failed range validation.
    #[error("validation failed: {0}")]
    ValidationFailed(&'static str),
}

impl SystemConfig {
    /// Load from a JSON file; missing fields keep their defaults.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Self = serde_json::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values that would break the timing model.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.cancel_poll_ms == 0 {
            return Err(ConfigError::ValidationFailed("cancel_poll_ms must be > 0"));
        }
        if self.countdown_tick_ms == 0 || self.auto_poll_interval_ms == 0 || self.melody_note_ms == 0 {
            return Err(ConfigError::ValidationFailed("device intervals must be > 0"));
        }
        if self.cancel_poll_ms > self.countdown_tick_ms || self.cancel_poll_ms > self.auto_poll_interval_ms {
            return Err(ConfigError::ValidationFailed(
                "cancel_poll_ms must not exceed the device intervals",
            ));
        }
        if self.join_timeout_ms == 0 {
            return Err(ConfigError::ValidationFailed("join_timeout_ms must be > 0"));
        }
        Ok(())
    }

    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.bind_address, self.port)
    }

    pub fn cancel_poll(&self) -> Duration {
        Duration::from_millis(self.cancel_poll_ms)
    }

    pub fn join_timeout(&self) -> Duration {
        Duration::from_millis(self.join_timeout_ms)
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_millis(self.shutdown_grace_ms)
    }
}
