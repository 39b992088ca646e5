//! Mount configuration stored as JSON

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

use crate::mount::Site;
use crate::protocol::{
    ChannelTiming, LinkTarget, ProtocolError, DEFAULT_BAUD_RATE, DEFAULT_DRAIN_TIMEOUT_MS,
    DEFAULT_FIRST_READ_TIMEOUT_MS, DEFAULT_NETWORK_PORT, DEFAULT_NEXT_READ_TIMEOUT_MS,
    DEFAULT_OPEN_SETTLE_MS,
};

/// Errors loading or saving a [`MountConfig`]
#[derive(Error, Debug)]
pub enum ConfigError {
    /// The file could not be read or written
    #[error("Failed to access config file: {0}")]
    Io(#[from] std::io::Error),

    /// The file is not a valid config document
    #[error("Invalid config JSON: {0}")]
    Json(#[from] serde_json::Error),
}

/// Connection and behaviour settings for one mount
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MountConfig {
    /// Serial device path or `asi://host[:port]`
    pub port: String,

    /// Serial line speed
    pub baud_rate: u32,

    /// TCP port used when `port` names a network endpoint without one
    pub network_port: u16,

    /// Wait for the first reply byte
    pub first_read_timeout_ms: u64,
    /// Wait for each later reply byte
    pub next_read_timeout_ms: u64,
    /// Read timeout while discarding stale input
    pub drain_timeout_ms: u64,

    /// Quiet period after opening before the link is used
    pub open_settle_ms: u64,

    /// Firmware supports `:SH`/`:GH` daylight saving commands
    pub use_dst_commands: bool,

    /// Daylight saving flag sent with `:SH` when supported
    pub daylight_saving: bool,

    /// Epoch of the coordinates the mount reports (2000.0 = J2000)
    pub epoch: f64,

    /// Guide rate written when the mount cannot report one, percent of sidereal
    pub guide_rate: u32,

    /// Site written to a mount that has lost its clock
    pub site: Option<Site>,

    /// Poll interval while the mount is still
    pub idle_poll_ms: u64,
    /// Poll interval while the mount is moving
    pub busy_poll_ms: u64,

    /// Longest guide pulse accepted from callers
    pub max_guide_pulse_ms: u32,
}

impl Default for MountConfig {
    fn default() -> Self {
        Self {
            port: "/dev/ZWO_AM5".to_string(),
            baud_rate: DEFAULT_BAUD_RATE,
            network_port: DEFAULT_NETWORK_PORT,
            first_read_timeout_ms: DEFAULT_FIRST_READ_TIMEOUT_MS,
            next_read_timeout_ms: DEFAULT_NEXT_READ_TIMEOUT_MS,
            drain_timeout_ms: DEFAULT_DRAIN_TIMEOUT_MS,
            open_settle_ms: DEFAULT_OPEN_SETTLE_MS,
            use_dst_commands: false,
            daylight_saving: false,
            epoch: 2000.0,
            guide_rate: 50,
            site: None,
            idle_poll_ms: 1000,
            busy_poll_ms: 500,
            max_guide_pulse_ms: 3000,
        }
    }
}

impl MountConfig {
    /// Load from a JSON file. Missing fields take their defaults.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }

    /// Save as pretty-printed JSON
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        let content = serde_json::to_string_pretty(self)?;
        fs::write(path, content)?;
        Ok(())
    }

    /// Classify `port` as a serial device or a network endpoint
    pub fn link_target(&self) -> Result<LinkTarget, ProtocolError> {
        LinkTarget::parse(&self.port, self.baud_rate, self.network_port)
    }

    /// Read timeouts for the command channel
    pub fn channel_timing(&self) -> ChannelTiming {
        ChannelTiming {
            first_read: Duration::from_millis(self.first_read_timeout_ms),
            next_read: Duration::from_millis(self.next_read_timeout_ms),
            drain: Duration::from_millis(self.drain_timeout_ms),
        }
    }

    /// Pause after opening the link
    pub fn open_settle(&self) -> Duration {
        Duration::from_millis(self.open_settle_ms)
    }

    /// Idle poll interval
    pub fn idle_poll(&self) -> Duration {
        Duration::from_millis(self.idle_poll_ms)
    }

    /// Busy poll interval
    pub fn busy_poll(&self) -> Duration {
        Duration::from_millis(self.busy_poll_ms)
    }
}
